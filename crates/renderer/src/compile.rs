use std::borrow::Cow;

use wgpu::naga::{self, ShaderStage};

use crate::RenderError;

/// Compiles the quad vertex stage.
pub(crate) fn compile_vertex_shader(
    device: &wgpu::Device,
) -> Result<wgpu::ShaderModule, RenderError> {
    compile_glsl(device, "liquid vertex", VERTEX_SHADER_GLSL, ShaderStage::Vertex)
}

/// Compiles the liquid metal fragment stage.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
) -> Result<wgpu::ShaderModule, RenderError> {
    compile_glsl(
        device,
        "liquid fragment",
        FRAGMENT_SHADER_GLSL,
        ShaderStage::Fragment,
    )
}

/// Compiles the vertex stage used to blit the offscreen target to a window.
pub(crate) fn compile_blit_vertex_shader(
    device: &wgpu::Device,
) -> Result<wgpu::ShaderModule, RenderError> {
    compile_glsl(device, "blit vertex", BLIT_VERTEX_GLSL, ShaderStage::Vertex)
}

pub(crate) fn compile_blit_fragment_shader(
    device: &wgpu::Device,
) -> Result<wgpu::ShaderModule, RenderError> {
    compile_glsl(
        device,
        "blit fragment",
        BLIT_FRAGMENT_GLSL,
        ShaderStage::Fragment,
    )
}

/// Source is checked with naga first so errors carry line information.
/// wgpu reports anything it still rejects as a validation error on the
/// device, so module creation runs inside an error scope as well.
fn compile_glsl(
    device: &wgpu::Device,
    label: &'static str,
    source: &'static str,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule, RenderError> {
    check_glsl(source, stage)?;
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage,
            defines: &[],
        },
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(RenderError::ShaderCompile {
            stage: stage_name(stage),
            message: err.to_string(),
        });
    }
    tracing::debug!(label, "compiled shader module");
    Ok(module)
}

/// Parses and validates `source` for `stage` without a device.
pub(crate) fn check_glsl(source: &str, stage: ShaderStage) -> Result<(), RenderError> {
    let compile_error = |message: String| RenderError::ShaderCompile {
        stage: stage_name(stage),
        message,
    };
    let mut frontend = naga::front::glsl::Frontend::default();
    let module = frontend
        .parse(&naga::front::glsl::Options::from(stage), source)
        .map_err(|err| compile_error(err.emit_to_string(source)))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|err| compile_error(err.emit_to_string(source)))?;
    Ok(())
}

fn stage_name(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "vertex",
        ShaderStage::Fragment => "fragment",
        _ => "compute",
    }
}

/// Maps the unit quad to clip space and passes UVs in `[0, 1]`.
pub(crate) const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = 0.5 * (a_position + 1.0);
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// The liquid metal program. The mask's red channel is the edge field:
/// white reads as background and black as metal.
///
/// The uniform block must match [`crate::LiquidUniforms`] field for field.
pub(crate) const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform LiquidParams {
    float time;
    float ratio;
    float img_ratio;
    float pattern_scale;
    float refraction;
    float edge;
    float pattern_blur;
    float liquid;
} ubo;

#define u_time ubo.time
#define u_ratio ubo.ratio
#define u_img_ratio ubo.img_ratio
#define u_patternScale ubo.pattern_scale
#define u_refraction ubo.refraction
#define u_edge ubo.edge
#define u_patternBlur ubo.pattern_blur
#define u_liquid ubo.liquid

layout(set = 1, binding = 0) uniform texture2D mask_texture;
layout(set = 1, binding = 1) uniform sampler mask_sampler;

#define PI 3.14159265358979323846

vec3 mod289_3(vec3 x) {
    return x - floor(x * (1.0 / 289.0)) * 289.0;
}

vec2 mod289_2(vec2 x) {
    return x - floor(x * (1.0 / 289.0)) * 289.0;
}

vec3 permute(vec3 x) {
    return mod289_3(((x * 34.0) + 1.0) * x);
}

float snoise(vec2 v) {
    const vec4 C = vec4(0.211324865405187, 0.366025403784439, -0.577350269189626, 0.024390243902439);
    vec2 i = floor(v + dot(v, C.yy));
    vec2 x0 = v - i + dot(i, C.xx);
    float upper = step(x0.y, x0.x);
    vec2 i1 = vec2(upper, 1.0 - upper);
    vec4 x12 = x0.xyxy + C.xxzz - vec4(i1, 0.0, 0.0);
    i = mod289_2(i);
    vec3 p = permute(permute(i.y + vec3(0.0, i1.y, 1.0)) + i.x + vec3(0.0, i1.x, 1.0));
    vec3 m = max(vec3(0.5) - vec3(dot(x0, x0), dot(x12.xy, x12.xy), dot(x12.zw, x12.zw)), vec3(0.0));
    m = m * m;
    m = m * m;
    vec3 x = 2.0 * fract(p * C.www) - 1.0;
    vec3 h = abs(x) - 0.5;
    vec3 ox = floor(x + 0.5);
    vec3 a0 = x - ox;
    m = m * (1.79284291400159 - 0.85373472095314 * (a0 * a0 + h * h));
    vec3 g = vec3(
        a0.x * x0.x + h.x * x0.y,
        a0.y * x12.x + h.y * x12.y,
        a0.z * x12.z + h.z * x12.w
    );
    return 130.0 * dot(m, g);
}

vec2 get_img_uv() {
    vec2 img_uv = v_uv - 0.5;
    if (u_ratio > u_img_ratio) {
        img_uv = vec2(img_uv.x * u_ratio / u_img_ratio, img_uv.y);
    } else {
        img_uv = vec2(img_uv.x, img_uv.y * u_img_ratio / u_ratio);
    }
    img_uv = img_uv + 0.5;
    return vec2(img_uv.x, 1.0 - img_uv.y);
}

vec2 rotate(vec2 uv, float th) {
    return mat2(cos(th), sin(th), -sin(th), cos(th)) * uv;
}

float get_color_channel(float c1, float c2, float stripe_p, vec3 w, float extra_blur, float b) {
    float ch = c2;
    float border = 0.0;
    float blur = u_patternBlur + extra_blur;

    ch = mix(ch, c1, smoothstep(0.0, blur, stripe_p));

    border = w.x;
    ch = mix(ch, c2, smoothstep(border - blur, border + blur, stripe_p));

    float bulge = smoothstep(0.2, 0.8, b);
    border = w.x + 0.4 * (1.0 - bulge) * w.y;
    ch = mix(ch, c1, smoothstep(border - blur, border + blur, stripe_p));

    border = w.x + 0.5 * (1.0 - bulge) * w.y;
    ch = mix(ch, c2, smoothstep(border - blur, border + blur, stripe_p));

    border = w.x + w.y;
    ch = mix(ch, c1, smoothstep(border - blur, border + blur, stripe_p));

    float gradient_t = (stripe_p - w.x - w.y) / w.z;
    float gradient = mix(c1, c2, smoothstep(0.0, 1.0, gradient_t));
    ch = mix(ch, gradient, smoothstep(border - blur, border + blur, stripe_p));

    return ch;
}

float get_img_frame_alpha(vec2 uv, float img_frame_width) {
    float alpha = smoothstep(0.0, img_frame_width, uv.x) * smoothstep(1.0, 1.0 - img_frame_width, uv.x);
    alpha *= smoothstep(0.0, img_frame_width, uv.y) * smoothstep(1.0, 1.0 - img_frame_width, uv.y);
    return alpha;
}

void main() {
    vec2 uv = vec2(v_uv.x * u_ratio, 1.0 - v_uv.y);

    float diagonal = uv.x - uv.y;
    float t = 0.001 * u_time;

    vec2 img_uv = get_img_uv();
    vec4 img = texture(sampler2D(mask_texture, mask_sampler), img_uv);

    vec3 color1 = vec3(0.98, 0.98, 1.0);
    vec3 color2 = vec3(0.1, 0.1, 0.1 + 0.1 * smoothstep(0.7, 1.3, uv.x + uv.y));

    float edge = img.r;

    vec2 grad_uv = uv - 0.5;
    float dist = length(grad_uv + vec2(0.0, 0.2 * diagonal));
    grad_uv = rotate(grad_uv, (0.25 - 0.2 * diagonal) * PI);

    float bulge = pow(1.8 * dist, 1.2);
    bulge = 1.0 - bulge;
    bulge *= pow(uv.y, 0.3);

    float cycle_width = u_patternScale;
    float thin_strip_1_ratio = 0.12 / cycle_width * (1.0 - 0.4 * bulge);
    float thin_strip_2_ratio = 0.07 / cycle_width * (1.0 + 0.4 * bulge);
    float wide_strip_ratio = 1.0 - thin_strip_1_ratio - thin_strip_2_ratio;

    float thin_strip_1_width = cycle_width * thin_strip_1_ratio;
    float thin_strip_2_width = cycle_width * thin_strip_2_ratio;

    float opacity = 1.0 - smoothstep(0.9 - 0.5 * u_edge, 1.0 - 0.5 * u_edge, edge);
    opacity *= get_img_frame_alpha(img_uv, 0.01);

    float noise = snoise(uv - t);

    edge += (1.0 - edge) * u_liquid * noise;

    float refr = clamp(1.0 - bulge, 0.0, 1.0);

    float dir = grad_uv.x;
    dir += diagonal;
    dir -= 2.0 * noise * diagonal * (smoothstep(0.0, 1.0, edge) * smoothstep(1.0, 0.0, edge));

    bulge *= clamp(pow(uv.y, 0.1), 0.3, 1.0);
    dir *= (0.1 + (1.1 - edge) * bulge);
    dir *= smoothstep(1.0, 0.7, edge);

    dir += 0.18 * (smoothstep(0.1, 0.2, uv.y) * smoothstep(0.4, 0.2, uv.y));
    dir += 0.03 * (smoothstep(0.1, 0.2, 1.0 - uv.y) * smoothstep(0.4, 0.2, 1.0 - uv.y));

    dir *= (0.5 + 0.5 * pow(uv.y, 2.0));
    dir *= cycle_width;
    dir -= t;

    float refr_r = refr;
    refr_r += 0.03 * bulge * noise;
    float refr_b = 1.3 * refr;

    refr_r += 5.0 * (smoothstep(-0.1, 0.2, uv.y) * smoothstep(0.5, 0.1, uv.y)) * (smoothstep(0.4, 0.6, bulge) * smoothstep(1.0, 0.4, bulge));
    refr_r -= diagonal;

    refr_b += (smoothstep(0.0, 0.4, uv.y) * smoothstep(0.8, 0.1, uv.y)) * (smoothstep(0.4, 0.6, bulge) * smoothstep(0.8, 0.4, bulge));
    refr_b -= 0.2 * edge;

    refr_r *= u_refraction;
    refr_b *= u_refraction;

    vec3 w = vec3(
        thin_strip_1_width,
        thin_strip_2_width - 0.02 * smoothstep(0.0, 1.0, edge + bulge),
        wide_strip_ratio
    );

    float stripe_r = fract(dir + refr_r);
    float r = get_color_channel(color1.r, color2.r, stripe_r, w, 0.02 + 0.03 * u_refraction * bulge, bulge);
    float stripe_g = fract(dir);
    float g = get_color_channel(color1.g, color2.g, stripe_g, w, 0.01 / (1.0 - diagonal), bulge);
    float stripe_b = fract(dir - refr_b);
    float b = get_color_channel(color1.b, color2.b, stripe_b, w, 0.01, bulge);

    vec3 color = vec3(r, g, b) * opacity;
    out_color = vec4(color, opacity);
}
";

/// Fullscreen triangle for the window blit.
const BLIT_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = vec2(0.5 * (pos.x + 1.0), 0.5 * (1.0 - pos.y));
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

const BLIT_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 0) uniform texture2D frame_texture;
layout(set = 0, binding = 1) uniform sampler frame_sampler;

void main() {
    out_color = texture(sampler2D(frame_texture, frame_sampler), v_uv);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liquid_stages_pass_naga_validation() {
        check_glsl(VERTEX_SHADER_GLSL, ShaderStage::Vertex).unwrap();
        check_glsl(FRAGMENT_SHADER_GLSL, ShaderStage::Fragment).unwrap();
    }

    #[test]
    fn blit_stages_pass_naga_validation() {
        check_glsl(BLIT_VERTEX_GLSL, ShaderStage::Vertex).unwrap();
        check_glsl(BLIT_FRAGMENT_GLSL, ShaderStage::Fragment).unwrap();
    }

    #[test]
    fn syntax_errors_become_compile_errors_for_their_stage() {
        let broken = FRAGMENT_SHADER_GLSL.replace("out_color = vec4(color, opacity);", "out_color = ;");
        match check_glsl(&broken, ShaderStage::Fragment) {
            Err(RenderError::ShaderCompile { stage, message }) => {
                assert_eq!(stage, "fragment");
                assert!(!message.is_empty());
            }
            other => panic!("expected a fragment compile error, got {other:?}"),
        }
    }

    #[test]
    fn type_errors_are_reported_for_the_vertex_stage() {
        let broken = VERTEX_SHADER_GLSL.replace("v_uv = 0.5 * (a_position + 1.0);", "v_uv = a_position.xyz;");
        assert!(matches!(
            check_glsl(&broken, ShaderStage::Vertex),
            Err(RenderError::ShaderCompile { stage: "vertex", .. })
        ));
    }

    #[test]
    fn stage_interface_locations_line_up() {
        assert!(VERTEX_SHADER_GLSL.contains("layout(location = 0) out vec2 v_uv"));
        assert!(FRAGMENT_SHADER_GLSL.contains("layout(location = 0) in vec2 v_uv"));
    }
}
