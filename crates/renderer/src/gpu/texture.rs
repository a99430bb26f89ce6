use logomask::PixelBuffer;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::RenderError;

/// A mask uploaded to the GPU.
#[derive(Debug)]
pub struct GpuTexture {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl GpuTexture {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(crate) fn destroy(self) {
        self.texture.destroy();
    }
}

/// Uploads `image` as straight-alpha RGBA8. Rows are tightly packed, the
/// equivalent of a one byte unpack alignment.
pub(crate) fn upload_mask(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    image: &PixelBuffer,
    max_side: u32,
) -> Result<GpuTexture, RenderError> {
    let (width, height) = image.dimensions();
    if width > max_side || height > max_side {
        return Err(RenderError::TextureUpload(format!(
            "{width}x{height} exceeds the adapter limit of {max_side}"
        )));
    }

    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let texture = create_rgba_texture(device, queue, "mask texture", width, height, image.as_bytes());
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    if let Some(err) = validation.or(out_of_memory) {
        texture.destroy();
        return Err(RenderError::TextureUpload(err.to_string()));
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    tracing::debug!(width, height, "uploaded mask texture");
    Ok(GpuTexture {
        texture,
        view,
        width,
        height,
    })
}

/// White reads as empty background, so draws without a mask are transparent.
pub(crate) const PLACEHOLDER_TEXEL: [u8; 4] = [255; 4];

pub(crate) fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> GpuTexture {
    let texture = create_rgba_texture(device, queue, "placeholder mask", 1, 1, &PLACEHOLDER_TEXEL);
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        width: 1,
        height: 1,
    }
}

fn create_rgba_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    data: &[u8],
) -> wgpu::Texture {
    device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        data,
    )
}

/// Linear filtering, clamped to edge on both axes.
pub(crate) fn linear_clamp_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
        let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    }

    /// Mask opacity as computed in the fragment shader.
    fn mask_opacity(red: f32, edge_param: f32) -> f32 {
        1.0 - smoothstep(0.9 - 0.5 * edge_param, 1.0 - 0.5 * edge_param, red)
    }

    #[test]
    fn placeholder_draws_transparent_for_every_edge_setting() {
        let red = PLACEHOLDER_TEXEL[0] as f32 / 255.0;
        for step in 0..=10 {
            let edge_param = step as f32 / 10.0;
            assert_eq!(mask_opacity(red, edge_param), 0.0, "edge {edge_param}");
        }
        assert_eq!(mask_opacity(0.0, 0.4), 1.0);
    }

    #[test]
    fn opacity_ramp_matches_shader_source() {
        assert!(crate::compile::FRAGMENT_SHADER_GLSL
            .contains("float opacity = 1.0 - smoothstep(0.9 - 0.5 * u_edge, 1.0 - 0.5 * u_edge, edge);"));
    }
}
