use std::mem::offset_of;

use bytemuck::{Pod, Zeroable};
use liquidconfig::{ParamKind, ShaderParameterSet};

/// CPU mirror of the `LiquidParams` uniform block.
///
/// Eight scalar floats pack contiguously under std140, so a plain
/// `#[repr(C)]` struct lines up with the shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LiquidUniforms {
    /// Accumulated animation time in milliseconds.
    pub time: f32,
    /// Surface width over height. The surface is square so this stays 1.
    pub ratio: f32,
    pub img_ratio: f32,
    pub pattern_scale: f32,
    pub refraction: f32,
    pub edge: f32,
    pub pattern_blur: f32,
    pub liquid: f32,
}

/// What a uniform slot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformRole {
    Time,
    SurfaceRatio,
    ImageRatio,
    Parameter(ParamKind),
}

/// One entry of the static uniform table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    /// Name the shader code refers to.
    pub name: &'static str,
    /// Field inside the uniform block.
    pub field: &'static str,
    pub role: UniformRole,
    /// Byte offset inside [`LiquidUniforms`].
    pub offset: usize,
}

/// Every uniform the liquid program reads, in block order.
pub const UNIFORM_TABLE: [UniformSlot; 8] = [
    UniformSlot {
        name: "u_time",
        field: "time",
        role: UniformRole::Time,
        offset: offset_of!(LiquidUniforms, time),
    },
    UniformSlot {
        name: "u_ratio",
        field: "ratio",
        role: UniformRole::SurfaceRatio,
        offset: offset_of!(LiquidUniforms, ratio),
    },
    UniformSlot {
        name: "u_img_ratio",
        field: "img_ratio",
        role: UniformRole::ImageRatio,
        offset: offset_of!(LiquidUniforms, img_ratio),
    },
    UniformSlot {
        name: "u_patternScale",
        field: "pattern_scale",
        role: UniformRole::Parameter(ParamKind::PatternScale),
        offset: offset_of!(LiquidUniforms, pattern_scale),
    },
    UniformSlot {
        name: "u_refraction",
        field: "refraction",
        role: UniformRole::Parameter(ParamKind::Refraction),
        offset: offset_of!(LiquidUniforms, refraction),
    },
    UniformSlot {
        name: "u_edge",
        field: "edge",
        role: UniformRole::Parameter(ParamKind::Edge),
        offset: offset_of!(LiquidUniforms, edge),
    },
    UniformSlot {
        name: "u_patternBlur",
        field: "pattern_blur",
        role: UniformRole::Parameter(ParamKind::PatternBlur),
        offset: offset_of!(LiquidUniforms, pattern_blur),
    },
    UniformSlot {
        name: "u_liquid",
        field: "liquid",
        role: UniformRole::Parameter(ParamKind::Liquid),
        offset: offset_of!(LiquidUniforms, liquid),
    },
];

impl LiquidUniforms {
    pub fn new(params: &ShaderParameterSet) -> Self {
        let mut uniforms = Self {
            time: 0.0,
            ratio: 1.0,
            img_ratio: 1.0,
            ..Self::zeroed()
        };
        uniforms.apply_parameters(params);
        uniforms
    }

    /// Copies every shader-visible knob. Speed is consumed by the clock and
    /// has no slot.
    pub fn apply_parameters(&mut self, params: &ShaderParameterSet) {
        for slot in &UNIFORM_TABLE {
            if let UniformRole::Parameter(kind) = slot.role {
                self.set(slot.role, params.get(kind));
            }
        }
    }

    pub fn get(&self, role: UniformRole) -> f32 {
        match role {
            UniformRole::Time => self.time,
            UniformRole::SurfaceRatio => self.ratio,
            UniformRole::ImageRatio => self.img_ratio,
            UniformRole::Parameter(ParamKind::PatternScale) => self.pattern_scale,
            UniformRole::Parameter(ParamKind::Refraction) => self.refraction,
            UniformRole::Parameter(ParamKind::Edge) => self.edge,
            UniformRole::Parameter(ParamKind::PatternBlur) => self.pattern_blur,
            UniformRole::Parameter(ParamKind::Liquid) => self.liquid,
            UniformRole::Parameter(ParamKind::Speed) => 0.0,
        }
    }

    pub fn set(&mut self, role: UniformRole, value: f32) {
        let slot = match role {
            UniformRole::Time => &mut self.time,
            UniformRole::SurfaceRatio => &mut self.ratio,
            UniformRole::ImageRatio => &mut self.img_ratio,
            UniformRole::Parameter(ParamKind::PatternScale) => &mut self.pattern_scale,
            UniformRole::Parameter(ParamKind::Refraction) => &mut self.refraction,
            UniformRole::Parameter(ParamKind::Edge) => &mut self.edge,
            UniformRole::Parameter(ParamKind::PatternBlur) => &mut self.pattern_blur,
            UniformRole::Parameter(ParamKind::Liquid) => &mut self.liquid,
            UniformRole::Parameter(ParamKind::Speed) => return,
        };
        *slot = value;
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::FRAGMENT_SHADER_GLSL;

    #[test]
    fn block_is_eight_packed_floats() {
        assert_eq!(std::mem::size_of::<LiquidUniforms>(), 32);
        for (index, slot) in UNIFORM_TABLE.iter().enumerate() {
            assert_eq!(slot.offset, index * 4, "{}", slot.name);
        }
    }

    #[test]
    fn table_matches_shader_declarations() {
        let block_start = FRAGMENT_SHADER_GLSL
            .find("uniform LiquidParams")
            .expect("uniform block present");
        let mut last_position = block_start;
        for slot in &UNIFORM_TABLE {
            let alias = format!("#define {} ubo.{}", slot.name, slot.field);
            assert!(FRAGMENT_SHADER_GLSL.contains(&alias), "missing {alias}");

            let member = format!("float {};", slot.field);
            let position = FRAGMENT_SHADER_GLSL[block_start..]
                .find(&member)
                .map(|offset| block_start + offset)
                .unwrap_or_else(|| panic!("missing member {member}"));
            assert!(position > last_position, "{} out of order", slot.field);
            last_position = position;
        }
    }

    #[test]
    fn parameters_land_in_their_slots() {
        let mut params = ShaderParameterSet::default();
        params.set(ParamKind::Refraction, 0.05);
        params.set(ParamKind::Speed, 0.9);
        let uniforms = LiquidUniforms::new(&params);
        assert_eq!(uniforms.refraction, 0.05);
        assert_eq!(uniforms.pattern_scale, params.pattern_scale);
        assert_eq!(uniforms.ratio, 1.0);
        assert_eq!(uniforms.time, 0.0);

        let bytes = uniforms.as_bytes();
        let slot = UNIFORM_TABLE
            .iter()
            .find(|slot| slot.name == "u_refraction")
            .unwrap();
        let raw = &bytes[slot.offset..slot.offset + 4];
        assert_eq!(f32::from_ne_bytes(raw.try_into().unwrap()), 0.05);
    }

    #[test]
    fn non_finite_values_are_written_as_given() {
        let mut params = ShaderParameterSet::default();
        params.set(ParamKind::Liquid, f32::NAN);
        let uniforms = LiquidUniforms::new(&params);
        assert!(uniforms.liquid.is_nan());
    }
}
