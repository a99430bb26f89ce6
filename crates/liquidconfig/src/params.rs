use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one of the six shader knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    PatternScale,
    Refraction,
    Edge,
    PatternBlur,
    Liquid,
    Speed,
}

/// Declared range and slider metadata for a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub kind: ParamKind,
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub default: f32,
}

impl ParamSpec {
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Pulls `value` into `[min, max]`. NaN falls back to the default.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

pub const PARAMS: [ParamSpec; 6] = [
    ParamSpec {
        kind: ParamKind::PatternScale,
        name: "pattern_scale",
        min: 1.0,
        max: 10.0,
        step: 0.1,
        default: 2.0,
    },
    ParamSpec {
        kind: ParamKind::Refraction,
        name: "refraction",
        min: 0.0,
        max: 0.06,
        step: 0.001,
        default: 0.015,
    },
    ParamSpec {
        kind: ParamKind::Edge,
        name: "edge",
        min: 0.0,
        max: 1.0,
        step: 0.01,
        default: 0.4,
    },
    ParamSpec {
        kind: ParamKind::PatternBlur,
        name: "pattern_blur",
        min: 0.0,
        max: 0.05,
        step: 0.001,
        default: 0.005,
    },
    ParamSpec {
        kind: ParamKind::Liquid,
        name: "liquid",
        min: 0.0,
        max: 1.0,
        step: 0.01,
        default: 0.07,
    },
    ParamSpec {
        kind: ParamKind::Speed,
        name: "speed",
        min: 0.0,
        max: 1.0,
        step: 0.01,
        default: 0.3,
    },
];

impl ParamKind {
    pub fn spec(self) -> &'static ParamSpec {
        match self {
            ParamKind::PatternScale => &PARAMS[0],
            ParamKind::Refraction => &PARAMS[1],
            ParamKind::Edge => &PARAMS[2],
            ParamKind::PatternBlur => &PARAMS[3],
            ParamKind::Liquid => &PARAMS[4],
            ParamKind::Speed => &PARAMS[5],
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec().name)
    }
}

/// The live set of shader knobs.
///
/// Values are not range-checked here; the renderer accepts whatever it is
/// given. Callers that take user input run [`ShaderParameterSet::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderParameterSet {
    pub pattern_scale: f32,
    pub refraction: f32,
    pub edge: f32,
    pub pattern_blur: f32,
    pub liquid: f32,
    pub speed: f32,
}

impl Default for ShaderParameterSet {
    fn default() -> Self {
        Self {
            pattern_scale: ParamKind::PatternScale.spec().default,
            refraction: ParamKind::Refraction.spec().default,
            edge: ParamKind::Edge.spec().default,
            pattern_blur: ParamKind::PatternBlur.spec().default,
            liquid: ParamKind::Liquid.spec().default,
            speed: ParamKind::Speed.spec().default,
        }
    }
}

/// Records a value that was pulled back into range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampNotice {
    pub kind: ParamKind,
    pub requested: f32,
    pub applied: f32,
}

impl ShaderParameterSet {
    pub fn get(&self, kind: ParamKind) -> f32 {
        match kind {
            ParamKind::PatternScale => self.pattern_scale,
            ParamKind::Refraction => self.refraction,
            ParamKind::Edge => self.edge,
            ParamKind::PatternBlur => self.pattern_blur,
            ParamKind::Liquid => self.liquid,
            ParamKind::Speed => self.speed,
        }
    }

    pub fn set(&mut self, kind: ParamKind, value: f32) {
        let slot = match kind {
            ParamKind::PatternScale => &mut self.pattern_scale,
            ParamKind::Refraction => &mut self.refraction,
            ParamKind::Edge => &mut self.edge,
            ParamKind::PatternBlur => &mut self.pattern_blur,
            ParamKind::Liquid => &mut self.liquid,
            ParamKind::Speed => &mut self.speed,
        };
        *slot = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static ParamSpec, f32)> + '_ {
        PARAMS.iter().map(move |spec| (spec, self.get(spec.kind)))
    }

    /// Returns a copy with every value inside its declared range, plus a
    /// notice for each value that had to move.
    pub fn clamped(&self) -> (Self, Vec<ClampNotice>) {
        let mut out = *self;
        let mut notices = Vec::new();
        for spec in PARAMS.iter() {
            let requested = self.get(spec.kind);
            let applied = spec.clamp(requested);
            if applied.to_bits() != requested.to_bits() {
                notices.push(ClampNotice {
                    kind: spec.kind,
                    requested,
                    applied,
                });
            }
            out.set(spec.kind, applied);
        }
        (out, notices)
    }

    pub fn is_within_ranges(&self) -> bool {
        self.iter().all(|(spec, value)| spec.contains(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_sit_inside_ranges() {
        let params = ShaderParameterSet::default();
        assert!(params.is_within_ranges());
        assert_eq!(params.pattern_scale, 2.0);
        assert_eq!(params.speed, 0.3);
    }

    #[test]
    fn clamping_reports_each_moved_value() {
        let params = ShaderParameterSet {
            pattern_scale: 40.0,
            refraction: -1.0,
            speed: f32::NAN,
            ..ShaderParameterSet::default()
        };
        let (clamped, notices) = params.clamped();
        assert_eq!(clamped.pattern_scale, 10.0);
        assert_eq!(clamped.refraction, 0.0);
        assert_eq!(clamped.speed, 0.3);
        assert_eq!(clamped.edge, 0.4);
        let kinds: Vec<_> = notices.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![ParamKind::PatternScale, ParamKind::Refraction, ParamKind::Speed]
        );
    }

    #[test]
    fn in_range_values_pass_through() {
        let (clamped, notices) = ShaderParameterSet::default().clamped();
        assert_eq!(clamped, ShaderParameterSet::default());
        assert!(notices.is_empty());
    }

    #[test]
    fn get_and_set_address_the_same_field() {
        let mut params = ShaderParameterSet::default();
        for spec in PARAMS.iter() {
            params.set(spec.kind, spec.max);
            assert_eq!(params.get(spec.kind), spec.max);
        }
    }
}
