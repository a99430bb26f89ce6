mod params;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

pub use params::{ClampNotice, ParamKind, ParamSpec, ShaderParameterSet, PARAMS};

pub const CONFIG_FILE_NAME: &str = "liquidmetal.toml";

/// Canonical square render side in CSS pixels.
pub const DEFAULT_SURFACE_SIDE: u32 = 1000;
pub const DEFAULT_GIF_FRAMES: u32 = 120;
pub const DEFAULT_GIF_SPEED: i32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiquidConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub params: ShaderParameterSet,
    #[serde(default)]
    pub surface: SurfaceSettings,
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub sources: SourceSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SurfaceSettings {
    pub side: u32,
    pub pixel_ratio: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportSettings {
    #[serde(default = "default_gif_frames")]
    pub gif_frames: u32,
    #[serde(
        default = "default_gif_frame_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub gif_frame_delay: Duration,
    /// NeuQuant sampling factor, 1 is slowest and best.
    #[serde(default = "default_gif_speed")]
    pub gif_speed: i32,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceSettings {
    /// Base URL holding uploaded logos as `<id>.png`.
    pub store_base: Option<String>,
    /// Service answering `/api/user-logo?id=` with the logo's URL.
    pub api_base: Option<String>,
}

impl Default for LiquidConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            params: ShaderParameterSet::default(),
            surface: SurfaceSettings::default(),
            export: ExportSettings::default(),
            sources: SourceSettings::default(),
        }
    }
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            side: DEFAULT_SURFACE_SIDE,
            pixel_ratio: 1.0,
        }
    }
}

impl SurfaceSettings {
    /// Device pixels along one edge of the square surface.
    pub fn device_side(&self) -> u32 {
        let ratio = if self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0 {
            self.pixel_ratio
        } else {
            1.0
        };
        ((self.side as f32) * ratio).round().max(1.0) as u32
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            gif_frames: default_gif_frames(),
            gif_frame_delay: default_gif_frame_delay(),
            gif_speed: default_gif_speed(),
            output_dir: None,
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_gif_frames() -> u32 {
    DEFAULT_GIF_FRAMES
}

/// 24 frames per second.
pub fn default_gif_frame_delay() -> Duration {
    Duration::from_secs_f64(1.0 / 24.0)
}

fn default_gif_speed() -> i32 {
    DEFAULT_GIF_SPEED
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_duration_opt(deserializer).map(|d| d.unwrap_or_else(default_gif_frame_delay))
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v.trim())
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be finite and non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl LiquidConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: LiquidConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        for (spec, value) in self.params.iter() {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "params.{} must be a finite number",
                    spec.name
                )));
            }
        }

        if self.surface.side == 0 {
            return Err(ConfigError::Invalid(
                "surface.side must be greater than zero".into(),
            ));
        }

        if !self.surface.pixel_ratio.is_finite() || self.surface.pixel_ratio <= 0.0 {
            return Err(ConfigError::Invalid(
                "surface.pixel_ratio must be a positive number".into(),
            ));
        }

        if self.export.gif_frames == 0 {
            return Err(ConfigError::Invalid(
                "export.gif_frames must be greater than zero".into(),
            ));
        }

        if self.export.gif_frame_delay.is_zero() {
            return Err(ConfigError::Invalid(
                "export.gif_frame_delay must be greater than zero".into(),
            ));
        }

        if !(1..=30).contains(&self.export.gif_speed) {
            return Err(ConfigError::Invalid(format!(
                "export.gif_speed must be within 1..=30, got {}",
                self.export.gif_speed
            )));
        }

        for (field, value) in [
            ("sources.store_base", &self.sources.store_base),
            ("sources.api_base", &self.sources.api_base),
        ] {
            if let Some(url) = value {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid(format!(
                        "{field} must be an http(s) URL, got '{url}'"
                    )));
                }
            }
        }

        Ok(())
    }
}
