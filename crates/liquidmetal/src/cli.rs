use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use liquidconfig::{ParamKind, ShaderParameterSet};

#[derive(Parser, Debug)]
#[command(
    name = "liquidmetal",
    author,
    version,
    about = "Liquid metal logo renderer",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(flatten)]
    pub preview: PreviewArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file; defaults to `liquidmetal.toml` in the config directory.
    #[arg(long, value_name = "FILE", global = true, env = "LIQUIDMETAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Re-download remote logos even when cached.
    #[arg(long, global = true, conflicts_with = "offline")]
    pub refresh: bool,

    /// Never touch the network; remote logos must already be cached.
    #[arg(long, global = true)]
    pub offline: bool,

    /// Directory for exports written without an explicit path.
    #[arg(long, value_name = "DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// Edge length of the square render surface, in logical pixels.
    #[arg(long, value_name = "PIXELS", global = true)]
    pub side: Option<u32>,

    /// Prefer a discrete GPU.
    #[arg(long, global = true)]
    pub high_performance: bool,

    /// Force a software adapter.
    #[arg(long, global = true)]
    pub software: bool,

    #[command(flatten)]
    pub params: ParamOverrides,
}

/// Per-knob overrides applied on top of the config file.
#[derive(Args, Debug, Clone, Copy, Default, PartialEq)]
pub struct ParamOverrides {
    /// Pattern scale (1-10).
    #[arg(long, value_name = "VALUE", global = true)]
    pub pattern_scale: Option<f32>,
    /// Refraction strength (0-0.06).
    #[arg(long, value_name = "VALUE", global = true)]
    pub refraction: Option<f32>,
    /// Edge thickness (0-1).
    #[arg(long, value_name = "VALUE", global = true)]
    pub edge: Option<f32>,
    /// Pattern blur (0-0.05).
    #[arg(long, value_name = "VALUE", global = true)]
    pub pattern_blur: Option<f32>,
    /// Liquid distortion (0-1).
    #[arg(long, value_name = "VALUE", global = true)]
    pub liquid: Option<f32>,
    /// Animation speed multiplier (0-1).
    #[arg(long, value_name = "VALUE", global = true)]
    pub speed: Option<f32>,
}

impl ParamOverrides {
    fn entries(&self) -> [(ParamKind, Option<f32>); 6] {
        [
            (ParamKind::PatternScale, self.pattern_scale),
            (ParamKind::Refraction, self.refraction),
            (ParamKind::Edge, self.edge),
            (ParamKind::PatternBlur, self.pattern_blur),
            (ParamKind::Liquid, self.liquid),
            (ParamKind::Speed, self.speed),
        ]
    }

    /// Copies every given override into `params`.
    pub fn apply(&self, params: &mut ShaderParameterSet) {
        for (kind, value) in self.entries() {
            if let Some(value) = value {
                params.set(kind, value);
            }
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct PreviewArgs {
    /// Logo handle: `preset:<name>`, `store:<id>`, an http(s) URL, or a file path.
    #[arg(value_name = "HANDLE")]
    pub logo: Option<String>,

    /// Reload parameters whenever the config file changes.
    #[arg(long)]
    pub watch: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a PNG still and/or a GIF loop without opening a window.
    Export(ExportArgs),
    /// Write the normalised mask for a logo as PNG (no GPU needed).
    Mask(MaskArgs),
    /// Print the resolved shader parameters.
    Params,
    /// List bundled preset logos.
    Presets,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Logo handle; defaults to the bundled preset.
    #[arg(value_name = "HANDLE")]
    pub logo: Option<String>,

    /// Write a PNG still to this path.
    #[arg(long, value_name = "PATH")]
    pub png: Option<PathBuf>,

    /// Write a GIF loop to this path.
    #[arg(long, value_name = "PATH")]
    pub gif: Option<PathBuf>,

    /// Accumulated animation time for the still, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 0.0)]
    pub time_ms: f32,

    /// GIF frame count; overrides `export.gif_frames`.
    #[arg(long, value_name = "COUNT")]
    pub frames: Option<u32>,

    /// GIF frame rate; overrides `export.gif_frame_delay`.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Step a virtual clock instead of waiting in real time.
    #[arg(long)]
    pub offline_clock: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MaskArgs {
    /// Logo handle.
    #[arg(value_name = "HANDLE")]
    pub logo: String,

    /// Destination PNG.
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_handle_selects_preview() {
        let cli = Cli::try_parse_from(["liquidmetal", "preset:ring", "--watch", "--speed", "0.5"])
            .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.preview.logo.as_deref(), Some("preset:ring"));
        assert!(cli.preview.watch);
        assert_eq!(cli.global.params.speed, Some(0.5));
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "liquidmetal",
            "export",
            "logo.svg",
            "--gif",
            "out.gif",
            "--frames",
            "12",
            "--edge",
            "0.2",
            "--offline",
        ])
        .unwrap();
        let Some(Command::Export(args)) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.logo.as_deref(), Some("logo.svg"));
        assert_eq!(args.frames, Some(12));
        assert_eq!(cli.global.params.edge, Some(0.2));
        assert!(cli.global.offline);
    }

    #[test]
    fn refresh_and_offline_conflict() {
        assert!(Cli::try_parse_from(["liquidmetal", "--refresh", "--offline"]).is_err());
    }

    #[test]
    fn overrides_only_touch_given_knobs() {
        let overrides = ParamOverrides {
            refraction: Some(0.03),
            speed: Some(0.0),
            ..Default::default()
        };
        let mut params = ShaderParameterSet::default();
        overrides.apply(&mut params);
        assert_eq!(params.refraction, 0.03);
        assert_eq!(params.speed, 0.0);
        assert_eq!(params.edge, ShaderParameterSet::default().edge);
    }
}
