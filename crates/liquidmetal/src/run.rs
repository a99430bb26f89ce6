use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use liquidconfig::{ExportSettings, LiquidConfig, ShaderParameterSet};
use logomask::{normalize, RawImage};
use logosource::{
    FetchPolicy, LogoClient, LogoHandle, LogoRepository, RemoteConfig, DEFAULT_PRESET, PRESETS,
};
use renderer::{
    BoxedTimeSource, GpuOptions, GpuPowerPreference, HeadlessRunner, LogoFetcher,
    PreviewOptions, PreviewWindow, RenderSurface, SimulatedTimeSource, SystemTimeSource,
    WgpuBackend, timestamped_export_path,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{ExportArgs, GlobalArgs, MaskArgs, ParamOverrides, PreviewArgs};
use crate::paths::AppPaths;
use crate::watch::ConfigWatcher;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file, parameters and directories resolved for one invocation.
struct Session {
    paths: AppPaths,
    config_path: PathBuf,
    config_found: bool,
    config: LiquidConfig,
    params: ShaderParameterSet,
}

impl Session {
    fn open(global: &GlobalArgs) -> Result<Self> {
        let paths = AppPaths::discover()?;
        let config_path = global
            .config
            .clone()
            .unwrap_or_else(|| paths.config_file());
        let (mut config, config_found) = load_config(&config_path, global.config.is_some())?;
        if let Some(side) = global.side {
            if side == 0 {
                bail!("--side must be greater than zero");
            }
            config.surface.side = side;
        }
        let params = resolve_parameters(&config.params, &global.params);
        debug!(
            config = %config_path.display(),
            found = config_found,
            cache = %paths.cache_dir().display(),
            side = config.surface.side,
            "resolved liquidmetal session"
        );
        Ok(Self {
            paths,
            config_path,
            config_found,
            config,
            params,
        })
    }

    fn repository(&self, global: &GlobalArgs) -> Result<LogoRepository> {
        let client = if global.offline {
            info!("remote fetch disabled (--offline)");
            None
        } else {
            let sources = &self.config.sources;
            let remote =
                RemoteConfig::new(sources.store_base.as_deref(), sources.api_base.as_deref())?;
            Some(LogoClient::new(remote)?)
        };
        Ok(LogoRepository::new(self.paths.logo_cache_dir(), client))
    }

    fn output_dir(&self, global: &GlobalArgs) -> Result<PathBuf> {
        match global
            .output_dir
            .clone()
            .or_else(|| self.config.export.output_dir.clone())
        {
            Some(dir) => Ok(dir),
            None => env::current_dir().context("failed to read the working directory"),
        }
    }
}

/// Reads the config file. A missing default file means defaults; a missing
/// file named with `--config` is an error.
fn load_config(path: &Path, explicit: bool) -> Result<(LiquidConfig, bool)> {
    if !path.exists() {
        if explicit {
            bail!("config file {} does not exist", path.display());
        }
        return Ok((LiquidConfig::default(), false));
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = LiquidConfig::from_toml_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok((config, true))
}

/// Applies CLI overrides and pulls every knob into its declared range,
/// warning for each value that moved.
pub(crate) fn resolve_parameters(
    base: &ShaderParameterSet,
    overrides: &ParamOverrides,
) -> ShaderParameterSet {
    let mut params = *base;
    overrides.apply(&mut params);
    let (clamped, notices) = params.clamped();
    for notice in notices {
        warn!(
            param = notice.kind.spec().name,
            requested = notice.requested,
            applied = notice.applied,
            "parameter out of range; clamped"
        );
    }
    clamped
}

fn fetch_policy(global: &GlobalArgs) -> FetchPolicy {
    if global.offline {
        FetchPolicy::Offline
    } else if global.refresh {
        FetchPolicy::Refresh
    } else {
        FetchPolicy::PreferCache
    }
}

fn gpu_options(global: &GlobalArgs) -> GpuOptions {
    GpuOptions {
        power: if global.high_performance {
            GpuPowerPreference::High
        } else {
            GpuPowerPreference::Low
        },
        force_fallback_adapter: global.software,
    }
}

fn logo_input(logo: Option<String>) -> String {
    logo.unwrap_or_else(|| format!("preset:{DEFAULT_PRESET}"))
}

fn resolve_logo(repository: &LogoRepository, input: &str, policy: FetchPolicy) -> Result<RawImage> {
    let handle = LogoHandle::from_input(input)?;
    let resolved = repository
        .resolve(&handle, policy)
        .with_context(|| format!("failed to load logo {handle}"))?;
    debug!(logo = %resolved.handle, origin = ?resolved.origin, "logo resolved");
    Ok(resolved.image)
}

/// GIF settings with `--frames` and `--fps` folded in.
fn export_settings(
    base: &ExportSettings,
    frames: Option<u32>,
    fps: Option<f32>,
) -> Result<ExportSettings> {
    let mut settings = base.clone();
    if let Some(frames) = frames {
        if frames == 0 {
            bail!("--frames must be at least 1");
        }
        settings.gif_frames = frames;
    }
    if let Some(fps) = fps {
        if !fps.is_finite() || fps <= 0.0 {
            bail!("--fps must be a positive number, got {fps}");
        }
        settings.gif_frame_delay = Duration::from_secs_f64(1.0 / f64::from(fps));
    }
    if settings.gif_frames == 0 {
        bail!("export.gif_frames must be at least 1");
    }
    Ok(settings)
}

pub fn preview(global: &GlobalArgs, args: PreviewArgs) -> Result<()> {
    let session = Session::open(global)?;
    let policy = fetch_policy(global);
    let repository = Arc::new(session.repository(global)?);
    let fetcher: LogoFetcher = Arc::new(move |input: &str| resolve_logo(&repository, input, policy));

    let options = PreviewOptions {
        initial_logo: Some(logo_input(args.logo)),
        params: session.params,
        surface: session.config.surface.clone(),
        export: session.config.export.clone(),
        gpu: gpu_options(global),
        output_dir: session.output_dir(global)?,
    };
    let window = PreviewWindow::spawn(options, fetcher)?;
    info!("preview running: Space pauses, S saves a PNG, G records a GIF, Esc quits");

    let _watcher = if args.watch {
        let proxy = window.proxy();
        Some(ConfigWatcher::spawn(
            session.config_path.clone(),
            global.params,
            move |params| proxy.set_parameters(params),
        )?)
    } else {
        None
    };
    window.wait()
}

pub fn export(global: &GlobalArgs, args: ExportArgs) -> Result<()> {
    let session = Session::open(global)?;
    let export = export_settings(&session.config.export, args.frames, args.fps)?;
    let (png, gif) = match (args.png, args.gif) {
        (None, None) => (
            Some(timestamped_export_path(&session.output_dir(global)?, "png")),
            None,
        ),
        paths => paths,
    };

    let repository = session.repository(global)?;
    let input = logo_input(args.logo);
    let raw = resolve_logo(&repository, &input, fetch_policy(global))?;
    let mask = normalize(&raw).with_context(|| format!("failed to normalise {input}"))?;

    let backend = WgpuBackend::headless(&gpu_options(global))?;
    let profile = backend.adapter_profile();
    info!(adapter = %profile.name, backend = ?profile.backend, "GPU ready");
    if profile.is_software() {
        warn!("software rasterizer detected; export will be slow");
    }
    let mut surface = RenderSurface::new(backend, &session.config.surface, &session.params)?;
    surface.set_image(&mask)?;

    let time: BoxedTimeSource = if args.offline_clock {
        Box::new(SimulatedTimeSource::default())
    } else {
        Box::new(SystemTimeSource::new())
    };
    let mut runner = HeadlessRunner::new(surface, time);

    if let Some(path) = png {
        runner.export_png(&path, args.time_ms)?;
        println!("{}", path.display());
    }
    if let Some(path) = gif {
        if !args.offline_clock {
            let seconds = export.gif_frame_delay.as_secs_f64() * f64::from(export.gif_frames);
            info!(seconds, "recording GIF in real time; --offline-clock renders without waiting");
        }
        runner.export_gif(&path, &export)?;
        println!("{}", path.display());
    }
    Ok(())
}

pub fn mask(global: &GlobalArgs, args: MaskArgs) -> Result<()> {
    let session = Session::open(global)?;
    let repository = session.repository(global)?;
    let raw = resolve_logo(&repository, &args.logo, fetch_policy(global))?;
    let buffer = normalize(&raw).with_context(|| format!("failed to normalise {}", args.logo))?;
    let (width, height) = buffer.dimensions();
    let image = buffer
        .into_rgba_image()
        .ok_or_else(|| anyhow!("normalised buffer does not match its dimensions"))?;

    if let Some(parent) = args.out.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    image
        .save(&args.out)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    println!("{width}x{height} {}", args.out.display());
    Ok(())
}

pub fn print_params(global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    if session.config_found {
        println!("# config: {}", session.config_path.display());
    } else {
        println!("# config: {} (not found, using defaults)", session.config_path.display());
    }
    for (spec, value) in session.params.iter() {
        println!(
            "{:<14} {:>8.3}   range {}..{}  default {}",
            spec.name, value, spec.min, spec.max, spec.default
        );
    }
    Ok(())
}

pub fn print_presets() {
    for preset in PRESETS {
        let marker = if preset.name == DEFAULT_PRESET {
            " (default)"
        } else {
            ""
        };
        println!("preset:{:<10} {}{marker}", preset.name, preset.title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_are_clamped_into_range() {
        let overrides = ParamOverrides {
            speed: Some(4.0),
            edge: Some(f32::NAN),
            liquid: Some(0.5),
            ..Default::default()
        };
        let params = resolve_parameters(&ShaderParameterSet::default(), &overrides);
        assert_eq!(params.speed, 1.0);
        assert_eq!(params.edge, ShaderParameterSet::default().edge);
        assert_eq!(params.liquid, 0.5);
        assert!(params.is_within_ranges());
    }

    #[test]
    fn fps_and_frames_replace_gif_settings() {
        let settings = export_settings(&ExportSettings::default(), Some(48), Some(12.0)).unwrap();
        assert_eq!(settings.gif_frames, 48);
        assert_eq!(settings.gif_frame_delay, Duration::from_secs_f64(1.0 / 12.0));
        assert!(export_settings(&ExportSettings::default(), Some(0), None).is_err());
        assert!(export_settings(&ExportSettings::default(), None, Some(0.0)).is_err());
        assert!(export_settings(&ExportSettings::default(), None, Some(f32::NAN)).is_err());
    }

    #[test]
    fn missing_default_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("liquidmetal.toml");
        let (config, found) = load_config(&path, false).unwrap();
        assert!(!found);
        assert_eq!(config.params, ShaderParameterSet::default());
        assert!(load_config(&path, true).is_err());
    }

    #[test]
    fn config_file_values_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("liquidmetal.toml");
        fs::write(&path, "[params]\nrefraction = 0.02\n\n[export]\ngif_frames = 10\n").unwrap();
        let (config, found) = load_config(&path, true).unwrap();
        assert!(found);
        assert_eq!(config.params.refraction, 0.02);
        assert_eq!(config.export.gif_frames, 10);
    }

    #[test]
    fn flags_pick_fetch_policy() {
        let mut global = GlobalArgs::default();
        assert_eq!(fetch_policy(&global), FetchPolicy::PreferCache);
        global.refresh = true;
        assert_eq!(fetch_policy(&global), FetchPolicy::Refresh);
        global.offline = true;
        assert_eq!(fetch_policy(&global), FetchPolicy::Offline);
    }
}
