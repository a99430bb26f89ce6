//! Interactive preview: a winit window whose redraw signal drives the clock.
//!
//! The event loop runs on its own thread and owns every GPU object. Other
//! threads talk to it only through [`PreviewProxy`].

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Sender};
use liquidconfig::{ExportSettings, ShaderParameterSet, SurfaceSettings};
use logomask::{ImageLoader, LoadEvent, RawImage};
use tracing::{error, info, warn};
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::capture::{
    timestamped_export_path, FrameCapture, GifAnimationEncoder, SequenceProgress, SequenceRequest,
};
use crate::clock::AnimationClock;
use crate::gpu::WgpuBackend;
use crate::surface::RenderSurface;
use crate::types::GpuOptions;
use crate::CaptureError;

/// Resolves a logo handle to encoded bytes. Runs on loader threads.
pub type LogoFetcher = Arc<dyn Fn(&str) -> Result<RawImage> + Send + Sync>;

/// How often an idle (paused) window wakes to poll for finished loads.
const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub enum PreviewCommand {
    SetParameters(ShaderParameterSet),
    LoadLogo(String),
    Shutdown,
}

/// Cloneable handle for sending commands to the preview thread.
#[derive(Clone)]
pub struct PreviewProxy {
    proxy: EventLoopProxy<PreviewCommand>,
}

impl PreviewProxy {
    pub fn send(&self, command: PreviewCommand) -> Result<()> {
        self.proxy
            .send_event(command)
            .map_err(|_| anyhow!("preview window has closed"))
    }

    pub fn set_parameters(&self, params: ShaderParameterSet) -> Result<()> {
        self.send(PreviewCommand::SetParameters(params))
    }

    pub fn load_logo(&self, handle: impl Into<String>) -> Result<()> {
        self.send(PreviewCommand::LoadLogo(handle.into()))
    }
}

#[derive(Debug, Clone)]
pub struct PreviewOptions {
    pub initial_logo: Option<String>,
    pub params: ShaderParameterSet,
    pub surface: SurfaceSettings,
    pub export: ExportSettings,
    pub gpu: GpuOptions,
    /// Where `S` and `G` write their files.
    pub output_dir: PathBuf,
}

pub struct PreviewWindow {
    proxy: PreviewProxy,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl PreviewWindow {
    /// Opens the window on a dedicated thread and returns once the GPU
    /// surface is ready.
    pub fn spawn(options: PreviewOptions, fetcher: LogoFetcher) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("liquidmetal-window".into())
            .spawn(move || run_preview_thread(options, fetcher, ready_tx))
            .map_err(|err| anyhow!("failed to spawn window thread: {err}"))?;

        let proxy = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread failed to initialise: {err}"))??;

        Ok(Self {
            proxy: PreviewProxy { proxy },
            join_handle: Some(handle),
        })
    }

    pub fn proxy(&self) -> PreviewProxy {
        self.proxy.clone()
    }

    /// Blocks until the window is closed.
    pub fn wait(mut self) -> Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))?,
            None => Ok(()),
        }
    }

    pub fn shutdown(self) -> Result<()> {
        let _ = self.proxy.send(PreviewCommand::Shutdown);
        self.wait()
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send(PreviewCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    TogglePause,
    Still,
    Gif,
    Quit,
}

fn key_action(key: &Key) -> Option<KeyAction> {
    match key {
        Key::Named(NamedKey::Space) => Some(KeyAction::TogglePause),
        Key::Named(NamedKey::Escape) => Some(KeyAction::Quit),
        Key::Character(value) => match value.as_str() {
            " " => Some(KeyAction::TogglePause),
            "s" | "S" => Some(KeyAction::Still),
            "g" | "G" => Some(KeyAction::Gif),
            "q" | "Q" => Some(KeyAction::Quit),
            _ => None,
        },
        _ => None,
    }
}

struct PreviewState {
    window: Arc<Window>,
    surface: RenderSurface<WgpuBackend>,
    clock: AnimationClock,
    capture: FrameCapture,
    loader: ImageLoader,
    fetcher: LogoFetcher,
    export: ExportSettings,
    output_dir: PathBuf,
    pending_gif: Option<PathBuf>,
}

impl PreviewState {
    fn load(&mut self, handle: String) {
        let fetcher = Arc::clone(&self.fetcher);
        let label = handle.clone();
        if let Err(err) = self.loader.request(label, move || fetcher(&handle)) {
            warn!("failed to start logo load: {err:#}");
        }
    }

    fn poll_loader(&mut self) {
        match self.loader.poll() {
            Some(LoadEvent::Ready { label, buffer, .. }) => match self.surface.set_image(&buffer) {
                Ok(()) => {
                    info!(logo = %label, width = buffer.width(), height = buffer.height(), "logo loaded");
                    self.window.request_redraw();
                }
                Err(err) => warn!(logo = %label, "could not display logo: {err}"),
            },
            Some(LoadEvent::Failed { label, error, .. }) => {
                warn!(logo = %label, "logo load failed, keeping current image: {error:#}");
            }
            None => {}
        }
    }

    fn set_parameters(&mut self, params: ShaderParameterSet) {
        match self.surface.set_parameters(&params) {
            Ok(()) => {
                info!("parameters updated");
                self.window.request_redraw();
            }
            Err(err) => warn!("failed to apply parameters: {err}"),
        }
    }

    fn redraw(&mut self) -> Result<()> {
        let now = Instant::now();
        let speed = self.surface.parameters().speed;
        let time_ms = self
            .clock
            .tick(now, speed)
            .unwrap_or(self.clock.accumulated_ms() as f32);
        self.surface.render(time_ms)?;

        match self.capture.on_frame(&mut self.surface, now) {
            Ok(SequenceProgress::Finished(animation)) => {
                if let Some(path) = self.pending_gif.take() {
                    match animation.write_to(&path) {
                        Ok(()) => info!(
                            path = %path.display(),
                            frames = animation.frame_count,
                            "GIF written"
                        ),
                        Err(err) => warn!("failed to write GIF: {err}"),
                    }
                }
            }
            Ok(SequenceProgress::Captured { index, total }) if index + 1 == total => {
                info!(frames = total, "GIF frames captured, finishing");
            }
            Ok(_) => {}
            Err(err) => {
                warn!("GIF capture failed: {err}");
                self.pending_gif = None;
            }
        }

        self.surface.backend_mut().present()?;
        Ok(())
    }

    fn toggle_pause(&mut self) {
        if self.clock.is_running() {
            self.clock.stop();
            info!("animation paused");
        } else {
            self.clock.start(Instant::now());
            info!("animation resumed");
            self.window.request_redraw();
        }
    }

    fn save_still(&mut self) {
        let path = timestamped_export_path(&self.output_dir, "png");
        let result = self
            .capture
            .capture_still(&mut self.surface)
            .and_then(|image| image.write_to(&path).map(|()| image));
        match result {
            Ok(image) => info!(
                path = %path.display(),
                width = image.width,
                height = image.height,
                "PNG written"
            ),
            Err(CaptureError::InProgress) => warn!("still ignored: a GIF capture is running"),
            Err(err) => warn!("still capture failed: {err}"),
        }
    }

    fn start_gif(&mut self) {
        let now = Instant::now();
        if !self.clock.is_running() {
            self.clock.start(now);
        }
        let request = SequenceRequest::from(&self.export);
        let encoder = Box::new(GifAnimationEncoder::new(self.export.gif_speed));
        match self
            .capture
            .begin_sequence(&self.surface, request, encoder, now)
        {
            Ok(()) => {
                let path = timestamped_export_path(&self.output_dir, "gif");
                info!(
                    path = %path.display(),
                    seconds = request.minimum_duration().as_secs_f32(),
                    "recording GIF"
                );
                self.pending_gif = Some(path);
                self.window.request_redraw();
            }
            Err(CaptureError::InProgress) => warn!("GIF already recording; request ignored"),
            Err(err) => warn!("could not start GIF capture: {err}"),
        }
    }

    fn wants_frames(&self) -> bool {
        self.clock.is_running() || self.capture.is_capturing()
    }
}

fn run_preview_thread(
    options: PreviewOptions,
    fetcher: LogoFetcher,
    ready_tx: Sender<Result<EventLoopProxy<PreviewCommand>>>,
) -> Result<()> {
    let mut builder = EventLoopBuilder::<PreviewCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }
    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }
    let event_loop = match builder.build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            let message = format!("failed to create event loop: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };
    let proxy = event_loop.create_proxy();

    let side = f64::from(options.surface.side);
    let window = WindowBuilder::new()
        .with_title("Liquid Metal")
        .with_inner_size(LogicalSize::new(side, side))
        .build(&event_loop);
    let window = match window {
        Ok(window) => Arc::new(window),
        Err(err) => {
            let message = format!("failed to create preview window: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };

    let mut state = match build_state(window.clone(), &options, fetcher) {
        Ok(state) => state,
        Err(err) => {
            let message = format!("failed to initialise window renderer: {err:#}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };
    if let Some(handle) = options.initial_logo.clone() {
        state.load(handle);
    }
    state.clock.start(Instant::now());
    state.window.request_redraw();
    let _ = ready_tx.send(Ok(proxy));

    let mut failure: Option<anyhow::Error> = None;
    let run_result = event_loop.run(|event, elwt| match event {
        Event::UserEvent(command) => match command {
            PreviewCommand::SetParameters(params) => state.set_parameters(params),
            PreviewCommand::LoadLogo(handle) => state.load(handle),
            PreviewCommand::Shutdown => elwt.exit(),
        },
        Event::WindowEvent { window_id, event } if window_id == state.window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                match key_action(&event.logical_key) {
                    Some(KeyAction::TogglePause) => state.toggle_pause(),
                    Some(KeyAction::Still) => state.save_still(),
                    Some(KeyAction::Gif) => state.start_gif(),
                    Some(KeyAction::Quit) => elwt.exit(),
                    None => {}
                }
            }
            WindowEvent::DroppedFile(path) => state.load(path.display().to_string()),
            WindowEvent::Resized(size) => {
                state
                    .surface
                    .backend_mut()
                    .resize_window(size.width, size.height);
                state.window.request_redraw();
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                if let Err(err) = state.surface.resize(scale_factor as f32) {
                    warn!("failed to apply new scale factor: {err}");
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = state.redraw() {
                    error!("render failed, closing preview: {err:#}");
                    failure = Some(err);
                    elwt.exit();
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            state.poll_loader();
            if state.wants_frames() {
                state.window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            } else {
                elwt.set_control_flow(ControlFlow::WaitUntil(Instant::now() + IDLE_POLL));
            }
        }
        _ => {}
    });

    if state.capture.abort() {
        warn!("preview closed before the GIF finished; nothing written");
    }
    state.surface.destroy();

    if let Err(err) = run_result {
        return Err(anyhow!("window event loop error: {err}"));
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn build_state(
    window: Arc<Window>,
    options: &PreviewOptions,
    fetcher: LogoFetcher,
) -> Result<PreviewState> {
    let backend = WgpuBackend::for_window(window.clone(), &options.gpu)?;
    let profile = backend.adapter_profile();
    if profile.is_software() {
        warn!(adapter = %profile.name, "software rasterizer detected; preview may be slow");
    }
    let settings = SurfaceSettings {
        side: options.surface.side,
        pixel_ratio: window.scale_factor() as f32,
    };
    let surface = RenderSurface::new(backend, &settings, &options.params)?;
    Ok(PreviewState {
        window,
        surface,
        clock: AnimationClock::new(),
        capture: FrameCapture::new(),
        loader: ImageLoader::new(),
        fetcher,
        export: options.export.clone(),
        output_dir: options.output_dir.clone(),
        pending_gif: None,
    })
}
