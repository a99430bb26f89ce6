use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::codecs::png::PngEncoder;
use image::imageops::flip_vertical_in_place;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use liquidconfig::ExportSettings;
use tracing::{debug, info, warn};

use crate::backend::SurfaceBackend;
use crate::surface::RenderSurface;
use crate::types::{RowOrigin, SurfaceId};
use crate::CaptureError;

/// RGBA8 pixels read back from a render surface.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
    origin: RowOrigin,
}

impl CapturedFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, origin: RowOrigin) -> Self {
        Self {
            width,
            height,
            data,
            origin,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn origin(&self) -> RowOrigin {
        self.origin
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reorders rows so the first row is the top of the picture.
    pub fn into_top_down(self) -> Result<Self, CaptureError> {
        if self.origin == RowOrigin::TopLeft {
            return Ok(self);
        }
        let (width, height) = (self.width, self.height);
        let mut image = RgbaImage::from_raw(width, height, self.data).ok_or_else(|| {
            CaptureError::Encode {
                format: "frame",
                message: format!("read-back buffer does not hold {width}x{height} RGBA"),
            }
        })?;
        flip_vertical_in_place(&mut image);
        Ok(Self {
            width,
            height,
            data: image.into_raw(),
            origin: RowOrigin::TopLeft,
        })
    }
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("origin", &self.origin)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A PNG-encoded still.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn png(frame: &CapturedFrame) -> Result<Self, CaptureError> {
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(
                frame.as_bytes(),
                frame.width,
                frame.height,
                ExtendedColorType::Rgba8,
            )
            .map_err(|err| CaptureError::Encode {
                format: "png",
                message: err.to_string(),
            })?;
        Ok(Self {
            width: frame.width,
            height: frame.height,
            bytes,
        })
    }

    pub fn write_to(&self, path: &Path) -> Result<(), CaptureError> {
        write_file(path, &self.bytes)
    }
}

/// A finished looping animation.
#[derive(Debug, Clone)]
pub struct EncodedAnimation {
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub frame_delay: Duration,
    pub bytes: Vec<u8>,
}

impl EncodedAnimation {
    pub fn write_to(&self, path: &Path) -> Result<(), CaptureError> {
        write_file(path, &self.bytes)
    }
}

/// `liquid-metal-<local time>.<extension>` inside `dir`.
pub fn timestamped_export_path(dir: &Path, extension: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("liquid-metal-{stamp}.{extension}"))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CaptureError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CaptureError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, bytes).map_err(|source| CaptureError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Receives top-down frames one at a time and produces an animation.
pub trait AnimationEncoder {
    fn add_frame(&mut self, frame: &CapturedFrame, delay: Duration) -> Result<(), CaptureError>;

    fn frame_count(&self) -> u32;

    fn finish(self: Box<Self>) -> Result<EncodedAnimation, CaptureError>;
}

/// Looping GIF with a NeuQuant palette per frame.
pub struct GifAnimationEncoder {
    encoder: Option<gif::Encoder<Vec<u8>>>,
    width: u16,
    height: u16,
    speed: i32,
    frames: u32,
    delay: Duration,
}

impl GifAnimationEncoder {
    /// `speed` is the NeuQuant sampling factor; 1 is slowest and best,
    /// 10 matches the usual browser encoders.
    pub fn new(speed: i32) -> Self {
        Self {
            encoder: None,
            width: 0,
            height: 0,
            speed: speed.clamp(1, 30),
            frames: 0,
            delay: Duration::ZERO,
        }
    }

    fn gif_error(err: impl std::fmt::Display) -> CaptureError {
        CaptureError::Encode {
            format: "gif",
            message: err.to_string(),
        }
    }
}

/// GIF delays are whole centiseconds.
fn delay_centiseconds(delay: Duration) -> u16 {
    (delay.as_secs_f64() * 100.0).round().clamp(1.0, u16::MAX as f64) as u16
}

impl AnimationEncoder for GifAnimationEncoder {
    fn add_frame(&mut self, frame: &CapturedFrame, delay: Duration) -> Result<(), CaptureError> {
        let width = u16::try_from(frame.width).map_err(Self::gif_error)?;
        let height = u16::try_from(frame.height).map_err(Self::gif_error)?;
        let expected = frame.width as usize * frame.height as usize * 4;
        if frame.as_bytes().len() != expected || expected == 0 {
            return Err(Self::gif_error(format!(
                "frame holds {} bytes, expected {expected}",
                frame.as_bytes().len()
            )));
        }

        if self.encoder.is_none() {
            let mut encoder =
                gif::Encoder::new(Vec::new(), width, height, &[]).map_err(Self::gif_error)?;
            encoder
                .set_repeat(gif::Repeat::Infinite)
                .map_err(Self::gif_error)?;
            self.encoder = Some(encoder);
            self.width = width;
            self.height = height;
        } else if (width, height) != (self.width, self.height) {
            return Err(Self::gif_error(format!(
                "frame is {width}x{height} but the animation is {}x{}",
                self.width, self.height
            )));
        }
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| Self::gif_error("encoder not initialised"))?;

        let mut rgba = frame.as_bytes().to_vec();
        let mut gif_frame = gif::Frame::from_rgba_speed(width, height, &mut rgba, self.speed);
        gif_frame.delay = delay_centiseconds(delay);
        encoder.write_frame(&gif_frame).map_err(Self::gif_error)?;

        self.frames += 1;
        self.delay = delay;
        Ok(())
    }

    fn frame_count(&self) -> u32 {
        self.frames
    }

    fn finish(self: Box<Self>) -> Result<EncodedAnimation, CaptureError> {
        let encoder = self
            .encoder
            .ok_or_else(|| Self::gif_error("animation has no frames"))?;
        let bytes = encoder.into_inner().map_err(Self::gif_error)?;
        Ok(EncodedAnimation {
            width: self.width as u32,
            height: self.height as u32,
            frame_count: self.frames,
            frame_delay: self.delay,
            bytes,
        })
    }
}

/// Frame count and spacing of a sequence capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceRequest {
    pub frames: u32,
    pub interval: Duration,
}

impl SequenceRequest {
    pub fn new(frames: u32, interval: Duration) -> Self {
        Self { frames, interval }
    }

    /// Shortest wall-clock span a complete capture can take.
    pub fn minimum_duration(&self) -> Duration {
        self.interval.saturating_mul(self.frames)
    }
}

impl From<&ExportSettings> for SequenceRequest {
    fn from(settings: &ExportSettings) -> Self {
        Self::new(settings.gif_frames, settings.gif_frame_delay)
    }
}

/// Result of offering a frame to [`FrameCapture::on_frame`].
#[derive(Debug)]
pub enum SequenceProgress {
    Idle,
    Waiting { next_due: Instant },
    Captured { index: u32, total: u32 },
    Finished(EncodedAnimation),
}

struct ActiveSequence {
    surface: SurfaceId,
    request: SequenceRequest,
    encoder: Box<dyn AnimationEncoder>,
    captured: u32,
    next_due: Instant,
    started: Instant,
}

/// Serialises read-backs for stills and sequences.
///
/// A sequence does not own the frame loop: the driver keeps rendering and
/// offers each frame through [`FrameCapture::on_frame`], which captures only
/// when the interval has elapsed. At most one capture runs at a time.
#[derive(Default)]
pub struct FrameCapture {
    active: Option<ActiveSequence>,
}

impl FrameCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    /// When the running sequence next wants a frame.
    pub fn next_due(&self) -> Option<Instant> {
        self.active.as_ref().map(|active| active.next_due)
    }

    /// `(captured, total)` for the running sequence.
    pub fn progress(&self) -> Option<(u32, u32)> {
        self.active
            .as_ref()
            .map(|active| (active.captured, active.request.frames))
    }

    /// Reads the current frame and encodes it as PNG.
    pub fn capture_still<B: SurfaceBackend>(
        &self,
        surface: &mut RenderSurface<B>,
    ) -> Result<EncodedImage, CaptureError> {
        if self.active.is_some() {
            warn!("still capture rejected: a sequence capture is running");
            return Err(CaptureError::InProgress);
        }
        let frame = surface.read_pixels()?.into_top_down()?;
        let encoded = EncodedImage::png(&frame)?;
        debug!(
            width = encoded.width,
            height = encoded.height,
            bytes = encoded.bytes.len(),
            "captured still"
        );
        Ok(encoded)
    }

    /// Arms a sequence capture. The first frame is taken on the next
    /// [`FrameCapture::on_frame`] call.
    pub fn begin_sequence<B: SurfaceBackend>(
        &mut self,
        surface: &RenderSurface<B>,
        request: SequenceRequest,
        encoder: Box<dyn AnimationEncoder>,
        now: Instant,
    ) -> Result<(), CaptureError> {
        if self.active.is_some() {
            warn!("sequence capture rejected: another capture is running");
            return Err(CaptureError::InProgress);
        }
        if surface.is_destroyed() {
            return Err(CaptureError::SurfaceDestroyed);
        }
        if request.frames == 0 {
            return Err(CaptureError::Encode {
                format: "animation",
                message: "frame count must be at least 1".into(),
            });
        }
        info!(
            frames = request.frames,
            interval_ms = request.interval.as_secs_f64() * 1000.0,
            "sequence capture started"
        );
        self.active = Some(ActiveSequence {
            surface: surface.id(),
            request,
            encoder,
            captured: 0,
            next_due: now,
            started: now,
        });
        Ok(())
    }

    /// Offers the frame most recently drawn on `surface`.
    ///
    /// After the last frame the sequence still waits one interval before it
    /// finishes, so every frame is held for its full delay.
    pub fn on_frame<B: SurfaceBackend>(
        &mut self,
        surface: &mut RenderSurface<B>,
        now: Instant,
    ) -> Result<SequenceProgress, CaptureError> {
        let Some(mut active) = self.active.take() else {
            return Ok(SequenceProgress::Idle);
        };
        if active.surface != surface.id() || surface.is_destroyed() {
            warn!(
                captured = active.captured,
                "sequence capture abandoned: surface destroyed"
            );
            return Err(CaptureError::SurfaceDestroyed);
        }
        if now < active.next_due {
            let next_due = active.next_due;
            self.active = Some(active);
            return Ok(SequenceProgress::Waiting { next_due });
        }

        let total = active.request.frames;
        if active.captured >= total {
            let elapsed = now.saturating_duration_since(active.started);
            let animation = active.encoder.finish()?;
            info!(
                frames = animation.frame_count,
                bytes = animation.bytes.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "sequence capture finished"
            );
            return Ok(SequenceProgress::Finished(animation));
        }

        let frame = surface.read_pixels()?.into_top_down()?;
        active
            .encoder
            .add_frame(&frame, active.request.interval)?;
        let index = active.captured;
        active.captured += 1;
        active.next_due = now + active.request.interval;
        debug!(index, total, "captured sequence frame");
        self.active = Some(active);
        Ok(SequenceProgress::Captured { index, total })
    }

    /// Drops a running sequence. Returns whether one was running.
    pub fn abort(&mut self) -> bool {
        let was_running = self.active.take().is_some();
        if was_running {
            warn!("sequence capture aborted");
        }
        was_running
    }
}
