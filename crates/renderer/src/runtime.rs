use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use liquidconfig::ExportSettings;
use tracing::info;

use crate::backend::SurfaceBackend;
use crate::capture::{
    AnimationEncoder, EncodedAnimation, EncodedImage, FrameCapture, GifAnimationEncoder,
    SequenceProgress, SequenceRequest,
};
use crate::clock::AnimationClock;
use crate::surface::RenderSurface;
use crate::CaptureError;

/// Spacing of simulated display refreshes, one 60 Hz frame.
pub const DISPLAY_FRAME_PERIOD: Duration = Duration::from_nanos(16_666_667);

/// Where the headless driver gets its notion of "now".
pub trait TimeSource: Send {
    fn now(&mut self) -> Instant;
    /// Blocks, or pretends to, until `deadline`.
    fn wait_until(&mut self, deadline: Instant);
}

/// Wall clock; waiting sleeps the thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&mut self) -> Instant {
        Instant::now()
    }

    fn wait_until(&mut self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
    }
}

/// Virtual clock that jumps straight to each deadline. Exports driven by it
/// finish as fast as the GPU allows while still sampling the animation at
/// the requested spacing.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedTimeSource {
    current: Instant,
}

impl SimulatedTimeSource {
    pub fn new(start: Instant) -> Self {
        Self { current: start }
    }

    pub fn advance(&mut self, by: Duration) {
        self.current += by;
    }
}

impl Default for SimulatedTimeSource {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl TimeSource for SimulatedTimeSource {
    fn now(&mut self) -> Instant {
        self.current
    }

    fn wait_until(&mut self, deadline: Instant) {
        self.current = self.current.max(deadline);
    }
}

pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

/// Offscreen driver: one surface, its clock and a capture coordinator,
/// stepped by a [`TimeSource`] instead of a display.
pub struct HeadlessRunner<B: SurfaceBackend> {
    surface: RenderSurface<B>,
    clock: AnimationClock,
    capture: FrameCapture,
    time: BoxedTimeSource,
    frame_period: Duration,
}

impl<B: SurfaceBackend> HeadlessRunner<B> {
    pub fn new(surface: RenderSurface<B>, time: BoxedTimeSource) -> Self {
        Self {
            surface,
            clock: AnimationClock::new(),
            capture: FrameCapture::new(),
            time,
            frame_period: DISPLAY_FRAME_PERIOD,
        }
    }

    /// Overrides the simulated refresh spacing. Zero falls back to the
    /// default.
    pub fn with_frame_period(mut self, period: Duration) -> Self {
        if !period.is_zero() {
            self.frame_period = period;
        }
        self
    }

    pub fn surface(&self) -> &RenderSurface<B> {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut RenderSurface<B> {
        &mut self.surface
    }

    pub fn clock(&self) -> &AnimationClock {
        &self.clock
    }

    pub fn now(&mut self) -> Instant {
        self.time.now()
    }

    /// Draws one frame at a fixed accumulated time and reads it back.
    pub fn render_still_at(&mut self, time_ms: f32) -> Result<EncodedImage, CaptureError> {
        self.surface.render(time_ms)?;
        self.capture.capture_still(&mut self.surface)
    }

    pub fn export_png(&mut self, path: &Path, time_ms: f32) -> Result<EncodedImage, CaptureError> {
        let image = self.render_still_at(time_ms)?;
        image.write_to(path)?;
        info!(path = %path.display(), width = image.width, height = image.height, "PNG written");
        Ok(image)
    }

    /// Runs the animation from zero and samples it into `encoder` until the
    /// sequence completes.
    pub fn record_sequence(
        &mut self,
        request: SequenceRequest,
        encoder: Box<dyn AnimationEncoder>,
    ) -> Result<EncodedAnimation, CaptureError> {
        let start = self.time.now();
        self.clock.reset(start);
        self.clock.start(start);
        self.capture
            .begin_sequence(&self.surface, request, encoder, start)?;

        let result = self.drive_sequence();
        self.clock.stop();
        if result.is_err() {
            self.capture.abort();
        }
        result
    }

    fn drive_sequence(&mut self) -> Result<EncodedAnimation, CaptureError> {
        loop {
            let now = self.time.now();
            let speed = self.surface.parameters().speed;
            if let Some(time_ms) = self.clock.tick(now, speed) {
                self.surface.render(time_ms)?;
            }
            if let SequenceProgress::Finished(animation) =
                self.capture.on_frame(&mut self.surface, now)?
            {
                return Ok(animation);
            }
            let refresh = now + self.frame_period;
            let deadline = self
                .capture
                .next_due()
                .map_or(refresh, |due| due.min(refresh));
            self.time.wait_until(deadline);
        }
    }

    pub fn export_gif(
        &mut self,
        path: &Path,
        settings: &ExportSettings,
    ) -> Result<EncodedAnimation, CaptureError> {
        let request = SequenceRequest::from(settings);
        let encoder = Box::new(GifAnimationEncoder::new(settings.gif_speed));
        let animation = self.record_sequence(request, encoder)?;
        animation.write_to(path)?;
        info!(
            path = %path.display(),
            frames = animation.frame_count,
            bytes = animation.bytes.len(),
            "GIF written"
        );
        Ok(animation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{Call, RecordingBackend};
    use crate::capture::CapturedFrame;
    use crate::RenderError;
    use liquidconfig::{ShaderParameterSet, SurfaceSettings};

    fn runner(params: &ShaderParameterSet) -> HeadlessRunner<RecordingBackend> {
        let (backend, _journal) = RecordingBackend::new();
        let settings = SurfaceSettings {
            side: 8,
            pixel_ratio: 1.0,
        };
        let surface = RenderSurface::new(backend, &settings, params).unwrap();
        HeadlessRunner::new(surface, Box::new(SimulatedTimeSource::default()))
    }

    #[derive(Default)]
    struct FrameCounter {
        frames: u32,
    }

    impl AnimationEncoder for FrameCounter {
        fn add_frame(&mut self, _frame: &CapturedFrame, _delay: Duration) -> Result<(), CaptureError> {
            self.frames += 1;
            Ok(())
        }

        fn frame_count(&self) -> u32 {
            self.frames
        }

        fn finish(self: Box<Self>) -> Result<EncodedAnimation, CaptureError> {
            Ok(EncodedAnimation {
                width: 8,
                height: 8,
                frame_count: self.frames,
                frame_delay: Duration::ZERO,
                bytes: Vec::new(),
            })
        }
    }

    #[test]
    fn simulated_time_only_moves_forward() {
        let start = Instant::now();
        let mut time = SimulatedTimeSource::new(start);
        time.wait_until(start + Duration::from_millis(10));
        time.wait_until(start);
        assert_eq!(time.now(), start + Duration::from_millis(10));
        time.advance(Duration::from_millis(5));
        assert_eq!(time.now(), start + Duration::from_millis(15));
    }

    #[test]
    fn full_sequence_has_every_frame_and_takes_the_minimum_time() {
        let mut runner = runner(&ShaderParameterSet::default());
        let request = SequenceRequest::new(120, liquidconfig::default_gif_frame_delay());
        let started = runner.now();
        let animation = runner
            .record_sequence(request, Box::new(FrameCounter::default()))
            .unwrap();
        let elapsed = runner.now() - started;

        assert_eq!(animation.frame_count, 120);
        assert!(elapsed >= request.minimum_duration());
        assert!(!runner.clock().is_running());
    }

    #[test]
    fn animation_keeps_advancing_between_captured_frames() {
        let (backend, journal) = RecordingBackend::new();
        let settings = SurfaceSettings {
            side: 8,
            pixel_ratio: 1.0,
        };
        let mut params = ShaderParameterSet::default();
        params.speed = 1.0;
        let surface = RenderSurface::new(backend, &settings, &params).unwrap();
        let mut runner = HeadlessRunner::new(surface, Box::new(SimulatedTimeSource::default()));

        let request = SequenceRequest::new(3, Duration::from_millis(50));
        runner
            .record_sequence(request, Box::new(FrameCounter::default()))
            .unwrap();

        let journal = journal.borrow();
        assert!(journal.draws() > 3);
        let times: Vec<f32> = journal
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Uniforms(uniforms) => Some(uniforms.time),
                _ => None,
            })
            .collect();
        assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(times.last().copied().unwrap_or_default() >= 150.0 - 0.01);
    }

    #[test]
    fn zero_speed_holds_time_during_export() {
        let (backend, journal) = RecordingBackend::new();
        let settings = SurfaceSettings {
            side: 8,
            pixel_ratio: 1.0,
        };
        let mut params = ShaderParameterSet::default();
        params.speed = 0.0;
        let surface = RenderSurface::new(backend, &settings, &params).unwrap();
        let mut runner = HeadlessRunner::new(surface, Box::new(SimulatedTimeSource::default()));

        runner
            .record_sequence(
                SequenceRequest::new(4, Duration::from_millis(40)),
                Box::new(FrameCounter::default()),
            )
            .unwrap();
        assert_eq!(runner.clock().accumulated_ms(), 0.0);
        let journal = journal.borrow();
        assert!(journal.calls.iter().all(|call| match call {
            Call::Uniforms(uniforms) => uniforms.time == 0.0,
            _ => true,
        }));
    }

    #[test]
    fn still_export_writes_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("still.png");
        let mut runner = runner(&ShaderParameterSet::default());
        let image = runner.export_png(&path, 1234.0).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, image.bytes);
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn gif_export_uses_export_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.gif");
        let settings = ExportSettings {
            gif_frames: 5,
            gif_frame_delay: Duration::from_millis(40),
            gif_speed: 30,
            output_dir: None,
        };
        let mut runner = runner(&ShaderParameterSet::default());
        let animation = runner.export_gif(&path, &settings).unwrap();
        assert_eq!(animation.frame_count, 5);
        assert!(std::fs::read(&path).unwrap().starts_with(b"GIF89a"));
    }

    #[test]
    fn failed_sequence_releases_the_capture_slot() {
        let mut runner = runner(&ShaderParameterSet::default());
        runner.surface_mut().destroy();
        let err = runner
            .record_sequence(
                SequenceRequest::new(2, Duration::from_millis(10)),
                Box::new(FrameCounter::default()),
            )
            .unwrap_err();
        assert!(matches!(err, CaptureError::SurfaceDestroyed));
        assert!(runner.render_still_at(0.0).is_err());
    }

    #[test]
    fn link_failure_aborts_export_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut backend, journal) = RecordingBackend::new();
        backend.fail_draws = true;
        let settings = SurfaceSettings {
            side: 8,
            pixel_ratio: 1.0,
        };
        let surface = RenderSurface::new(backend, &settings, &ShaderParameterSet::default()).unwrap();
        let mut runner = HeadlessRunner::new(surface, Box::new(SimulatedTimeSource::default()));

        let png = dir.path().join("still.png");
        assert!(matches!(
            runner.export_png(&png, 0.0),
            Err(CaptureError::Render(RenderError::ShaderLink(_)))
        ));
        assert!(!png.exists());

        let err = runner
            .record_sequence(
                SequenceRequest::new(2, Duration::from_millis(10)),
                Box::new(FrameCounter::default()),
            )
            .unwrap_err();
        assert!(matches!(err, CaptureError::Render(RenderError::ShaderLink(_))));
        assert_eq!(journal.borrow().draws(), 0);
        assert!(!journal.borrow().calls.contains(&Call::Read));
    }
}
