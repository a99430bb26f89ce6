use std::time::Instant;

/// Speed-scaled animation time, in milliseconds.
///
/// The clock owns no timer. The driver calls [`AnimationClock::tick`] once per
/// presented frame and passes the returned time to the render surface.
#[derive(Debug, Clone, Default)]
pub struct AnimationClock {
    accumulated_ms: f64,
    last_frame: Option<Instant>,
    running: bool,
}

impl AnimationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts or resumes. The frame timestamp restarts at `now` so paused
    /// time never shows up as a delta.
    pub fn start(&mut self, now: Instant) {
        self.running = true;
        self.last_frame = Some(now);
    }

    /// Stops advancing. Ticks after this return `None` until the next start.
    pub fn stop(&mut self) {
        self.running = false;
        self.last_frame = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Back to zero, as on surface re-initialisation. Keeps the run state.
    pub fn reset(&mut self, now: Instant) {
        self.accumulated_ms = 0.0;
        if self.running {
            self.last_frame = Some(now);
        }
    }

    pub fn accumulated_ms(&self) -> f64 {
        self.accumulated_ms
    }

    /// Advances by `(now - last frame) * speed` and returns the new time, or
    /// `None` when stopped.
    ///
    /// `speed` is read on every call so it can change without a restart.
    /// Negative and non-finite speeds count as zero, which keeps the time
    /// monotonic.
    pub fn tick(&mut self, now: Instant, speed: f32) -> Option<f32> {
        if !self.running {
            return None;
        }
        let last = self.last_frame.replace(now).unwrap_or(now);
        let elapsed_ms = now.saturating_duration_since(last).as_nanos() as f64 / 1_000_000.0;
        let speed = if speed.is_finite() && speed > 0.0 {
            speed as f64
        } else {
            0.0
        };
        self.accumulated_ms += elapsed_ms * speed;
        Some(self.accumulated_ms as f32)
    }

    /// Ticks and hands the time to `on_frame` when running.
    pub fn advance<F>(&mut self, now: Instant, speed: f32, on_frame: F) -> bool
    where
        F: FnOnce(f32),
    {
        match self.tick(now, speed) {
            Some(time) => {
                on_frame(time);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn accumulates_scaled_elapsed_time() {
        let start = Instant::now();
        let mut clock = AnimationClock::new();
        clock.start(start);
        assert_eq!(clock.tick(start + ms(100), 0.5), Some(50.0));
        assert_eq!(clock.tick(start + ms(200), 1.0), Some(150.0));
    }

    #[test]
    fn zero_speed_freezes_time() {
        let start = Instant::now();
        let mut clock = AnimationClock::new();
        clock.start(start);
        clock.tick(start + ms(100), 1.0);
        let frozen = clock.accumulated_ms();
        for frame in 2..10 {
            clock.tick(start + ms(100 * frame), 0.0);
        }
        assert_eq!(clock.accumulated_ms(), frozen);
    }

    #[test]
    fn bad_speeds_never_run_time_backwards() {
        let start = Instant::now();
        let mut clock = AnimationClock::new();
        clock.start(start);
        clock.tick(start + ms(100), 1.0);
        clock.tick(start + ms(200), -3.0);
        clock.tick(start + ms(300), f32::NAN);
        clock.tick(start + ms(400), f32::INFINITY);
        assert_eq!(clock.accumulated_ms(), 100.0);
    }

    #[test]
    fn stopped_clock_does_not_call_back() {
        let start = Instant::now();
        let mut clock = AnimationClock::new();
        clock.start(start);
        clock.stop();
        let mut calls = 0;
        assert!(!clock.advance(start + ms(50), 1.0, |_| calls += 1));
        assert_eq!(calls, 0);
        assert_eq!(clock.tick(start + ms(60), 1.0), None);
    }

    #[test]
    fn restart_ignores_paused_interval() {
        let start = Instant::now();
        let mut clock = AnimationClock::new();
        clock.start(start);
        clock.tick(start + ms(100), 1.0);
        clock.stop();
        clock.start(start + ms(10_000));
        assert_eq!(clock.tick(start + ms(10_050), 1.0), Some(150.0));
    }

    #[test]
    fn reset_returns_to_zero() {
        let start = Instant::now();
        let mut clock = AnimationClock::new();
        clock.start(start);
        clock.tick(start + ms(500), 1.0);
        clock.reset(start + ms(500));
        assert_eq!(clock.accumulated_ms(), 0.0);
        assert_eq!(clock.tick(start + ms(600), 1.0), Some(100.0));
    }
}
