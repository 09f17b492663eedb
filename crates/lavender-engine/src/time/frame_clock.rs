use std::time::{Duration, Instant};

/// Weight of the newest sample in the fps moving average.
const FPS_SMOOTHING: f32 = 0.1;

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Clamped time since the previous tick, in seconds.
    pub dt: f32,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Ticks since the clock was created.
    pub tick: u64,

    /// Exponential moving average of frames per second.
    pub fps: f32,
}

/// Produces one [`FrameTime`] per presented frame.
///
/// Delta time is clamped so a debugger pause or a minimized window does not
/// send the camera flying on the next frame.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    tick: u64,
    fps: f32,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: Instant::now(),
            tick: 0,
            fps: 0.0,
            dt_min,
            dt_max,
        }
    }

    /// Resets the baseline, e.g. after the window was hidden.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        self.tick_at(now)
    }

    fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max)
            .as_secs_f32();
        self.last = now;

        let sample = 1.0 / dt;
        self.fps = if self.tick == 0 {
            sample
        } else {
            self.fps + (sample - self.fps) * FPS_SMOOTHING
        };

        let ft = FrameTime {
            dt,
            now,
            tick: self.tick,
            fps: self.fps,
        };
        self.tick = self.tick.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_is_clamped() {
        let mut clock = FrameClock::new();
        let start = clock.last;
        let ft = clock.tick_at(start + Duration::from_secs(10));
        assert_eq!(ft.dt, 0.25);
        let ft = clock.tick_at(start + Duration::from_secs(10));
        assert!((ft.dt - 0.0001).abs() < 1e-6);
    }

    #[test]
    fn fps_converges_to_frame_rate() {
        let mut clock = FrameClock::new();
        let mut t = clock.last;
        let mut ft = clock.tick_at(t);
        for _ in 0..200 {
            t += Duration::from_millis(16);
            ft = clock.tick_at(t);
        }
        assert!((ft.fps - 62.5).abs() < 0.5, "fps {}", ft.fps);
        assert_eq!(ft.tick, 200);
    }
}
