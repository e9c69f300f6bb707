use std::time::{Duration, Instant};

/// Wall-clock frame timestamps for driving `SoundBus::update`
pub struct FrameClock {
    started: Instant,
    frame_period: Duration,
    next_frame: Instant,
    frames: u64,
}

impl FrameClock {
    /// Create a clock ticking `frame_rate` times per second
    pub fn new(frame_rate: f64) -> Self {
        let frame_rate = if frame_rate.is_finite() && frame_rate > 0.0 {
            frame_rate
        } else {
            60.0
        };
        let started = Instant::now();

        Self {
            started,
            frame_period: Duration::from_secs_f64(1.0 / frame_rate),
            next_frame: started,
            frames: 0,
        }
    }

    /// Milliseconds since the clock started
    pub fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// Count a frame and return its timestamp in milliseconds
    pub fn tick(&mut self) -> f64 {
        self.frames += 1;
        self.next_frame += self.frame_period;
        self.now_ms()
    }

    /// Block until the next frame is due.
    /// Falls behind gracefully: a late frame does not cause a burst.
    pub fn sleep_until_next_frame(&mut self) {
        let now = Instant::now();
        if self.next_frame > now {
            std::thread::sleep(self.next_frame - now);
        } else {
            self.next_frame = now;
        }
    }

    pub fn frame_period(&self) -> Duration {
        self.frame_period
    }

    /// Frames ticked so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
