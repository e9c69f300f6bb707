/// Frame-driven volume fades
///
/// A [`FadeJob`] holds the interpolation state of one running fade. Jobs live
/// on their owner (a sound or the master bus); the [`Fader`] only keeps the
/// list of owners to tick once per frame, so cancelling is removing an entry.
use std::fmt;

use super::ease::Ease;
use super::volume::{clamp_volume, DEFAULT_VOLUME};
use crate::audio_system::manager::SoundBus;
use crate::audio_system::sound::SoundId;

/// Logical frame rate fades are computed against
pub const FRAME_RATE: f64 = 60.0;

/// Default fade duration in milliseconds
pub const DEFAULT_FADE_MS: f64 = 5000.0;

/// Called once when a fade reaches its target
pub type FadeCallback<G> = Box<dyn FnOnce(&mut SoundBus<G>)>;

/// Parameters for a fade, built like an effect chain
pub struct FadeRequest<G> {
    /// Volume to fade to
    pub target: f64,

    /// Fade duration in milliseconds
    pub duration_ms: f64,

    /// Easing curve
    pub ease: Ease,

    on_complete: Option<FadeCallback<G>>,
}

impl<G> FadeRequest<G> {
    /// Fade to `target` with the default duration and curve
    pub fn new(target: f64) -> Self {
        Self {
            target,
            duration_ms: DEFAULT_FADE_MS,
            ease: Ease::default(),
            on_complete: None,
        }
    }

    /// Set fade duration
    pub fn with_duration(mut self, ms: f64) -> Self {
        self.duration_ms = ms;
        self
    }

    /// Set easing curve
    pub fn with_ease(mut self, ease: Ease) -> Self {
        self.ease = ease;
        self
    }

    /// Set easing curve by name, falling back to the default curve
    pub fn with_ease_name(mut self, name: &str) -> Self {
        self.ease = Ease::resolve(name);
        self
    }

    /// Run `callback` when the fade completes
    pub fn on_complete(mut self, callback: impl FnOnce(&mut SoundBus<G>) + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Whether the request can start a fade at all
    pub fn is_valid(&self) -> bool {
        !self.target.is_nan() && !self.duration_ms.is_nan()
    }

    /// Split into the job and its completion callback
    pub(crate) fn into_job(
        self,
        initial: f64,
        frame_rate: f64,
    ) -> (FadeJob, Option<FadeCallback<G>>) {
        let job = FadeJob::new(initial, self.target, self.duration_ms, self.ease, frame_rate);
        (job, self.on_complete)
    }
}

impl<G> Default for FadeRequest<G> {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME)
    }
}

impl<G> fmt::Debug for FadeRequest<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FadeRequest")
            .field("target", &self.target)
            .field("duration_ms", &self.duration_ms)
            .field("ease", &self.ease)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Result of advancing a fade by one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeStep {
    /// Owner is unfocused; nothing was applied
    Suspended,

    /// Apply this value and keep going
    Continue(f64),

    /// Apply the target; the fade is over
    Complete(f64),
}

/// Interpolation state of one running fade
#[derive(Debug, Clone, PartialEq)]
pub struct FadeJob {
    duration_ms: f64,
    elapsed_iterations: f64,
    initial: f64,
    delta: f64,
    target: f64,
    total_iterations: f64,
    ease: Ease,
    started_at: Option<f64>,
    previous_timestamp: Option<f64>,
    // (time already folded in, time lost during the current unfocused stretch)
    off_screen: (f64, f64),
}

impl FadeJob {
    /// Create a job fading from `initial` to `target` (clamped into the
    /// volume range) over `duration_ms`
    pub fn new(initial: f64, target: f64, duration_ms: f64, ease: Ease, frame_rate: f64) -> Self {
        let target = clamp_volume(target);
        let duration_ms = duration_ms.max(0.0);
        let frame_period = 1000.0 / frame_rate;

        Self {
            duration_ms,
            elapsed_iterations: 0.0,
            initial,
            delta: target - initial,
            target,
            total_iterations: duration_ms / frame_period,
            ease,
            started_at: None,
            previous_timestamp: None,
            off_screen: (0.0, 0.0),
        }
    }

    /// Advance by one frame at `timestamp` (milliseconds).
    ///
    /// While unfocused the job does not progress; the wall time spent away is
    /// subtracted from the elapsed time once focus returns.
    pub fn tick(&mut self, timestamp: f64, focused: bool) -> FadeStep {
        if !focused {
            if let Some(previous) = self.previous_timestamp {
                self.off_screen.1 = timestamp - previous;
            }
            return FadeStep::Suspended;
        }

        let started_at = *self.started_at.get_or_insert(timestamp);
        let value = self.ease.apply(
            self.elapsed_iterations,
            self.initial,
            self.delta,
            self.total_iterations,
        );

        if self.off_screen.1 != 0.0 {
            self.off_screen.0 += self.off_screen.1;
            self.off_screen.1 = 0.0;
        }

        let elapsed = (timestamp - self.off_screen.0) - started_at;
        if self.elapsed_iterations < self.total_iterations {
            self.elapsed_iterations = (self.elapsed_iterations + 1.0).min(self.total_iterations);
        }

        if elapsed < self.duration_ms {
            self.previous_timestamp = Some(timestamp);
            FadeStep::Continue(value)
        } else {
            FadeStep::Complete(self.target)
        }
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub fn ease(&self) -> Ease {
        self.ease
    }

    pub fn elapsed_iterations(&self) -> f64 {
        self.elapsed_iterations
    }

    pub fn total_iterations(&self) -> f64 {
        self.total_iterations
    }

    /// Wall time excluded from progress because the owner was unfocused
    pub fn off_screen_ms(&self) -> f64 {
        self.off_screen.0 + self.off_screen.1
    }
}

/// Something that owns a fade job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FadeOwner {
    Master,
    Sound(SoundId),
}

/// Per-frame driver for every active fade
#[derive(Debug, Default)]
pub struct Fader {
    active: Vec<FadeOwner>,
}

impl Fader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking `owner` on the next frame
    pub fn schedule(&mut self, owner: FadeOwner) {
        if !self.active.contains(&owner) {
            self.active.push(owner);
        }
    }

    /// Stop ticking `owner`
    pub fn cancel(&mut self, owner: FadeOwner) {
        self.active.retain(|active| *active != owner);
    }

    /// Owners to tick this frame
    pub fn snapshot(&self) -> Vec<FadeOwner> {
        self.active.clone()
    }

    pub fn is_scheduled(&self, owner: FadeOwner) -> bool {
        self.active.contains(&owner)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FRAME_MS: f64 = 1000.0 / 60.0;

    fn run_focused(job: &mut FadeJob, start: f64, frames: usize) -> Vec<FadeStep> {
        (0..frames)
            .map(|frame| job.tick(start + frame as f64 * FRAME_MS, true))
            .collect()
    }

    #[test]
    fn test_job_iterations() {
        let job = FadeJob::new(100.0, 0.0, 1000.0, Ease::Linear, FRAME_RATE);
        assert_relative_eq!(job.total_iterations(), 60.0);
        assert_eq!(job.target(), 0.0);
    }

    #[test]
    fn test_target_is_clamped() {
        let job = FadeJob::new(100.0, 500.0, 1000.0, Ease::Linear, FRAME_RATE);
        assert_eq!(job.target(), 200.0);

        let job = FadeJob::new(100.0, -500.0, -20.0, Ease::Linear, FRAME_RATE);
        assert_eq!(job.target(), -200.0);
        assert_eq!(job.duration_ms(), 0.0);
    }

    #[test]
    fn test_linear_fade_progresses_and_completes() {
        let mut job = FadeJob::new(100.0, 0.0, 1000.0, Ease::Linear, FRAME_RATE);
        let steps = run_focused(&mut job, 0.0, 70);

        assert_eq!(steps[0], FadeStep::Continue(100.0));
        match steps[30] {
            FadeStep::Continue(value) => assert_relative_eq!(value, 50.0, epsilon = 1e-9),
            other => panic!("unexpected step {:?}", other),
        }

        let completed = steps
            .iter()
            .position(|step| matches!(step, FadeStep::Complete(_)))
            .expect("fade should complete");
        assert_eq!(steps[completed], FadeStep::Complete(0.0));
        assert!(job.elapsed_iterations() <= job.total_iterations());
    }

    #[test]
    fn test_zero_duration_completes_on_first_frame() {
        let mut job = FadeJob::new(40.0, 40.0, 0.0, Ease::EaseInElastic, FRAME_RATE);
        assert_eq!(job.tick(10.0, true), FadeStep::Complete(40.0));
    }

    #[test]
    fn test_unfocused_time_is_not_counted() {
        let mut job = FadeJob::new(0.0, 100.0, 100.0, Ease::Linear, FRAME_RATE);
        assert!(matches!(job.tick(0.0, true), FadeStep::Continue(_)));
        assert!(matches!(job.tick(50.0, true), FadeStep::Continue(_)));

        // Five seconds away from the window
        assert_eq!(job.tick(1_000.0, false), FadeStep::Suspended);
        assert_eq!(job.tick(5_050.0, false), FadeStep::Suspended);
        assert_relative_eq!(job.off_screen_ms(), 5_000.0);

        // Back: only 50ms of progress have happened so far
        assert!(matches!(job.tick(5_060.0, true), FadeStep::Continue(_)));
        assert!(matches!(job.tick(5_100.0, true), FadeStep::Continue(_)));
        assert_eq!(job.tick(5_160.0, true), FadeStep::Complete(100.0));
    }

    #[test]
    fn test_suspended_before_first_frame() {
        let mut job = FadeJob::new(0.0, 100.0, 100.0, Ease::Linear, FRAME_RATE);
        assert_eq!(job.tick(0.0, false), FadeStep::Suspended);
        assert_eq!(job.off_screen_ms(), 0.0);
        assert_eq!(job.tick(500.0, true), FadeStep::Continue(0.0));
    }

    #[test]
    fn test_fader_schedule_and_cancel() {
        let mut fader = Fader::new();
        fader.schedule(FadeOwner::Master);
        fader.schedule(FadeOwner::Master);
        assert_eq!(fader.len(), 1);

        fader.cancel(FadeOwner::Master);
        assert!(fader.is_empty());
        assert!(!fader.is_scheduled(FadeOwner::Master));
    }

    #[test]
    fn test_request_builder() {
        let request: FadeRequest<()> = FadeRequest::new(20.0)
            .with_duration(250.0)
            .with_ease(Ease::Linear);
        assert_eq!(request.target, 20.0);
        assert_eq!(request.duration_ms, 250.0);
        assert_eq!(request.ease, Ease::Linear);
        assert!(request.is_valid());

        let request: FadeRequest<()> = FadeRequest::new(f64::NAN);
        assert!(!request.is_valid());
        let request: FadeRequest<()> = FadeRequest::default().with_duration(f64::NAN);
        assert!(!request.is_valid());
    }
}
