/// Volume and playback-rate bounds
///
/// Volumes are expressed in percent-like units between [`MIN_VOLUME`] and
/// [`MAX_VOLUME`]; `100` is unity gain. Normalization to a gain-node value
/// happens only at the point where a gain node is written.

/// Loudest volume a sound or the master bus can be set to
pub const MAX_VOLUME: f64 = 200.0;

/// Quietest volume (negative values invert the signal)
pub const MIN_VOLUME: f64 = -200.0;

/// Default volume for new sounds and the master bus
pub const DEFAULT_VOLUME: f64 = 100.0;

/// Slowest playback rate (no slow motion)
pub const MIN_PLAYBACK_RATE: f64 = 1.0;

/// Fastest playback rate
pub const MAX_PLAYBACK_RATE: f64 = 10.0;

/// Volume level clamped into the supported range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume {
    level: f64,
}

impl Volume {
    /// Create a new volume, clamping into range
    pub fn new(level: f64) -> Self {
        Self {
            level: clamp_volume(level),
        }
    }

    /// Get the volume level
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Set the volume level
    pub fn set_level(&mut self, level: f64) {
        self.level = clamp_volume(level);
    }

    /// Gain-node value for this level
    pub fn gain(&self) -> f32 {
        normalize(self.level) as f32
    }

    /// Check if silent
    pub fn is_silent(&self) -> bool {
        self.level == 0.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self {
            level: DEFAULT_VOLUME,
        }
    }
}

/// Clamp a volume into `[MIN_VOLUME, MAX_VOLUME]`.
///
/// NaN is not a volume; callers reject it before reaching this point.
pub fn clamp_volume(level: f64) -> f64 {
    level.clamp(MIN_VOLUME, MAX_VOLUME)
}

/// Clamp a playback rate into `[MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE]`,
/// treating NaN as normal speed.
pub fn clamp_playback_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        return MIN_PLAYBACK_RATE;
    }
    rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
}

/// Map a volume level onto a gain multiplier (`100` → `1.0`)
pub fn normalize(level: f64) -> f64 {
    level / DEFAULT_VOLUME
}
