/// Audio effects module
///
/// Volume bounds, easing curves and the frame-driven fade engine shared by
/// sounds and the master bus.

pub mod ease;
pub mod fade;
pub mod volume;

pub use ease::Ease;
pub use fade::{FadeCallback, FadeJob, FadeOwner, FadeRequest, FadeStep, Fader};
pub use volume::{clamp_playback_rate, clamp_volume, normalize, Volume};
