/// Sound entity data
///
/// A [`Sound`] lives in a slot of the bus arena and is addressed by a
/// [`SoundId`]. The operations that drive it against the audio graph are
/// bus methods (see `player.rs`), since nearly all of them also touch bus
/// state.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::effects::fade::{FadeCallback, FadeJob, FadeRequest};
use super::effects::volume::{clamp_playback_rate, Volume, DEFAULT_VOLUME};
use super::graph::{AudioBuffer, NodeId};
use super::manager::SoundBus;
use crate::error::NameError;

/// Handle to a sound in the bus arena.
///
/// The generation changes every time the slot is wiped, so a handle kept
/// after `kill` no longer addresses anything and every call with it is a
/// no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl SoundId {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u32,
            generation,
        }
    }

    /// Arena slot this id points at
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sound#{}v{}", self.index, self.generation)
    }
}

/// Lifecycle state of a sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SoundState {
    #[default]
    Unset,
    Loading,
    Playing,
    Paused,
    Fading,
    Stopped,
    Restarting,
    Recycled,
}

impl SoundState {
    /// Whether the sound is audible right now
    pub fn is_active(&self) -> bool {
        matches!(self, SoundState::Playing | SoundState::Fading)
    }
}

impl fmt::Display for SoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SoundState::Unset => "unset",
            SoundState::Loading => "loading",
            SoundState::Playing => "playing",
            SoundState::Paused => "paused",
            SoundState::Fading => "fading",
            SoundState::Stopped => "stopped",
            SoundState::Restarting => "restarting",
            SoundState::Recycled => "recycled",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle events a callback can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundEvent {
    Start,
    Stop,
    End,
    Pause,
    Resume,
}

impl SoundEvent {
    pub const ALL: [SoundEvent; 5] = [
        SoundEvent::Start,
        SoundEvent::Stop,
        SoundEvent::End,
        SoundEvent::Pause,
        SoundEvent::Resume,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SoundEvent::Start => "start",
            SoundEvent::Stop => "stop",
            SoundEvent::End => "end",
            SoundEvent::Pause => "pause",
            SoundEvent::Resume => "resume",
        }
    }

    fn slot(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for SoundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SoundEvent {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SoundEvent::ALL
            .into_iter()
            .find(|event| event.name() == s)
            .ok_or_else(|| NameError::UnknownEvent(s.to_string()))
    }
}

/// Event handler; receives the bus and the id of the sound that fired
pub type SoundCallback<G> = Box<dyn FnMut(&mut SoundBus<G>, SoundId)>;

/// One optional callback per [`SoundEvent`]
pub struct EventCallbacks<G> {
    slots: [Option<SoundCallback<G>>; 5],
}

impl<G> EventCallbacks<G> {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
        }
    }

    pub fn set(&mut self, event: SoundEvent, callback: SoundCallback<G>) {
        self.slots[event.slot()] = Some(callback);
    }

    pub fn is_set(&self, event: SoundEvent) -> bool {
        self.slots[event.slot()].is_some()
    }

    /// Remove the callback so it can be called with the bus borrowed
    pub(crate) fn take(&mut self, event: SoundEvent) -> Option<SoundCallback<G>> {
        self.slots[event.slot()].take()
    }

    /// Put a callback back unless a new one was registered meanwhile
    pub(crate) fn restore(&mut self, event: SoundEvent, callback: SoundCallback<G>) {
        let slot = &mut self.slots[event.slot()];
        if slot.is_none() {
            *slot = Some(callback);
        }
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
    }
}

impl<G> Default for EventCallbacks<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> fmt::Debug for EventCallbacks<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<_> = SoundEvent::ALL
            .iter()
            .filter(|event| self.is_set(**event))
            .map(|event| event.name())
            .collect();
        f.debug_struct("EventCallbacks")
            .field("registered", &registered)
            .finish()
    }
}

/// Parameters for creating a sound
#[derive(Debug, Clone, PartialEq)]
pub struct SoundOptions {
    /// Resource path, also the buffer cache key
    pub path: Option<String>,

    /// Volume (-200 to 200, 100 is unity)
    pub volume: f64,

    /// Playback start position in seconds
    pub start_offset: f64,

    /// Playback end position in seconds (`None` plays to the end)
    pub end_offset: Option<f64>,

    /// Keep the sound after it ends instead of recycling it
    pub save: bool,

    /// Keep playing while the host is unfocused
    pub play_unfocused: bool,

    /// Playback speed (1 to 10)
    pub playback_rate: f64,

    /// Play again when the end is reached
    pub looping: bool,
}

impl Default for SoundOptions {
    fn default() -> Self {
        Self {
            path: None,
            volume: DEFAULT_VOLUME,
            start_offset: 0.0,
            end_offset: None,
            save: false,
            play_unfocused: false,
            playback_rate: 1.0,
            looping: false,
        }
    }
}

impl SoundOptions {
    /// Options for the sound at `path` with default settings
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    /// Play only between `start` and `end` seconds
    pub fn with_clip(mut self, start: f64, end: Option<f64>) -> Self {
        self.start_offset = start;
        self.end_offset = end;
        self
    }

    pub fn with_save(mut self, save: bool) -> Self {
        self.save = save;
        self
    }

    pub fn with_play_unfocused(mut self, play_unfocused: bool) -> Self {
        self.play_unfocused = play_unfocused;
        self
    }

    pub fn with_playback_rate(mut self, rate: f64) -> Self {
        self.playback_rate = rate;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

/// Read-only summary of a sound
#[derive(Debug, Clone, PartialEq)]
pub struct SoundInfo {
    pub path: Option<String>,
    pub duration: Option<f64>,
}

/// Source and gain node pair driving the graph during playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LiveHandle {
    pub source: NodeId,
    pub gain: NodeId,
}

/// One logical playback unit
pub struct Sound<G> {
    pub(crate) path: Option<String>,
    pub(crate) start_offset: f64,
    pub(crate) end_offset: Option<f64>,
    pub(crate) duration: Option<f64>,
    pub(crate) volume: Volume,
    pub(crate) playback_rate: f64,
    pub(crate) looping: bool,
    pub(crate) save: bool,
    pub(crate) state: SoundState,
    pub(crate) started_at: Option<f64>,
    pub(crate) paused_at: Option<f64>,
    pub(crate) play_unfocused: bool,
    pub(crate) muted: bool,
    pub(crate) loaded: bool,
    pub(crate) play_after_load: bool,
    pub(crate) stop_signal: bool,
    pub(crate) auto_paused: bool,
    pub(crate) fade: Option<FadeJob>,
    pub(crate) fade_done: Option<FadeCallback<G>>,
    pub(crate) pending_fade: Option<FadeRequest<G>>,
    pub(crate) callbacks: EventCallbacks<G>,
    pub(crate) live: Option<LiveHandle>,
    pub(crate) filters: Vec<NodeId>,
    pub(crate) buffer: Option<Arc<AudioBuffer>>,
}

impl<G> Sound<G> {
    /// Create an empty sound
    pub(crate) fn new() -> Self {
        Self {
            path: None,
            start_offset: 0.0,
            end_offset: None,
            duration: None,
            volume: Volume::default(),
            playback_rate: 1.0,
            looping: false,
            save: false,
            state: SoundState::Unset,
            started_at: None,
            paused_at: None,
            play_unfocused: false,
            muted: false,
            loaded: false,
            play_after_load: false,
            stop_signal: false,
            auto_paused: false,
            fade: None,
            fade_done: None,
            pending_fade: None,
            callbacks: EventCallbacks::new(),
            live: None,
            filters: Vec::new(),
            buffer: None,
        }
    }

    /// Apply creation options. Does not touch loading; the bus decides that.
    pub(crate) fn build(&mut self, options: SoundOptions) {
        self.path = options.path;
        self.start_offset = options.start_offset.max(0.0);
        self.end_offset = options.end_offset.filter(|end| *end > 0.0);
        self.save = options.looping || options.save;
        self.playback_rate = clamp_playback_rate(options.playback_rate);
        self.play_unfocused = options.play_unfocused;
        self.state = SoundState::Unset;
        self.looping = options.looping;
        self.volume = Volume::new(if options.volume.is_nan() {
            DEFAULT_VOLUME
        } else {
            options.volume
        });
    }

    /// Reset every field, leaving the state as `Recycled`
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
        self.state = SoundState::Recycled;
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn state(&self) -> SoundState {
        self.state
    }

    pub fn volume(&self) -> f64 {
        self.volume.level()
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_saved(&self) -> bool {
        self.save
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn plays_unfocused(&self) -> bool {
        self.play_unfocused
    }

    pub fn start_offset(&self) -> f64 {
        self.start_offset
    }

    pub fn end_offset(&self) -> Option<f64> {
        self.end_offset
    }

    /// Buffer duration, known once the sound has played
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    pub fn has_pending_fade(&self) -> bool {
        self.pending_fade.is_some()
    }

    /// Whether the sound currently drives the audio graph
    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Filters applied between source and gain, in order
    pub fn filters(&self) -> &[NodeId] {
        &self.filters
    }

    pub fn has_callback(&self, event: SoundEvent) -> bool {
        self.callbacks.is_set(event)
    }

    /// Gain value written to this sound's gain node
    pub(crate) fn output_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume.gain()
        }
    }

    /// Whether every identity field is back at its default
    pub fn is_blank(&self) -> bool {
        self.path.is_none()
            && self.start_offset == 0.0
            && self.end_offset.is_none()
            && self.duration.is_none()
            && self.volume == Volume::default()
            && self.playback_rate == 1.0
            && !self.looping
            && !self.save
            && self.started_at.is_none()
            && self.paused_at.is_none()
            && !self.play_unfocused
            && !self.muted
            && !self.loaded
            && !self.play_after_load
            && !self.stop_signal
            && !self.auto_paused
            && self.fade.is_none()
            && self.fade_done.is_none()
            && self.pending_fade.is_none()
            && SoundEvent::ALL.iter().all(|event| !self.callbacks.is_set(*event))
            && self.live.is_none()
            && self.filters.is_empty()
            && self.buffer.is_none()
    }
}

impl<G> fmt::Debug for Sound<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sound")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("volume", &self.volume.level())
            .field("playback_rate", &self.playback_rate)
            .field("looping", &self.looping)
            .field("save", &self.save)
            .field("live", &self.live)
            .field("fade", &self.fade)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_round_trip() {
        for event in SoundEvent::ALL {
            assert_eq!(event.name().parse::<SoundEvent>(), Ok(event));
        }
        assert_eq!(
            "explode".parse::<SoundEvent>(),
            Err(NameError::UnknownEvent("explode".to_string()))
        );
    }

    #[test]
    fn test_build_forces_save_for_loops() {
        let mut sound: Sound<()> = Sound::new();
        sound.build(SoundOptions::new("a.wav").with_looping(true).with_save(false));
        assert!(sound.is_looping());
        assert!(sound.is_saved());
    }

    #[test]
    fn test_build_clamps_inputs() {
        let mut sound: Sound<()> = Sound::new();
        sound.build(
            SoundOptions::new("a.wav")
                .with_volume(900.0)
                .with_playback_rate(0.0)
                .with_clip(-3.0, Some(0.0)),
        );
        assert_eq!(sound.volume(), 200.0);
        assert_eq!(sound.playback_rate(), 1.0);
        assert_eq!(sound.start_offset(), 0.0);
        assert_eq!(sound.end_offset(), None);
    }

    #[test]
    fn test_reset_blanks_everything() {
        let mut sound: Sound<()> = Sound::new();
        sound.build(SoundOptions::new("a.wav").with_volume(50.0).with_looping(true));
        sound.callbacks.set(SoundEvent::End, Box::new(|_, _| {}));
        sound.muted = true;

        sound.reset();
        assert!(sound.is_blank());
        assert_eq!(sound.state(), SoundState::Recycled);
    }

    #[test]
    fn test_callbacks_restore_keeps_newer() {
        let mut callbacks: EventCallbacks<()> = EventCallbacks::new();
        callbacks.set(SoundEvent::Start, Box::new(|_, _| {}));

        let taken = callbacks.take(SoundEvent::Start).unwrap();
        assert!(!callbacks.is_set(SoundEvent::Start));

        callbacks.restore(SoundEvent::Start, taken);
        assert!(callbacks.is_set(SoundEvent::Start));

        callbacks.clear();
        assert!(!callbacks.is_set(SoundEvent::Start));
    }

    #[test]
    fn test_muted_output_gain() {
        let mut sound: Sound<()> = Sound::new();
        sound.build(SoundOptions::new("a.wav").with_volume(50.0));
        assert_eq!(sound.output_gain(), 0.5);
        sound.muted = true;
        assert_eq!(sound.output_gain(), 0.0);
    }
}
