/// Audio system module
///
/// A frame-driven sound bus over an abstract audio graph:
/// - Sounds with a small state machine, event callbacks and filter chains
/// - Fades driven once per host frame, with 31 easing curves
/// - Focus handling: auto pause/resume and deferred playback
/// - A shared decoded-buffer cache filled by pluggable loaders
///
/// ## Architecture
///
/// ```text
/// SoundBus
///   ├── master gain ──> destination
///   ├── Sound (arena slot)     source ─> filters ─> gain ─┐
///   ├── Sound (arena slot)     source ─> gain ────────────┤ master gain
///   └── Emission (one-shot)    source ─> gain ────────────┘
///
/// Each frame, SoundBus::update:
///   1. decodes finished loads and starts deferred plays
///   2. handles ended sources (loop, stop or recycle)
///   3. ticks every active fade
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// use soundbus::audio_system::{FadeRequest, FileLoader, SoundBus, SoundOptions};
///
/// let mut bus = SoundBus::open_default(FileLoader::new("assets"), &config);
/// let id = bus.create_sound(SoundOptions::new("music/theme.mp3").with_looping(true));
/// bus.play(id);
/// bus.fade(id, FadeRequest::new(40.0).with_duration(2000.0));
///
/// loop {
///     bus.update(clock.tick());
///     clock.sleep_until_next_frame();
/// }
/// ```
pub mod effects;
pub mod emitter;
pub mod graph;
pub mod loader;
pub mod manager;
pub mod player;
pub mod rodio_graph;
pub mod sound;

// Re-export commonly used types
pub use effects::{Ease, FadeRequest, Volume};
pub use emitter::EmitId;
pub use graph::{AudioBuffer, AudioGraph, FilterKind, NodeId, OfflineGraph};
pub use loader::{FetchReply, FileLoader, MemoryLoader, SoundLoader};
pub use manager::{SoundBus, MAX_RECYCLED_SOUNDS};
pub use rodio_graph::RodioGraph;
pub use sound::{SoundEvent, SoundId, SoundInfo, SoundOptions, SoundState};
