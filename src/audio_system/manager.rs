/// Sound bus
///
/// Owns the master gain stage, the sound arena and every bus-wide policy:
/// focus handling, queued playback, recycling, the shared buffer cache and
/// the per-frame fade driver. The host creates one bus, keeps it, and calls
/// [`SoundBus::update`] once per frame.
use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::effects::ease::Ease;
use super::effects::fade::{FadeCallback, FadeJob, FadeOwner, FadeRequest, FadeStep, Fader};
use super::effects::volume::Volume;
use super::emitter::{EmitId, Emission};
use super::graph::{AudioBuffer, AudioGraph, NodeId};
use super::loader::{FetchReply, FetchResult, MemoryLoader, Requester, SoundLoader};
use super::rodio_graph::RodioGraph;
use super::sound::{Sound, SoundEvent, SoundId, SoundOptions, SoundState};
use crate::config::BusConfig;
use crate::error::AudioError;

/// Most wiped sounds kept around for reuse
pub const MAX_RECYCLED_SOUNDS: usize = 500;

pub(super) enum SlotEntry<G> {
    Active(Sound<G>),
    Recycled(Sound<G>),
    Vacant,
}

pub(super) struct Slot<G> {
    pub(super) generation: u32,
    pub(super) entry: SlotEntry<G>,
}

/// Playback orchestration over an [`AudioGraph`]
pub struct SoundBus<G> {
    pub(super) graph: G,
    pub(super) loader: Box<dyn SoundLoader>,
    pub(super) fetch_sender: Sender<FetchResult>,
    pub(super) fetch_receiver: Receiver<FetchResult>,
    pub(super) enabled: bool,

    pub(super) master_gain: NodeId,
    pub(super) master_volume: Volume,
    pub(super) muted: bool,
    pub(super) previous_gain: Option<f32>,
    pub(super) focused: bool,
    pub(super) master_fade: Option<FadeJob>,
    pub(super) master_fade_done: Option<FadeCallback<G>>,
    pub(super) fader: Fader,

    pub(super) slots: Vec<Slot<G>>,
    pub(super) free_slots: Vec<usize>,
    pub(super) recycle_pool: Vec<usize>,
    pub(super) max_recycled_sounds: usize,

    pub(super) playing: Vec<SoundId>,
    pub(super) paused: Vec<SoundId>,
    pub(super) queued_to_play: Vec<SoundId>,
    pub(super) queued_to_fade: Vec<SoundId>,

    pub(super) buffers: HashMap<String, Arc<AudioBuffer>>,
    pub(super) checker: Option<Box<dyn Fn() -> bool>>,
    pub(super) source_owners: HashMap<NodeId, Requester>,
    pub(super) emissions: HashMap<EmitId, Emission>,
    pub(super) next_emit: u64,

    pub(super) frame_rate: f64,
    pub(super) default_fade_ms: f64,
    pub(super) default_ease: Ease,
}

impl SoundBus<RodioGraph> {
    /// Bus on the default output device.
    ///
    /// Without a usable device the bus is returned disabled: every call is a
    /// no-op and nothing will ever play.
    pub fn open_default(loader: impl SoundLoader + 'static, config: &BusConfig) -> Self {
        match RodioGraph::open_default() {
            Ok(graph) => Self::with_config(graph, loader, config),
            Err(e) => {
                tracing::error!("No audio output available, sound is disabled: {}", e);
                Self::disabled(RodioGraph::detached())
            }
        }
    }
}

impl<G: AudioGraph> SoundBus<G> {
    /// Create a new bus with default settings
    pub fn new(graph: G, loader: impl SoundLoader + 'static) -> Self {
        Self::with_config(graph, loader, &BusConfig::default())
    }

    /// Create a new bus from configuration
    pub fn with_config(mut graph: G, loader: impl SoundLoader + 'static, config: &BusConfig) -> Self {
        let master_volume = Volume::new(config.master_volume);
        let master_gain = graph.create_gain(master_volume.gain());
        let destination = graph.destination();
        graph.connect(master_gain, destination);

        let (fetch_sender, fetch_receiver) = unbounded();

        tracing::debug!(
            "Sound bus ready: master={}, pool={}, frame_rate={}",
            master_volume.level(),
            config.max_recycled_sounds,
            config.frame_rate
        );

        Self {
            graph,
            loader: Box::new(loader),
            fetch_sender,
            fetch_receiver,
            enabled: true,
            master_gain,
            master_volume,
            muted: false,
            previous_gain: None,
            focused: true,
            master_fade: None,
            master_fade_done: None,
            fader: Fader::new(),
            slots: Vec::new(),
            free_slots: Vec::new(),
            recycle_pool: Vec::new(),
            max_recycled_sounds: config.max_recycled_sounds,
            playing: Vec::new(),
            paused: Vec::new(),
            queued_to_play: Vec::new(),
            queued_to_fade: Vec::new(),
            buffers: HashMap::new(),
            checker: None,
            source_owners: HashMap::new(),
            emissions: HashMap::new(),
            next_emit: 0,
            frame_rate: config.frame_rate,
            default_fade_ms: config.default_fade_ms,
            default_ease: Ease::resolve(&config.default_ease),
        }
    }

    /// A bus that never plays anything
    pub fn disabled(graph: G) -> Self {
        let mut bus = Self::new(graph, MemoryLoader::new());
        bus.enabled = false;
        bus
    }

    /// Advance the bus by one frame.
    ///
    /// `timestamp` is the host's frame time in milliseconds. Finished loads
    /// are decoded, ended sources are handled and every active fade ticks
    /// once.
    pub fn update(&mut self, timestamp: f64) {
        if !self.enabled {
            return;
        }

        self.resolve_fetches();
        self.resolve_ended();
        self.tick_fades(timestamp);
    }

    /// Create a sound, reusing a recycled slot when one is available
    pub fn create_sound(&mut self, options: SoundOptions) -> SoundId {
        if !self.enabled {
            return SoundId::new(u32::MAX as usize, u32::MAX);
        }

        let index = match self.recycle_pool.pop().or_else(|| self.free_slots.pop()) {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: SlotEntry::Vacant,
                });
                self.slots.len() - 1
            }
        };

        let slot = &mut self.slots[index];
        let mut sound = match std::mem::replace(&mut slot.entry, SlotEntry::Vacant) {
            SlotEntry::Recycled(sound) => sound,
            _ => Sound::new(),
        };
        sound.build(options);
        let id = SoundId::new(index, slot.generation);

        let fetch = match sound.path.clone() {
            Some(path) if !self.buffers.contains_key(&path) => {
                sound.state = SoundState::Loading;
                Some(path)
            }
            _ => {
                sound.loaded = true;
                None
            }
        };
        slot.entry = SlotEntry::Active(sound);

        if let Some(path) = fetch {
            tracing::debug!("Loading {} for {}", path, id);
            self.request_fetch(&path, Requester::Sound(id));
        }

        id
    }

    /// Wipe a sound and hand its slot back to the pool
    pub fn recycle_sound(&mut self, id: SoundId) {
        self.kill(id);
    }

    /// Stop every playing sound except `exceptions`
    pub fn stop_all_sounds(&mut self, exceptions: &[SoundId]) {
        for id in self.playing.clone().into_iter().rev() {
            if exceptions.contains(&id) {
                continue;
            }
            self.stop(id);
        }
        tracing::debug!("Stopped all sounds ({} kept)", exceptions.len());
    }

    /// Kill every playing and paused sound
    pub fn kill_all_sounds(&mut self) {
        for id in self.playing.clone().into_iter().rev() {
            self.kill(id);
        }
        for id in self.paused.clone().into_iter().rev() {
            self.kill(id);
        }
        tracing::debug!("Killed all sounds");
    }

    /// Pause every playing sound. With `auto` (focus loss), sounds allowed
    /// to play unfocused keep playing.
    pub fn pause_all_sounds(&mut self, auto: bool) {
        for id in self.playing.clone().into_iter().rev() {
            let plays_unfocused = self.sound(id).map(|s| s.play_unfocused).unwrap_or(false);
            if auto && plays_unfocused {
                continue;
            }

            self.pause(id);
            if auto {
                if let Some(sound) = self.sound_mut(id) {
                    sound.auto_paused = sound.state == SoundState::Paused;
                }
            }
        }
    }

    /// Resume paused sounds. With `auto` (focus gain), only the sounds that
    /// focus loss paused are resumed.
    pub fn resume_all_sounds(&mut self, auto: bool) {
        for id in self.paused.clone().into_iter().rev() {
            let auto_paused = self.sound(id).map(|s| s.auto_paused).unwrap_or(false);
            if auto && !auto_paused {
                continue;
            }
            self.resume(id);
        }
    }

    /// Flush playback and fades deferred while unfocused, most recent first
    pub fn play_queued_sounds(&mut self) {
        while let Some(id) = self.queued_to_play.pop() {
            // Paused sounds were queued by `resume` and continue where they left off
            if self.sound(id).map(|s| s.state) == Some(SoundState::Paused) {
                self.resume(id);
            } else {
                self.play(id);
            }
        }
        while let Some(id) = self.queued_to_fade.pop() {
            self.queued_fade(id);
        }
    }

    /// Host focus changed
    pub fn set_focused(&mut self, focused: bool) {
        if !self.enabled || self.focused == focused {
            return;
        }
        self.focused = focused;
        tracing::debug!("Focus {}", if focused { "gained" } else { "lost" });

        if focused {
            if !self.paused.is_empty() {
                self.resume_all_sounds(true);
            }
            if !self.queued_to_play.is_empty() || !self.queued_to_fade.is_empty() {
                self.play_queued_sounds();
            }
        } else if !self.playing.is_empty() {
            self.pause_all_sounds(true);
        }
    }

    /// Set the master volume
    pub fn adjust_volume(&mut self, volume: f64) {
        if !self.enabled || volume.is_nan() {
            return;
        }
        self.master_volume.set_level(volume);

        let gain = self.master_volume.gain();
        if self.muted {
            self.previous_gain = Some(gain);
        } else {
            self.graph.set_gain(self.master_gain, gain);
        }
    }

    /// Fade the master volume. Ignored while a master fade is running.
    pub fn fade_master(&mut self, request: FadeRequest<G>) {
        if !self.enabled || !request.is_valid() || self.master_fade.is_some() {
            return;
        }

        let (job, callback) = request.into_job(self.master_volume.level(), self.frame_rate);
        tracing::debug!("Master fade to {} over {}ms", job.target(), job.duration_ms());

        self.master_fade = Some(job);
        self.master_fade_done = callback;
        self.fader.schedule(FadeOwner::Master);
    }

    /// Mute or unmute the master gain
    pub fn toggle_mute(&mut self) {
        if !self.enabled {
            return;
        }
        self.muted = !self.muted;

        if self.muted {
            self.previous_gain = self.graph.gain(self.master_gain);
            self.graph.set_gain(self.master_gain, 0.0);
        } else {
            let gain = self.previous_gain.take().unwrap_or(1.0);
            self.graph.set_gain(self.master_gain, gain);
        }
    }

    /// Drop a cached buffer. Sounds already playing keep their copy.
    pub fn unload_sound(&mut self, path: &str) {
        if self.buffers.remove(path).is_some() {
            tracing::debug!("Unloaded {}", path);
        }
    }

    /// Install the host policy deciding whether sounds may play at all
    pub fn enable_checker(&mut self, checker: impl Fn() -> bool + 'static) {
        self.checker = Some(Box::new(checker));
    }

    pub fn can_play_sound(&self) -> bool {
        self.checker.as_ref().map(|checker| checker()).unwrap_or(true)
    }

    /// A fade request seeded with the configured duration and curve
    pub fn fade_request(&self, target: f64) -> FadeRequest<G> {
        FadeRequest::new(target)
            .with_duration(self.default_fade_ms)
            .with_ease(self.default_ease)
    }

    pub fn sound(&self, id: SoundId) -> Option<&Sound<G>> {
        match self.slots.get(id.index()) {
            Some(Slot {
                generation,
                entry: SlotEntry::Active(sound),
            }) if *generation == id.generation => Some(sound),
            _ => None,
        }
    }

    /// Whether `id` still addresses a live sound
    pub fn is_alive(&self, id: SoundId) -> bool {
        self.sound(id).is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn master_volume(&self) -> f64 {
        self.master_volume.level()
    }

    /// Whether a master fade is running
    pub fn is_fading(&self) -> bool {
        self.master_fade.is_some()
    }

    pub fn master_gain_node(&self) -> NodeId {
        self.master_gain
    }

    pub fn playing_sounds(&self) -> &[SoundId] {
        &self.playing
    }

    pub fn paused_sounds(&self) -> &[SoundId] {
        &self.paused
    }

    pub fn queued_to_play(&self) -> &[SoundId] {
        &self.queued_to_play
    }

    pub fn queued_to_fade(&self) -> &[SoundId] {
        &self.queued_to_fade
    }

    /// Number of wiped sounds waiting for reuse
    pub fn recycled_count(&self) -> usize {
        self.recycle_pool.len()
    }

    /// Number of arena slots holding nothing at all
    pub fn vacant_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.entry, SlotEntry::Vacant))
            .count()
    }

    pub fn max_recycled_sounds(&self) -> usize {
        self.max_recycled_sounds
    }

    /// Cached decoded buffer for `path`
    pub fn buffer(&self, path: &str) -> Option<&Arc<AudioBuffer>> {
        self.buffers.get(path)
    }

    pub fn cached_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// Mutable graph access, e.g. for creating filter nodes
    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    pub(super) fn sound_mut(&mut self, id: SoundId) -> Option<&mut Sound<G>> {
        match self.slots.get_mut(id.index()) {
            Some(Slot {
                generation,
                entry: SlotEntry::Active(sound),
            }) if *generation == id.generation => Some(sound),
            _ => None,
        }
    }

    /// Run the callback registered for `event`, if any
    pub(super) fn fire(&mut self, id: SoundId, event: SoundEvent) {
        let callback = self.sound_mut(id).and_then(|sound| sound.callbacks.take(event));

        if let Some(mut callback) = callback {
            callback(self, id);
            if let Some(sound) = self.sound_mut(id) {
                sound.callbacks.restore(event, callback);
            }
        }
    }

    pub(super) fn request_fetch(&mut self, path: &str, requester: Requester) {
        let reply = FetchReply::new(self.fetch_sender.clone(), path, requester);
        self.loader.fetch(path, reply);
    }

    /// Reset a sound's slot and return it to the pool (or leave it vacant
    /// once the pool is full)
    pub(super) fn wipe_slot(&mut self, id: SoundId) {
        let pool_full = self.recycle_pool.len() >= self.max_recycled_sounds;
        let Some(slot) = self.slots.get_mut(id.index()) else {
            return;
        };

        let entry = std::mem::replace(&mut slot.entry, SlotEntry::Vacant);
        slot.generation = slot.generation.wrapping_add(1);

        match entry {
            SlotEntry::Active(mut sound) if !pool_full => {
                sound.reset();
                slot.entry = SlotEntry::Recycled(sound);
                self.recycle_pool.push(id.index());
            }
            _ => {
                self.free_slots.push(id.index());
            }
        }
    }

    /// Take `id` out of every bus set
    pub(super) fn forget(&mut self, id: SoundId) {
        self.playing.retain(|other| *other != id);
        self.paused.retain(|other| *other != id);
        self.queued_to_play.retain(|other| *other != id);
        self.queued_to_fade.retain(|other| *other != id);
    }

    fn resolve_fetches(&mut self) {
        while let Ok(result) = self.fetch_receiver.try_recv() {
            let FetchResult {
                path,
                requester,
                bytes,
            } = result;

            let decoded = bytes.and_then(|bytes| self.graph.decode(&bytes));
            let buffer = match decoded {
                Ok(buffer) => {
                    tracing::info!(
                        "Decoded {} ({:.2}s, {} channel(s), {} Hz)",
                        path,
                        buffer.duration(),
                        buffer.channels(),
                        buffer.sample_rate()
                    );
                    let buffer = Arc::new(buffer);
                    self.buffers.insert(path.clone(), buffer.clone());
                    Ok(buffer)
                }
                Err(e) => Err(e),
            };

            match requester {
                Requester::Sound(id) => self.finish_load(id, &path, buffer.map(|_| ())),
                Requester::Emit(emit) => self.finish_emit_load(emit, &path, buffer),
            }
        }
    }

    fn finish_load(&mut self, id: SoundId, path: &str, outcome: Result<(), AudioError>) {
        if let Err(e) = outcome {
            tracing::error!("Error with decoding audio data \"{}\", sound killed: {}", path, e);
            self.kill(id);
            return;
        }

        let Some(sound) = self.sound_mut(id) else {
            return;
        };
        if sound.path.as_deref() != Some(path) {
            return;
        }

        sound.loaded = true;
        if sound.state == SoundState::Loading {
            sound.state = SoundState::Unset;
        }

        if sound.play_after_load {
            if sound.stop_signal {
                sound.stop_signal = false;
                sound.play_after_load = false;
                return;
            }
            self.play(id);
        }
    }

    fn resolve_ended(&mut self) {
        for source in self.graph.drain_ended() {
            match self.source_owners.remove(&source) {
                Some(Requester::Sound(id)) => self.handle_ended(id, source),
                Some(Requester::Emit(emit)) => self.finish_emission(emit),
                None => {}
            }
            self.graph.release(source);
        }
    }

    /// Natural end (or the end notification of a stopped source)
    fn handle_ended(&mut self, id: SoundId, source: NodeId) {
        let Some(sound) = self.sound(id) else {
            return;
        };
        if sound.live.is_some_and(|live| live.source != source) {
            return;
        }

        match sound.state {
            SoundState::Stopped if sound.save => return,
            SoundState::Paused => return,
            SoundState::Restarting => {
                self.play(id);
                return;
            }
            _ => {}
        }

        if sound.state != SoundState::Stopped {
            self.fire(id, SoundEvent::End);
        }

        let Some(sound) = self.sound(id) else {
            return;
        };
        // The end callback may have started playback again
        if sound.live.is_some_and(|live| live.source != source) {
            return;
        }

        if sound.looping {
            self.play(id);
        } else if !sound.save {
            self.kill(id);
        } else {
            self.release_handle(id, true);
            self.playing.retain(|other| *other != id);
            if let Some(sound) = self.sound_mut(id) {
                sound.state = SoundState::Stopped;
            }
        }
    }

    fn tick_fades(&mut self, timestamp: f64) {
        for owner in self.fader.snapshot() {
            match owner {
                FadeOwner::Master => self.tick_master_fade(timestamp),
                FadeOwner::Sound(id) => self.tick_sound_fade(id, timestamp),
            }
        }
    }

    fn tick_master_fade(&mut self, timestamp: f64) {
        let focused = self.focused;
        let Some(job) = self.master_fade.as_mut() else {
            self.fader.cancel(FadeOwner::Master);
            return;
        };

        match job.tick(timestamp, focused) {
            FadeStep::Suspended => {}
            FadeStep::Continue(value) => self.adjust_volume(value),
            FadeStep::Complete(target) => {
                self.master_fade = None;
                self.fader.cancel(FadeOwner::Master);
                self.adjust_volume(target);

                if let Some(callback) = self.master_fade_done.take() {
                    callback(self);
                }
            }
        }
    }

    fn tick_sound_fade(&mut self, id: SoundId, timestamp: f64) {
        let owner = FadeOwner::Sound(id);
        let focused = self.focused;
        let Some(job) = self.sound_mut(id).and_then(|sound| sound.fade.as_mut()) else {
            self.fader.cancel(owner);
            return;
        };

        match job.tick(timestamp, focused) {
            FadeStep::Suspended => {}
            FadeStep::Continue(value) => self.set_volume(id, value),
            FadeStep::Complete(target) => {
                self.fader.cancel(owner);
                let callback = self.sound_mut(id).and_then(|sound| {
                    sound.fade = None;
                    if sound.state == SoundState::Fading {
                        sound.state = SoundState::Playing;
                    }
                    sound.fade_done.take()
                });
                self.set_volume(id, target);

                if let Some(callback) = callback {
                    callback(self);
                }
            }
        }
    }
}
