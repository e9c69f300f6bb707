/// Per-sound playback operations
///
/// Each operation takes the [`SoundId`] of the sound to drive. A dead id
/// (killed, or never created) turns every call into a no-op.
use super::effects::fade::{FadeOwner, FadeRequest};
use super::effects::volume::clamp_playback_rate;
use super::graph::{AudioGraph, NodeId};
use super::loader::Requester;
use super::manager::SoundBus;
use super::sound::{LiveHandle, SoundEvent, SoundId, SoundInfo, SoundState};
use crate::error::NameError;

impl<G: AudioGraph> SoundBus<G> {
    /// Play a sound from its start offset (or from where it was paused)
    pub fn play(&mut self, id: SoundId) {
        self.start_playback(id, false);
    }

    /// Pause a playing sound, remembering its position
    pub fn pause(&mut self, id: SoundId) {
        let now = self.graph.current_time();
        let Some(sound) = self.sound_mut(id) else {
            return;
        };
        if sound.live.is_none() {
            return;
        }

        sound.paused_at = Some(now - sound.started_at.unwrap_or(now));
        self.release_handle(id, false);

        if let Some(sound) = self.sound_mut(id) {
            sound.state = SoundState::Paused;
        }
        self.playing.retain(|other| *other != id);
        if !self.paused.contains(&id) {
            self.paused.push(id);
        }

        tracing::debug!("Paused {}", id);
        self.fire(id, SoundEvent::Pause);
    }

    /// Continue a paused sound where it left off
    pub fn resume(&mut self, id: SoundId) {
        if self.sound(id).map(|s| s.state) != Some(SoundState::Paused) {
            return;
        }

        if self.start_playback(id, true) {
            tracing::debug!("Resumed {}", id);
            self.fire(id, SoundEvent::Resume);
        }
    }

    /// Stop a sound. A sound that is still loading will not start once its
    /// load completes.
    pub fn stop(&mut self, id: SoundId) {
        self.stop_into(id, SoundState::Stopped);
    }

    /// Play a sound again from the start without firing its end callback
    pub fn restart(&mut self, id: SoundId) {
        match self.sound(id).map(|sound| sound.live.is_some()) {
            Some(true) => self.stop_into(id, SoundState::Restarting),
            Some(false) => self.play(id),
            None => {}
        }
    }

    /// Tear a sound down completely. The id is dead afterwards.
    pub fn kill(&mut self, id: SoundId) {
        let Some(sound) = self.sound(id) else {
            return;
        };
        let filters = sound.filters.clone();

        self.release_handle(id, true);
        for filter in filters {
            self.graph.disconnect(filter);
        }
        self.fader.cancel(FadeOwner::Sound(id));
        self.forget(id);
        self.wipe_slot(id);

        tracing::debug!("Killed {}", id);
    }

    /// Fade a playing sound's volume.
    ///
    /// While the host is unfocused (and the sound may not play unfocused) the
    /// request is parked and replayed on refocus; a later request replaces
    /// a parked one.
    pub fn fade(&mut self, id: SoundId, request: FadeRequest<G>) {
        if !request.is_valid() {
            return;
        }

        let focused = self.focused;
        let frame_rate = self.frame_rate;
        let Some(sound) = self.sound_mut(id) else {
            return;
        };

        if !focused && !sound.play_unfocused {
            sound.pending_fade = Some(request);
            if !self.queued_to_fade.contains(&id) {
                self.queued_to_fade.push(id);
            }
            return;
        }

        if sound.state != SoundState::Playing || sound.fade.is_some() {
            return;
        }

        let (job, callback) = request.into_job(sound.volume.level(), frame_rate);
        tracing::debug!("Fading {} to {} over {}ms", id, job.target(), job.duration_ms());

        sound.pending_fade = None;
        sound.fade = Some(job);
        sound.fade_done = callback;
        sound.state = SoundState::Fading;
        self.fader.schedule(FadeOwner::Sound(id));
    }

    /// Mute or unmute a playing sound
    pub fn toggle_sound_mute(&mut self, id: SoundId) {
        let Some(sound) = self.sound_mut(id) else {
            return;
        };
        let Some(live) = sound.live.filter(|_| sound.loaded) else {
            return;
        };

        sound.muted = !sound.muted;
        let gain = sound.output_gain();
        self.graph.set_gain(live.gain, gain);
    }

    /// Flip looping; looping sounds are always saved
    pub fn toggle_loop(&mut self, id: SoundId) {
        if let Some(looping) = self.sound(id).map(|s| s.looping) {
            self.set_looping(id, !looping);
        }
    }

    pub fn set_looping(&mut self, id: SoundId, looping: bool) {
        if let Some(sound) = self.sound_mut(id) {
            sound.looping = looping;
            if looping {
                sound.save = true;
            }
        }
    }

    /// Set a sound's volume, clamped into range
    pub fn set_volume(&mut self, id: SoundId, volume: f64) {
        if volume.is_nan() {
            return;
        }
        let Some(sound) = self.sound_mut(id) else {
            return;
        };

        sound.volume.set_level(volume);
        if let Some(live) = sound.live.filter(|_| sound.loaded) {
            let gain = sound.output_gain();
            self.graph.set_gain(live.gain, gain);
        }
    }

    /// Set a sound's playback rate, clamped into range
    pub fn set_playback_rate(&mut self, id: SoundId, rate: f64) {
        let Some(sound) = self.sound_mut(id) else {
            return;
        };

        sound.playback_rate = clamp_playback_rate(rate);
        if let Some(live) = sound.live {
            let rate = sound.playback_rate as f32;
            self.graph.set_playback_rate(live.source, rate);
        }
    }

    /// Attach a callback to one of a sound's lifecycle events
    pub fn on(
        &mut self,
        id: SoundId,
        event: SoundEvent,
        callback: impl FnMut(&mut SoundBus<G>, SoundId) + 'static,
    ) {
        if let Some(sound) = self.sound_mut(id) {
            sound.callbacks.set(event, Box::new(callback));
        }
    }

    /// Attach a callback by event name
    pub fn on_named(
        &mut self,
        id: SoundId,
        event: &str,
        callback: impl FnMut(&mut SoundBus<G>, SoundId) + 'static,
    ) -> Result<(), NameError> {
        match event.parse::<SoundEvent>() {
            Ok(event) => {
                self.on(id, event, callback);
                Ok(())
            }
            Err(e) => {
                tracing::error!("{}", e);
                Err(e)
            }
        }
    }

    /// Playback position in seconds
    pub fn current_time(&self, id: SoundId) -> f64 {
        let Some(sound) = self.sound(id) else {
            return 0.0;
        };

        if let Some(paused_at) = sound.paused_at {
            paused_at * sound.playback_rate
        } else if let Some(started_at) = sound.started_at {
            self.graph.current_time() - started_at
        } else {
            0.0
        }
    }

    /// Insert a filter between the sound's source and its gain stage.
    /// The filter stays applied across replays until removed or killed.
    pub fn add_filter(&mut self, id: SoundId, filter: NodeId) {
        let Some(sound) = self.sound_mut(id) else {
            return;
        };
        if sound.live.is_none() {
            tracing::error!("Invalid sound {}: no source to filter", id);
            return;
        }

        if !sound.filters.contains(&filter) {
            sound.filters.push(filter);
            self.rewire(id);
        }
    }

    /// Remove a filter from a playing sound
    pub fn remove_filter(&mut self, id: SoundId, filter: NodeId) {
        let Some(sound) = self.sound_mut(id) else {
            return;
        };
        if sound.live.is_none() {
            tracing::error!("Invalid sound {}: no source to unfilter", id);
            return;
        }

        if let Some(position) = sound.filters.iter().position(|f| *f == filter) {
            sound.filters.remove(position);
            self.graph.disconnect(filter);
            self.rewire(id);
        }
    }

    /// Path and (once played) buffer duration
    pub fn info(&self, id: SoundId) -> Option<SoundInfo> {
        self.sound(id).map(|sound| SoundInfo {
            path: sound.path.clone(),
            duration: if sound.loaded { sound.duration } else { None },
        })
    }

    /// Gain node of a playing sound
    pub fn gain_node(&self, id: SoundId) -> Option<NodeId> {
        self.sound(id).and_then(|s| s.live).map(|live| live.gain)
    }

    /// Source node of a playing sound
    pub fn source_node(&self, id: SoundId) -> Option<NodeId> {
        self.sound(id).and_then(|s| s.live).map(|live| live.source)
    }

    /// Replay a fade parked while unfocused
    pub(super) fn queued_fade(&mut self, id: SoundId) {
        let request = self.sound_mut(id).and_then(|sound| sound.pending_fade.take());
        if let Some(request) = request {
            self.fade(id, request);
        }
    }

    /// Allocate nodes and start the graph. Returns whether playback began.
    fn start_playback(&mut self, id: SoundId, resuming: bool) -> bool {
        if !self.enabled {
            return false;
        }
        let can_play = self.can_play_sound();
        let focused = self.focused;

        let Some(path) = self.sound(id).and_then(|sound| sound.path.clone()) else {
            return false;
        };
        let cached = self.buffers.get(&path).cloned();

        let Some(sound) = self.sound_mut(id) else {
            return false;
        };
        if sound.state == SoundState::Recycled || !can_play {
            return false;
        }

        let Some(buffer) = cached else {
            sound.play_after_load = true;
            // Loaded once but evicted from the cache since: fetch it again
            let evicted = sound.loaded;
            if evicted {
                sound.loaded = false;
                sound.state = SoundState::Loading;
                tracing::debug!("Reloading evicted {} for {}", path, id);
                self.request_fetch(&path, Requester::Sound(id));
            }
            return false;
        };

        if !focused && !sound.play_unfocused {
            // A queued paused sound must not also be picked up by the auto resume
            if sound.state == SoundState::Paused {
                sound.auto_paused = false;
            }
            if !self.queued_to_play.contains(&id) {
                self.queued_to_play.push(id);
            }
            return false;
        }

        self.release_handle(id, true);
        self.paused.retain(|other| *other != id);

        let Some(sound) = self.sound_mut(id) else {
            return false;
        };
        let rate = sound.playback_rate;
        let resume_from = sound.paused_at;
        let length = buffer.duration();
        let offset = resume_from
            .map(|p| p * rate)
            .unwrap_or(sound.start_offset)
            .max(0.0)
            .min(length);
        let end = sound.end_offset.map_or(length, |end| end.min(length));
        let gain_value = sound.output_gain();

        let source = self.graph.create_source(buffer.clone());
        self.graph.set_playback_rate(source, rate as f32);
        let gain = self.graph.create_gain(gain_value);
        self.graph.connect(gain, self.master_gain);

        let now = self.graph.current_time();
        let Some(sound) = self.sound_mut(id) else {
            return false;
        };
        sound.live = Some(LiveHandle { source, gain });
        sound.duration = Some(buffer.duration());
        sound.buffer = Some(buffer);
        sound.play_after_load = false;
        sound.started_at = Some(now - resume_from.unwrap_or(offset));
        sound.paused_at = None;
        sound.auto_paused = false;
        sound.state = if sound.fade.is_some() {
            SoundState::Fading
        } else {
            SoundState::Playing
        };

        self.rewire(id);
        self.graph.start(source, offset, (end - offset).max(0.0));
        self.source_owners.insert(source, Requester::Sound(id));
        if !self.playing.contains(&id) {
            self.playing.push(id);
        }

        tracing::debug!("Playing {} ({}) from {:.3}s", id, path, offset);
        if !resuming {
            self.fire(id, SoundEvent::Start);
        }
        true
    }

    fn stop_into(&mut self, id: SoundId, next: SoundState) {
        let Some(sound) = self.sound_mut(id) else {
            return;
        };

        // A restarting sound has no live source but still counts as playing
        // until its end notification replays it
        let restarting = sound.state == SoundState::Restarting;
        if sound.live.is_none() && sound.state != SoundState::Paused && !restarting {
            if !sound.loaded {
                sound.stop_signal = true;
            }
            return;
        }

        let was_playing = matches!(
            sound.state,
            SoundState::Playing | SoundState::Fading | SoundState::Paused | SoundState::Restarting
        );
        sound.fade = None;
        sound.fade_done = None;
        sound.paused_at = None;

        self.fader.cancel(FadeOwner::Sound(id));
        if next != SoundState::Restarting {
            self.playing.retain(|other| *other != id);
        }
        self.paused.retain(|other| *other != id);
        self.release_handle(id, false);

        if let Some(sound) = self.sound_mut(id) {
            sound.state = next;
        }

        if next == SoundState::Stopped && was_playing {
            tracing::debug!("Stopped {}", id);
            self.fire(id, SoundEvent::Stop);
        }
    }

    /// Stop and disconnect the live nodes of a sound.
    ///
    /// With `forget` the source is released right away and its end
    /// notification is never seen; otherwise the notification still reaches
    /// the natural-end handling.
    pub(super) fn release_handle(&mut self, id: SoundId, forget: bool) {
        let Some(sound) = self.sound_mut(id) else {
            return;
        };
        let Some(live) = sound.live.take() else {
            return;
        };
        let filters = sound.filters.clone();

        self.graph.stop(live.source);
        self.graph.disconnect(live.source);
        for filter in filters {
            self.graph.disconnect(filter);
        }
        self.graph.disconnect(live.gain);
        self.graph.release(live.gain);

        if forget {
            self.source_owners.remove(&live.source);
            self.graph.release(live.source);
        }
    }

    /// Wire source -> filters... -> gain for the live handle
    fn rewire(&mut self, id: SoundId) {
        let Some(sound) = self.sound(id) else {
            return;
        };
        let Some(live) = sound.live else {
            return;
        };
        let filters = sound.filters.clone();

        self.graph.disconnect(live.source);
        let mut previous = live.source;
        for filter in filters {
            self.graph.disconnect(filter);
            self.graph.connect(previous, filter);
            previous = filter;
        }
        self.graph.connect(previous, live.gain);
    }
}
