/// Fire-and-forget sounds
///
/// An emitted sound is not pooled, has no callbacks and cannot be changed
/// after creation. It plays regardless of focus; the only thing a caller can
/// do with it is kill it.
use std::fmt;
use std::sync::Arc;

use super::effects::volume::{clamp_playback_rate, Volume};
use super::graph::{AudioBuffer, AudioGraph, NodeId};
use super::loader::Requester;
use super::manager::SoundBus;
use crate::error::AudioError;

/// Handle to an emitted sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmitId(pub u64);

impl fmt::Display for EmitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "emit#{}", self.0)
    }
}

#[derive(Debug)]
pub(crate) struct Emission {
    path: String,
    volume: Volume,
    start_offset: f64,
    end_offset: Option<f64>,
    playback_rate: f64,
    queued_to_stop: bool,
    live: Option<(NodeId, NodeId)>,
}

impl<G: AudioGraph> SoundBus<G> {
    /// Play `path` once without keeping a sound around.
    ///
    /// Returns `None` when playback is currently not allowed.
    pub fn emit(
        &mut self,
        path: &str,
        volume: f64,
        start_offset: f64,
        end_offset: Option<f64>,
        playback_rate: f64,
    ) -> Option<EmitId> {
        if !self.enabled || !self.can_play_sound() {
            return None;
        }

        let id = EmitId(self.next_emit);
        self.next_emit += 1;

        self.emissions.insert(
            id,
            Emission {
                path: path.to_string(),
                volume: Volume::new(if volume.is_nan() { 100.0 } else { volume }),
                start_offset: start_offset.max(0.0),
                end_offset: end_offset.filter(|end| *end > 0.0),
                playback_rate: clamp_playback_rate(playback_rate),
                queued_to_stop: false,
                live: None,
            },
        );

        match self.buffers.get(path).cloned() {
            Some(buffer) => self.start_emission(id, buffer),
            None => self.request_fetch(path, Requester::Emit(id)),
        }

        Some(id)
    }

    /// Stop an emitted sound, or keep it from starting if it is still loading
    pub fn kill_emitted(&mut self, id: EmitId) {
        let Some(emission) = self.emissions.get_mut(&id) else {
            return;
        };

        match emission.live {
            Some((source, _)) => self.graph.stop(source),
            None => emission.queued_to_stop = true,
        }
    }

    /// Emitted sounds that are loading or playing
    pub fn emitted_count(&self) -> usize {
        self.emissions.len()
    }

    pub fn is_emitting(&self, id: EmitId) -> bool {
        self.emissions
            .get(&id)
            .map(|emission| emission.live.is_some())
            .unwrap_or(false)
    }

    pub(super) fn finish_emit_load(
        &mut self,
        id: EmitId,
        path: &str,
        buffer: Result<Arc<AudioBuffer>, AudioError>,
    ) {
        let buffer = match buffer {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::error!("Error with decoding audio data \"{}\": {}", path, e);
                self.emissions.remove(&id);
                return;
            }
        };

        let queued_to_stop = self
            .emissions
            .get(&id)
            .map(|emission| emission.queued_to_stop)
            .unwrap_or(true);

        if queued_to_stop {
            self.emissions.remove(&id);
        } else {
            self.start_emission(id, buffer);
        }
    }

    pub(super) fn finish_emission(&mut self, id: EmitId) {
        if let Some(Emission {
            live: Some((_, gain)),
            ..
        }) = self.emissions.remove(&id)
        {
            self.graph.disconnect(gain);
            self.graph.release(gain);
        }
    }

    fn start_emission(&mut self, id: EmitId, buffer: Arc<AudioBuffer>) {
        let Some(emission) = self.emissions.get(&id) else {
            return;
        };

        let length = buffer.duration();
        let offset = emission.start_offset.min(length);
        let end = emission.end_offset.map_or(length, |end| end.min(length));
        let rate = emission.playback_rate as f32;
        let gain_value = emission.volume.gain();
        tracing::debug!("Emitting {} as {}", emission.path, id);

        let source = self.graph.create_source(buffer);
        self.graph.set_playback_rate(source, rate);
        let gain = self.graph.create_gain(gain_value);
        self.graph.connect(gain, self.master_gain);
        self.graph.connect(source, gain);
        self.graph.start(source, offset, (end - offset).max(0.0));

        self.source_owners.insert(source, Requester::Emit(id));
        if let Some(emission) = self.emissions.get_mut(&id) {
            emission.live = Some((source, gain));
        }
    }
}
