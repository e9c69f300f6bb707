/// Audio graph backed by rodio
///
/// Every started source gets its own `Sink`. Gain nodes are not rendered as
/// separate stages: the gains along a source's route to the destination are
/// multiplied into the sink volume and re-applied whenever one of them
/// changes. Filters between the source and its gain are part of the sample
/// stream; when a playing source's filters change, its sink is rebuilt at
/// the current buffer position.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

use super::graph::{AudioBuffer, AudioGraph, FilterKind, NodeId};
use crate::error::AudioError;

// Longest route walked from a source before giving up (guards against cycles)
const MAX_ROUTE_LENGTH: usize = 64;

/// A started source: its sink and where it is in the buffer
struct Voice {
    sink: Sink,
    // Buffer position in seconds at `segment_start`
    position: f64,
    end: f64,
    segment_start: Instant,
    filters: Vec<FilterKind>,
}

impl Voice {
    fn position(&self, rate: f32) -> f64 {
        playback_position(
            self.position,
            self.end,
            self.segment_start.elapsed().as_secs_f64(),
            rate,
        )
    }
}

enum RodioNode {
    Destination,
    Gain(f32),
    Source {
        buffer: Arc<AudioBuffer>,
        rate: f32,
        voice: Option<Voice>,
        started: bool,
    },
    Filter(FilterKind),
}

/// Buffer position after playing `elapsed` seconds at `rate` from `position`
fn playback_position(position: f64, end: f64, elapsed: f64, rate: f32) -> f64 {
    (position + elapsed * rate as f64).min(end)
}

/// Skip and take durations playing `duration` seconds from `offset` of a
/// buffer `length` seconds long, kept inside the buffer
fn clip_window(length: f64, offset: f64, duration: f64) -> (Duration, Duration) {
    let length = if length.is_finite() { length.max(0.0) } else { 0.0 };
    let offset = if offset.is_nan() { 0.0 } else { offset.clamp(0.0, length) };
    let duration = if duration.is_nan() {
        0.0
    } else {
        duration.clamp(0.0, length - offset)
    };

    (Duration::from_secs_f64(offset), Duration::from_secs_f64(duration))
}

/// Platform output graph on the default audio device
pub struct RodioGraph {
    // Keeps the device open; dropped last
    stream: Option<(OutputStream, OutputStreamHandle)>,
    epoch: Instant,
    next_id: u64,
    destination: NodeId,
    nodes: HashMap<NodeId, RodioNode>,
    outputs: HashMap<NodeId, Vec<NodeId>>,
    ended: Vec<NodeId>,
}

impl RodioGraph {
    /// Open the default output device
    pub fn open_default() -> Result<Self, AudioError> {
        let stream =
            OutputStream::try_default().map_err(|e| AudioError::StreamInitFailed(Box::new(e)))?;

        tracing::info!("Audio output stream opened");
        Ok(Self::with_stream(Some(stream)))
    }

    /// Graph with no output device; sources end as soon as they start
    pub fn detached() -> Self {
        Self::with_stream(None)
    }

    fn with_stream(stream: Option<(OutputStream, OutputStreamHandle)>) -> Self {
        let destination = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(destination, RodioNode::Destination);

        Self {
            stream,
            epoch: Instant::now(),
            next_id: 1,
            destination,
            nodes,
            outputs: HashMap::new(),
            ended: Vec::new(),
        }
    }

    /// Whether an output device is attached
    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    fn insert(&mut self, node: RodioNode) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    /// Filters and combined gain between `source` and the destination.
    /// Returns `None` when the source is not routed to the output.
    fn route(&self, source: NodeId) -> Option<(Vec<FilterKind>, f32)> {
        let mut filters = Vec::new();
        let mut gain = 1.0;
        let mut current = source;

        for _ in 0..MAX_ROUTE_LENGTH {
            let next = *self.outputs.get(&current)?.first()?;
            match self.nodes.get(&next)? {
                RodioNode::Destination => return Some((filters, gain)),
                RodioNode::Gain(value) => gain *= value,
                RodioNode::Filter(kind) => filters.push(*kind),
                RodioNode::Source { .. } => return None,
            }
            current = next;
        }

        None
    }

    /// Re-apply route gains, rebuilding sinks whose filters changed
    fn refresh_routes(&mut self) {
        let mut rebuild = Vec::new();

        for (id, node) in &self.nodes {
            if let RodioNode::Source { voice: Some(voice), .. } = node {
                match self.route(*id) {
                    Some((filters, gain)) if filters != voice.filters => {
                        rebuild.push((*id, filters, gain));
                    }
                    Some((_, gain)) => voice.sink.set_volume(gain),
                    // Partially wired (e.g. mid-rewire): silent until routed again
                    None => voice.sink.set_volume(0.0),
                }
            }
        }

        for (id, filters, gain) in rebuild {
            self.rebuild_voice(id, filters, gain);
        }
    }

    fn rebuild_voice(&mut self, source: NodeId, filters: Vec<FilterKind>, gain: f32) {
        let (buffer, rate, position, end) = match self.nodes.get(&source) {
            Some(RodioNode::Source {
                buffer,
                rate,
                voice: Some(voice),
                ..
            }) => (buffer.clone(), *rate, voice.position(*rate), voice.end),
            _ => return,
        };

        let sink = match self.build_sink(&buffer, rate, position, end - position, &filters) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::error!("Failed to apply filters to {}: {}", source, e);
                return;
            }
        };
        sink.set_volume(gain);
        sink.play();

        tracing::debug!(
            "Rebuilt {} at {:.3}s with {} filter(s)",
            source,
            position,
            filters.len()
        );

        if let Some(RodioNode::Source { voice: Some(voice), .. }) = self.nodes.get_mut(&source) {
            voice.sink.stop();
            voice.sink = sink;
            voice.position = position;
            voice.segment_start = Instant::now();
            voice.filters = filters;
        }
    }

    fn build_sink(
        &self,
        buffer: &AudioBuffer,
        rate: f32,
        offset: f64,
        duration: f64,
        filters: &[FilterKind],
    ) -> Result<Sink, AudioError> {
        let (_, handle) = self
            .stream
            .as_ref()
            .ok_or_else(|| AudioError::PlaybackFailed("no output device attached".into()))?;

        let sink = Sink::try_new(handle).map_err(|e| AudioError::PlaybackFailed(Box::new(e)))?;

        let samples = SamplesBuffer::new(
            buffer.channels(),
            buffer.sample_rate(),
            buffer.samples().to_vec(),
        );
        let (skip, take) = clip_window(buffer.duration(), offset, duration);

        // Each adapter returns a different type, so the chain is boxed
        let mut source: Box<dyn Source<Item = f32> + Send> =
            Box::new(samples.skip_duration(skip).take_duration(take));

        for filter in filters {
            source = match *filter {
                FilterKind::LowPass { hz } => Box::new(source.low_pass(hz)),
                FilterKind::HighPass { hz } => Box::new(source.high_pass(hz)),
            };
        }

        sink.set_speed(rate);
        sink.append(source);
        Ok(sink)
    }
}

impl AudioGraph for RodioGraph {
    fn current_time(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn destination(&self) -> NodeId {
        self.destination
    }

    fn create_gain(&mut self, value: f32) -> NodeId {
        self.insert(RodioNode::Gain(value))
    }

    fn create_source(&mut self, buffer: Arc<AudioBuffer>) -> NodeId {
        self.insert(RodioNode::Source {
            buffer,
            rate: 1.0,
            voice: None,
            started: false,
        })
    }

    fn create_filter(&mut self, kind: FilterKind) -> NodeId {
        self.insert(RodioNode::Filter(kind))
    }

    fn set_playback_rate(&mut self, source: NodeId, value: f32) {
        if let Some(RodioNode::Source { rate, voice, .. }) = self.nodes.get_mut(&source) {
            if let Some(voice) = voice {
                voice.position = voice.position(*rate);
                voice.segment_start = Instant::now();
                voice.sink.set_speed(value);
            }
            *rate = value;
        }
    }

    fn connect(&mut self, from: NodeId, to: NodeId) {
        let outputs = self.outputs.entry(from).or_default();
        if !outputs.contains(&to) {
            outputs.push(to);
        }
        self.refresh_routes();
    }

    fn disconnect(&mut self, node: NodeId) {
        self.outputs.remove(&node);
        self.refresh_routes();
    }

    fn set_gain(&mut self, node: NodeId, value: f32) {
        if let Some(RodioNode::Gain(gain)) = self.nodes.get_mut(&node) {
            *gain = value;
            self.refresh_routes();
        }
    }

    fn gain(&self, node: NodeId) -> Option<f32> {
        match self.nodes.get(&node) {
            Some(RodioNode::Gain(value)) => Some(*value),
            _ => None,
        }
    }

    fn start(&mut self, source: NodeId, offset: f64, duration: f64) {
        let (buffer, rate) = match self.nodes.get(&source) {
            Some(RodioNode::Source {
                buffer,
                rate,
                started: false,
                ..
            }) => (buffer.clone(), *rate),
            _ => return,
        };

        let (filters, volume) = self.route(source).unwrap_or((Vec::new(), 0.0));
        let voice = match self.build_sink(&buffer, rate, offset, duration, &filters) {
            Ok(sink) => {
                sink.set_volume(volume);
                sink.play();

                let (skip, take) = clip_window(buffer.duration(), offset, duration);
                let position = skip.as_secs_f64();
                Some(Voice {
                    sink,
                    position,
                    end: position + take.as_secs_f64(),
                    segment_start: Instant::now(),
                    filters,
                })
            }
            Err(e) => {
                tracing::error!("Failed to start {}: {}", source, e);
                self.ended.push(source);
                None
            }
        };

        if let Some(RodioNode::Source {
            voice: slot,
            started,
            ..
        }) = self.nodes.get_mut(&source)
        {
            *slot = voice;
            *started = true;
        }
    }

    fn stop(&mut self, source: NodeId) {
        if let Some(RodioNode::Source { voice, .. }) = self.nodes.get_mut(&source) {
            if let Some(voice) = voice.take() {
                voice.sink.stop();
                self.ended.push(source);
            }
        }
    }

    fn release(&mut self, node: NodeId) {
        if node == self.destination {
            return;
        }
        if let Some(RodioNode::Source { voice: Some(voice), .. }) = self.nodes.remove(&node) {
            voice.sink.stop();
        }
        self.outputs.remove(&node);
        for outputs in self.outputs.values_mut() {
            outputs.retain(|output| *output != node);
        }
    }

    fn drain_ended(&mut self) -> Vec<NodeId> {
        for (id, node) in self.nodes.iter_mut() {
            if let RodioNode::Source { voice, .. } = node {
                if voice.as_ref().map(|v| v.sink.empty()).unwrap_or(false) {
                    *voice = None;
                    self.ended.push(*id);
                }
            }
        }

        std::mem::take(&mut self.ended)
    }
}
