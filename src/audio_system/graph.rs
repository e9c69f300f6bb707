/// Audio graph abstraction
///
/// The bus only needs a handful of node operations from the platform: a
/// clock, gain nodes, one-shot buffer sources, filters, wiring and an
/// "ended" notification. [`AudioGraph`] captures exactly those. Two
/// implementations ship with the crate: [`OfflineGraph`] (headless, manual
/// clock) and [`RodioGraph`](super::rodio_graph::RodioGraph).
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use rodio::{Decoder, Source};

use crate::error::AudioError;

/// Handle to a node inside an audio graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Biquad filter that can be inserted between a source and its gain stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    LowPass { hz: u32 },
    HighPass { hz: u32 },
}

/// Decoded, interleaved audio shared by every sound using the same path
#[derive(Clone)]
pub struct AudioBuffer {
    channels: u16,
    sample_rate: u32,
    samples: Arc<[f32]>,
}

impl AudioBuffer {
    /// Create a buffer from interleaved samples
    pub fn new(channels: u16, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
            samples: samples.into(),
        }
    }

    /// Decode an encoded file (wav, mp3, flac, vorbis) into an f32 buffer
    pub fn decode(bytes: &[u8]) -> Result<Self, AudioError> {
        let decoder = Decoder::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| AudioError::DecodeFailed(Box::new(e)))?;

        let channels = decoder.channels();
        let sample_rate = decoder.sample_rate();
        let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();

        if samples.is_empty() {
            return Err(AudioError::InvalidFormat(
                "decoded stream contains no samples".to_string(),
            ));
        }

        Ok(Self::new(channels, sample_rate, samples))
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

/// Operations the bus performs on the platform audio graph.
///
/// Sources are one-shot: once started and ended they are released and a new
/// source is created for the next playback.
pub trait AudioGraph {
    /// Monotonic graph clock in seconds
    fn current_time(&self) -> f64;

    /// Final output node
    fn destination(&self) -> NodeId;

    /// Decode raw bytes into a buffer
    fn decode(&mut self, bytes: &[u8]) -> Result<AudioBuffer, AudioError> {
        AudioBuffer::decode(bytes)
    }

    fn create_gain(&mut self, value: f32) -> NodeId;

    fn create_source(&mut self, buffer: Arc<AudioBuffer>) -> NodeId;

    fn create_filter(&mut self, kind: FilterKind) -> NodeId;

    fn set_playback_rate(&mut self, source: NodeId, rate: f32);

    /// Route the output of `from` into `to`
    fn connect(&mut self, from: NodeId, to: NodeId);

    /// Remove every outgoing connection of `node`
    fn disconnect(&mut self, node: NodeId);

    fn set_gain(&mut self, node: NodeId, value: f32);

    fn gain(&self, node: NodeId) -> Option<f32>;

    /// Begin playback `offset` seconds into the buffer for `duration`
    /// seconds of buffer time
    fn start(&mut self, source: NodeId, offset: f64, duration: f64);

    /// Halt a started source. The source is reported through
    /// [`drain_ended`](AudioGraph::drain_ended) like a natural end.
    fn stop(&mut self, source: NodeId);

    /// Forget a node entirely
    fn release(&mut self, node: NodeId);

    /// Sources that finished (naturally or via `stop`) since the last call
    fn drain_ended(&mut self) -> Vec<NodeId>;
}

/// Scheduled playback of a source in an [`OfflineGraph`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playback {
    /// Offset into the buffer in seconds
    pub offset: f64,

    /// Buffer time to play in seconds
    pub duration: f64,

    /// Graph time playback began
    pub started_at: f64,
}

#[derive(Debug)]
enum NodeKind {
    Destination,
    Gain(f32),
    Source {
        buffer: Arc<AudioBuffer>,
        rate: f32,
        playback: Option<Playback>,
        started: bool,
    },
    Filter(FilterKind),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    outputs: Vec<NodeId>,
}

/// Headless graph with a manually advanced clock.
///
/// Nothing is rendered; the graph keeps track of wiring, gains and scheduled
/// playback so the bus can run on machines without an output device.
#[derive(Debug)]
pub struct OfflineGraph {
    clock: f64,
    next_id: u64,
    destination: NodeId,
    nodes: BTreeMap<NodeId, Node>,
    ended: Vec<NodeId>,
}

impl OfflineGraph {
    /// Create a new graph at time zero
    pub fn new() -> Self {
        let destination = NodeId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            destination,
            Node {
                kind: NodeKind::Destination,
                outputs: Vec::new(),
            },
        );

        Self {
            clock: 0.0,
            next_id: 1,
            destination,
            nodes,
            ended: Vec::new(),
        }
    }

    /// Move the clock forward, ending every source whose scheduled playback
    /// has elapsed
    pub fn advance(&mut self, seconds: f64) {
        self.clock += seconds.max(0.0);
        let clock = self.clock;

        for (id, node) in self.nodes.iter_mut() {
            if let NodeKind::Source { rate, playback, .. } = &mut node.kind {
                let finished = match *playback {
                    Some(p) => clock >= p.started_at + p.duration / *rate as f64,
                    None => false,
                };
                if finished {
                    *playback = None;
                    self.ended.push(*id);
                }
            }
        }
    }

    /// Current value of a gain node
    pub fn gain_value(&self, node: NodeId) -> Option<f32> {
        self.gain(node)
    }

    /// Scheduled playback of a source, if it is currently playing
    pub fn playback(&self, source: NodeId) -> Option<Playback> {
        match self.nodes.get(&source).map(|n| &n.kind) {
            Some(NodeKind::Source { playback, .. }) => *playback,
            _ => None,
        }
    }

    pub fn is_source_playing(&self, source: NodeId) -> bool {
        self.playback(source).is_some()
    }

    /// Playback rate of a source
    pub fn playback_rate(&self, source: NodeId) -> Option<f32> {
        match self.nodes.get(&source).map(|n| &n.kind) {
            Some(NodeKind::Source { rate, .. }) => Some(*rate),
            _ => None,
        }
    }

    /// Nodes `node` currently feeds into
    pub fn outputs(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&node)
            .map(|n| n.outputs.clone())
            .unwrap_or_default()
    }

    /// Number of sources currently playing
    pub fn active_sources(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| matches!(n.kind, NodeKind::Source { playback: Some(_), .. }))
            .count()
    }

    /// Number of live nodes, destination included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn insert(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                kind,
                outputs: Vec::new(),
            },
        );
        id
    }
}

impl Default for OfflineGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioGraph for OfflineGraph {
    fn current_time(&self) -> f64 {
        self.clock
    }

    fn destination(&self) -> NodeId {
        self.destination
    }

    fn create_gain(&mut self, value: f32) -> NodeId {
        self.insert(NodeKind::Gain(value))
    }

    fn create_source(&mut self, buffer: Arc<AudioBuffer>) -> NodeId {
        self.insert(NodeKind::Source {
            buffer,
            rate: 1.0,
            playback: None,
            started: false,
        })
    }

    fn create_filter(&mut self, kind: FilterKind) -> NodeId {
        self.insert(NodeKind::Filter(kind))
    }

    fn set_playback_rate(&mut self, source: NodeId, value: f32) {
        if let Some(NodeKind::Source { rate, .. }) = self.nodes.get_mut(&source).map(|n| &mut n.kind) {
            *rate = value.max(f32::EPSILON);
        }
    }

    fn connect(&mut self, from: NodeId, to: NodeId) {
        if !self.nodes.contains_key(&to) {
            return;
        }
        if let Some(node) = self.nodes.get_mut(&from) {
            if !node.outputs.contains(&to) {
                node.outputs.push(to);
            }
        }
    }

    fn disconnect(&mut self, node: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node) {
            node.outputs.clear();
        }
    }

    fn set_gain(&mut self, node: NodeId, value: f32) {
        if let Some(NodeKind::Gain(gain)) = self.nodes.get_mut(&node).map(|n| &mut n.kind) {
            *gain = value;
        }
    }

    fn gain(&self, node: NodeId) -> Option<f32> {
        match self.nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Gain(value)) => Some(*value),
            _ => None,
        }
    }

    fn start(&mut self, source: NodeId, offset: f64, duration: f64) {
        let clock = self.clock;
        if let Some(NodeKind::Source {
            buffer,
            playback,
            started,
            ..
        }) = self.nodes.get_mut(&source).map(|n| &mut n.kind)
        {
            // A source can only be started once
            if *started {
                return;
            }
            *started = true;

            let offset = offset.clamp(0.0, buffer.duration());
            let duration = duration.clamp(0.0, buffer.duration() - offset);
            *playback = Some(Playback {
                offset,
                duration,
                started_at: clock,
            });
        }
    }

    fn stop(&mut self, source: NodeId) {
        if let Some(NodeKind::Source { playback, .. }) = self.nodes.get_mut(&source).map(|n| &mut n.kind) {
            if playback.take().is_some() {
                self.ended.push(source);
            }
        }
    }

    fn release(&mut self, node: NodeId) {
        if node == self.destination {
            return;
        }
        self.nodes.remove(&node);
        for other in self.nodes.values_mut() {
            other.outputs.retain(|output| *output != node);
        }
    }

    fn drain_ended(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.ended)
    }
}
