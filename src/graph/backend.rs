//! Host audio capability: the boundary between the engine and whatever
//! actually produces sound (a browser `AudioContext`, a test double, ...).
//!
//! Handles are opaque node ids handed out by the backend. The typed
//! wrappers keep oscillator, gain and panner handles from being mixed up
//! at compile time; all of them convert to a plain [`NodeId`] for
//! `disconnect`.

use crate::error::BackendError;
use crate::tone::Waveform;

/// Opaque id of a node created by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OscHandle(pub NodeId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GainHandle(pub NodeId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PanHandle(pub NodeId);

impl From<OscHandle> for NodeId {
    fn from(h: OscHandle) -> NodeId {
        h.0
    }
}

impl From<GainHandle> for NodeId {
    fn from(h: GainHandle) -> NodeId {
        h.0
    }
}

impl From<PanHandle> for NodeId {
    fn from(h: PanHandle) -> NodeId {
        h.0
    }
}

/// Where a connection lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Input {
    /// The audio input of another node.
    Node(NodeId),
    /// An oscillator's frequency control (summed with its base value).
    Frequency(OscHandle),
    /// A gain node's gain control (summed with its base value).
    Gain(GainHandle),
    /// The host's audio output.
    Destination,
}

/// Run state of the host audio context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Suspended,
    Closed,
}

/// Primitive operations the host must provide.
///
/// Every call is synchronous and issued from the single control thread.
/// `resume` is the one gate that may take effect asynchronously on the
/// host; the engine calls it before building any graph.
pub trait AudioBackend {
    fn context_state(&self) -> ContextState;
    fn resume(&mut self) -> Result<(), BackendError>;

    fn make_oscillator(
        &mut self,
        waveform: Waveform,
        frequency: f64,
    ) -> Result<OscHandle, BackendError>;
    fn make_gain(&mut self, gain: f64) -> Result<GainHandle, BackendError>;
    fn make_panner(&mut self, pan: f64) -> Result<PanHandle, BackendError>;

    fn connect(&mut self, src: NodeId, dst: Input) -> Result<(), BackendError>;
    /// Remove every outgoing connection of `node`.
    fn disconnect(&mut self, node: NodeId) -> Result<(), BackendError>;

    /// Begin audio production immediately on the host clock.
    fn start(&mut self, osc: OscHandle) -> Result<(), BackendError>;
    fn stop(&mut self, osc: OscHandle) -> Result<(), BackendError>;

    fn set_frequency(&mut self, osc: OscHandle, hz: f64) -> Result<(), BackendError>;
    fn set_gain(&mut self, gain: GainHandle, value: f64) -> Result<(), BackendError>;
    fn set_pan(&mut self, pan: PanHandle, value: f64) -> Result<(), BackendError>;
}
