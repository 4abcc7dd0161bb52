//! Recording backend: an in-memory audio host that keeps every node it
//! creates and logs every primitive call.
//!
//! It behaves like a strict Web Audio context: starting an oscillator twice
//! or stopping one that is not running is an error, while `disconnect` is
//! idempotent. Node creation can be made to fail on demand to exercise the
//! engine's cleanup paths.

use crate::error::BackendError;
use crate::tone::Waveform;

use super::backend::{
    AudioBackend, ContextState, GainHandle, Input, NodeId, OscHandle, PanHandle,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Oscillator(Waveform),
    Gain,
    Panner,
}

/// One node as the host sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedNode {
    pub kind: NodeKind,
    /// Frequency (oscillator), gain, or pan, depending on `kind`.
    pub value: f64,
    pub starts: u32,
    pub stops: u32,
    pub disconnects: u32,
    /// Current outgoing connections.
    pub outputs: Vec<Input>,
}

impl RecordedNode {
    pub fn is_running(&self) -> bool {
        self.starts > 0 && self.stops == 0
    }
}

/// A primitive call, in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Resume,
    MakeOscillator(NodeId, Waveform, f64),
    MakeGain(NodeId, f64),
    MakePanner(NodeId, f64),
    Connect(NodeId, Input),
    Disconnect(NodeId),
    Start(NodeId),
    Stop(NodeId),
    SetFrequency(NodeId, f64),
    SetGain(NodeId, f64),
    SetPan(NodeId, f64),
}

#[derive(Debug, Clone)]
pub struct RecordingBackend {
    state: ContextState,
    nodes: Vec<RecordedNode>,
    calls: Vec<Call>,
    /// Node creations still allowed before the next one fails.
    creations_left: Option<usize>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        RecordingBackend::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        RecordingBackend {
            state: ContextState::Running,
            nodes: Vec::new(),
            calls: Vec::new(),
            creations_left: None,
        }
    }

    /// A backend whose context starts suspended, like a browser before a
    /// user gesture.
    pub fn suspended() -> Self {
        RecordingBackend {
            state: ContextState::Suspended,
            ..RecordingBackend::new()
        }
    }

    pub fn set_state(&mut self, state: ContextState) {
        self.state = state;
    }

    /// Let `n` more node creations succeed, then fail every later one.
    pub fn fail_after(&mut self, n: usize) {
        self.creations_left = Some(n);
    }

    /// Stop injecting creation failures.
    pub fn heal(&mut self) {
        self.creations_left = None;
    }

    pub fn node(&self, id: NodeId) -> Option<&RecordedNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn nodes(&self) -> &[RecordedNode] {
        &self.nodes
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn oscillators_created(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Oscillator(_)))
            .count()
    }

    pub fn running_oscillators(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_running()).count()
    }

    /// Nodes that still have at least one outgoing connection.
    pub fn connected_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| !n.outputs.is_empty()).count()
    }

    /// Number of calls in the log matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn create(&mut self, kind: NodeKind, value: f64) -> Result<NodeId, BackendError> {
        if let Some(left) = self.creations_left.as_mut() {
            if *left == 0 {
                return Err(BackendError::NodeCreation("device unavailable".to_string()));
            }
            *left -= 1;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(RecordedNode {
            kind,
            value,
            starts: 0,
            stops: 0,
            disconnects: 0,
            outputs: Vec::new(),
        });
        Ok(id)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut RecordedNode, BackendError> {
        self.nodes
            .get_mut(id.0 as usize)
            .ok_or_else(|| BackendError::Host(format!("no such node {}", id.0)))
    }

    fn oscillator_mut(&mut self, osc: OscHandle) -> Result<&mut RecordedNode, BackendError> {
        let node = self.node_mut(osc.0)?;
        match node.kind {
            NodeKind::Oscillator(_) => Ok(node),
            _ => Err(BackendError::Host(format!("node {} is not an oscillator", osc.0 .0))),
        }
    }
}

impl AudioBackend for RecordingBackend {
    fn context_state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> Result<(), BackendError> {
        self.calls.push(Call::Resume);
        match self.state {
            ContextState::Closed => Err(BackendError::Resume("context is closed".to_string())),
            _ => {
                self.state = ContextState::Running;
                Ok(())
            }
        }
    }

    fn make_oscillator(
        &mut self,
        waveform: Waveform,
        frequency: f64,
    ) -> Result<OscHandle, BackendError> {
        let id = self.create(NodeKind::Oscillator(waveform), frequency)?;
        self.calls.push(Call::MakeOscillator(id, waveform, frequency));
        Ok(OscHandle(id))
    }

    fn make_gain(&mut self, gain: f64) -> Result<GainHandle, BackendError> {
        let id = self.create(NodeKind::Gain, gain)?;
        self.calls.push(Call::MakeGain(id, gain));
        Ok(GainHandle(id))
    }

    fn make_panner(&mut self, pan: f64) -> Result<PanHandle, BackendError> {
        let id = self.create(NodeKind::Panner, pan)?;
        self.calls.push(Call::MakePanner(id, pan));
        Ok(PanHandle(id))
    }

    fn connect(&mut self, src: NodeId, dst: Input) -> Result<(), BackendError> {
        let target = match dst {
            Input::Node(id) => Some(id),
            Input::Frequency(osc) => Some(osc.0),
            Input::Gain(gain) => Some(gain.0),
            Input::Destination => None,
        };
        if let Some(id) = target {
            self.node_mut(id)?;
        }
        self.node_mut(src)?.outputs.push(dst);
        self.calls.push(Call::Connect(src, dst));
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), BackendError> {
        let n = self.node_mut(node)?;
        n.outputs.clear();
        n.disconnects += 1;
        self.calls.push(Call::Disconnect(node));
        Ok(())
    }

    fn start(&mut self, osc: OscHandle) -> Result<(), BackendError> {
        let node = self.oscillator_mut(osc)?;
        if node.starts > 0 {
            return Err(BackendError::Playback("oscillator already started".to_string()));
        }
        node.starts += 1;
        self.calls.push(Call::Start(osc.0));
        Ok(())
    }

    fn stop(&mut self, osc: OscHandle) -> Result<(), BackendError> {
        let node = self.oscillator_mut(osc)?;
        if !node.is_running() {
            return Err(BackendError::Playback("oscillator is not running".to_string()));
        }
        node.stops += 1;
        self.calls.push(Call::Stop(osc.0));
        Ok(())
    }

    fn set_frequency(&mut self, osc: OscHandle, hz: f64) -> Result<(), BackendError> {
        self.oscillator_mut(osc)?.value = hz;
        self.calls.push(Call::SetFrequency(osc.0, hz));
        Ok(())
    }

    fn set_gain(&mut self, gain: GainHandle, value: f64) -> Result<(), BackendError> {
        self.node_mut(gain.0)?.value = value;
        self.calls.push(Call::SetGain(gain.0, value));
        Ok(())
    }

    fn set_pan(&mut self, pan: PanHandle, value: f64) -> Result<(), BackendError> {
        self.node_mut(pan.0)?.value = value;
        self.calls.push(Call::SetPan(pan.0, value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_stop_is_an_error() {
        let mut b = RecordingBackend::new();
        let osc = b.make_oscillator(Waveform::Sine, 440.0).unwrap();
        b.start(osc).unwrap();
        b.stop(osc).unwrap();
        assert!(b.stop(osc).is_err(), "Second stop should fault like Web Audio");
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut b = RecordingBackend::new();
        let g = b.make_gain(0.5).unwrap();
        b.connect(g.into(), Input::Destination).unwrap();
        b.disconnect(g.into()).unwrap();
        b.disconnect(g.into()).unwrap();
        assert_eq!(b.connected_nodes(), 0);
        assert_eq!(b.node(g.0).unwrap().disconnects, 2);
    }

    #[test]
    fn fail_after_limits_creations() {
        let mut b = RecordingBackend::new();
        b.fail_after(1);
        assert!(b.make_gain(1.0).is_ok());
        assert!(matches!(b.make_gain(1.0), Err(BackendError::NodeCreation(_))));
        b.heal();
        assert!(b.make_gain(1.0).is_ok());
    }

    #[test]
    fn resume_wakes_suspended_context() {
        let mut b = RecordingBackend::suspended();
        assert_eq!(b.context_state(), ContextState::Suspended);
        b.resume().unwrap();
        assert_eq!(b.context_state(), ContextState::Running);
    }
}
