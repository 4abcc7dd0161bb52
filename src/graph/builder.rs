//! Tone graph builder: turns one descriptor into a running node chain.
//!
//! Static tone:
//! ```text
//! carrier(waveform, f) ─► gain(volume) ─► panner(pan) ─► master
//! ```
//! Chirp tone adds two sine modulators:
//! ```text
//! rate_osc(chirpSpeed) ─► rate_depth(chirpRange) ─► carrier.frequency
//! lfo_osc(random 0.5..2.5) ─► lfo_depth(fluct × volume) ─► gain.gain
//! ```

use rand::Rng;
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::tone::{ToneDescriptor, ToneId, ToneSettings, ToneType, Waveform};

use super::backend::{AudioBackend, GainHandle, Input, NodeId, OscHandle, PanHandle};

/// Lower bound (inclusive) of the fluctuation LFO rate in Hz.
pub const LFO_RATE_MIN: f64 = 0.5;
/// Upper bound (exclusive) of the fluctuation LFO rate in Hz.
pub const LFO_RATE_MAX: f64 = 2.5;

/// The modulator pairs of a chirp tone.
#[derive(Debug, Clone, PartialEq)]
pub struct ChirpNodes {
    pub rate_osc: OscHandle,
    pub rate_depth: GainHandle,
    pub lfo_osc: OscHandle,
    pub lfo_depth: GainHandle,
    /// Fluctuation rate drawn for this build, in Hz.
    pub lfo_rate: f64,
}

/// A live signal graph bound to one tone id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneGraph {
    id: ToneId,
    /// Settings the graph was built from; fixes its topology.
    built: ToneSettings,
    carrier: OscHandle,
    gain: GainHandle,
    panner: PanHandle,
    chirp: Option<ChirpNodes>,
    torn_down: bool,
}

impl ToneGraph {
    pub fn id(&self) -> ToneId {
        self.id
    }

    pub fn carrier(&self) -> OscHandle {
        self.carrier
    }

    pub fn gain(&self) -> GainHandle {
        self.gain
    }

    pub fn panner(&self) -> PanHandle {
        self.panner
    }

    pub fn chirp(&self) -> Option<&ChirpNodes> {
        self.chirp.as_ref()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Whether `settings` can no longer be expressed by patching this graph.
    pub fn needs_rebuild(&self, settings: &ToneSettings) -> bool {
        self.built.topology_differs(settings)
    }

    /// Every node id in this graph, carrier first.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes = vec![self.carrier.into(), self.gain.into(), self.panner.into()];
        if let Some(c) = &self.chirp {
            nodes.extend([
                NodeId::from(c.rate_osc),
                NodeId::from(c.rate_depth),
                NodeId::from(c.lfo_osc),
                NodeId::from(c.lfo_depth),
            ]);
        }
        nodes
    }

    /// Push live parameters onto the existing nodes without touching topology.
    pub fn patch<B: AudioBackend + ?Sized>(
        &self,
        backend: &mut B,
        settings: &ToneSettings,
    ) -> Result<(), BackendError> {
        debug_assert!(!self.torn_down, "patching torn-down graph {}", self.id);
        backend.set_frequency(self.carrier, settings.frequency)?;
        backend.set_gain(self.gain, settings.volume)?;
        backend.set_pan(self.panner, settings.pan)?;

        if settings.tone_type == ToneType::Chirp {
            if let Some(c) = &self.chirp {
                backend.set_frequency(c.rate_osc, settings.chirp_speed)?;
                backend.set_gain(c.rate_depth, settings.chirp_range)?;
                backend.set_gain(c.lfo_depth, settings.fluctuation_depth())?;
            }
        }
        Ok(())
    }

    /// Stop every oscillator and disconnect every node, exactly once.
    ///
    /// All steps run even if one fails; the first failure is returned. A
    /// second call is a no-op.
    pub fn teardown<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), BackendError> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let mut first: Option<BackendError> = None;
        let mut keep = |result: Result<(), BackendError>| {
            if let Err(e) = result {
                warn!("teardown of tone {} hit: {e}", self.id);
                first.get_or_insert(e);
            }
        };

        keep(backend.stop(self.carrier));
        keep(backend.disconnect(self.carrier.into()));
        if let Some(c) = &self.chirp {
            keep(backend.stop(c.rate_osc));
            keep(backend.disconnect(c.rate_osc.into()));
            keep(backend.disconnect(c.rate_depth.into()));
            keep(backend.stop(c.lfo_osc));
            keep(backend.disconnect(c.lfo_osc.into()));
            keep(backend.disconnect(c.lfo_depth.into()));
        }
        keep(backend.disconnect(self.panner.into()));
        keep(backend.disconnect(self.gain.into()));

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Nodes created so far by an in-progress build, for unwinding on failure.
#[derive(Default)]
struct Scratch {
    nodes: Vec<NodeId>,
    started: Vec<OscHandle>,
}

impl Scratch {
    fn osc<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        waveform: Waveform,
        frequency: f64,
    ) -> Result<OscHandle, BackendError> {
        let osc = backend.make_oscillator(waveform, frequency)?;
        self.nodes.push(osc.into());
        Ok(osc)
    }

    fn gain<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        value: f64,
    ) -> Result<GainHandle, BackendError> {
        let gain = backend.make_gain(value)?;
        self.nodes.push(gain.into());
        Ok(gain)
    }

    fn start<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        osc: OscHandle,
    ) -> Result<(), BackendError> {
        backend.start(osc)?;
        self.started.push(osc);
        Ok(())
    }

    /// Stop what was started and disconnect what was created. Secondary
    /// failures are logged, the original error is what the caller sees.
    fn unwind<B: AudioBackend + ?Sized>(self, backend: &mut B) {
        for osc in self.started {
            if let Err(e) = backend.stop(osc) {
                warn!("unwinding partial graph: stop failed: {e}");
            }
        }
        for node in self.nodes {
            if let Err(e) = backend.disconnect(node) {
                warn!("unwinding partial graph: disconnect failed: {e}");
            }
        }
    }
}

/// Build and start a fresh graph for `tone`, feeding `master`.
///
/// Always creates new nodes; the caller must not build an id that still
/// has a live graph. On failure nothing created here stays connected or
/// running.
pub fn build<B, R>(
    backend: &mut B,
    tone: &ToneDescriptor,
    master: GainHandle,
    rng: &mut R,
) -> Result<ToneGraph, BackendError>
where
    B: AudioBackend + ?Sized,
    R: Rng + ?Sized,
{
    let mut scratch = Scratch::default();
    match wire(backend, tone, master, rng, &mut scratch) {
        Ok(graph) => {
            debug!(
                "built {} tone {} ({} Hz, {})",
                graph.built.tone_type,
                graph.id,
                graph.built.frequency,
                graph.built.waveform
            );
            Ok(graph)
        }
        Err(e) => {
            scratch.unwind(backend);
            Err(e)
        }
    }
}

fn wire<B, R>(
    backend: &mut B,
    tone: &ToneDescriptor,
    master: GainHandle,
    rng: &mut R,
    scratch: &mut Scratch,
) -> Result<ToneGraph, BackendError>
where
    B: AudioBackend + ?Sized,
    R: Rng + ?Sized,
{
    let s = tone.settings();

    let carrier = scratch.osc(backend, s.waveform, s.frequency)?;
    let gain = scratch.gain(backend, s.volume)?;
    let panner = backend.make_panner(s.pan)?;
    scratch.nodes.push(panner.into());

    let chirp = match s.tone_type {
        ToneType::Static => None,
        ToneType::Chirp => {
            let lfo_rate = rng.gen_range(LFO_RATE_MIN..LFO_RATE_MAX);
            let rate_osc = scratch.osc(backend, Waveform::Sine, s.chirp_speed)?;
            let rate_depth = scratch.gain(backend, s.chirp_range)?;
            let lfo_osc = scratch.osc(backend, Waveform::Sine, lfo_rate)?;
            let lfo_depth = scratch.gain(backend, s.fluctuation_depth())?;
            Some(ChirpNodes {
                rate_osc,
                rate_depth,
                lfo_osc,
                lfo_depth,
                lfo_rate,
            })
        }
    };

    if let Some(c) = &chirp {
        backend.connect(c.rate_osc.into(), Input::Node(c.rate_depth.into()))?;
        backend.connect(c.rate_depth.into(), Input::Frequency(carrier))?;
        backend.connect(c.lfo_osc.into(), Input::Node(c.lfo_depth.into()))?;
        backend.connect(c.lfo_depth.into(), Input::Gain(gain))?;
    }
    backend.connect(carrier.into(), Input::Node(gain.into()))?;
    backend.connect(gain.into(), Input::Node(panner.into()))?;
    backend.connect(panner.into(), Input::Node(master.into()))?;

    scratch.start(backend, carrier)?;
    if let Some(c) = &chirp {
        scratch.start(backend, c.rate_osc)?;
        scratch.start(backend, c.lfo_osc)?;
    }

    Ok(ToneGraph {
        id: tone.id(),
        built: *s,
        carrier,
        gain,
        panner,
        chirp,
        torn_down: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::recording::{Call, NodeKind, RecordingBackend};
    use crate::tone::ToneSettings;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn chirp_tone() -> ToneDescriptor {
        ToneDescriptor::new(ToneSettings {
            frequency: 4000.0,
            volume: 0.4,
            pan: -0.3,
            tone_type: ToneType::Chirp,
            chirp_range: 800.0,
            chirp_speed: 3.0,
            fluctuation_intensity: 0.6,
            ..ToneSettings::default()
        })
    }

    fn setup() -> (RecordingBackend, GainHandle, StdRng) {
        let mut b = RecordingBackend::new();
        let master = b.make_gain(0.3).unwrap();
        (b, master, StdRng::seed_from_u64(7))
    }

    #[test]
    fn static_tone_chain() {
        let (mut b, master, mut rng) = setup();
        let tone = ToneDescriptor::new(ToneSettings {
            frequency: 8000.0,
            volume: 0.6,
            ..ToneSettings::default()
        });
        let graph = build(&mut b, &tone, master, &mut rng).unwrap();

        assert_eq!(graph.id(), tone.id());
        assert!(graph.chirp().is_none());
        assert_eq!(b.oscillators_created(), 1);
        assert_eq!(b.running_oscillators(), 1);

        let carrier = b.node(graph.carrier().0).unwrap();
        assert_eq!(carrier.kind, NodeKind::Oscillator(Waveform::Sine));
        assert_eq!(carrier.value, 8000.0);
        assert_eq!(carrier.outputs, vec![Input::Node(graph.gain().0)]);
        assert_eq!(b.node(graph.gain().0).unwrap().value, 0.6);
        assert_eq!(
            b.node(graph.panner().0).unwrap().outputs,
            vec![Input::Node(master.0)]
        );
    }

    #[test]
    fn chirp_tone_modulators() {
        let (mut b, master, mut rng) = setup();
        let tone = chirp_tone();
        let graph = build(&mut b, &tone, master, &mut rng).unwrap();
        let c = graph.chirp().expect("chirp graph should have modulators");

        assert_eq!(b.running_oscillators(), 3);
        assert_eq!(graph.nodes().len(), 7);
        assert_eq!(b.node(c.rate_osc.0).unwrap().value, 3.0);
        assert_eq!(b.node(c.rate_depth.0).unwrap().value, 800.0);
        assert!((b.node(c.lfo_depth.0).unwrap().value - 0.24).abs() < 1e-12);
        assert_eq!(
            b.node(c.rate_depth.0).unwrap().outputs,
            vec![Input::Frequency(graph.carrier())]
        );
        assert_eq!(
            b.node(c.lfo_depth.0).unwrap().outputs,
            vec![Input::Gain(graph.gain())]
        );
        assert!(
            c.lfo_rate >= LFO_RATE_MIN && c.lfo_rate < LFO_RATE_MAX,
            "LFO rate out of range: {}",
            c.lfo_rate
        );
        assert_eq!(b.node(c.lfo_osc.0).unwrap().value, c.lfo_rate);
    }

    #[test]
    fn seeded_rng_reproduces_lfo_rate() {
        let tone = chirp_tone();
        let (mut b1, m1, mut r1) = setup();
        let (mut b2, m2, mut r2) = setup();
        let g1 = build(&mut b1, &tone, m1, &mut r1).unwrap();
        let g2 = build(&mut b2, &tone, m2, &mut r2).unwrap();
        assert_eq!(g1.chirp().unwrap().lfo_rate, g2.chirp().unwrap().lfo_rate);
    }

    #[test]
    fn failed_build_leaves_nothing_behind() {
        // A chirp tone creates seven nodes; fail at every position.
        for n in 0..7 {
            let (mut b, master, mut rng) = setup();
            b.fail_after(n);
            let result = build(&mut b, &chirp_tone(), master, &mut rng);
            assert!(result.is_err(), "build should fail after {n} creations");
            assert_eq!(b.running_oscillators(), 0, "running oscillators after failure at {n}");
            assert_eq!(b.connected_nodes(), 0, "connected nodes after failure at {n}");
        }
    }

    #[test]
    fn teardown_stops_and_disconnects_everything_once() {
        let (mut b, master, mut rng) = setup();
        let mut graph = build(&mut b, &chirp_tone(), master, &mut rng).unwrap();
        graph.teardown(&mut b).unwrap();

        for id in graph.nodes() {
            let node = b.node(id).unwrap();
            assert_eq!(node.disconnects, 1, "node {id:?} disconnect count");
            if matches!(node.kind, NodeKind::Oscillator(_)) {
                assert_eq!((node.starts, node.stops), (1, 1), "node {id:?} start/stop");
            }
        }
        assert_eq!(b.connected_nodes(), 0);

        // Second teardown must not issue any primitive call.
        b.clear_calls();
        graph.teardown(&mut b).unwrap();
        assert!(b.calls().is_empty());
        assert!(graph.is_torn_down());
    }

    #[test]
    fn patch_sets_live_values_only() {
        let (mut b, master, mut rng) = setup();
        let tone = chirp_tone();
        let graph = build(&mut b, &tone, master, &mut rng).unwrap();
        b.clear_calls();

        let edited = ToneSettings {
            frequency: 5000.0,
            volume: 0.5,
            chirp_speed: 6.0,
            ..*tone.settings()
        };
        graph.patch(&mut b, &edited).unwrap();

        let c = graph.chirp().unwrap();
        assert_eq!(b.count_calls(|c| matches!(c, Call::MakeOscillator(..))), 0);
        assert_eq!(b.node(graph.carrier().0).unwrap().value, 5000.0);
        assert_eq!(b.node(c.rate_osc.0).unwrap().value, 6.0);
        assert!((b.node(c.lfo_depth.0).unwrap().value - 0.3).abs() < 1e-12);
        assert!(!graph.needs_rebuild(&edited));
        assert!(graph.needs_rebuild(&ToneSettings {
            waveform: Waveform::Square,
            ..edited
        }));
    }
}
