//! Live engine: owns the tone list, the master gain and the running
//! graphs, and decides on every change whether to patch parameters in
//! place or tear everything down and rebuild.
//!
//! Playback state is structural: the engine is playing exactly when it
//! holds a [`LiveGraph`], so the active map can never disagree with the
//! play flag.

use std::collections::{BTreeMap, BTreeSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::codec::{self, SharedConfig};
use crate::error::{BackendError, EngineError};
use crate::preset;
use crate::share;
use crate::tone::{MASTER_VOLUME, ToneDescriptor, ToneId, ToneSettings, ToneUpdate};

use super::backend::{AudioBackend, ContextState, GainHandle, Input};
use super::builder::{self, ToneGraph};

// ── Options ─────────────────────────────────────────────────

/// Engine configuration. Deserializable so a host can pass it as JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineOptions {
    /// Seed for the fluctuation-rate random source. `None` uses OS entropy.
    pub lfo_seed: Option<u64>,
    /// Upper bound on the number of tones.
    pub max_tones: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            lfo_seed: None,
            max_tones: codec::MAX_DECODED_TONES,
        }
    }
}

// ── State ───────────────────────────────────────────────────

/// The declarative part of the engine: what should be playing.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    tones: Vec<ToneDescriptor>,
    master_volume: f64,
}

impl Default for EngineState {
    fn default() -> Self {
        EngineState {
            tones: Vec::new(),
            master_volume: MASTER_VOLUME.default,
        }
    }
}

impl EngineState {
    /// Tones in insertion order.
    pub fn tones(&self) -> &[ToneDescriptor] {
        &self.tones
    }

    pub fn master_volume(&self) -> f64 {
        self.master_volume
    }

    pub fn tone(&self, id: ToneId) -> Option<&ToneDescriptor> {
        self.tones.iter().find(|t| t.id() == id)
    }

    pub fn push(&mut self, tone: ToneDescriptor) {
        self.tones.push(tone);
    }

    pub fn remove(&mut self, id: ToneId) -> Option<ToneDescriptor> {
        let idx = self.tones.iter().position(|t| t.id() == id)?;
        Some(self.tones.remove(idx))
    }

    pub fn update(&mut self, id: ToneId, update: ToneUpdate) -> Result<(), EngineError> {
        let tone = self
            .tones
            .iter_mut()
            .find(|t| t.id() == id)
            .ok_or(EngineError::UnknownTone(id))?;
        tone.apply(update);
        Ok(())
    }

    pub fn set_master_volume(&mut self, volume: f64) -> f64 {
        self.master_volume = MASTER_VOLUME.clamp(volume);
        self.master_volume
    }

    pub fn replace(&mut self, tones: Vec<ToneDescriptor>, master_volume: f64) {
        self.tones = tones;
        self.set_master_volume(master_volume);
    }
}

/// The running side: master gain plus one graph per playing tone.
#[derive(Debug)]
struct LiveGraph {
    master: GainHandle,
    graphs: BTreeMap<ToneId, ToneGraph>,
}

/// What a reconcile pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Not playing; nothing to touch.
    Idle,
    /// Parameters pushed onto this many existing graphs.
    Patched(usize),
    /// Every graph torn down and this many rebuilt.
    Rebuilt(usize),
}

// ── Engine ──────────────────────────────────────────────────

pub struct Engine<B: AudioBackend> {
    backend: B,
    state: EngineState,
    live: Option<LiveGraph>,
    rng: StdRng,
    options: EngineOptions,
}

impl<B: AudioBackend> Engine<B> {
    pub fn new(backend: B) -> Self {
        Engine::with_options(backend, EngineOptions::default())
    }

    pub fn with_options(backend: B, options: EngineOptions) -> Self {
        let rng = match options.lfo_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Engine {
            backend,
            state: EngineState::default(),
            live: None,
            rng,
            options,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn tones(&self) -> &[ToneDescriptor] {
        self.state.tones()
    }

    pub fn master_volume(&self) -> f64 {
        self.state.master_volume()
    }

    pub fn is_playing(&self) -> bool {
        self.live.is_some()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Ids with a live graph, in id order. Empty when stopped.
    pub fn active_ids(&self) -> Vec<ToneId> {
        self.live
            .as_ref()
            .map(|l| l.graphs.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn active_graph(&self, id: ToneId) -> Option<&ToneGraph> {
        self.live.as_ref()?.graphs.get(&id)
    }

    pub fn master_gain(&self) -> Option<GainHandle> {
        self.live.as_ref().map(|l| l.master)
    }

    // ── Tone list ──

    /// Add a tone with default settings.
    pub fn add_tone(&mut self) -> Result<ToneId, EngineError> {
        self.add_tone_with(ToneSettings::default())
    }

    /// Add a tone. While playing it starts sounding right away.
    ///
    /// If the tone cannot be brought up, it is not kept: the list is as
    /// before and playback has ended.
    pub fn add_tone_with(&mut self, settings: ToneSettings) -> Result<ToneId, EngineError> {
        if self.state.tones.len() >= self.options.max_tones {
            return Err(EngineError::TooManyTones {
                limit: self.options.max_tones,
            });
        }
        let tone = ToneDescriptor::new(settings);
        let id = tone.id();
        self.state.push(tone);
        if let Err(e) = self.reconcile() {
            self.state.remove(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Remove a tone, stopping its graph if it has one.
    ///
    /// Returns whether the id was in the list. Unknown ids are not an error.
    pub fn remove_tone(&mut self, id: ToneId) -> Result<bool, EngineError> {
        let removed = self.state.remove(id).is_some();
        if let Some(live) = self.live.as_mut() {
            if let Some(mut graph) = live.graphs.remove(&id) {
                graph.teardown(&mut self.backend)?;
            }
        }
        Ok(removed)
    }

    /// Edit one property of one tone, then reconcile.
    pub fn update_tone(
        &mut self,
        id: ToneId,
        update: ToneUpdate,
    ) -> Result<Reconciliation, EngineError> {
        self.state.update(id, update)?;
        self.reconcile()
    }

    /// Replace the whole tone list (same ids = same tones) and reconcile.
    ///
    /// Each id may appear once; a rejected list leaves the engine untouched.
    pub fn replace_tones(
        &mut self,
        tones: Vec<ToneDescriptor>,
    ) -> Result<Reconciliation, EngineError> {
        if tones.len() > self.options.max_tones {
            return Err(EngineError::TooManyTones {
                limit: self.options.max_tones,
            });
        }
        check_unique(&tones)?;
        self.state.tones = tones;
        self.reconcile()
    }

    pub fn set_master_volume(&mut self, volume: f64) -> Result<(), EngineError> {
        let volume = self.state.set_master_volume(volume);
        if let Some(live) = &self.live {
            self.backend.set_gain(live.master, volume)?;
        }
        Ok(())
    }

    // ── Playback ──

    /// Start if stopped, stop if playing. Returns the new play state.
    pub fn toggle_playback(&mut self) -> Result<bool, EngineError> {
        if self.is_playing() {
            self.stop()?;
        } else {
            self.start()?;
        }
        Ok(self.is_playing())
    }

    /// Build one graph per tone behind a fresh master gain.
    ///
    /// On failure nothing stays connected and the engine stays stopped.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.live.is_some() {
            return Ok(());
        }
        if self.backend.context_state() != ContextState::Running {
            debug!("resuming audio context");
            self.backend.resume()?;
        }

        let master = self.backend.make_gain(self.state.master_volume)?;
        let mut live = LiveGraph {
            master,
            graphs: BTreeMap::new(),
        };
        let built = self
            .backend
            .connect(master.into(), Input::Destination)
            .and_then(|()| self.populate(&mut live));

        match built {
            Ok(()) => {
                info!(
                    "playback started with {} tones at master volume {}",
                    live.graphs.len(),
                    self.state.master_volume
                );
                self.live = Some(live);
                Ok(())
            }
            Err(e) => {
                warn!("playback could not start: {e}");
                if let Err(cleanup) = dismantle(&mut self.backend, live) {
                    warn!("cleanup after failed start: {cleanup}");
                }
                Err(e.into())
            }
        }
    }

    /// Tear down every graph and the master gain.
    ///
    /// The engine is stopped afterwards even if a primitive failed; the
    /// first failure is still reported.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        let Some(live) = self.live.take() else {
            return Ok(());
        };
        let result = dismantle(&mut self.backend, live);
        info!("playback stopped");
        result.map_err(EngineError::from)
    }

    /// Bring the live graphs in line with the tone list.
    ///
    /// A changed waveform or tone type on any tone, or a tone without a
    /// graph, rebuilds every graph. Otherwise parameters are patched in
    /// place. Graphs whose tone left the list are torn down.
    pub fn reconcile(&mut self) -> Result<Reconciliation, EngineError> {
        let Some(live) = self.live.as_mut() else {
            return Ok(Reconciliation::Idle);
        };

        let stale: Vec<ToneId> = live
            .graphs
            .keys()
            .filter(|id| self.state.tone(**id).is_none())
            .copied()
            .collect();
        let mut teardown_failure: Option<BackendError> = None;
        for id in stale {
            if let Some(mut graph) = live.graphs.remove(&id) {
                if let Err(e) = graph.teardown(&mut self.backend) {
                    teardown_failure.get_or_insert(e);
                }
            }
        }

        let rebuild = self.state.tones.iter().any(|tone| {
            live.graphs
                .get(&tone.id())
                .is_none_or(|g| g.needs_rebuild(tone.settings()))
        });

        let outcome = if rebuild {
            self.rebuild()?
        } else {
            for tone in &self.state.tones {
                if let Some(graph) = live.graphs.get(&tone.id()) {
                    graph.patch(&mut self.backend, tone.settings())?;
                }
            }
            debug!("patched {} live tones", live.graphs.len());
            Reconciliation::Patched(live.graphs.len())
        };

        match teardown_failure {
            Some(e) => Err(e.into()),
            None => Ok(outcome),
        }
    }

    /// Tear down all graphs and build them again behind the same master.
    ///
    /// If any build fails, everything built in this pass is torn down and
    /// playback ends, so old and new graphs never coexist.
    fn rebuild(&mut self) -> Result<Reconciliation, EngineError> {
        let Some(mut live) = self.live.take() else {
            return Ok(Reconciliation::Idle);
        };
        debug!("structural rebuild of {} tones", self.state.tones.len());

        for (id, mut graph) in std::mem::take(&mut live.graphs) {
            if let Err(e) = graph.teardown(&mut self.backend) {
                warn!("rebuild: tearing down tone {id} failed: {e}");
            }
        }

        match self.populate(&mut live) {
            Ok(()) => {
                let count = live.graphs.len();
                self.live = Some(live);
                Ok(Reconciliation::Rebuilt(count))
            }
            Err(e) => {
                warn!("rebuild failed, stopping playback: {e}");
                if let Err(cleanup) = dismantle(&mut self.backend, live) {
                    warn!("cleanup after failed rebuild: {cleanup}");
                }
                Err(e.into())
            }
        }
    }

    fn populate(&mut self, live: &mut LiveGraph) -> Result<(), BackendError> {
        for tone in &self.state.tones {
            debug_assert!(
                !live.graphs.contains_key(&tone.id()),
                "tone {} already has a live graph",
                tone.id()
            );
            let graph = builder::build(&mut self.backend, tone, live.master, &mut self.rng)?;
            live.graphs.insert(tone.id(), graph);
        }
        Ok(())
    }

    // ── Configurations ──

    /// Replace tones and master volume, stopping playback first.
    pub fn load(&mut self, config: SharedConfig) -> Result<(), EngineError> {
        check_unique(&config.tones)?;
        let stopped = self.stop();
        let SharedConfig {
            master_volume,
            mut tones,
        } = config;
        if tones.len() > self.options.max_tones {
            warn!(
                "configuration has {} tones, keeping the first {}",
                tones.len(),
                self.options.max_tones
            );
            tones.truncate(self.options.max_tones);
        }
        info!("loaded {} tones at master volume {master_volume}", tones.len());
        self.state.replace(tones, master_volume);
        stopped
    }

    pub fn load_preset(&mut self, id: &str) -> Result<(), EngineError> {
        let preset = preset::find(id).ok_or_else(|| EngineError::UnknownPreset(id.to_string()))?;
        self.load(preset.to_config())
    }

    /// Load a shared token. An unreadable token leaves the engine untouched.
    pub fn load_token(&mut self, token: &str) -> Result<(), EngineError> {
        let config = codec::decode(token).inspect_err(|e| {
            warn!("ignoring unreadable configuration token: {e}");
        })?;
        self.load(config)
    }

    /// Load whatever configuration a page query string carries.
    ///
    /// Returns `Ok(false)` when the query has none, leaving defaults.
    pub fn load_query(&mut self, query: &str) -> Result<bool, EngineError> {
        match share::config_from_query(query) {
            None => Ok(false),
            Some(Ok(config)) => {
                self.load(config)?;
                Ok(true)
            }
            Some(Err(e)) => {
                warn!("ignoring unreadable configuration in URL: {e}");
                Err(e.into())
            }
        }
    }

    /// Stop, drop every tone and reset master volume.
    pub fn clear(&mut self) -> Result<(), EngineError> {
        self.load(SharedConfig::default())
    }

    /// Encode the current tones and master volume.
    pub fn share_token(&self) -> String {
        codec::encode(self.state.tones(), self.state.master_volume())
    }

    /// `base_url` with its `config` parameter set to the current token.
    pub fn share_url(&self, base_url: &str) -> String {
        share::share_url(base_url, &self.share_token())
    }
}

impl<B: AudioBackend> Drop for Engine<B> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("stopping playback on drop: {e}");
        }
    }
}

fn check_unique(tones: &[ToneDescriptor]) -> Result<(), EngineError> {
    let mut seen = BTreeSet::new();
    match tones.iter().map(ToneDescriptor::id).find(|id| !seen.insert(*id)) {
        Some(id) => Err(EngineError::DuplicateTone(id)),
        None => Ok(()),
    }
}

/// Tear down every graph and the master gain, reporting the first failure.
fn dismantle<B: AudioBackend + ?Sized>(backend: &mut B, live: LiveGraph) -> Result<(), BackendError> {
    let mut first: Option<BackendError> = None;
    for (_, mut graph) in live.graphs {
        if let Err(e) = graph.teardown(backend) {
            first.get_or_insert(e);
        }
    }
    if let Err(e) = backend.disconnect(live.master.into()) {
        warn!("disconnecting master gain failed: {e}");
        first.get_or_insert(e);
    }
    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::graph::recording::{Call, NodeKind, RecordingBackend};
    use crate::tone::{ToneType, Waveform};

    fn engine() -> Engine<RecordingBackend> {
        Engine::with_options(
            RecordingBackend::new(),
            EngineOptions {
                lfo_seed: Some(42),
                ..EngineOptions::default()
            },
        )
    }

    fn chirp() -> ToneSettings {
        ToneSettings {
            frequency: 4000.0,
            tone_type: ToneType::Chirp,
            ..ToneSettings::default()
        }
    }

    /// Every started oscillator stopped exactly once, nothing left connected.
    fn assert_silent(b: &RecordingBackend) {
        for (i, node) in b.nodes().iter().enumerate() {
            if let NodeKind::Oscillator(_) = node.kind {
                assert!(node.stops <= 1, "node {i} stopped {} times", node.stops);
                assert_eq!(node.starts, node.stops, "node {i} start/stop mismatch");
            }
        }
        assert_eq!(b.running_oscillators(), 0, "oscillators still running");
        assert_eq!(b.connected_nodes(), 0, "nodes still connected");
    }

    #[test]
    fn initial_state() {
        let e = engine();
        assert!(e.tones().is_empty());
        assert_eq!(e.master_volume(), 0.3);
        assert!(!e.is_playing());
        assert!(e.active_ids().is_empty());
    }

    #[test]
    fn start_builds_one_graph_per_tone() {
        let mut e = engine();
        e.add_tone().unwrap();
        e.add_tone_with(chirp()).unwrap();
        e.add_tone().unwrap();

        assert!(e.toggle_playback().unwrap());
        assert_eq!(e.active_ids().len(), 3);
        // Two static carriers plus a chirp carrier with two modulators.
        assert_eq!(e.backend().running_oscillators(), 5);

        let master = e.master_gain().unwrap();
        assert_eq!(e.backend().node(master.0).unwrap().value, 0.3);
        assert_eq!(
            e.backend().node(master.0).unwrap().outputs,
            vec![Input::Destination]
        );
    }

    #[test]
    fn stop_silences_everything_once() {
        let mut e = engine();
        e.add_tone().unwrap();
        e.add_tone_with(chirp()).unwrap();
        e.start().unwrap();

        assert!(!e.toggle_playback().unwrap());
        assert!(e.active_ids().is_empty());
        assert!(e.master_gain().is_none());
        assert_silent(e.backend());

        // Stopping again is a no-op.
        e.stop().unwrap();
        assert_silent(e.backend());
    }

    #[test]
    fn volume_change_is_a_live_patch() {
        let mut e = engine();
        let a = e.add_tone().unwrap();
        e.add_tone().unwrap();
        e.start().unwrap();
        let gain = e.active_graph(a).unwrap().gain();
        e.backend_mut().clear_calls();

        let outcome = e.update_tone(a, ToneUpdate::Volume(0.9)).unwrap();

        assert_eq!(outcome, Reconciliation::Patched(2));
        let b = e.backend();
        assert_eq!(b.count_calls(|c| matches!(c, Call::MakeOscillator(..))), 0);
        assert_eq!(b.count_calls(|c| matches!(c, Call::MakeGain(..))), 0);
        assert_eq!(b.count_calls(|c| matches!(c, Call::Stop(_) | Call::Start(_))), 0);
        assert!(b.calls().contains(&Call::SetGain(gain.0, 0.9)));
        assert_eq!(b.node(gain.0).unwrap().value, 0.9);
    }

    #[test]
    fn chirp_parameters_are_patched() {
        let mut e = engine();
        let id = e.add_tone_with(chirp()).unwrap();
        e.start().unwrap();

        e.update_tone(id, ToneUpdate::ChirpSpeed(7.5)).unwrap();
        e.update_tone(id, ToneUpdate::ChirpRange(1200.0)).unwrap();
        e.update_tone(id, ToneUpdate::FluctuationIntensity(1.0)).unwrap();

        let graph = e.active_graph(id).unwrap();
        let c = graph.chirp().unwrap();
        let b = e.backend();
        assert_eq!(b.node(c.rate_osc.0).unwrap().value, 7.5);
        assert_eq!(b.node(c.rate_depth.0).unwrap().value, 1200.0);
        assert_eq!(b.node(c.lfo_depth.0).unwrap().value, 0.5);
    }

    #[test]
    fn waveform_change_rebuilds_every_tone() {
        let mut e = engine();
        let a = e.add_tone().unwrap();
        let b = e.add_tone().unwrap();
        e.start().unwrap();
        let old_a = e.active_graph(a).unwrap().carrier();
        let old_b = e.active_graph(b).unwrap().carrier();

        let outcome = e.update_tone(a, ToneUpdate::Waveform(Waveform::Sawtooth)).unwrap();

        assert_eq!(outcome, Reconciliation::Rebuilt(2));
        assert!(e.is_playing());
        let backend = e.backend();
        assert_eq!(backend.node(old_a.0).unwrap().stops, 1);
        assert_eq!(backend.node(old_b.0).unwrap().stops, 1, "unchanged tone is rebuilt too");
        assert_eq!(backend.oscillators_created(), 4);
        assert_eq!(backend.running_oscillators(), 2);

        let new_a = e.active_graph(a).unwrap().carrier();
        assert_ne!(new_a, old_a);
        assert_ne!(e.active_graph(b).unwrap().carrier(), old_b);
        assert_eq!(
            backend.node(new_a.0).unwrap().kind,
            NodeKind::Oscillator(Waveform::Sawtooth)
        );
    }

    #[test]
    fn tone_type_change_rebuilds() {
        let mut e = engine();
        let a = e.add_tone().unwrap();
        e.start().unwrap();
        let outcome = e.update_tone(a, ToneUpdate::ToneType(ToneType::Chirp)).unwrap();
        assert_eq!(outcome, Reconciliation::Rebuilt(1));
        assert!(e.active_graph(a).unwrap().chirp().is_some());
        assert_eq!(e.backend().running_oscillators(), 3);
    }

    #[test]
    fn rebuild_keeps_master_gain() {
        let mut e = engine();
        let a = e.add_tone().unwrap();
        e.start().unwrap();
        let master = e.master_gain();
        e.update_tone(a, ToneUpdate::Waveform(Waveform::Square)).unwrap();
        assert_eq!(e.master_gain(), master);
    }

    #[test]
    fn added_tone_sounds_immediately_while_playing() {
        let mut e = engine();
        e.add_tone().unwrap();
        e.start().unwrap();

        let id = e.add_tone_with(chirp()).unwrap();

        assert!(e.active_graph(id).is_some());
        assert_eq!(e.active_ids().len(), 2);
        assert_eq!(e.backend().running_oscillators(), 4);
    }

    #[test]
    fn adding_while_stopped_builds_nothing() {
        let mut e = engine();
        e.add_tone().unwrap();
        assert_eq!(e.backend().nodes().len(), 0);
        assert_eq!(e.reconcile().unwrap(), Reconciliation::Idle);
    }

    #[test]
    fn remove_idle_tone() {
        let mut e = engine();
        let id = e.add_tone().unwrap();
        assert!(e.remove_tone(id).unwrap());
        assert!(e.tones().is_empty());
        assert!(!e.remove_tone(id).unwrap(), "second remove is a no-op");
    }

    #[test]
    fn remove_playing_tone_stops_only_it() {
        let mut e = engine();
        let a = e.add_tone_with(chirp()).unwrap();
        let b = e.add_tone().unwrap();
        e.start().unwrap();
        let nodes = e.active_graph(a).unwrap().nodes();

        assert!(e.remove_tone(a).unwrap());

        assert_eq!(e.active_ids(), vec![b]);
        assert_eq!(e.tones().len(), 1);
        for id in nodes {
            let node = e.backend().node(id).unwrap();
            assert_eq!(node.disconnects, 1);
            assert!(!node.is_running());
        }
        assert_eq!(e.backend().running_oscillators(), 1);
    }

    #[test]
    fn replace_tones_drops_stale_graphs() {
        let mut e = engine();
        e.add_tone().unwrap();
        let keep = e.add_tone().unwrap();
        e.start().unwrap();

        let remaining: Vec<_> = e.tones().iter().filter(|t| t.id() == keep).cloned().collect();
        let outcome = e.replace_tones(remaining).unwrap();

        assert_eq!(outcome, Reconciliation::Patched(1));
        assert_eq!(e.active_ids(), vec![keep]);
        assert_eq!(e.backend().running_oscillators(), 1);
    }

    #[test]
    fn master_volume_reaches_live_gain() {
        let mut e = engine();
        e.add_tone().unwrap();
        e.set_master_volume(0.8).unwrap();
        e.start().unwrap();
        let master = e.master_gain().unwrap();
        assert_eq!(e.backend().node(master.0).unwrap().value, 0.8);

        e.set_master_volume(4.0).unwrap();
        assert_eq!(e.master_volume(), 1.0);
        assert_eq!(e.backend().node(master.0).unwrap().value, 1.0);
    }

    #[test]
    fn suspended_context_is_resumed_first() {
        let mut e = Engine::with_options(
            RecordingBackend::suspended(),
            EngineOptions {
                lfo_seed: Some(1),
                ..EngineOptions::default()
            },
        );
        e.add_tone().unwrap();
        e.start().unwrap();
        assert_eq!(e.backend().calls()[0], Call::Resume);
        assert_eq!(e.backend().context_state(), ContextState::Running);
    }

    #[test]
    fn closed_context_cannot_start() {
        let mut e = engine();
        e.backend_mut().set_state(ContextState::Closed);
        e.add_tone().unwrap();
        let err = e.start().unwrap_err();
        assert!(matches!(err, EngineError::Backend(BackendError::Resume(_))));
        assert!(!e.is_playing());
        assert!(e.backend().nodes().is_empty());
    }

    #[test]
    fn failed_start_leaves_engine_stopped_and_clean() {
        let mut e = engine();
        e.add_tone().unwrap();
        e.add_tone().unwrap();
        // Master plus the first tone's three nodes succeed.
        e.backend_mut().fail_after(4);

        let err = e.toggle_playback().unwrap_err();

        assert!(matches!(err, EngineError::Backend(BackendError::NodeCreation(_))));
        assert!(!e.is_playing());
        assert!(e.active_ids().is_empty());
        assert_silent(e.backend());

        e.backend_mut().heal();
        assert!(e.toggle_playback().unwrap());
        assert_eq!(e.active_ids().len(), 2);
    }

    #[test]
    fn failed_rebuild_ends_playback() {
        let mut e = engine();
        let a = e.add_tone().unwrap();
        e.add_tone_with(chirp()).unwrap();
        e.start().unwrap();
        e.backend_mut().fail_after(1);

        let result = e.update_tone(a, ToneUpdate::Waveform(Waveform::Triangle));

        assert!(result.is_err());
        assert!(!e.is_playing());
        assert!(e.active_ids().is_empty());
        assert_silent(e.backend());
        assert_eq!(e.tones().len(), 2, "descriptors survive a failed rebuild");
    }

    #[test]
    fn duplicate_ids_are_rejected_before_anything_changes() {
        let mut e = engine();
        let id = e.add_tone().unwrap();
        e.start().unwrap();
        let before = e.state().clone();
        let tone = e.tones()[0].clone();

        let err = e.replace_tones(vec![tone.clone(), tone.clone()]).unwrap_err();
        assert_eq!(err, EngineError::DuplicateTone(id));
        assert_eq!(e.state(), &before);
        assert_eq!(e.active_ids(), vec![id]);

        let config = SharedConfig {
            master_volume: 0.5,
            tones: vec![tone.clone(), tone],
        };
        assert_eq!(e.load(config), Err(EngineError::DuplicateTone(id)));
        assert!(e.is_playing(), "rejected load must not stop playback");

        e.stop().unwrap();
        assert_silent(e.backend());
    }

    #[test]
    fn failed_add_while_playing_is_not_kept() {
        let mut e = engine();
        let first = e.add_tone().unwrap();
        e.start().unwrap();
        e.backend_mut().fail_after(0);

        let result = e.add_tone();

        assert!(matches!(
            result,
            Err(EngineError::Backend(BackendError::NodeCreation(_)))
        ));
        assert_eq!(e.tones().len(), 1);
        assert_eq!(e.tones()[0].id(), first);
        assert!(!e.is_playing());
        assert_silent(e.backend());
    }

    #[test]
    fn update_unknown_tone() {
        let mut e = engine();
        let err = e.update_tone(ToneId(u32::MAX), ToneUpdate::Volume(0.1)).unwrap_err();
        assert_eq!(err, EngineError::UnknownTone(ToneId(u32::MAX)));
    }

    #[test]
    fn tone_limit_is_enforced() {
        let mut e = Engine::with_options(
            RecordingBackend::new(),
            EngineOptions {
                lfo_seed: Some(3),
                max_tones: 2,
            },
        );
        e.add_tone().unwrap();
        e.add_tone().unwrap();
        assert_eq!(e.add_tone(), Err(EngineError::TooManyTones { limit: 2 }));
    }

    #[test]
    fn load_preset_stops_playback() {
        let mut e = engine();
        e.add_tone().unwrap();
        e.start().unwrap();

        e.load_preset("cricket-sounds").unwrap();

        assert!(!e.is_playing());
        assert_silent(e.backend());
        assert_eq!(e.tones().len(), 2);
        assert_eq!(e.master_volume(), 0.3);
        assert_eq!(
            e.load_preset("nope"),
            Err(EngineError::UnknownPreset("nope".to_string()))
        );
    }

    #[test]
    fn clear_resets_defaults() {
        let mut e = engine();
        e.load_preset("ocean-waves").unwrap();
        e.start().unwrap();
        e.clear().unwrap();
        assert!(e.tones().is_empty());
        assert_eq!(e.master_volume(), 0.3);
        assert!(!e.is_playing());
        assert_silent(e.backend());
    }

    #[test]
    fn share_token_restores_in_another_engine() {
        let mut a = engine();
        a.load_preset("multi-tone").unwrap();
        a.set_master_volume(0.42).unwrap();

        let mut b = engine();
        b.load_token(&a.share_token()).unwrap();

        assert_eq!(b.master_volume(), 0.42);
        let left: Vec<_> = a.tones().iter().map(|t| *t.settings()).collect();
        let right: Vec<_> = b.tones().iter().map(|t| *t.settings()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn unreadable_token_leaves_state_alone() {
        let mut e = engine();
        e.load_preset("pulsating").unwrap();
        let before = e.state().clone();

        let err = e.load_token("").unwrap_err();

        assert_eq!(err, EngineError::Decode(DecodeError::Empty));
        assert_eq!(e.state(), &before);
    }

    #[test]
    fn query_without_config_keeps_defaults() {
        let mut e = engine();
        assert!(!e.load_query("?utm_source=mail").unwrap());
        assert!(e.tones().is_empty());

        let mut a = engine();
        a.load_preset("electrical-buzz").unwrap();
        let url = a.share_url("https://example.org/app?lang=en");
        let query = url.split_once('?').map(|(_, q)| q).unwrap();
        assert!(e.load_query(query).unwrap());
        assert_eq!(e.tones().len(), 1);
        assert_eq!(e.master_volume(), 0.25);
    }
}
