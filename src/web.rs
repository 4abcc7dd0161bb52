//! WASM surface: binds the engine to a JavaScript audio host.
//!
//! The page supplies an object implementing the host capability on top of
//! a real `AudioContext`, handing out numeric node ids:
//!
//! ```js
//! const host = {
//!   contextState() { return ctx.state },          // "running" | "suspended" | "closed"
//!   resume() { ctx.resume() },
//!   makeOscillator(type, hz) { ... return id },
//!   makeGain(value) { ... }, makePanner(value) { ... },
//!   connect(src, dst, param) { ... },             // param: "" | "frequency" | "gain"
//!   connectToDestination(src) { ... },
//!   disconnect(id) { ... }, start(id) { ... }, stop(id) { ... },
//!   setFrequency(id, hz) { ... }, setGain(id, v) { ... }, setPan(id, v) { ... },
//! };
//! const engine = new ToneEngine(host, { lfoSeed: null });
//! ```
//!
//! `ctx.resume()` returns a promise; the page should await it inside the
//! user gesture before calling `togglePlayback`.

use wasm_bindgen::prelude::*;

use crate::error::{BackendError, EngineError};
use crate::graph::backend::{
    AudioBackend, ContextState, GainHandle, Input, NodeId, OscHandle, PanHandle,
};
use crate::graph::engine::{Engine, EngineOptions};
use crate::tone::{ToneId, ToneUpdate, Waveform};

#[wasm_bindgen]
extern "C" {
    /// JavaScript object implementing the audio host capability.
    pub type AudioHost;

    #[wasm_bindgen(method, js_name = contextState)]
    fn context_state(this: &AudioHost) -> String;

    #[wasm_bindgen(method, catch)]
    fn resume(this: &AudioHost) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = makeOscillator)]
    fn make_oscillator(this: &AudioHost, waveform: &str, frequency: f64) -> Result<u32, JsValue>;

    #[wasm_bindgen(method, catch, js_name = makeGain)]
    fn make_gain(this: &AudioHost, value: f64) -> Result<u32, JsValue>;

    #[wasm_bindgen(method, catch, js_name = makePanner)]
    fn make_panner(this: &AudioHost, value: f64) -> Result<u32, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn connect(this: &AudioHost, src: u32, dst: u32, param: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = connectToDestination)]
    fn connect_to_destination(this: &AudioHost, src: u32) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    fn disconnect(this: &AudioHost, id: u32) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    fn start(this: &AudioHost, id: u32) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    fn stop(this: &AudioHost, id: u32) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = setFrequency)]
    fn set_frequency(this: &AudioHost, id: u32, hz: f64) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = setGain)]
    fn set_gain(this: &AudioHost, id: u32, value: f64) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = setPan)]
    fn set_pan(this: &AudioHost, id: u32, value: f64) -> Result<(), JsValue>;
}

fn js_message(e: &JsValue) -> String {
    e.as_string().unwrap_or_else(|| format!("{e:?}"))
}

/// [`AudioBackend`] implemented by calls into an [`AudioHost`].
pub struct JsBackend {
    host: AudioHost,
}

impl JsBackend {
    pub fn new(host: AudioHost) -> Self {
        JsBackend { host }
    }
}

impl AudioBackend for JsBackend {
    fn context_state(&self) -> ContextState {
        match self.host.context_state().as_str() {
            "running" => ContextState::Running,
            "closed" => ContextState::Closed,
            _ => ContextState::Suspended,
        }
    }

    fn resume(&mut self) -> Result<(), BackendError> {
        self.host
            .resume()
            .map_err(|e| BackendError::Resume(js_message(&e)))
    }

    fn make_oscillator(
        &mut self,
        waveform: Waveform,
        frequency: f64,
    ) -> Result<OscHandle, BackendError> {
        self.host
            .make_oscillator(waveform.as_str(), frequency)
            .map(|id| OscHandle(NodeId(id)))
            .map_err(|e| BackendError::NodeCreation(js_message(&e)))
    }

    fn make_gain(&mut self, gain: f64) -> Result<GainHandle, BackendError> {
        self.host
            .make_gain(gain)
            .map(|id| GainHandle(NodeId(id)))
            .map_err(|e| BackendError::NodeCreation(js_message(&e)))
    }

    fn make_panner(&mut self, pan: f64) -> Result<PanHandle, BackendError> {
        self.host
            .make_panner(pan)
            .map(|id| PanHandle(NodeId(id)))
            .map_err(|e| BackendError::NodeCreation(js_message(&e)))
    }

    fn connect(&mut self, src: NodeId, dst: Input) -> Result<(), BackendError> {
        let result = match dst {
            Input::Node(id) => self.host.connect(src.0, id.0, ""),
            Input::Frequency(osc) => self.host.connect(src.0, osc.0.0, "frequency"),
            Input::Gain(gain) => self.host.connect(src.0, gain.0.0, "gain"),
            Input::Destination => self.host.connect_to_destination(src.0),
        };
        result.map_err(|e| BackendError::Connection(js_message(&e)))
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), BackendError> {
        self.host
            .disconnect(node.0)
            .map_err(|e| BackendError::Connection(js_message(&e)))
    }

    fn start(&mut self, osc: OscHandle) -> Result<(), BackendError> {
        self.host
            .start(osc.0.0)
            .map_err(|e| BackendError::Playback(js_message(&e)))
    }

    fn stop(&mut self, osc: OscHandle) -> Result<(), BackendError> {
        self.host
            .stop(osc.0.0)
            .map_err(|e| BackendError::Playback(js_message(&e)))
    }

    fn set_frequency(&mut self, osc: OscHandle, hz: f64) -> Result<(), BackendError> {
        self.host
            .set_frequency(osc.0.0, hz)
            .map_err(|e| BackendError::Parameter(js_message(&e)))
    }

    fn set_gain(&mut self, gain: GainHandle, value: f64) -> Result<(), BackendError> {
        self.host
            .set_gain(gain.0.0, value)
            .map_err(|e| BackendError::Parameter(js_message(&e)))
    }

    fn set_pan(&mut self, pan: PanHandle, value: f64) -> Result<(), BackendError> {
        self.host
            .set_pan(pan.0.0, value)
            .map_err(|e| BackendError::Parameter(js_message(&e)))
    }
}

fn to_js(e: EngineError) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// The live engine, exposed to JavaScript.
#[wasm_bindgen]
pub struct ToneEngine {
    inner: Engine<JsBackend>,
}

#[wasm_bindgen]
impl ToneEngine {
    /// `options` may be `undefined` or `{ lfoSeed?, maxTones? }`.
    #[wasm_bindgen(constructor)]
    pub fn new(host: AudioHost, options: JsValue) -> Result<ToneEngine, JsValue> {
        let options: EngineOptions = if options.is_undefined() || options.is_null() {
            EngineOptions::default()
        } else {
            serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&format!("{e}")))?
        };
        Ok(ToneEngine {
            inner: Engine::with_options(JsBackend::new(host), options),
        })
    }

    /// Current tones as plain objects.
    pub fn tones(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.inner.tones()).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    #[wasm_bindgen(js_name = masterVolume)]
    pub fn master_volume(&self) -> f64 {
        self.inner.master_volume()
    }

    #[wasm_bindgen(js_name = isPlaying)]
    pub fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    #[wasm_bindgen(js_name = addTone)]
    pub fn add_tone(&mut self) -> Result<u32, JsValue> {
        self.inner.add_tone().map(|id| id.0).map_err(to_js)
    }

    #[wasm_bindgen(js_name = removeTone)]
    pub fn remove_tone(&mut self, id: u32) -> Result<bool, JsValue> {
        self.inner.remove_tone(ToneId(id)).map_err(to_js)
    }

    /// Set one property, e.g. `updateTone(id, "chirpSpeed", 3)`.
    #[wasm_bindgen(js_name = updateTone)]
    pub fn update_tone(&mut self, id: u32, property: &str, value: JsValue) -> Result<(), JsValue> {
        let value: serde_json::Value =
            serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&format!("{e}")))?;
        let update = ToneUpdate::from_property(property, &value)
            .ok_or_else(|| JsValue::from_str(&format!("Invalid value for '{property}'")))?;
        self.inner.update_tone(ToneId(id), update).map(|_| ()).map_err(to_js)
    }

    #[wasm_bindgen(js_name = togglePlayback)]
    pub fn toggle_playback(&mut self) -> Result<bool, JsValue> {
        self.inner.toggle_playback().map_err(to_js)
    }

    #[wasm_bindgen(js_name = setMasterVolume)]
    pub fn set_master_volume(&mut self, volume: f64) -> Result<(), JsValue> {
        self.inner.set_master_volume(volume).map_err(to_js)
    }

    #[wasm_bindgen(js_name = loadPreset)]
    pub fn load_preset(&mut self, id: &str) -> Result<(), JsValue> {
        self.inner.load_preset(id).map_err(to_js)
    }

    /// Load from `location.search`. Returns whether a configuration was found.
    #[wasm_bindgen(js_name = loadQuery)]
    pub fn load_query(&mut self, query: &str) -> Result<bool, JsValue> {
        self.inner.load_query(query).map_err(to_js)
    }

    #[wasm_bindgen(js_name = loadToken)]
    pub fn load_token(&mut self, token: &str) -> Result<(), JsValue> {
        self.inner.load_token(token).map_err(to_js)
    }

    pub fn clear(&mut self) -> Result<(), JsValue> {
        self.inner.clear().map_err(to_js)
    }

    #[wasm_bindgen(js_name = shareToken)]
    pub fn share_token(&self) -> String {
        self.inner.share_token()
    }

    #[wasm_bindgen(js_name = shareUrl)]
    pub fn share_url(&self, base_url: &str) -> String {
        self.inner.share_url(base_url)
    }
}
