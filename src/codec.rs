//! Configuration codec: tone sets to and from a URL-safe token.
//!
//! The token is unpadded URL-safe base64 over a compact JSON payload:
//!
//! ```text
//! {"mv":0.3,"t":[{"freq":8000.0,"vol":0.6,"wave":"sine","type":"static",
//!                 "range":500.0,"speed":2.0,"fluct":0.3,"pan":0.0}]}
//! ```
//!
//! Ids are never written; decoding assigns fresh ones. Decoding is
//! tolerant per field: a missing, mistyped or non-finite field takes its
//! default, an out-of-range number is clamped, and only a token that
//! cannot be read at all is an error.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::error::DecodeError;
use crate::tone::{
    CHIRP_RANGE, CHIRP_SPEED, FLUCTUATION, FREQUENCY, MASTER_VOLUME, PAN, ToneDescriptor,
    ToneSettings, ToneType, VOLUME, Waveform,
};

/// Tokens longer than this are rejected before decoding.
pub const MAX_TOKEN_LEN: usize = 16 * 1024;
/// Tones past this count are dropped while decoding.
pub const MAX_DECODED_TONES: usize = 32;

// Payload keys.
const KEY_MASTER: &str = "mv";
const KEY_TONES: &str = "t";
const KEY_FREQUENCY: &str = "freq";
const KEY_VOLUME: &str = "vol";
const KEY_WAVEFORM: &str = "wave";
const KEY_TONE_TYPE: &str = "type";
const KEY_CHIRP_RANGE: &str = "range";
const KEY_CHIRP_SPEED: &str = "speed";
const KEY_FLUCTUATION: &str = "fluct";
const KEY_PAN: &str = "pan";

/// A decoded configuration: master volume plus tones with fresh ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedConfig {
    pub master_volume: f64,
    pub tones: Vec<ToneDescriptor>,
}

impl Default for SharedConfig {
    fn default() -> Self {
        SharedConfig {
            master_volume: MASTER_VOLUME.default,
            tones: Vec::new(),
        }
    }
}

/// Encode tones and master volume into a single URL-safe token.
pub fn encode(tones: &[ToneDescriptor], master_volume: f64) -> String {
    let tones: Vec<Value> = tones.iter().map(|d| tone_to_value(d.settings())).collect();
    let payload = json!({
        KEY_MASTER: MASTER_VOLUME.clamp(master_volume),
        KEY_TONES: tones,
    });
    URL_SAFE_NO_PAD.encode(payload.to_string())
}

fn tone_to_value(s: &ToneSettings) -> Value {
    json!({
        KEY_FREQUENCY: s.frequency,
        KEY_VOLUME: s.volume,
        KEY_WAVEFORM: s.waveform.as_str(),
        KEY_TONE_TYPE: s.tone_type.as_str(),
        KEY_CHIRP_RANGE: s.chirp_range,
        KEY_CHIRP_SPEED: s.chirp_speed,
        KEY_FLUCTUATION: s.fluctuation_intensity,
        KEY_PAN: s.pan,
    })
}

/// Decode a token produced by [`encode`] (or hand-edited, or hostile).
pub fn decode(token: &str) -> Result<SharedConfig, DecodeError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(DecodeError::Empty);
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(DecodeError::TooLong {
            len: token.len(),
            limit: MAX_TOKEN_LEN,
        });
    }

    // Accept padded tokens too; some share targets append '='.
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim_end_matches('='))
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    let payload: Value =
        serde_json::from_slice(&bytes).map_err(|e| DecodeError::Json(e.to_string()))?;
    from_payload(&payload)
}

/// Decode an already-parsed payload object.
pub fn from_payload(payload: &Value) -> Result<SharedConfig, DecodeError> {
    let obj = payload
        .as_object()
        .ok_or(DecodeError::Shape("payload is not an object"))?;

    let master_volume = MASTER_VOLUME.clamp_or_default(number(obj, KEY_MASTER));

    let tones = match obj.get(KEY_TONES) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            if items.len() > MAX_DECODED_TONES {
                warn!(
                    "configuration has {} tones, keeping the first {MAX_DECODED_TONES}",
                    items.len()
                );
            }
            items
                .iter()
                .take(MAX_DECODED_TONES)
                .map(tone_from_value)
                .collect::<Result<Vec<_>, _>>()?
        }
        Some(_) => return Err(DecodeError::Shape("tone list is not an array")),
    };

    Ok(SharedConfig {
        master_volume,
        tones,
    })
}

pub(crate) fn tone_from_value(value: &Value) -> Result<ToneDescriptor, DecodeError> {
    let obj = value
        .as_object()
        .ok_or(DecodeError::Shape("tone entry is not an object"))?;
    Ok(ToneDescriptor::new(settings_from_fields(obj)))
}

/// Build settings field by field; every field falls back independently.
pub(crate) fn settings_from_fields(obj: &Map<String, Value>) -> ToneSettings {
    let waveform = obj
        .get(KEY_WAVEFORM)
        .and_then(Value::as_str)
        .and_then(Waveform::parse)
        .unwrap_or_default();
    let tone_type = obj
        .get(KEY_TONE_TYPE)
        .and_then(Value::as_str)
        .and_then(ToneType::parse)
        .unwrap_or_default();

    ToneSettings {
        frequency: FREQUENCY.clamp_or_default(number(obj, KEY_FREQUENCY)),
        volume: VOLUME.clamp_or_default(number(obj, KEY_VOLUME)),
        pan: PAN.clamp_or_default(number(obj, KEY_PAN)),
        waveform,
        tone_type,
        chirp_range: CHIRP_RANGE.clamp_or_default(number(obj, KEY_CHIRP_RANGE)),
        chirp_speed: CHIRP_SPEED.clamp_or_default(number(obj, KEY_CHIRP_SPEED)),
        fluctuation_intensity: FLUCTUATION.clamp_or_default(number(obj, KEY_FLUCTUATION)),
    }
}

fn number(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key).and_then(Value::as_f64)
}

/// Payload key for a field, shared with the legacy query decoder.
pub(crate) fn legacy_key(suffix: &str) -> Option<&'static str> {
    match suffix {
        "freq" => Some(KEY_FREQUENCY),
        "vol" => Some(KEY_VOLUME),
        "wave" => Some(KEY_WAVEFORM),
        "type" => Some(KEY_TONE_TYPE),
        "range" => Some(KEY_CHIRP_RANGE),
        "speed" => Some(KEY_CHIRP_SPEED),
        "fluct" => Some(KEY_FLUCTUATION),
        "pan" => Some(KEY_PAN),
        _ => None,
    }
}
