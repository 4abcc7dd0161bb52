//! Tone descriptors: the pure-data description of one tone generator.
//!
//! A descriptor never holds live audio handles. Every numeric field is
//! clamped to its [`Domain`] whenever a descriptor is built or edited, so
//! nothing downstream (graph builder, codec) has to re-validate.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

// ── Domains ─────────────────────────────────────────────────

/// Valid range and fallback value for one numeric tone field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Domain {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl Domain {
    /// Clamp a finite value into the domain. Non-finite values take the default.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.default
        }
    }

    /// Clamp an optional value; `None` takes the default.
    pub fn clamp_or_default(&self, value: Option<f64>) -> f64 {
        value.map_or(self.default, |v| self.clamp(v))
    }
}

/// Carrier frequency in Hz.
pub const FREQUENCY: Domain = Domain { min: 20.0, max: 20_000.0, default: 440.0 };
/// Linear tone gain.
pub const VOLUME: Domain = Domain { min: 0.0, max: 1.0, default: 0.5 };
/// Stereo position, negative = left.
pub const PAN: Domain = Domain { min: -1.0, max: 1.0, default: 0.0 };
/// FM deviation in Hz, applied symmetrically around the carrier.
pub const CHIRP_RANGE: Domain = Domain { min: 50.0, max: 2000.0, default: 500.0 };
/// FM rate in Hz.
pub const CHIRP_SPEED: Domain = Domain { min: 0.1, max: 10.0, default: 2.0 };
/// Depth scale of the random-rate amplitude LFO.
pub const FLUCTUATION: Domain = Domain { min: 0.0, max: 1.0, default: 0.3 };
/// Master output gain.
pub const MASTER_VOLUME: Domain = Domain { min: 0.0, max: 1.0, default: 0.3 };

// ── Enumerations ────────────────────────────────────────────

/// Carrier waveform shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
        }
    }

    /// Parse the exact lowercase name. Anything else is `None`.
    pub fn parse(s: &str) -> Option<Waveform> {
        Waveform::ALL.into_iter().find(|w| w.as_str() == s)
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a tone is a plain carrier or a modulated chirp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneType {
    #[default]
    Static,
    Chirp,
}

impl ToneType {
    pub fn as_str(self) -> &'static str {
        match self {
            ToneType::Static => "static",
            ToneType::Chirp => "chirp",
        }
    }

    pub fn parse(s: &str) -> Option<ToneType> {
        match s {
            "static" => Some(ToneType::Static),
            "chirp" => Some(ToneType::Chirp),
            _ => None,
        }
    }
}

impl fmt::Display for ToneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Identity ────────────────────────────────────────────────

static NEXT_TONE_ID: AtomicU32 = AtomicU32::new(1);

/// Session-local tone identifier. Never transmitted in a shared configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToneId(pub u32);

impl ToneId {
    /// Allocate an id that no other descriptor in this process has used.
    pub fn fresh() -> ToneId {
        ToneId(NEXT_TONE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ToneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── Settings / Descriptor ───────────────────────────────────

/// The nine semantic fields of a tone, without identity.
///
/// This is plain data and may hold out-of-domain values (e.g. fresh from
/// deserialization); [`ToneDescriptor::new`] clamps it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneSettings {
    pub frequency: f64,
    pub volume: f64,
    pub pan: f64,
    pub waveform: Waveform,
    pub tone_type: ToneType,
    pub chirp_range: f64,
    pub chirp_speed: f64,
    pub fluctuation_intensity: f64,
}

impl Default for ToneSettings {
    fn default() -> Self {
        ToneSettings {
            frequency: FREQUENCY.default,
            volume: VOLUME.default,
            pan: PAN.default,
            waveform: Waveform::Sine,
            tone_type: ToneType::Static,
            chirp_range: CHIRP_RANGE.default,
            chirp_speed: CHIRP_SPEED.default,
            fluctuation_intensity: FLUCTUATION.default,
        }
    }
}

impl ToneSettings {
    /// Every numeric field clamped into its domain.
    pub fn clamped(self) -> Self {
        ToneSettings {
            frequency: FREQUENCY.clamp(self.frequency),
            volume: VOLUME.clamp(self.volume),
            pan: PAN.clamp(self.pan),
            waveform: self.waveform,
            tone_type: self.tone_type,
            chirp_range: CHIRP_RANGE.clamp(self.chirp_range),
            chirp_speed: CHIRP_SPEED.clamp(self.chirp_speed),
            fluctuation_intensity: FLUCTUATION.clamp(self.fluctuation_intensity),
        }
    }

    /// Depth of the amplitude LFO: fluctuation scaled by the tone's own volume.
    pub fn fluctuation_depth(&self) -> f64 {
        self.fluctuation_intensity * self.volume
    }

    /// True when `other` needs a different graph topology than `self`.
    pub fn topology_differs(&self, other: &ToneSettings) -> bool {
        self.waveform != other.waveform || self.tone_type != other.tone_type
    }
}

/// A tone with a session-local identity. Fields are always within domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToneDescriptor {
    id: ToneId,
    #[serde(flatten)]
    settings: ToneSettings,
}

impl ToneDescriptor {
    /// Build a descriptor with a fresh id, clamping every field.
    pub fn new(settings: ToneSettings) -> Self {
        ToneDescriptor::with_id(ToneId::fresh(), settings)
    }

    pub fn with_id(id: ToneId, settings: ToneSettings) -> Self {
        ToneDescriptor {
            id,
            settings: settings.clamped(),
        }
    }

    pub fn id(&self) -> ToneId {
        self.id
    }

    pub fn settings(&self) -> &ToneSettings {
        &self.settings
    }

    /// Apply a single-property edit, clamping the new value.
    pub fn apply(&mut self, update: ToneUpdate) {
        let s = &mut self.settings;
        match update {
            ToneUpdate::Frequency(v) => s.frequency = FREQUENCY.clamp(v),
            ToneUpdate::Volume(v) => s.volume = VOLUME.clamp(v),
            ToneUpdate::Pan(v) => s.pan = PAN.clamp(v),
            ToneUpdate::Waveform(w) => s.waveform = w,
            ToneUpdate::ToneType(t) => s.tone_type = t,
            ToneUpdate::ChirpRange(v) => s.chirp_range = CHIRP_RANGE.clamp(v),
            ToneUpdate::ChirpSpeed(v) => s.chirp_speed = CHIRP_SPEED.clamp(v),
            ToneUpdate::FluctuationIntensity(v) => {
                s.fluctuation_intensity = FLUCTUATION.clamp(v)
            }
        }
    }
}

// ── Single-property edits ───────────────────────────────────

/// One edited property, as produced by a UI control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToneUpdate {
    Frequency(f64),
    Volume(f64),
    Pan(f64),
    Waveform(Waveform),
    ToneType(ToneType),
    ChirpRange(f64),
    ChirpSpeed(f64),
    FluctuationIntensity(f64),
}

impl ToneUpdate {
    /// Build an update from a camelCase property name and a JSON value.
    ///
    /// Numbers may also arrive as numeric strings (form inputs do that).
    /// Returns `None` for unknown properties or unusable values.
    pub fn from_property(property: &str, value: &serde_json::Value) -> Option<ToneUpdate> {
        let number = || match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        let update = match property {
            "frequency" => ToneUpdate::Frequency(number()?),
            "volume" => ToneUpdate::Volume(number()?),
            "pan" => ToneUpdate::Pan(number()?),
            "waveform" => ToneUpdate::Waveform(Waveform::parse(value.as_str()?)?),
            "toneType" => ToneUpdate::ToneType(ToneType::parse(value.as_str()?)?),
            "chirpRange" => ToneUpdate::ChirpRange(number()?),
            "chirpSpeed" => ToneUpdate::ChirpSpeed(number()?),
            "fluctuationIntensity" => ToneUpdate::FluctuationIntensity(number()?),
            _ => return None,
        };
        Some(update)
    }
}
