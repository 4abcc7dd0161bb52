//! Preset catalog: named starting configurations.
//!
//! Presets use the same settings shape the engine and codec use. Loading
//! one goes through [`Preset::to_config`], which clamps and assigns fresh
//! ids exactly like decoding a shared token.

use serde::Serialize;

use crate::codec::SharedConfig;
use crate::tone::{MASTER_VOLUME, ToneDescriptor, ToneSettings, ToneType, Waveform};

// ── Catalog Types ───────────────────────────────────────────

/// A built-in preset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    /// Stable identifier (e.g., "cricket-sounds").
    pub id: &'static str,
    /// Human-readable name (e.g., "Cricket-like Chirping").
    pub name: &'static str,
    pub description: &'static str,
    pub master_volume: f64,
    pub tones: &'static [ToneSettings],
}

/// Lightweight listing entry, without tone data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetSummary {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

impl Preset {
    /// Materialize as a configuration with fresh tone ids.
    pub fn to_config(&self) -> SharedConfig {
        SharedConfig {
            master_volume: MASTER_VOLUME.clamp(self.master_volume),
            tones: self.tones.iter().map(|s| ToneDescriptor::new(*s)).collect(),
        }
    }

    pub fn summary(&self) -> PresetSummary {
        PresetSummary {
            id: self.id,
            name: self.name,
            description: self.description,
        }
    }
}

// ── Built-in Presets ────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
const fn tone(
    frequency: f64,
    volume: f64,
    waveform: Waveform,
    tone_type: ToneType,
    chirp_range: f64,
    chirp_speed: f64,
    fluctuation_intensity: f64,
    pan: f64,
) -> ToneSettings {
    ToneSettings {
        frequency,
        volume,
        pan,
        waveform,
        tone_type,
        chirp_range,
        chirp_speed,
        fluctuation_intensity,
    }
}

use ToneType::{Chirp, Static};
use Waveform::{Sawtooth, Sine, Square, Triangle};

static PRESETS: [Preset; 6] = [
    Preset {
        id: "high-pitched-ringing",
        name: "High-Pitched Ringing",
        description: "Classic high-frequency tinnitus sound",
        master_volume: 0.3,
        tones: &[tone(8000.0, 0.6, Sine, Static, 500.0, 2.0, 0.3, 0.0)],
    },
    Preset {
        id: "electrical-buzz",
        name: "Electrical Buzzing",
        description: "Buzzing sound like electrical interference",
        master_volume: 0.25,
        tones: &[tone(6000.0, 0.5, Square, Chirp, 200.0, 5.0, 0.4, 0.0)],
    },
    Preset {
        id: "cricket-sounds",
        name: "Cricket-like Chirping",
        description: "Sounds similar to crickets or insects",
        master_volume: 0.3,
        tones: &[
            tone(4000.0, 0.4, Sine, Chirp, 800.0, 3.0, 0.6, -0.3),
            tone(4500.0, 0.3, Sine, Chirp, 600.0, 2.5, 0.5, 0.3),
        ],
    },
    Preset {
        id: "ocean-waves",
        name: "Ocean Wave Sound",
        description: "Low-frequency rushing sound like ocean waves",
        master_volume: 0.4,
        tones: &[tone(200.0, 0.7, Sawtooth, Chirp, 100.0, 0.3, 0.8, 0.0)],
    },
    Preset {
        id: "multi-tone",
        name: "Multiple Frequencies",
        description: "Complex tinnitus with multiple simultaneous tones",
        master_volume: 0.25,
        tones: &[
            tone(6000.0, 0.4, Sine, Static, 500.0, 2.0, 0.3, -0.5),
            tone(8500.0, 0.3, Sine, Chirp, 300.0, 4.0, 0.4, 0.5),
            tone(12000.0, 0.2, Triangle, Static, 500.0, 2.0, 0.3, 0.0),
        ],
    },
    Preset {
        id: "pulsating",
        name: "Pulsating Tone",
        description: "Rhythmic pulsating tinnitus sound",
        master_volume: 0.3,
        tones: &[tone(5000.0, 0.5, Sine, Chirp, 50.0, 1.0, 0.9, 0.0)],
    },
];

/// All built-in presets, in display order.
pub fn presets() -> &'static [Preset] {
    &PRESETS
}

pub fn find(id: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.id == id)
}

pub fn list() -> Vec<PresetSummary> {
    PRESETS.iter().map(Preset::summary).collect()
}
