//! Tone graphs: per-tone node topologies on a host audio backend.
//!
//! Nothing here synthesizes samples. Oscillators, gains and panners are
//! created, wired and scheduled through [`backend::AudioBackend`]; the
//! browser supplies the real nodes and tests use
//! [`recording::RecordingBackend`].

pub mod backend;
pub mod builder;
pub mod engine;
pub mod recording;

pub use backend::AudioBackend;
pub use builder::ToneGraph;
pub use engine::{Engine, EngineOptions, Reconciliation};
