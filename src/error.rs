use crate::tone::ToneId;
use std::fmt;

/// Failure reported by the host audio capability.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    NodeCreation(String),
    Connection(String),
    Playback(String),
    Parameter(String),
    Resume(String),
    Host(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Backend(BackendError),
    UnknownTone(ToneId),
    DuplicateTone(ToneId),
    TooManyTones { limit: usize },
    UnknownPreset(String),
    Decode(DecodeError),
}

/// A configuration token that could not be read at all.
///
/// Field-level problems never produce this; they fall back to defaults.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    Empty,
    TooLong { len: usize, limit: usize },
    Base64(String),
    Json(String),
    Shape(&'static str),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::NodeCreation(msg) => write!(f, "Could not create audio node: {msg}"),
            BackendError::Connection(msg) => write!(f, "Could not connect audio nodes: {msg}"),
            BackendError::Playback(msg) => write!(f, "Oscillator start/stop failed: {msg}"),
            BackendError::Parameter(msg) => write!(f, "Could not set audio parameter: {msg}"),
            BackendError::Resume(msg) => write!(f, "Could not resume audio context: {msg}"),
            BackendError::Host(msg) => write!(f, "Audio host error: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Backend(e) => write!(f, "Playback failed: {e}"),
            EngineError::UnknownTone(id) => write!(f, "No tone with id {id}"),
            EngineError::DuplicateTone(id) => write!(f, "Tone {id} appears more than once"),
            EngineError::TooManyTones { limit } => {
                write!(f, "Too many tones (limit is {limit})")
            }
            EngineError::UnknownPreset(name) => write!(f, "Unknown preset '{name}'"),
            EngineError::Decode(e) => write!(f, "Could not load configuration: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Backend(e) => Some(e),
            EngineError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "Configuration token is empty"),
            DecodeError::TooLong { len, limit } => {
                write!(f, "Configuration token is {len} bytes, limit is {limit}")
            }
            DecodeError::Base64(msg) => write!(f, "Configuration token is not base64: {msg}"),
            DecodeError::Json(msg) => write!(f, "Configuration payload is not JSON: {msg}"),
            DecodeError::Shape(what) => write!(f, "Configuration payload has wrong shape: {what}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<BackendError> for EngineError {
    fn from(e: BackendError) -> Self {
        EngineError::Backend(e)
    }
}

impl From<DecodeError> for EngineError {
    fn from(e: DecodeError) -> Self {
        EngineError::Decode(e)
    }
}
