//! Error types for the reading pipeline.
//!
//! Failures are scoped to a single counter: a [`DataError`] or [`ConfigError`]
//! removes that counter from the report while every other counter is still
//! computed. [`MeterError`] wraps both together with the I/O and JSON errors
//! raised while loading exports.

use serde::Serialize;

/// A reading that cannot take part in delta computation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error(
        "counter {counter}: reading #{index} at {timestamp} has no numeric value (raw: {})",
        .raw.as_deref().unwrap_or("<missing>")
    )]
    MissingValue {
        counter: String,
        index: usize,
        timestamp: String,
        raw: Option<String>,
    },
}

/// An invalid virtual counter definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("virtual counter {counter} has no master counter")]
    MissingMaster { counter: String },

    #[error("virtual counter {counter}: master counter {master} does not exist")]
    UnknownMaster { counter: String, master: String },

    #[error("virtual counter {counter}: constituent {constituent} does not exist")]
    UnknownConstituent { counter: String, constituent: String },

    #[error("virtual counter {counter} references itself")]
    SelfReference { counter: String },

    #[error("virtual counter {counter} is part of, or depends on, a reference cycle")]
    Cycle { counter: String },

    #[error("virtual counter {counter}: constituent {constituent} could not be resolved")]
    ConstituentFailed { counter: String, constituent: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, MeterError>;

/// Error category as reported in the failures relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Data,
    Config,
}

/// A counter that was dropped from the report, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterFailure {
    pub counter_uuid: String,
    pub counter_name: String,
    pub kind: FailureKind,
    pub message: String,
}

impl CounterFailure {
    pub fn data(counter_uuid: &str, counter_name: &str, err: &DataError) -> Self {
        Self {
            counter_uuid: counter_uuid.to_string(),
            counter_name: counter_name.to_string(),
            kind: FailureKind::Data,
            message: err.to_string(),
        }
    }

    pub fn config(counter_uuid: &str, counter_name: &str, err: &ConfigError) -> Self {
        Self {
            counter_uuid: counter_uuid.to_string(),
            counter_name: counter_name.to_string(),
            kind: FailureKind::Config,
            message: err.to_string(),
        }
    }
}
