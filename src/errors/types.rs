//! Error type definitions for the W-phase publisher
//!
//! This module defines the error types used throughout the application.
//! Each pipeline layer has its own enum; `AppError` wraps them so the
//! driver can log any failure uniformly.

use thiserror::Error;

/// Top-level application error type
///
/// Component failures are caught at the driver boundary and converted to
/// log entries; only `Configuration` stops a run before any work is done.
#[derive(Error, Debug)]
pub enum AppError {
    /// Result payload failed normalization
    #[error("Normalization error: {0}")]
    Normalization(#[from] NormalizationError),

    /// Domain graph could not be built
    #[error("Graph build error: {0}")]
    GraphBuild(#[from] GraphBuildError),

    /// A publish sink failed
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Invalid or incomplete option combination
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// External moment tensor computation failed
    #[error("Computation error: {0}")]
    Compute(#[from] ComputeError),

    /// File system errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to coerce a single payload value into its target type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoercionError {
    /// Key absent from its section
    #[error("missing")]
    Missing,

    /// Value present but of the wrong JSON type
    #[error("expected {expected}, found {found}")]
    WrongType {
        expected: &'static str,
        found: String,
    },

    /// Value could not be parsed into the target type
    #[error("cannot parse '{value}' as {expected}")]
    Unparseable {
        expected: &'static str,
        value: String,
    },
}

/// Payload normalization errors
///
/// Any of these aborts normalization; no partial solution is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    /// A required section of the payload is absent
    #[error("Schema error: section '{section}' is missing")]
    Schema { section: String },

    /// A required field is absent
    #[error("Required field '{field}' missing (key '{key}' in section '{section}')")]
    MissingField {
        field: &'static str,
        key: &'static str,
        section: &'static str,
    },

    /// A required field is present but could not be coerced
    #[error("Field '{field}' (key '{key}' in section '{section}'): {source}")]
    Coercion {
        field: &'static str,
        key: &'static str,
        section: &'static str,
        #[source]
        source: CoercionError,
    },
}

/// Domain graph construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphBuildError {
    /// A required entity could not be constructed
    #[error("Cannot build {entity}: {message}")]
    Entity {
        entity: &'static str,
        message: String,
    },

    /// A change was recorded after the change log was sealed
    #[error("Change log is sealed; cannot record {kind}")]
    ChangeLogSealed { kind: &'static str },
}

/// Per-sink publish errors
///
/// Sink errors never propagate past the orchestrator; they are recorded in
/// the publish report.
#[derive(Error, Debug)]
pub enum SinkError {
    /// File system failure while writing or reading sink artifacts
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization of the sink payload failed
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Transport returned an error or could not be reached
    #[error("Transport error: {service} - {message}")]
    Transport { service: String, message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An identifier cannot be used inside an object key
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Sink input is incomplete (e.g. no domain graph to publish)
    #[error("Nothing to publish: {0}")]
    MissingInput(String),
}

/// Configuration errors, detected before any sink runs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// An option required by another option is absent
    #[error("Option '{option}' is required when {required_by}")]
    MissingOption {
        option: &'static str,
        required_by: String,
    },

    /// Mutually exclusive options were both given
    #[error("Options '{first}' and '{second}' are mutually exclusive")]
    Conflict {
        first: &'static str,
        second: &'static str,
    },

    /// An option has an unusable value
    #[error("Invalid value for '{option}': {message}")]
    InvalidValue {
        option: &'static str,
        message: String,
    },

    /// The configuration file could not be read or parsed
    #[error("Cannot load configuration file '{path}': {message}")]
    File { path: String, message: String },
}

/// External computation errors
#[derive(Error, Debug)]
pub enum ComputeError {
    /// The computation process could not be started
    #[error("Failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    /// The computation did not finish within its time budget
    #[error("Computation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The computation exited unsuccessfully
    #[error("Computation exited with status {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// The computation output was not a JSON result document
    #[error("Invalid computation output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

/// Convenience methods for creating common error types
impl SinkError {
    /// Create a transport error
    pub fn transport<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::Transport {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization<M: Into<String>>(message: M) -> Self {
        Self::Serialization(message.into())
    }
}

impl ConfigurationError {
    /// Create a missing option error
    pub fn missing<R: Into<String>>(option: &'static str, required_by: R) -> Self {
        Self::MissingOption {
            option,
            required_by: required_by.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid<M: Into<String>>(option: &'static str, message: M) -> Self {
        Self::InvalidValue {
            option,
            message: message.into(),
        }
    }
}

impl GraphBuildError {
    /// Create an entity construction error
    pub fn entity<M: Into<String>>(entity: &'static str, message: M) -> Self {
        Self::Entity {
            entity,
            message: message.into(),
        }
    }
}
