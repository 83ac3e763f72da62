use std::path::PathBuf;
use thiserror::Error;

/// Missing or invalid startup configuration. The only fatal class.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not well-formed XML: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },
    #[error("invalid camera schema: {0}")]
    Schema(String),
    #[error("invalid settings file {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("required setting `{0}` is missing")]
    MissingSetting(&'static str),
    #[error("OPC interface enabled for {0}, but no tag-bus client is built into this program")]
    TagBusUnsupported(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("camera {0} is not in the database")]
    NotFound(u32),
    #[error("camera number {0} is already registered")]
    Duplicate(u32),
    #[error("camera record on line {line}: {reason}")]
    InvalidRecord { line: u32, reason: String },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("{operation} request to {endpoint} failed: {source}")]
    Transport {
        operation: String,
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },
    #[error("{operation} failed with HTTP {status}")]
    Http { operation: String, status: u16 },
    #[error("{operation} returned a SOAP fault: {reason}")]
    Fault { operation: String, reason: String },
    #[error("malformed {operation} response: {reason}")]
    Malformed { operation: String, reason: String },
    #[error("camera manufacturer '{0}' not recognized")]
    UnsupportedManufacturer(String),
    #[error("stream index {index} requested but device has {available} profile(s)")]
    ProfileOutOfRange { index: u32, available: usize },
    #[error("device does not expose the {0} service")]
    ServiceMissing(&'static str),
    #[error("invalid stream uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("cannot build WS-Security timestamp: {0}")]
    Timestamp(String),
}

impl ProtocolError {
    pub(crate) fn malformed(operation: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandSyntaxError {
    #[error("empty callup file")]
    Empty,
    #[error("unrecognized command '{0}'")]
    UnrecognizedBatch(String),
    #[error("error with callup string [{segment}]: {reason}")]
    Callup { segment: String, reason: String },
    #[error("error with sequencing string [{segment}]: {reason}")]
    Sequencing { segment: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerResolutionError {
    #[error("tag not found [{0}], callup cannot be performed")]
    MissingCompanion(String),
    #[error("tag [{0}] has no value, callup cannot be performed")]
    EmptyCompanion(String),
    #[error("trigger [{0}] does not end in a viewer number")]
    NoSlotIndex(String),
}

/// Why a camera could not be shown on a slot.
#[derive(Debug, Error)]
pub enum CallupError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("camera {0} failed discovery recently; not retrying yet")]
    DiscoveryBackoff(u32),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum PtzError {
    #[error("PTZ unavailable: {0}")]
    Unavailable(String),
    #[error("invalid preset requested - preset number {requested} ({available} available)")]
    IndexOutOfRange { requested: u32, available: usize },
    #[error("velocity {0} is not a finite number")]
    InvalidVelocity(f32),
    #[error("PTZ worker for {0} has shut down")]
    WorkerClosed(String),
    #[error("PTZ command queue for {0} is full")]
    Busy(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
