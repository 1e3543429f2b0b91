use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failure to acquire a local capture device (microphone or screen).
///
/// This is the closed set of reasons a platform media layer may report.
/// Device errors are fatal to the action that triggered them and are
/// surfaced to the user; they are never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DeviceError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("no capture device available")]
    NoDevice,

    #[error("cancelled by user")]
    UserCancelled,

    #[error("device error: {0}")]
    Unknown(String),
}

#[derive(Debug, thiserror::Error)]
pub enum HuddleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("signaling error: {0}")]
    Signaling(String),

    #[error("{0}")]
    Other(String),
}
