//! CSM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, CsmError>;

/// Top-level error type for the CSM agent.
#[derive(Debug, Error)]
pub enum CsmError {
    #[error("[CSM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[CSM-1002] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[CSM-1101] cannot initialize logging at {path}: {details}")]
    LogInit { path: PathBuf, details: String },

    #[error("[CSM-2001] another agent instance with pid {pid} is active")]
    AlreadyRunning { pid: u32 },

    #[error("[CSM-2002] cannot detach into background: {details}")]
    DetachFailed { details: String },

    #[error("[CSM-2003] instance marker failure at {path}: {source}")]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[CSM-3001] no alert plugin registered for unit {unit}")]
    PluginNotFound { unit: String },

    #[error("[CSM-3002] alert plugin {unit} failed: {details}")]
    PluginFailed { unit: String, details: String },

    #[error("[CSM-4001] storage failure in {context}: {details}")]
    Storage {
        context: &'static str,
        details: String,
    },

    #[error("[CSM-4002] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[CSM-5001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[CSM-5002] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[CSM-5003] alert relay queue is full")]
    RelaySaturated,

    #[error("[CSM-5900] runtime failure: {details}")]
    Runtime { details: String },
}

impl CsmError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "CSM-1001",
            Self::ConfigParse { .. } => "CSM-1002",
            Self::LogInit { .. } => "CSM-1101",
            Self::AlreadyRunning { .. } => "CSM-2001",
            Self::DetachFailed { .. } => "CSM-2002",
            Self::Marker { .. } => "CSM-2003",
            Self::PluginNotFound { .. } => "CSM-3001",
            Self::PluginFailed { .. } => "CSM-3002",
            Self::Storage { .. } => "CSM-4001",
            Self::Serialization { .. } => "CSM-4002",
            Self::Io { .. } => "CSM-5001",
            Self::ChannelClosed { .. } => "CSM-5002",
            Self::RelaySaturated => "CSM-5003",
            Self::Runtime { .. } => "CSM-5900",
        }
    }

    /// Whether the failure is a benign no-op exit rather than a fault.
    ///
    /// Only the already-running detection qualifies: the caller prints a
    /// notice and exits 0.
    #[must_use]
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for marker-file errors.
    #[must_use]
    pub fn marker(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Marker {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for CsmError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for CsmError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
