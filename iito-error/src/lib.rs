//! Unified error handling for iito
//!
//! A single error type shared by the daemon and its library. The variants are
//! grouped by the phase in which they occur: provisioning errors abort startup,
//! sampling errors abort one update cycle, hardware errors abort one output.

use std::io;
use std::path::PathBuf;

/// Result type alias using IitoError
pub type Result<T> = std::result::Result<T, IitoError>;

/// Unified error type for all iito operations
#[derive(thiserror::Error, Debug)]
pub enum IitoError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Provisioning Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("Unknown {kind} type \"{name}\"")]
    UnknownDriver {
        kind: &'static str,
        name: String,
    },

    #[error("No input device matching \"{0}\"")]
    InputNotFound(String),

    #[error("Hardware not found: {0}")]
    HardwareNotFound(String),

    #[error("Invalid target state for {output}: {reason}")]
    InvalidState {
        output: String,
        reason: String,
    },

    // ============================================================================
    // Sampling Errors
    // ============================================================================
    #[error("{input}: unable to sample unknown property \"{property}\"")]
    InvalidProperty {
        input: String,
        property: String,
    },

    // ============================================================================
    // Hardware Errors
    // ============================================================================
    #[error("Device not present: {0}")]
    NotPresent(String),

    // ============================================================================
    // Event Source Errors
    // ============================================================================
    #[error("Unable to watch {target}: {reason}")]
    Watch {
        target: String,
        reason: String,
    },
}

impl IitoError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid target state error
    pub fn invalid_state(output: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            output: output.into(),
            reason: reason.into(),
        }
    }

    /// Create an error for a watch or monitor that could not be set up
    pub fn watch(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Watch {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error can only occur while probing the configuration
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::JsonParse(_)
                | Self::InvalidConfig { .. }
                | Self::MissingConfig(_)
                | Self::UnknownDriver { .. }
                | Self::InputNotFound(_)
                | Self::HardwareNotFound(_)
                | Self::InvalidState { .. }
        )
    }
}

impl From<String> for IitoError {
    fn from(s: String) -> Self {
        Self::Config(s)
    }
}

impl From<&str> for IitoError {
    fn from(s: &str) -> Self {
        Self::Config(s.to_string())
    }
}
