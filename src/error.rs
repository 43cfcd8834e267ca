//! Error handling for the reboot-mode crate.
//!
//! Errors carry a structured [`ErrorCode`] for programmatic handling next to
//! a human-readable message. Most errors raised while a reboot is in flight
//! are logged and folded into reports rather than returned, because the
//! reboot must proceed regardless; only setup paths propagate them.
//!
//! # Usage Examples
//!
//! ```no_run
//! use reboot_mode::{Error, Result};
//!
//! fn check_offset(offset: Option<u32>) -> Result<u32> {
//!     offset.ok_or_else(|| Error::config_missing("swreset-system-offset"))
//! }
//! ```

/// Result type alias for reboot-mode operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error code enum for categorizing and identifying errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum ErrorCode {
    // Configuration errors: 1000-1999
    ConfigInvalid = 1000,
    ConfigParse = 1001,
    ConfigMissing = 1002,

    // Register errors: 2000-2999
    RegisterAccessDenied = 2000,
    RegisterWriteFailed = 2001,

    // Storage errors: 3000-3999
    StorageWriteFailed = 3000,
    StorageReadFailed = 3001,
    StorageRecordInvalid = 3002,

    // Observer errors: 4000-4999
    ObserverFailed = 4000,
    ObserverNotFound = 4001,

    // Coordination errors: 5000-5999
    PrepareRebootFailed = 5000,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.as_str(), *self as i32)
    }
}

impl ErrorCode {
    /// Convert error code to string representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::ConfigParse => "CONFIG_PARSE",
            Self::ConfigMissing => "CONFIG_MISSING",

            Self::RegisterAccessDenied => "REGISTER_ACCESS_DENIED",
            Self::RegisterWriteFailed => "REGISTER_WRITE_FAILED",

            Self::StorageWriteFailed => "STORAGE_WRITE_FAILED",
            Self::StorageReadFailed => "STORAGE_READ_FAILED",
            Self::StorageRecordInvalid => "STORAGE_RECORD_INVALID",

            Self::ObserverFailed => "OBSERVER_FAILED",
            Self::ObserverNotFound => "OBSERVER_NOT_FOUND",

            Self::PrepareRebootFailed => "PREPARE_REBOOT_FAILED",

        }
    }
}

/// Error type for all reboot-mode operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error [{code}]: {message}")]
    Config {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
    },

    /// Register write errors on either the privileged or the regmap path
    #[error("Register error [{code}] at {address:#x}: {message}")]
    Register {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Address or offset that was targeted
        address: u64,
        /// Human-readable error message
        message: String,
    },

    /// Long-term storage errors
    #[error("Storage error [{code}] (tag {tag:#010x}, status {status}): {message}")]
    Storage {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Storage tag that was accessed
        tag: u32,
        /// Status reported by the storage backend
        status: i32,
        /// Human-readable error message
        message: String,
    },

    /// Observer callback errors
    #[error("Observer '{name}' error [{code}]: {message}")]
    Observer {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Name of the observer
        name: String,
        /// Human-readable error message
        message: String,
        /// Optional source error for better context
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
}

impl Error {
    /// Create a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            code: ErrorCode::ConfigInvalid,
            message: message.into(),
        }
    }

    /// Create a configuration error for a required property that is absent.
    pub fn config_missing<S: AsRef<str>>(property: S) -> Self {
        Self::Config {
            code: ErrorCode::ConfigMissing,
            message: format!("failed to find {} property", property.as_ref()),
        }
    }

    /// Create a configuration error with specific code.
    pub fn config_with_code<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self::Config {
            code,
            message: message.into(),
        }
    }

    /// Create an error for a register write refused by the access-control layer.
    pub fn register_denied<S: Into<String>>(address: u64, message: S) -> Self {
        Self::Register {
            code: ErrorCode::RegisterAccessDenied,
            address,
            message: message.into(),
        }
    }

    /// Create a new register write error.
    pub fn register<S: Into<String>>(address: u64, message: S) -> Self {
        Self::Register {
            code: ErrorCode::RegisterWriteFailed,
            address,
            message: message.into(),
        }
    }

    /// Create a new storage write error carrying the backend status.
    pub fn storage<S: Into<String>>(tag: u32, status: i32, message: S) -> Self {
        Self::Storage {
            code: ErrorCode::StorageWriteFailed,
            tag,
            status,
            message: message.into(),
        }
    }

    /// Create a new storage error with specific code.
    pub fn storage_with_code<S: Into<String>>(
        code: ErrorCode,
        tag: u32,
        status: i32,
        message: S,
    ) -> Self {
        Self::Storage {
            code,
            tag,
            status,
            message: message.into(),
        }
    }

    /// Create a new observer error.
    pub fn observer<S: Into<String>, M: Into<String>>(name: S, message: M) -> Self {
        Self::Observer {
            code: ErrorCode::ObserverFailed,
            name: name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a new observer error with specific code.
    pub fn observer_with_code<S: Into<String>, M: Into<String>>(
        code: ErrorCode,
        name: S,
        message: M,
    ) -> Self {
        Self::Observer {
            code,
            name: name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a new observer error with source error.
    pub fn observer_with_source<S, M, E>(name: S, message: M, source: E) -> Self
    where
        S: Into<String>,
        M: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Observer {
            code: ErrorCode::ObserverFailed,
            name: name.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the structured error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Config { code, .. }
            | Self::Register { code, .. }
            | Self::Storage { code, .. }
            | Self::Observer { code, .. } => *code,
        }
    }

    /// Status code reported by the storage backend, if this is a storage error.
    #[must_use]
    pub const fn storage_status(&self) -> Option<i32> {
        match self {
            Self::Storage { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this error is configuration-related.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Check if this error is a refused privileged access.
    #[must_use]
    pub const fn is_access_denied(&self) -> bool {
        matches!(
            self,
            Self::Register {
                code: ErrorCode::RegisterAccessDenied,
                ..
            }
        )
    }

    /// Get the error category for logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Register { .. } => "register",
            Self::Storage { .. } => "storage",
            Self::Observer { .. } => "observer",
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::config_with_code(
            ErrorCode::ConfigParse,
            format!("Configuration loading failed: {err}"),
        )
    }
}
