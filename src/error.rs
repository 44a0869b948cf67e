//! Error types for winrm-exec.
//!
//! Configuration faults are the only errors raised while a connection profile
//! is being resolved. They are always detected before any remote connection is
//! attempted and are surfaced verbatim to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for profile resolution.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for winrm-exec.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing required configuration input.
    #[error("{message}")]
    Configuration {
        /// Human readable message, shown to the user as-is
        message: String,
        /// Underlying cause, if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A properties or settings file could not be loaded.
    #[error("Failed to load settings from '{path}': {message}")]
    SettingsLoad {
        /// Path of the file being loaded
        path: PathBuf,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates a configuration fault.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a configuration fault carrying its cause.
    pub fn configuration_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a settings load error.
    pub fn settings_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SettingsLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration fault.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Configuration { .. } => 2,
            Error::SettingsLoad { .. } => 4,
        }
    }
}

/// Extension trait for turning foreign errors into configuration faults.
pub trait ErrorContext<T> {
    /// Wraps the error as a configuration fault with the given message.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::configuration_with_source(message, e))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::configuration_with_source(f(), e))
    }
}
