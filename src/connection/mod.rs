//! Transport boundary.
//!
//! The WS-Management wire protocol lives below this crate. A [`Transport`]
//! turns a [`ConnectionProfile`] into an open [`Connection`], and a connection
//! offers the two primitives remote actions are built from: run a command and
//! report its exit code, or open a remote file and write bytes to it.
//!
//! # Example
//!
//! ```rust,ignore
//! use winrm_exec::connection::{Transport, OutputHandler};
//!
//! let mut conn = transport.connect(&profile).await?;
//! let exit_code = conn.execute(&spec, &mut handler).await?;
//! conn.close().await?;
//! ```

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::io::AsyncWrite;

use crate::command::CommandSpec;
use crate::profile::ConnectionProfile;

/// Errors raised by a transport.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// WS-Management fault reported by the remote service.
    #[error("WinRM protocol error: {message}")]
    Protocol {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The connection could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Establishing the connection took longer than allowed.
    #[error("Connection timeout after {0} ms")]
    Timeout(u64),

    /// The connection was closed while in use.
    #[error("Connection closed")]
    Closed,

    /// I/O error on the underlying channel.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    pub fn protocol_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Protocol {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this is a fault of the WinRM service itself rather than of the
    /// channel it runs over
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            ConnectionError::Protocol { .. } | ConnectionError::AuthenticationFailed(_)
        )
    }

    /// The underlying cause, for short user-facing messages
    pub fn cause_message(&self) -> String {
        match self {
            ConnectionError::Protocol {
                source: Some(source),
                ..
            } => source.to_string(),
            ConnectionError::Protocol { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for transport operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Receives command output line by line as it arrives.
pub trait OutputHandler: Send {
    fn stdout_line(&mut self, line: &str);
    fn stderr_line(&mut self, line: &str);
}

/// A writable file on the remote host.
pub struct RemoteFile {
    path: String,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl RemoteFile {
    pub fn new(path: impl Into<String>, writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            path: path.into(),
            writer,
        }
    }

    /// Remote path of the file
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Sink the file content is written to
    pub fn writer(&mut self) -> &mut (dyn AsyncWrite + Send + Unpin) {
        self.writer.as_mut()
    }
}

impl fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFile")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Opens connections from resolved profiles.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the node described by `profile`.
    ///
    /// Implementations bound only this step by the profile's connection
    /// timeout.
    async fn connect(&self, profile: &ConnectionProfile) -> ConnectionResult<Box<dyn Connection>>;
}

/// An open connection to one node.
#[async_trait]
pub trait Connection: Send {
    /// Connection identifier, usually the remote address
    fn identifier(&self) -> &str;

    /// Run a command, streaming its output to `output`, and return its exit code.
    async fn execute(
        &mut self,
        command: &CommandSpec,
        output: &mut dyn OutputHandler,
    ) -> ConnectionResult<i32>;

    /// Open the remote file at `path` for writing.
    async fn file(&mut self, path: &str) -> ConnectionResult<RemoteFile>;

    /// Create a new, uniquely named temporary file.
    async fn temp_file(&mut self, prefix: &str) -> ConnectionResult<RemoteFile>;

    /// Release the connection.
    async fn close(&mut self) -> ConnectionResult<()>;
}
