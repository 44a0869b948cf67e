//! Remote action execution.
//!
//! A [`RemoteActionExecutor`] performs exactly one action per call against a
//! resolved [`ConnectionProfile`]:
//!
//! ```text
//! Idle -> Connecting -> Connected -> Acting -> Closing -> Done
//!             |                                          ^
//!             +------------- connect failure ------------+
//! ```
//!
//! Once a connection is open it is closed exactly once, whatever the action
//! did. Every transport fault is classified into a [`FailureReason`] before it
//! leaves this module.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use crate::command::CommandSpec;
use crate::config::PROVIDER_NAME;
use crate::connection::{Connection, ConnectionError, OutputHandler, RemoteFile, Transport};
use crate::context::{ExecutionContext, LogLevel};
use crate::error::Error;
use crate::profile::ConnectionProfile;

/// Prefix for remote temporary files when none is configured
pub const DEFAULT_TEMP_FILE_PREFIX: &str = "WINRM_TMP";

// ============================================================================
// Outcome
// ============================================================================

/// Classified cause of a failed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureReason {
    /// Malformed or missing configuration, detected before connecting
    ConfigurationFailure,
    /// The WinRM service rejected or failed the exchange
    WinRmProtocolError,
    /// Generic I/O failure while connecting or acting
    IoFailure,
    /// The remote command completed with a non-zero exit code
    NonZeroResultCode,
    /// The local source of a file copy could not be opened
    SourceNotReadable,
    /// Writing the remote file failed
    IoWriteError,
}

impl FailureReason {
    /// Whether a caller may reasonably retry the action unchanged.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FailureReason::WinRmProtocolError | FailureReason::IoFailure | FailureReason::IoWriteError
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::ConfigurationFailure => "ConfigurationFailure",
            FailureReason::WinRmProtocolError => "WinRMProtocolError",
            FailureReason::IoFailure => "IOFailure",
            FailureReason::NonZeroResultCode => "NonZeroResultCode",
            FailureReason::SourceNotReadable => "SourceNotReadable",
            FailureReason::IoWriteError => "IOWriteError",
        };
        f.write_str(name)
    }
}

/// A failed remote action.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ActionFailure {
    pub reason: FailureReason,
    /// User facing message
    pub message: String,
    /// Exit code of the remote command, when it ran to completion
    pub exit_code: Option<i32>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ActionFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            exit_code: None,
            source: None,
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_configuration(&self) -> bool {
        self.reason == FailureReason::ConfigurationFailure
    }
}

impl From<Error> for ActionFailure {
    fn from(err: Error) -> Self {
        ActionFailure::new(FailureReason::ConfigurationFailure, err.to_string()).with_source(err)
    }
}

/// Result of one remote action.
pub type ActionOutcome<T = ()> = std::result::Result<T, ActionFailure>;

/// Emit the single error-level job log line for a failure.
pub(crate) fn report_failure(ctx: &ExecutionContext, reason: FailureReason, detail: &str) {
    debug!(reason = %reason, "remote action failed");
    ctx.log(
        LogLevel::Error,
        &format!("[{}] failed: {}: {}", PROVIDER_NAME, reason, detail),
    );
}

// ============================================================================
// State machine
// ============================================================================

/// Lifecycle state of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutorState {
    Idle,
    Connecting,
    Connected,
    Acting,
    Closing,
    Done,
}

impl ExecutorState {
    /// Whether `next` directly follows `self`.
    fn can_advance(self, next: ExecutorState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Connecting)
                | (Self::Connecting, Self::Connected | Self::Done)
                | (Self::Connected, Self::Acting)
                | (Self::Acting, Self::Closing)
                | (Self::Closing, Self::Done)
        )
    }
}

#[derive(Debug)]
struct Lifecycle {
    action: &'static str,
    state: ExecutorState,
}

impl Lifecycle {
    fn new(action: &'static str) -> Self {
        Self {
            action,
            state: ExecutorState::Idle,
        }
    }

    fn advance(&mut self, next: ExecutorState) {
        debug_assert!(
            self.state.can_advance(next),
            "illegal {} transition {:?} -> {:?}",
            self.action,
            self.state,
            next
        );
        trace!(action = self.action, from = ?self.state, to = ?next, "executor state");
        self.state = next;
    }
}

/// Owns an open connection until it is closed.
///
/// When the action future is dropped before reaching `Closing` (cancelled,
/// timed out or unwound by a panic), the connection is closed on a spawned
/// task instead of leaking the remote shell.
struct ConnectionGuard {
    connection: Option<Box<dyn Connection>>,
}

impl ConnectionGuard {
    fn new(connection: Box<dyn Connection>) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    fn connection(&mut self) -> Result<&mut (dyn Connection + 'static), ConnectionError> {
        match self.connection.as_mut() {
            Some(connection) => Ok(connection.as_mut()),
            None => Err(ConnectionError::Closed),
        }
    }

    fn disarm(&mut self) -> Option<Box<dyn Connection>> {
        self.connection.take()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(connection = connection.identifier(), "action abandoned, closing connection");
                handle.spawn(async move {
                    if let Err(e) = connection.close().await {
                        warn!(connection = connection.identifier(), error = %e, "failed to close connection");
                    }
                });
            }
            Err(_) => {
                warn!(
                    connection = connection.identifier(),
                    "action abandoned outside a runtime, connection not closed"
                );
            }
        }
    }
}

/// Streams command output into the job log.
struct ListenerOutput<'a> {
    ctx: &'a ExecutionContext,
}

impl OutputHandler for ListenerOutput<'_> {
    fn stdout_line(&mut self, line: &str) {
        self.ctx.log(LogLevel::Normal, line);
    }

    fn stderr_line(&mut self, line: &str) {
        self.ctx.log(LogLevel::Warn, line);
    }
}

/// Runs single actions over a [`Transport`].
#[derive(Clone)]
pub struct RemoteActionExecutor {
    transport: Arc<dyn Transport>,
    temp_file_prefix: String,
}

impl RemoteActionExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            temp_file_prefix: DEFAULT_TEMP_FILE_PREFIX.to_string(),
        }
    }

    /// Prefix used when naming remote temporary files
    pub fn with_temp_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_file_prefix = prefix.into();
        self
    }

    /// Run `command` on the node. A non-zero exit code is a
    /// [`FailureReason::NonZeroResultCode`] failure carrying the code.
    #[instrument(skip_all, fields(address = %profile.address, port = profile.port))]
    pub async fn execute_command(
        &self,
        ctx: &ExecutionContext,
        profile: &ConnectionProfile,
        command: &CommandSpec,
    ) -> ActionOutcome {
        let mut lifecycle = Lifecycle::new("command");
        let mut guard = self.connect(ctx, profile, &mut lifecycle).await?;

        lifecycle.advance(ExecutorState::Acting);
        debug!(style = %command.style, tokens = command.tokens.len(), "executing command");
        let mut output = ListenerOutput { ctx };
        let result = match guard.connection() {
            Ok(connection) => connection.execute(command, &mut output).await,
            Err(e) => Err(e),
        };

        self.close(ctx, &mut guard, &mut lifecycle).await;

        match result {
            Ok(0) => Ok(()),
            Ok(code) => {
                report_failure(
                    ctx,
                    FailureReason::NonZeroResultCode,
                    &format!("exit code: {}", code),
                );
                Err(ActionFailure::new(
                    FailureReason::NonZeroResultCode,
                    format!("[{}] result code: {}", PROVIDER_NAME, code),
                )
                .with_exit_code(code))
            }
            Err(e) => Err(self.transport_failure(ctx, profile, e)),
        }
    }

    /// Copy `source` to the node and return the remote path written.
    ///
    /// The target is `destination` when given; otherwise a uniquely named file
    /// in the profile's destination directory; otherwise a remote temporary
    /// file.
    #[instrument(skip_all, fields(address = %profile.address, port = profile.port))]
    pub async fn copy(
        &self,
        ctx: &ExecutionContext,
        profile: &ConnectionProfile,
        source: &mut (dyn AsyncRead + Send + Unpin),
        destination: Option<&str>,
    ) -> ActionOutcome<String> {
        let prompt = format!("[{}:{}] ", PROVIDER_NAME, profile.address);
        let mut lifecycle = Lifecycle::new("copy");
        let mut guard = self.connect(ctx, profile, &mut lifecycle).await?;

        lifecycle.advance(ExecutorState::Acting);
        let result = match guard.connection() {
            Ok(connection) => {
                self.write_remote(ctx, &prompt, connection, profile, source, destination)
                    .await
            }
            Err(e) => Err(self.transport_failure(ctx, profile, e)),
        };

        ctx.log(LogLevel::Verbose, &format!("{}Closing connection", prompt));
        self.close(ctx, &mut guard, &mut lifecycle).await;
        result
    }

    async fn connect(
        &self,
        ctx: &ExecutionContext,
        profile: &ConnectionProfile,
        lifecycle: &mut Lifecycle,
    ) -> ActionOutcome<ConnectionGuard> {
        lifecycle.advance(ExecutorState::Connecting);
        match self.transport.connect(profile).await {
            Ok(connection) => {
                lifecycle.advance(ExecutorState::Connected);
                debug!(connection = connection.identifier(), "connected");
                Ok(ConnectionGuard::new(connection))
            }
            Err(e) => {
                lifecycle.advance(ExecutorState::Done);
                Err(self.transport_failure(ctx, profile, e))
            }
        }
    }

    async fn close(
        &self,
        ctx: &ExecutionContext,
        guard: &mut ConnectionGuard,
        lifecycle: &mut Lifecycle,
    ) {
        lifecycle.advance(ExecutorState::Closing);
        if let Some(mut connection) = guard.disarm() {
            if let Err(e) = connection.close().await {
                warn!(connection = connection.identifier(), error = %e, "failed to close connection");
                ctx.log(
                    LogLevel::Warn,
                    &format!("[{}] could not close connection: {}", PROVIDER_NAME, e),
                );
            }
        }
        lifecycle.advance(ExecutorState::Done);
    }

    async fn write_remote(
        &self,
        ctx: &ExecutionContext,
        prompt: &str,
        connection: &mut dyn Connection,
        profile: &ConnectionProfile,
        source: &mut (dyn AsyncRead + Send + Unpin),
        destination: Option<&str>,
    ) -> ActionOutcome<String> {
        let mut file = self
            .open_target(ctx, prompt, connection, profile, destination)
            .await
            .map_err(|e| self.transport_failure(ctx, profile, e))?;

        ctx.log(
            LogLevel::Verbose,
            &format!("{}Copying file to {}", prompt, file.path()),
        );

        let copied = async {
            let bytes = tokio::io::copy(&mut *source, file.writer()).await?;
            file.writer().shutdown().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;

        match copied {
            Ok(bytes) => {
                debug!(path = file.path(), bytes, "file copied");
                ctx.log(
                    LogLevel::Verbose,
                    &format!("{}File copied at: {}", prompt, file.path()),
                );
                Ok(file.path().to_string())
            }
            Err(e) => {
                ctx.log(
                    LogLevel::Verbose,
                    &format!("{}Error while copying the file", prompt),
                );
                let message = if ctx.is_verbose() {
                    ctx.log(LogLevel::Debug, &format!("{:?}", e));
                    e.to_string()
                } else {
                    format!("WinRM Error: {}", e)
                };
                let message = profile.password.redact_in(&message);
                report_failure(ctx, FailureReason::IoWriteError, &message);
                Err(ActionFailure::new(FailureReason::IoWriteError, message).with_source(e))
            }
        }
    }

    async fn open_target(
        &self,
        ctx: &ExecutionContext,
        prompt: &str,
        connection: &mut dyn Connection,
        profile: &ConnectionProfile,
        destination: Option<&str>,
    ) -> Result<RemoteFile, ConnectionError> {
        if let Some(path) = destination.filter(|d| !d.is_empty()) {
            let file = connection.file(path).await?;
            ctx.log(
                LogLevel::Verbose,
                &format!("{}Destination file acquired {}", prompt, file.path()),
            );
            return Ok(file);
        }

        if let Some(dir) = profile
            .destination_dir
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            let path = unique_path(dir, &self.temp_file_prefix);
            let file = connection.file(&path).await?;
            ctx.log(
                LogLevel::Verbose,
                &format!("{}Destination file acquired {}", prompt, file.path()),
            );
            return Ok(file);
        }

        let file = connection.temp_file(&self.temp_file_prefix).await?;
        ctx.log(
            LogLevel::Verbose,
            &format!("{}Temporary file acquired {}", prompt, file.path()),
        );
        Ok(file)
    }

    /// Classify a transport fault and report it.
    fn transport_failure(
        &self,
        ctx: &ExecutionContext,
        profile: &ConnectionProfile,
        err: ConnectionError,
    ) -> ActionFailure {
        let reason = if err.is_protocol() {
            FailureReason::WinRmProtocolError
        } else {
            FailureReason::IoFailure
        };

        let message = if ctx.is_verbose() {
            ctx.log(
                LogLevel::Debug,
                &profile.password.redact_in(&format!("{:?}", err)),
            );
            err.to_string()
        } else if err.is_protocol() {
            format!("WinRM Error: {}", err.cause_message())
        } else {
            format!("runtime exception: {}", err)
        };
        let message = profile.password.redact_in(&message);

        report_failure(ctx, reason, &message);
        ActionFailure::new(reason, message).with_source(err)
    }
}

impl fmt::Debug for RemoteActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteActionExecutor")
            .field("temp_file_prefix", &self.temp_file_prefix)
            .finish_non_exhaustive()
    }
}

/// `{dir}\{prefix}-{uuid}`, keeping the separator style of `dir`.
fn unique_path(dir: &str, prefix: &str) -> String {
    let separator = if dir.contains('/') && !dir.contains('\\') {
        '/'
    } else {
        '\\'
    };
    format!(
        "{}{}{}-{}",
        dir.trim_end_matches(['/', '\\']),
        separator,
        prefix,
        Uuid::new_v4().simple()
    )
}
