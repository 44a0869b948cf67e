//! Shared test utilities and fixtures for the winrm-exec test suite.
//!
//! This module provides:
//! - A mock transport and connection that record everything they are asked to do
//! - A recording job log listener
//! - Fixtures for framework properties, nodes and execution contexts
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncWrite;

use winrm_exec::command::CommandSpec;
use winrm_exec::connection::{
    Connection, ConnectionError, ConnectionResult, OutputHandler, RemoteFile, Transport,
};
use winrm_exec::context::{ExecutionContext, ExecutionListener, LogLevel};
use winrm_exec::node::NodeTarget;
use winrm_exec::profile::ConnectionProfile;
use winrm_exec::properties::FrameworkProperties;

pub const PROJECT: &str = "ops";
pub const PASSWORD: &str = "Sup3rS3cret!";

// ============================================================================
// Fault injection
// ============================================================================

/// Kind of transport fault to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// WS-Management fault
    Protocol,
    /// Rejected credentials
    Auth,
    /// Generic channel failure
    Io,
}

impl Fault {
    fn error(self) -> ConnectionError {
        match self {
            Fault::Protocol => ConnectionError::protocol_with_source(
                "SOAP fault",
                io::Error::other("wsman:InvalidSelectors"),
            ),
            Fault::Auth => ConnectionError::AuthenticationFailed("401 Unauthorized".into()),
            Fault::Io => ConnectionError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
        }
    }
}

// ============================================================================
// Mock Transport Implementation
// ============================================================================

#[derive(Debug, Default)]
struct MockState {
    connects: AtomicU32,
    closes: AtomicU32,
    exit_code: AtomicI32,
    temp_files: AtomicU32,
    profiles: RwLock<Vec<ConnectionProfile>>,
    commands: RwLock<Vec<CommandSpec>>,
    stdout: RwLock<Vec<String>>,
    stderr: RwLock<Vec<String>>,
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    connect_fault: RwLock<Option<Fault>>,
    execute_fault: RwLock<Option<Fault>>,
    open_fault: RwLock<Option<Fault>>,
    write_fails: RwLock<bool>,
    close_fails: RwLock<bool>,
    execute_hangs: AtomicBool,
}

/// A transport double that records every interaction.
///
/// # Example
///
/// ```rust,ignore
/// let transport = Arc::new(MockTransport::new());
/// transport.set_exit_code(3);
/// // ... run an action ...
/// assert_eq!(transport.close_count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_exit_code(&self, code: i32) {
        self.state.exit_code.store(code, Ordering::SeqCst);
    }

    pub fn set_stdout(&self, lines: &[&str]) {
        *self.state.stdout.write() = lines.iter().map(|l| l.to_string()).collect();
    }

    pub fn set_stderr(&self, lines: &[&str]) {
        *self.state.stderr.write() = lines.iter().map(|l| l.to_string()).collect();
    }

    pub fn fail_connect(&self, fault: Fault) {
        *self.state.connect_fault.write() = Some(fault);
    }

    pub fn fail_execute(&self, fault: Fault) {
        *self.state.execute_fault.write() = Some(fault);
    }

    pub fn fail_open(&self, fault: Fault) {
        *self.state.open_fault.write() = Some(fault);
    }

    pub fn fail_writes(&self) {
        *self.state.write_fails.write() = true;
    }

    pub fn fail_close(&self) {
        *self.state.close_fails.write() = true;
    }

    /// Commands never complete; the caller has to give up on them.
    pub fn hang_execute(&self) {
        self.state.execute_hangs.store(true, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> u32 {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<CommandSpec> {
        self.state.commands.read().clone()
    }

    pub fn profiles(&self) -> Vec<ConnectionProfile> {
        self.state.profiles.read().clone()
    }

    /// Content written to a remote file, once the file has been closed
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.files.read().get(path).cloned()
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.state.files.read().keys().cloned().collect()
    }

    fn open(&self, path: String) -> RemoteFile {
        let writer = RecordingWriter {
            path: path.clone(),
            files: Arc::clone(&self.state.files),
            buffer: Vec::new(),
            fail: *self.state.write_fails.read(),
        };
        RemoteFile::new(path, Box::new(writer))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, profile: &ConnectionProfile) -> ConnectionResult<Box<dyn Connection>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.profiles.write().push(profile.clone());
        if let Some(fault) = *self.state.connect_fault.read() {
            return Err(fault.error());
        }
        Ok(Box::new(MockConnection {
            identifier: profile.address.clone(),
            transport: self.clone(),
        }))
    }
}

/// Connection handed out by [`MockTransport`].
#[derive(Debug)]
pub struct MockConnection {
    identifier: String,
    transport: MockTransport,
}

#[async_trait]
impl Connection for MockConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn execute(
        &mut self,
        command: &CommandSpec,
        output: &mut dyn OutputHandler,
    ) -> ConnectionResult<i32> {
        let state = &self.transport.state;
        state.commands.write().push(command.clone());
        if let Some(fault) = *state.execute_fault.read() {
            return Err(fault.error());
        }
        if state.execute_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        for line in state.stdout.read().iter() {
            output.stdout_line(line);
        }
        for line in state.stderr.read().iter() {
            output.stderr_line(line);
        }
        Ok(state.exit_code.load(Ordering::SeqCst))
    }

    async fn file(&mut self, path: &str) -> ConnectionResult<RemoteFile> {
        if let Some(fault) = *self.transport.state.open_fault.read() {
            return Err(fault.error());
        }
        Ok(self.transport.open(path.to_string()))
    }

    async fn temp_file(&mut self, prefix: &str) -> ConnectionResult<RemoteFile> {
        if let Some(fault) = *self.transport.state.open_fault.read() {
            return Err(fault.error());
        }
        let n = self.transport.state.temp_files.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .transport
            .open(format!("C:\\Windows\\Temp\\{}{}.tmp", prefix, n)))
    }

    async fn close(&mut self) -> ConnectionResult<()> {
        self.transport.state.closes.fetch_add(1, Ordering::SeqCst);
        if *self.transport.state.close_fails.read() {
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }
}

/// Buffers written bytes and publishes them on shutdown.
struct RecordingWriter {
    path: String,
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    buffer: Vec<u8>,
    fail: bool,
}

impl AsyncWrite for RecordingWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.fail {
            return Poll::Ready(Err(io::Error::other("remote disk full")));
        }
        self.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.files
            .write()
            .insert(this.path.clone(), std::mem::take(&mut this.buffer));
        Poll::Ready(Ok(()))
    }
}

// ============================================================================
// Recording listener
// ============================================================================

/// Job log listener that keeps every line.
#[derive(Debug, Default)]
pub struct RecordingListener {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().clone()
    }

    pub fn at(&self, level: LogLevel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.at(LogLevel::Error)
    }

    /// Whether any line, at any level, contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|(_, m)| m.contains(needle))
    }
}

impl ExecutionListener for RecordingListener {
    fn log(&self, level: LogLevel, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Framework properties with HTTPS and Kerberos left at their defaults.
pub fn framework() -> FrameworkProperties {
    FrameworkProperties::new()
        .with_framework_property("framework.winrm-locale", "en-us")
        .with_project_property(PROJECT, "project.winrm-timeout", "PT120.000S")
}

/// Execution context with the default secure password option set.
pub fn context(listener: Arc<RecordingListener>) -> ExecutionContext {
    ExecutionContext::new(PROJECT)
        .with_listener(listener)
        .with_private_data("option", "winrmPassword", PASSWORD)
}

/// Node using Basic authentication over HTTP.
pub fn basic_node() -> NodeTarget {
    NodeTarget::new("web01", "web01.corp.example.com")
        .with_username("svc_deploy")
        .with_attribute("winrm-auth-type", "basic")
        .with_attribute("winrm-protocol", "http")
}

/// Node using the defaults: Kerberos over HTTPS.
pub fn kerberos_node() -> NodeTarget {
    NodeTarget::new("dc-app01", "app01.corp.example.com").with_username("alice")
}
