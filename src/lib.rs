//! # winrm-exec - Remote actions on Windows nodes over WinRM
//!
//! winrm-exec is the node executor and file copier an orchestration platform
//! uses to reach Windows hosts over WS-Management. For every action it
//! resolves a complete connection profile from layered configuration, runs one
//! command or file copy over a pluggable transport, and classifies whatever
//! goes wrong into a small, stable set of failure reasons.
//!
//! ## Core Concepts
//!
//! - **Properties**: every option is looked up on the node, then in the
//!   project, then framework-wide, then falls back to a built-in default
//! - **Profiles**: the resolved address, port, protocol, credentials and TLS
//!   policy for one node, including Kerberos principal derivation
//! - **Secrets**: passwords come from the key storage tree or from secure job
//!   options, and are redacted everywhere they could be printed
//! - **Transport**: the wire protocol is supplied by the caller through the
//!   [`Transport`](connection::Transport) trait
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │          WinRmNodeExecutor / WinRmFileCopier (service)       │
//! └──────────────────────────────────────────────────────────────┘
//!                 │                               │
//!                 ▼                               ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │   ConnectionProfileBuilder   │  │     RemoteActionExecutor     │
//! │ (properties, secrets,        │  │ (connect, act, close,        │
//! │  Kerberos principal)         │  │  classify failures)          │
//! └──────────────────────────────┘  └──────────────────────────────┘
//!                                                 │
//!                                                 ▼
//!                                 ┌──────────────────────────────┐
//!                                 │     Transport (caller's)     │
//!                                 └──────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use winrm_exec::prelude::*;
//!
//! let framework = Arc::new(FrameworkProperties::from_file("winrm.toml")?);
//! let executor = WinRmNodeExecutor::new(framework, transport, Arc::new(Settings::current()));
//!
//! let ctx = ExecutionContext::new("ops").with_private_data("option", "winrmPassword", password);
//! let node = NodeTarget::new("web01", "web01.corp.example.com");
//! executor.execute_command(&ctx, &["ipconfig", "/all"], &node).await?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of the types needed to run remote actions.

    pub use std::sync::Arc;

    pub use crate::command::{CommandLineBuilder, CommandSpec, CommandStyle};
    pub use crate::config::{Preset, Settings};
    pub use crate::connection::{
        Connection, ConnectionError, ConnectionResult, OutputHandler, RemoteFile, Transport,
    };
    pub use crate::context::{ExecutionContext, ExecutionListener, LogLevel, TracingListener};
    pub use crate::error::{Error, ErrorContext, Result};
    pub use crate::executor::{
        ActionFailure, ActionOutcome, FailureReason, RemoteActionExecutor,
    };
    pub use crate::node::NodeTarget;
    pub use crate::profile::{
        AuthMechanism, CertificateTrust, ConnectionProfile, ConnectionProfileBuilder,
        HostnameVerification, KerberosOptions, Protocol,
    };
    pub use crate::properties::{FrameworkProperties, FrameworkSource, PropertyResolver};
    pub use crate::secrets::{
        FileStorageTree, MemoryStorageTree, PasswordStrategy, SensitiveString, StorageTree,
    };
    pub use crate::service::{WinRmFileCopier, WinRmNodeExecutor};
}

// ============================================================================
// Configuration
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// Property keys, built-in defaults and named presets.
pub mod config;

/// Target node description.
pub mod node;

/// Layered node / project / framework property lookup.
pub mod properties;

/// Per-action execution context: job log, data contexts and key storage.
pub mod context;

// ============================================================================
// Profile Resolution
// ============================================================================

/// Redaction, key storage trees and password resolution.
pub mod secrets;

/// Connection profiles and the builder that resolves them.
pub mod profile;

// ============================================================================
// Execution
// ============================================================================

/// Command line construction for raw and PowerShell commands.
pub mod command;

/// Transport, connection and remote file traits.
pub mod connection;

/// Single-action executor and failure classification.
pub mod executor;

/// Node executor and file copier entry points.
pub mod service;

pub use error::{Error, Result};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
