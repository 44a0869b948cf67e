//! Per-action execution context.
//!
//! The orchestration runtime hands one [`ExecutionContext`] to every action.
//! It carries the job log sink, the data context used for `${group.key}`
//! substitution, the private data context holding secure option values, and
//! an optional handle to the key storage tree.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::secrets::StorageTree;

/// Nested `group -> key -> value` dataset.
pub type DataContext = HashMap<String, HashMap<String, String>>;

static DATA_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^\s.}]+)\.([^\s}]+)\}").expect("data reference pattern is valid")
});

/// Severity of a job log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Normal = 2,
    Verbose = 3,
    Debug = 4,
}

impl LogLevel {
    /// Level from its numeric value, clamped to [`LogLevel::Debug`]
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Normal,
            3 => LogLevel::Verbose,
            _ => LogLevel::Debug,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Normal => "normal",
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
        };
        write!(f, "{}", name)
    }
}

/// Sink for job log output.
pub trait ExecutionListener: Send + Sync {
    /// Record one line at the given level
    fn log(&self, level: LogLevel, message: &str);
}

/// Listener that forwards job output to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl ExecutionListener for TracingListener {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!(target: "winrm_exec::job", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "winrm_exec::job", "{}", message),
            LogLevel::Normal => tracing::info!(target: "winrm_exec::job", "{}", message),
            LogLevel::Verbose => tracing::debug!(target: "winrm_exec::job", "{}", message),
            LogLevel::Debug => tracing::trace!(target: "winrm_exec::job", "{}", message),
        }
    }
}

/// Context of a single remote action.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Project the action runs in
    pub project: String,
    /// Requested log level
    pub log_level: LogLevel,
    /// Public data context for `${group.key}` substitution
    pub data_context: DataContext,
    /// Private data context holding secure option values
    pub private_data_context: Option<DataContext>,
    /// Key storage tree, if the runtime provides one
    pub storage: Option<Arc<dyn StorageTree>>,
    listener: Arc<dyn ExecutionListener>,
}

impl ExecutionContext {
    /// Create a context for a project, logging through `tracing`
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            log_level: LogLevel::Normal,
            data_context: DataContext::new(),
            private_data_context: None,
            storage: None,
            listener: Arc::new(TracingListener),
        }
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageTree>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Add a value to the public data context
    pub fn with_data(
        mut self,
        group: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.data_context
            .entry(group.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    /// Add a value to the private data context
    pub fn with_private_data(
        mut self,
        group: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.private_data_context
            .get_or_insert_with(DataContext::new)
            .entry(group.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    /// Whether verbose diagnostics were requested
    pub fn is_verbose(&self) -> bool {
        self.log_level > LogLevel::Normal
    }

    /// Log a line to the job output
    pub fn log(&self, level: LogLevel, message: &str) {
        self.listener.log(level, message);
    }

    /// Substitute `${group.key}` references from the public data context
    pub fn substitute(&self, text: &str) -> String {
        replace_data_references(text, &self.data_context)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("project", &self.project)
            .field("log_level", &self.log_level)
            .field("data_context", &self.data_context)
            .field(
                "private_data_context",
                &self.private_data_context.as_ref().map(|_| "[REDACTED]"),
            )
            .field("storage", &self.storage.is_some())
            .finish_non_exhaustive()
    }
}

/// Replace `${group.key}` references in `text`.
///
/// References to groups or keys missing from `data` are left untouched.
pub fn replace_data_references(text: &str, data: &DataContext) -> String {
    if !text.contains("${") {
        return text.to_string();
    }
    DATA_REFERENCE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            data.get(&caps[1])
                .and_then(|group| group.get(&caps[2]))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
