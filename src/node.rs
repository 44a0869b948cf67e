//! Target node description.
//!
//! A [`NodeTarget`] is supplied by the caller for each action and is never
//! modified while the action runs. Its attributes form the highest priority
//! scope of property resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// A Windows node targeted by one action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTarget {
    /// Node name as known to the orchestration platform
    pub name: String,

    /// Hostname or address, optionally carrying a `:port` suffix
    #[serde(default)]
    pub hostname: Option<String>,

    /// Explicit username for the node
    #[serde(default)]
    pub username: Option<String>,

    /// Explicit port, kept as text so malformed values can be reported
    #[serde(default)]
    pub port: Option<String>,

    /// Arbitrary node attributes
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl NodeTarget {
    /// Create a node with a name and hostname
    pub fn new(name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: Some(hostname.into()),
            ..Default::default()
        }
    }

    /// Load a node description from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::settings_load(path, e.to_string()))?;
        toml::from_str(&content).map_err(|e| Error::settings_load(path, e.to_string()))
    }

    /// Set the username
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set an explicit port
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Get an attribute value
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The trimmed username, if one is set and not blank
    pub fn username(&self) -> Option<&str> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// Hostname without any `:port` suffix
    pub fn extract_hostname(&self) -> Option<&str> {
        let hostname = self.hostname.as_deref()?.trim();
        if hostname.is_empty() {
            return None;
        }
        Some(split_host_port(hostname).0)
    }

    /// Explicit port, else the `:port` suffix of the hostname
    pub fn extract_port(&self) -> Option<&str> {
        if let Some(port) = self.port.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            return Some(port);
        }
        self.hostname
            .as_deref()
            .and_then(|h| split_host_port(h.trim()).1)
    }

    /// Whether the node carries a port of its own
    pub fn contains_port(&self) -> bool {
        self.extract_port().is_some()
    }
}

/// Split `host:port`; bare IPv6 addresses are returned whole, bracketed ones
/// lose their brackets.
fn split_host_port(hostname: &str) -> (&str, Option<&str>) {
    if let Some(rest) = hostname.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let host = &rest[..end];
            let port = rest[end + 1..].strip_prefix(':').filter(|p| !p.is_empty());
            return (host, port);
        }
        return (hostname, None);
    }
    match hostname.matches(':').count() {
        1 => {
            let (host, port) = hostname.split_once(':').unwrap_or((hostname, ""));
            (host, Some(port).filter(|p| !p.is_empty()))
        }
        _ => (hostname, None),
    }
}
