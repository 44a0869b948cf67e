//! Layered property resolution.
//!
//! A property named `X` is looked up, in order, as:
//!
//! ```text
//! node attribute       X
//! project property     project.X    (in the current project)
//! framework property   framework.X
//! caller default
//! ```
//!
//! The first scope holding a non-empty value wins. An empty value never
//! shadows a lower scope.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::trace;

use crate::config::{FRAMEWORK_PREFIX, PROJECT_PREFIX};
use crate::error::{Error, ErrorContext, Result};
use crate::node::NodeTarget;

/// Source of project and framework level properties.
///
/// Keys are passed with their scope prefix already applied
/// (`project.winrm-port`, `framework.winrm-port`).
pub trait FrameworkSource: Send + Sync {
    /// Look up a property of the given project
    fn project_property(&self, project: &str, key: &str) -> Option<String>;

    /// Look up a framework-wide property
    fn framework_property(&self, key: &str) -> Option<String>;
}

/// Scope a property value was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyScope {
    /// Node attribute
    Node,
    /// Project property
    Project,
    /// Framework property
    Framework,
    /// Caller supplied default
    Default,
}

impl fmt::Display for PropertyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyScope::Node => "node",
            PropertyScope::Project => "project",
            PropertyScope::Framework => "framework",
            PropertyScope::Default => "default",
        };
        write!(f, "{}", name)
    }
}

/// Property value as written in a TOML properties file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PropertyValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{}", s),
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PropertiesFile {
    #[serde(default)]
    framework: HashMap<String, PropertyValue>,
    #[serde(default)]
    projects: HashMap<String, HashMap<String, PropertyValue>>,
}

/// In-memory framework and project properties.
///
/// Loaded from TOML of the form:
///
/// ```toml
/// [framework]
/// "framework.winrm-protocol" = "https"
///
/// [projects.ops]
/// "project.winrm-auth-type" = "basic"
/// "project.winrm-port" = 5986
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameworkProperties {
    framework: HashMap<String, String>,
    projects: HashMap<String, HashMap<String, String>>,
}

impl FrameworkProperties {
    /// Create an empty property set
    pub fn new() -> Self {
        Self::default()
    }

    /// Load properties from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::settings_load(path, e.to_string()))?;
        let file: PropertiesFile =
            toml::from_str(&content).map_err(|e| Error::settings_load(path, e.to_string()))?;
        Ok(Self::from_parsed(file))
    }

    /// Parse properties from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: PropertiesFile =
            toml::from_str(content).context("Failed to parse properties")?;
        Ok(Self::from_parsed(file))
    }

    fn from_parsed(file: PropertiesFile) -> Self {
        let stringify = |values: HashMap<String, PropertyValue>| {
            values
                .into_iter()
                .map(|(k, v)| (k, v.to_string()))
                .collect::<HashMap<_, _>>()
        };

        Self {
            framework: stringify(file.framework),
            projects: file
                .projects
                .into_iter()
                .map(|(name, values)| (name, stringify(values)))
                .collect(),
        }
    }

    /// Set a framework property (key including the `framework.` prefix)
    pub fn set_framework_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.framework.insert(key.into(), value.into());
    }

    /// Set a project property (key including the `project.` prefix)
    pub fn set_project_property(
        &mut self,
        project: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.projects
            .entry(project.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Builder-style variant of [`set_framework_property`](Self::set_framework_property)
    pub fn with_framework_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.set_framework_property(key, value);
        self
    }

    /// Builder-style variant of [`set_project_property`](Self::set_project_property)
    pub fn with_project_property(
        mut self,
        project: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.set_project_property(project, key, value);
        self
    }
}

impl FrameworkSource for FrameworkProperties {
    fn project_property(&self, project: &str, key: &str) -> Option<String> {
        self.projects.get(project)?.get(key).cloned()
    }

    fn framework_property(&self, key: &str) -> Option<String> {
        self.framework.get(key).cloned()
    }
}

/// Resolves properties for one node within one project.
#[derive(Clone, Copy)]
pub struct PropertyResolver<'a> {
    node: &'a NodeTarget,
    project: &'a str,
    framework: &'a dyn FrameworkSource,
}

impl<'a> PropertyResolver<'a> {
    /// Create a resolver over the node, project and framework scopes
    pub fn new(node: &'a NodeTarget, project: &'a str, framework: &'a dyn FrameworkSource) -> Self {
        Self {
            node,
            project,
            framework,
        }
    }

    /// The node this resolver reads attributes from
    pub fn node(&self) -> &'a NodeTarget {
        self.node
    }

    /// The project this resolver reads project properties from
    pub fn project(&self) -> &'a str {
        self.project
    }

    /// Resolve a property and report which scope it came from.
    ///
    /// Returns `None` when no scope holds a non-empty value.
    pub fn lookup(&self, key: &str) -> Option<(PropertyScope, String)> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());

        if let Some(value) = non_empty(self.node.attribute(key).map(str::to_string)) {
            return Some((PropertyScope::Node, value));
        }
        let project_key = format!("{}{}", PROJECT_PREFIX, key);
        if let Some(value) = non_empty(self.framework.project_property(self.project, &project_key))
        {
            return Some((PropertyScope::Project, value));
        }
        let framework_key = format!("{}{}", FRAMEWORK_PREFIX, key);
        if let Some(value) = non_empty(self.framework.framework_property(&framework_key)) {
            return Some((PropertyScope::Framework, value));
        }
        None
    }

    /// Resolve a string property, falling back to `default`
    pub fn resolve(&self, key: &str, default: Option<&str>) -> Option<String> {
        match self.lookup(key) {
            Some((scope, value)) => {
                trace!(key = %key, scope = %scope, "resolved property");
                Some(value)
            }
            None => {
                trace!(key = %key, scope = %PropertyScope::Default, "resolved property");
                default.map(str::to_string)
            }
        }
    }

    /// Resolve an integer property.
    ///
    /// A value that is present but does not parse is a configuration fault;
    /// the default is only used when no scope holds a value.
    pub fn resolve_int(&self, key: &str, default: i32) -> Result<i32> {
        match self.resolve(key, None) {
            Some(value) => value.parse::<i32>().map_err(|_| {
                Error::configuration(format!("Not a valid integer: {}: {}", key, value))
            }),
            None => Ok(default),
        }
    }

    /// Resolve a long integer property, with the same fault rules as
    /// [`resolve_int`](Self::resolve_int)
    pub fn resolve_long(&self, key: &str, default: i64) -> Result<i64> {
        match self.resolve(key, None) {
            Some(value) => value.parse::<i64>().map_err(|_| {
                Error::configuration(format!("Not a valid long: {}: {}", key, value))
            }),
            None => Ok(default),
        }
    }

    /// Resolve a boolean property. Only `true` (any case) is true; any other
    /// present value is false.
    pub fn resolve_bool(&self, key: &str, default: bool) -> bool {
        match self.resolve(key, None) {
            Some(value) => value.eq_ignore_ascii_case("true"),
            None => default,
        }
    }

    /// Resolve an optional key; unsupported keys yield `default`
    pub fn resolve_optional(&self, key: Option<&str>, default: Option<&str>) -> Option<String> {
        match key {
            Some(key) => self.resolve(key, default),
            None => default.map(str::to_string),
        }
    }

    /// Resolve an optional boolean key; unsupported keys yield `default`
    pub fn resolve_optional_bool(&self, key: Option<&str>, default: bool) -> bool {
        key.map_or(default, |key| self.resolve_bool(key, default))
    }
}

impl fmt::Debug for PropertyResolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyResolver")
            .field("node", &self.node.name)
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}
