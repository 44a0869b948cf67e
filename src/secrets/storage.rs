//! Key storage trees.
//!
//! A storage tree maps hierarchical paths such as `keys/ops/winrm.password`
//! to raw bytes. The runtime supplies one through the execution context;
//! passwords referenced by a storage path are read from it.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a storage tree.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No resource exists at the path
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The path is malformed
    #[error("invalid storage path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Reading the resource failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Normalised storage path.
///
/// Leading, trailing and repeated slashes are dropped. `.` and `..` segments
/// are rejected so a path can never leave the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoragePath {
    segments: Vec<String>,
}

impl StoragePath {
    pub fn parse(path: &str) -> StorageResult<Self> {
        let invalid = |reason: &str| StorageError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let segments: Vec<String> = path
            .trim()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if segments.is_empty() {
            return Err(invalid("path is empty"));
        }
        if segments.iter().any(|s| s == "." || s == "..") {
            return Err(invalid("relative segments are not allowed"));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final path segment
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Read access to a key storage tree.
#[async_trait]
pub trait StorageTree: Send + Sync {
    /// Read the full contents of the resource at `path`.
    async fn read_resource(&self, path: &StoragePath) -> StorageResult<Vec<u8>>;
}

/// Storage tree held in memory.
#[derive(Debug, Default)]
pub struct MemoryStorageTree {
    resources: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorageTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a resource, replacing any previous content
    pub fn insert(&self, path: &str, content: impl Into<Vec<u8>>) -> StorageResult<()> {
        let path = StoragePath::parse(path)?;
        self.resources.write().insert(path.to_string(), content.into());
        Ok(())
    }

    pub fn remove(&self, path: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = StoragePath::parse(path)?;
        Ok(self.resources.write().remove(&path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }
}

#[async_trait]
impl StorageTree for MemoryStorageTree {
    async fn read_resource(&self, path: &StoragePath) -> StorageResult<Vec<u8>> {
        self.resources
            .read()
            .get(&path.to_string())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

/// Storage tree backed by a directory; each resource is one file.
#[derive(Debug, Clone)]
pub struct FileStorageTree {
    root: PathBuf,
}

impl FileStorageTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn resolve(&self, path: &StoragePath) -> PathBuf {
        path.segments()
            .iter()
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }
}

#[async_trait]
impl StorageTree for FileStorageTree {
    async fn read_resource(&self, path: &StoragePath) -> StorageResult<Vec<u8>> {
        let file = self.resolve(path);
        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
