//! Secret handling: redaction, key storage and password resolution.

pub mod no_log;
pub mod resolver;
pub mod storage;

pub use no_log::SensitiveString;
pub use resolver::{evaluate_secure_option, PasswordStrategy, SecretResolver};
pub use storage::{
    FileStorageTree, MemoryStorageTree, StorageError, StoragePath, StorageResult, StorageTree,
};
