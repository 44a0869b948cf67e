//! Password resolution.
//!
//! Two sources are consulted, and exactly one of them is used:
//!
//! 1. A storage path property. When it is set and non-blank the password is
//!    read from the key storage tree, and any fault is a configuration fault.
//! 2. Otherwise a secure option key (`dataset.name`) looked up in the private
//!    data context. A missing dataset or option simply yields no password.

use async_trait::async_trait;
use tracing::debug;

use super::no_log::SensitiveString;
use super::storage::StoragePath;
use crate::config::Settings;
use crate::context::{DataContext, ExecutionContext};
use crate::error::{Error, Result};
use crate::properties::PropertyResolver;

/// Source of the connection password.
#[async_trait]
pub trait PasswordStrategy: Send + Sync {
    /// Resolve the password, or `None` when no source provides one.
    async fn password(
        &self,
        properties: &PropertyResolver<'_>,
        ctx: &ExecutionContext,
    ) -> Result<Option<SensitiveString>>;
}

/// Default password strategy: storage path first, then secure option.
#[derive(Debug, Clone)]
pub struct SecretResolver {
    storage_path_key: Option<String>,
    option_key: String,
    default_option: String,
    implicit_dataset: Option<String>,
}

impl SecretResolver {
    pub fn new(settings: &Settings) -> Self {
        Self {
            storage_path_key: settings.keys.password_storage_path.clone(),
            option_key: settings.keys.password_option.clone(),
            default_option: settings.default_password_option.clone(),
            implicit_dataset: settings.implicit_option_dataset.clone(),
        }
    }

    async fn read_storage(&self, raw_path: &str, ctx: &ExecutionContext) -> Result<SensitiveString> {
        let path = ctx.substitute(raw_path);
        let fault = |cause: &dyn std::fmt::Display| {
            Error::configuration(format!(
                "Failed to read the winrm password for storage path: {}: {}",
                path, cause
            ))
        };

        let storage = ctx
            .storage
            .as_ref()
            .ok_or_else(|| fault(&"no key storage is available"))?;
        let parsed = StoragePath::parse(&path).map_err(|e| fault(&e))?;
        debug!(path = %parsed, "reading password from key storage");

        let bytes = storage.read_resource(&parsed).await.map_err(|e| fault(&e))?;
        let text = String::from_utf8(bytes).map_err(|e| fault(&e))?;
        Ok(SensitiveString::new(text))
    }
}

#[async_trait]
impl PasswordStrategy for SecretResolver {
    async fn password(
        &self,
        properties: &PropertyResolver<'_>,
        ctx: &ExecutionContext,
    ) -> Result<Option<SensitiveString>> {
        let storage_path = properties
            .resolve_optional(self.storage_path_key.as_deref(), None)
            .filter(|p| !p.trim().is_empty());

        if let Some(path) = storage_path {
            return self.read_storage(path.trim(), ctx).await.map(Some);
        }

        let option = properties
            .resolve(&self.option_key, Some(&self.default_option))
            .unwrap_or_default();
        debug!(option = %option, "reading password from secure option");

        Ok(evaluate_secure_option(
            &option,
            ctx.private_data_context.as_ref(),
            self.implicit_dataset.as_deref(),
        )
        .map(SensitiveString::new))
    }
}

/// Look up a secure option named `dataset.name` in the private data context.
///
/// The name is split on the first `.` only, so `option.db.pass` is the option
/// `db.pass` of dataset `option`. A name without a dot uses
/// `implicit_dataset`; with no implicit dataset it resolves to nothing.
pub fn evaluate_secure_option(
    option: &str,
    private: Option<&DataContext>,
    implicit_dataset: Option<&str>,
) -> Option<String> {
    let private = private?;
    let (dataset, name) = match option.split_once('.') {
        Some((dataset, name)) => (dataset, name),
        None => (implicit_dataset?, option),
    };
    private.get(dataset)?.get(name).cloned()
}
