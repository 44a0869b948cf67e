//! Settings for profile resolution.
//!
//! Every property key and built-in default consulted while resolving a
//! connection profile lives in [`Settings`]. The struct is immutable once built
//! and is threaded through every call; there is no process-wide state.
//!
//! Two key layouts are known:
//!
//! - [`Preset::Current`]: the full key set, including password storage paths,
//!   domain membership and the Kerberos ticket cache.
//! - [`Preset::Legacy`]: the older layout, where the user comes from
//!   `winrm-user`, the password option must name its dataset explicitly and the
//!   Kerberos realm is the node hostname taken verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::command::CommandStyle;
use crate::profile::{AuthMechanism, Protocol};

/// Default WinRM HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 5985;

/// Default WinRM HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 5986;

/// Default connection timeout in milliseconds
pub const DEFAULT_CONNECTION_TIMEOUT_MILLIS: i64 = 15_000;

/// Prefix applied to a key when looking it up in project properties
pub const PROJECT_PREFIX: &str = "project.";

/// Prefix applied to a key when looking it up in framework properties
pub const FRAMEWORK_PREFIX: &str = "framework.";

/// Dataset used for secure options whose key carries no dataset
pub const DEFAULT_OPTION_DATASET: &str = "option";

/// Name used as the log prompt for job output
pub const PROVIDER_NAME: &str = "winrm-exec";

/// Property keys of the current layout.
pub mod keys {
    pub const AUTH_TYPE: &str = "winrm-auth-type";
    pub const PROTOCOL: &str = "winrm-protocol";
    pub const CERT_TRUST: &str = "winrm-cert-trust";
    pub const HOSTNAME_TRUST: &str = "winrm-hostname-trust";
    pub const SPN_ADD_PORT: &str = "winrm-spn-add-port";
    pub const SPN_USE_HTTP: &str = "winrm-spn-use-http";
    pub const LOCALE: &str = "winrm-locale";
    pub const WINRM_TIMEOUT: &str = "winrm-timeout";
    pub const CONNECTION_TIMEOUT: &str = "winrm-connection-timeout";
    pub const PORT: &str = "winrm-port";
    pub const PASSWORD_STORAGE_PATH: &str = "winrm-password-storage-path";
    pub const PASSWORD_OPTION: &str = "winrm-password-option";
    pub const USER_OPTION: &str = "winrm-user-option";
    pub const LEGACY_USER: &str = "winrm-user";
    pub const COMMAND_TYPE: &str = "winrm-cmd";
    pub const FILE_COPY_DESTINATION_DIR: &str = "file-copy-destination-dir";
    pub const IS_DOMAIN_MEMBER: &str = "winrm-is-domain-member";
    pub const DOMAIN: &str = "winrm-domain";
    pub const KERBEROS_CACHE: &str = "kerberos-cache";
    pub const KERBEROS_DEBUG: &str = "winrm-kerberos-debug";
}

/// Named key layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Current key layout
    #[default]
    Current,
    /// Older key layout kept for existing project configurations
    Legacy,
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::Current => write!(f, "current"),
            Preset::Legacy => write!(f, "legacy"),
        }
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "current" | "default" => Ok(Preset::Current),
            "legacy" => Ok(Preset::Legacy),
            _ => Err(format!("Unknown settings preset: {}", s)),
        }
    }
}

/// How a Kerberos realm is derived when the username carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealmDerivation {
    /// Domain override, else the upper-cased hostname (reduced for domain members)
    Derived,
    /// The node hostname, appended verbatim
    Hostname,
}

/// Property keys consulted during resolution.
///
/// A key set to `None` is not supported by the layout and always resolves to
/// its built-in default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyKeys {
    pub auth_type: String,
    pub protocol: String,
    pub cert_trust: String,
    pub hostname_trust: String,
    pub spn_add_port: String,
    pub spn_use_http: String,
    pub locale: String,
    pub winrm_timeout: String,
    pub connection_timeout: String,
    pub port: String,
    pub password_storage_path: Option<String>,
    pub password_option: String,
    pub user: String,
    pub command_type: Option<String>,
    pub file_copy_destination_dir: String,
    pub is_domain_member: Option<String>,
    pub domain: Option<String>,
    pub kerberos_cache: Option<String>,
    pub kerberos_debug: String,
}

impl PropertyKeys {
    fn current() -> Self {
        Self {
            auth_type: keys::AUTH_TYPE.to_string(),
            protocol: keys::PROTOCOL.to_string(),
            cert_trust: keys::CERT_TRUST.to_string(),
            hostname_trust: keys::HOSTNAME_TRUST.to_string(),
            spn_add_port: keys::SPN_ADD_PORT.to_string(),
            spn_use_http: keys::SPN_USE_HTTP.to_string(),
            locale: keys::LOCALE.to_string(),
            winrm_timeout: keys::WINRM_TIMEOUT.to_string(),
            connection_timeout: keys::CONNECTION_TIMEOUT.to_string(),
            port: keys::PORT.to_string(),
            password_storage_path: Some(keys::PASSWORD_STORAGE_PATH.to_string()),
            password_option: keys::PASSWORD_OPTION.to_string(),
            user: keys::USER_OPTION.to_string(),
            command_type: Some(keys::COMMAND_TYPE.to_string()),
            file_copy_destination_dir: keys::FILE_COPY_DESTINATION_DIR.to_string(),
            is_domain_member: Some(keys::IS_DOMAIN_MEMBER.to_string()),
            domain: Some(keys::DOMAIN.to_string()),
            kerberos_cache: Some(keys::KERBEROS_CACHE.to_string()),
            kerberos_debug: keys::KERBEROS_DEBUG.to_string(),
        }
    }

    fn legacy() -> Self {
        Self {
            password_storage_path: None,
            user: keys::LEGACY_USER.to_string(),
            command_type: None,
            is_domain_member: None,
            domain: None,
            kerberos_cache: None,
            ..Self::current()
        }
    }
}

/// Immutable resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Layout these settings were built from
    pub preset: Preset,
    /// Property keys
    pub keys: PropertyKeys,
    /// Authentication mechanism when none is configured
    pub default_auth: AuthMechanism,
    /// Protocol when none is configured
    pub default_protocol: Protocol,
    /// Username when neither the node nor the properties provide one
    pub default_user: Option<String>,
    /// Secure option consulted for the password when none is configured
    pub default_password_option: String,
    /// Dataset assumed for secure option keys without a `.`; `None` makes such keys unresolvable
    pub implicit_option_dataset: Option<String>,
    /// Realm derivation for Kerberos usernames
    pub realm_derivation: RealmDerivation,
    /// Command style when none is configured
    pub default_command_style: CommandStyle,
    /// Connection timeout in milliseconds when none is configured
    pub default_connection_timeout_millis: i64,
    /// Prefix for temporary remote file names
    pub temp_file_prefix: String,
}

impl Settings {
    /// Settings for the current key layout.
    pub fn current() -> Self {
        Self {
            preset: Preset::Current,
            keys: PropertyKeys::current(),
            default_auth: AuthMechanism::Kerberos,
            default_protocol: Protocol::Https,
            default_user: Some("winrmUser".to_string()),
            default_password_option: "winrmPassword".to_string(),
            implicit_option_dataset: Some(DEFAULT_OPTION_DATASET.to_string()),
            realm_derivation: RealmDerivation::Derived,
            default_command_style: CommandStyle::Raw,
            default_connection_timeout_millis: DEFAULT_CONNECTION_TIMEOUT_MILLIS,
            temp_file_prefix: "WINRM_TMP".to_string(),
        }
    }

    /// Settings for the legacy key layout.
    pub fn legacy() -> Self {
        Self {
            preset: Preset::Legacy,
            keys: PropertyKeys::legacy(),
            default_user: None,
            default_password_option: "option.winrmPassword".to_string(),
            implicit_option_dataset: None,
            realm_derivation: RealmDerivation::Hostname,
            ..Self::current()
        }
    }

    /// Settings for a named preset.
    pub fn for_preset(preset: Preset) -> Self {
        match preset {
            Preset::Current => Self::current(),
            Preset::Legacy => Self::legacy(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::current()
    }
}
