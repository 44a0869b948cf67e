//! Connection profiles.
//!
//! A [`ConnectionProfile`] is everything the transport needs to reach one
//! Windows node: address, port, protocol, credentials, authentication mechanism
//! and TLS policy. Profiles are assembled by the [`ConnectionProfileBuilder`]
//! fresh for every action and are never cached.

pub mod builder;
pub mod kerberos;

pub use builder::{ConnectionProfileBuilder, PreConnectHook};
pub use kerberos::{
    kerberos_username, DerivedRealm, HostnameRealm, PrincipalRequest, UsernameStrategy,
};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use crate::secrets::SensitiveString;

// ============================================================================
// Enumerations
// ============================================================================

/// Authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMechanism {
    Kerberos,
    Basic,
}

impl AuthMechanism {
    /// Exactly `kerberos` selects Kerberos; every other value, including
    /// `Kerberos`, is Basic.
    pub fn from_property(value: &str) -> Self {
        if value == "kerberos" {
            AuthMechanism::Kerberos
        } else {
            AuthMechanism::Basic
        }
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMechanism::Kerberos => write!(f, "kerberos"),
            AuthMechanism::Basic => write!(f, "basic"),
        }
    }
}

/// Transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// `https` (any case) selects HTTPS; every other value is HTTP.
    pub fn from_property(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("https") {
            Protocol::Https
        } else {
            Protocol::Http
        }
    }

    pub fn is_https(&self) -> bool {
        matches!(self, Protocol::Https)
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Http => DEFAULT_HTTP_PORT,
            Protocol::Https => DEFAULT_HTTPS_PORT,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Server certificate trust policy for HTTPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateTrust {
    /// Only certificates chaining to a trusted root
    Strict,
    /// Trusted roots plus self-signed certificates
    SelfSigned,
    /// Any certificate
    AllowAll,
}

impl CertificateTrust {
    /// `default` and unknown values are strict; `self-signed` and `all` relax it.
    pub fn from_property(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("self-signed") => CertificateTrust::SelfSigned,
            Some("all") => CertificateTrust::AllowAll,
            _ => CertificateTrust::Strict,
        }
    }
}

/// Hostname verification policy for HTTPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostnameVerification {
    /// Exact match, no wildcard subdomains
    Strict,
    /// Wildcards match one or more subdomain levels
    BrowserCompatible,
    /// No verification
    AllowAll,
}

impl HostnameVerification {
    /// Unknown values fall back to browser-compatible.
    pub fn from_property(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("strict") => HostnameVerification::Strict,
            Some("all") => HostnameVerification::AllowAll,
            _ => HostnameVerification::BrowserCompatible,
        }
    }
}

/// Operating system family of the target. Only Windows is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystemFamily {
    #[default]
    Windows,
}

// ============================================================================
// Profile
// ============================================================================

/// Kerberos specific connection options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KerberosOptions {
    /// Enable Kerberos debug output in the transport
    pub debug: bool,
    /// Append the port to the service principal name
    pub spn_add_port: bool,
    /// Use the `HTTP` service class instead of `WSMAN`
    pub spn_use_http: bool,
    /// Authenticate with the local ticket cache instead of the password
    pub ticket_cache: bool,
}

/// Fully resolved connection options for one action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionProfile {
    /// Hostname or address, without port
    pub address: String,
    pub port: u16,
    /// Username; `principal@REALM` when Kerberos is used
    pub username: String,
    pub password: SensitiveString,
    pub os: OperatingSystemFamily,
    pub protocol: Protocol,
    pub auth: AuthMechanism,
    /// Set for HTTPS only
    pub cert_trust: Option<CertificateTrust>,
    /// Set for HTTPS only
    pub hostname_verification: Option<HostnameVerification>,
    pub connection_timeout_millis: u64,
    pub locale: Option<String>,
    /// WinRM operation timeout as an XML duration, e.g. `PT60.000S`
    pub winrm_timeout: Option<String>,
    /// Set for Kerberos only
    pub kerberos: Option<KerberosOptions>,
    /// Directory new remote files are created in when copying
    pub destination_dir: Option<String>,
}

impl ConnectionProfile {
    /// WS-Management endpoint URL
    pub fn endpoint_url(&self) -> String {
        let host = if self.address.contains(':') {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        };
        format!("{}://{}:{}/wsman", self.protocol.scheme(), host, self.port)
    }

    pub fn is_kerberos(&self) -> bool {
        self.auth == AuthMechanism::Kerberos || self.kerberos.is_some()
    }
}
