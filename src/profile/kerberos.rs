//! Kerberos principal construction.
//!
//! Kerberos needs `principal@REALM` with an upper-case realm. Usernames are
//! often configured without a realm, so it is derived from what is known about
//! the node.

use crate::error::{Error, Result};

/// Inputs for deriving a Kerberos principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrincipalRequest<'a> {
    /// Resolved username, possibly already carrying `@realm`
    pub username: &'a str,
    /// Node hostname, possibly carrying a `:port` suffix
    pub hostname: &'a str,
    /// Domain override
    pub domain: Option<&'a str>,
    /// Whether the node is a member of the domain its FQDN names
    pub domain_member: bool,
}

/// Derives the username sent to the transport for Kerberos authentication.
pub trait UsernameStrategy: Send + Sync {
    fn username(&self, request: &PrincipalRequest<'_>) -> Result<String>;
}

impl<F> UsernameStrategy for F
where
    F: Fn(&PrincipalRequest<'_>) -> Result<String> + Send + Sync,
{
    fn username(&self, request: &PrincipalRequest<'_>) -> Result<String> {
        self(request)
    }
}

/// Realm from the domain override, else from the node FQDN.
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedRealm;

impl UsernameStrategy for DerivedRealm {
    fn username(&self, request: &PrincipalRequest<'_>) -> Result<String> {
        kerberos_username(request)
    }
}

/// Realm is the node hostname, appended as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostnameRealm;

impl UsernameStrategy for HostnameRealm {
    fn username(&self, request: &PrincipalRequest<'_>) -> Result<String> {
        if let Some(qualified) = upper_case_realm(request.username) {
            return Ok(qualified);
        }
        Ok(format!("{}@{}", request.username, strip_port(request.hostname)))
    }
}

/// Build `principal@REALM`.
///
/// - `user@realm` keeps the principal and upper-cases the realm.
/// - Otherwise a domain override gives `user@OVERRIDE`.
/// - Otherwise the realm is the upper-cased hostname without its port. For
///   domain members the first label is dropped: `host.corp.example.com`
///   becomes `CORP.EXAMPLE.COM`, and a two-label `host.tld` becomes `TLD`.
pub fn kerberos_username(request: &PrincipalRequest<'_>) -> Result<String> {
    if let Some(qualified) = upper_case_realm(request.username) {
        return Ok(qualified);
    }
    if request.username.contains('@') {
        // Leading '@': no principal to qualify
        return Ok(request.username.to_string());
    }

    if let Some(domain) = request.domain {
        return Ok(format!("{}@{}", request.username, domain.to_uppercase()));
    }

    let mut realm = strip_port(request.hostname).to_uppercase();
    if request.domain_member {
        realm = match realm.split_once('.') {
            Some((_, rest)) if !rest.is_empty() => rest.to_string(),
            _ => {
                return Err(Error::configuration(format!(
                    "Node FQDN is not correct for configuration as domain member (no '.' found:{})",
                    realm
                )))
            }
        };
    }
    Ok(format!("{}@{}", request.username, realm))
}

/// `user@realm` -> `user@REALM`; `None` when there is no principal before `@`.
fn upper_case_realm(username: &str) -> Option<String> {
    match username.find('@') {
        Some(at) if at > 0 => {
            let (principal, realm) = username.split_at(at);
            Some(format!("{}{}", principal, realm.to_uppercase()))
        }
        _ => None,
    }
}

fn strip_port(hostname: &str) -> &str {
    // Bare IPv6 addresses carry several colons and no port
    match hostname.split_once(':') {
        Some((host, port)) if !port.contains(':') => host,
        _ => hostname,
    }
}
