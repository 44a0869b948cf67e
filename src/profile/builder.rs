//! Connection profile assembly.
//!
//! [`ConnectionProfileBuilder::build`] resolves every connection option for a
//! node in a fixed order, so the first configuration fault a user sees is
//! always the same one for the same input:
//!
//! 1. authentication mechanism and protocol
//! 2. username, and whether Kerberos is in effect
//! 3. Kerberos principal and options
//! 4. password
//! 5. HTTPS trust policies
//! 6. port
//! 7. timeouts and locale

use std::sync::Arc;
use tracing::{debug, instrument};

use super::kerberos::{DerivedRealm, HostnameRealm, PrincipalRequest, UsernameStrategy};
use super::{
    AuthMechanism, CertificateTrust, ConnectionProfile, HostnameVerification, KerberosOptions,
    OperatingSystemFamily, Protocol,
};
use crate::config::{RealmDerivation, Settings};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::node::NodeTarget;
use crate::properties::{FrameworkSource, PropertyResolver};
use crate::secrets::{PasswordStrategy, SecretResolver};

/// Adjusts a resolved profile right before it is used to connect.
pub trait PreConnectHook: Send + Sync {
    fn before_connect(&self, profile: ConnectionProfile) -> Result<ConnectionProfile>;
}

impl<F> PreConnectHook for F
where
    F: Fn(ConnectionProfile) -> Result<ConnectionProfile> + Send + Sync,
{
    fn before_connect(&self, profile: ConnectionProfile) -> Result<ConnectionProfile> {
        self(profile)
    }
}

/// Builds [`ConnectionProfile`]s from layered configuration.
#[derive(Clone)]
pub struct ConnectionProfileBuilder {
    settings: Arc<Settings>,
    username_strategy: Arc<dyn UsernameStrategy>,
    password_strategy: Arc<dyn PasswordStrategy>,
    pre_connect: Option<Arc<dyn PreConnectHook>>,
}

impl ConnectionProfileBuilder {
    /// Create a builder with the default strategies for `settings`.
    pub fn new(settings: Arc<Settings>) -> Self {
        let username_strategy: Arc<dyn UsernameStrategy> = match settings.realm_derivation {
            RealmDerivation::Derived => Arc::new(DerivedRealm),
            RealmDerivation::Hostname => Arc::new(HostnameRealm),
        };
        let password_strategy = Arc::new(SecretResolver::new(&settings));
        Self {
            settings,
            username_strategy,
            password_strategy,
            pre_connect: None,
        }
    }

    /// Replace the Kerberos username strategy
    pub fn with_username_strategy(mut self, strategy: impl UsernameStrategy + 'static) -> Self {
        self.username_strategy = Arc::new(strategy);
        self
    }

    /// Replace the password strategy
    pub fn with_password_strategy(mut self, strategy: impl PasswordStrategy + 'static) -> Self {
        self.password_strategy = Arc::new(strategy);
        self
    }

    /// Install a hook run on every profile before connecting
    pub fn with_pre_connect_hook(mut self, hook: impl PreConnectHook + 'static) -> Self {
        self.pre_connect = Some(Arc::new(hook));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolve the profile for `node` and pass it through the pre-connect hook.
    pub async fn build(
        &self,
        ctx: &ExecutionContext,
        node: &NodeTarget,
        framework: &dyn FrameworkSource,
    ) -> Result<ConnectionProfile> {
        let profile = self.resolve(ctx, node, framework).await?;
        self.apply_pre_connect(profile)
    }

    /// Run the pre-connect hook, if one is installed.
    pub fn apply_pre_connect(&self, profile: ConnectionProfile) -> Result<ConnectionProfile> {
        match &self.pre_connect {
            Some(hook) => hook.before_connect(profile),
            None => Ok(profile),
        }
    }

    /// Resolve the profile for `node` without running the pre-connect hook.
    #[instrument(skip_all, fields(node = %node.name, project = %ctx.project))]
    pub async fn resolve(
        &self,
        ctx: &ExecutionContext,
        node: &NodeTarget,
        framework: &dyn FrameworkSource,
    ) -> Result<ConnectionProfile> {
        let keys = &self.settings.keys;
        let props = PropertyResolver::new(node, &ctx.project, framework);

        let address = node.extract_hostname().ok_or_else(|| {
            Error::configuration(format!(
                "Hostname must be set to connect to remote node '{}'",
                node.name
            ))
        })?;

        let auth = props
            .resolve(&keys.auth_type, None)
            .map_or(self.settings.default_auth, |v| AuthMechanism::from_property(&v));
        let protocol = props
            .resolve(&keys.protocol, None)
            .map_or(self.settings.default_protocol, |v| Protocol::from_property(&v));

        let username = self.username(&props, ctx).ok_or_else(|| {
            Error::configuration(format!(
                "Username must be set to connect to remote node '{}'",
                node.name
            ))
        })?;

        let is_kerberos =
            username.find('@').is_some_and(|at| at > 0) || auth == AuthMechanism::Kerberos;

        let (username, kerberos) = if is_kerberos {
            let domain = props.resolve_optional(keys.domain.as_deref(), None);
            let request = PrincipalRequest {
                username: &username,
                hostname: address,
                domain: domain.as_deref(),
                domain_member: props.resolve_optional_bool(keys.is_domain_member.as_deref(), false),
            };
            let principal = self.username_strategy.username(&request)?;
            let options = KerberosOptions {
                debug: props.resolve_bool(&keys.kerberos_debug, false),
                spn_add_port: props.resolve_bool(&keys.spn_add_port, false),
                spn_use_http: props.resolve_bool(&keys.spn_use_http, false),
                ticket_cache: props.resolve_optional_bool(keys.kerberos_cache.as_deref(), false),
            };
            (principal, Some(options))
        } else {
            (username, None)
        };

        let password = self
            .password_strategy
            .password(&props, ctx)
            .await?
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::configuration("Password was not set"))?;

        let (cert_trust, hostname_verification) = if protocol.is_https() {
            (
                Some(CertificateTrust::from_property(
                    props.resolve(&keys.cert_trust, None).as_deref(),
                )),
                Some(HostnameVerification::from_property(
                    props.resolve(&keys.hostname_trust, None).as_deref(),
                )),
            )
        } else {
            (None, None)
        };

        let port = self.port(&props, protocol)?;

        let timeout = props.resolve_long(
            &keys.connection_timeout,
            self.settings.default_connection_timeout_millis,
        )?;
        let connection_timeout_millis = u64::try_from(timeout).map_err(|_| {
            Error::configuration(format!(
                "Not a valid connection timeout: {}: {}",
                keys.connection_timeout, timeout
            ))
        })?;

        let profile = ConnectionProfile {
            address: address.to_string(),
            port,
            username,
            password,
            os: OperatingSystemFamily::Windows,
            protocol,
            auth: if is_kerberos {
                AuthMechanism::Kerberos
            } else {
                AuthMechanism::Basic
            },
            cert_trust,
            hostname_verification,
            connection_timeout_millis,
            locale: props.resolve(&keys.locale, None),
            winrm_timeout: props.resolve(&keys.winrm_timeout, None),
            kerberos,
            destination_dir: None,
        };

        debug!(
            address = %profile.address,
            port = profile.port,
            protocol = %profile.protocol,
            auth = %profile.auth,
            username = %profile.username,
            "resolved connection profile"
        );
        Ok(profile)
    }

    /// Node username if set, else the user property; `${...}` references are
    /// substituted from the data context.
    fn username(&self, props: &PropertyResolver<'_>, ctx: &ExecutionContext) -> Option<String> {
        let user = match props.node().username() {
            Some(user) => Some(user.to_string()),
            None => props.resolve(&self.settings.keys.user, self.settings.default_user.as_deref()),
        }?;
        if user.contains("${") {
            Some(ctx.substitute(&user))
        } else {
            Some(user)
        }
    }

    /// Node port if present (and then it must be numeric), else the port
    /// property with the protocol's default.
    fn port(&self, props: &PropertyResolver<'_>, protocol: Protocol) -> Result<u16> {
        if let Some(raw) = props.node().extract_port() {
            return raw.parse::<u16>().map_err(|e| {
                Error::configuration_with_source(format!("Port number is not valid: {}", raw), e)
            });
        }
        let port = props.resolve_int(&self.settings.keys.port, i32::from(protocol.default_port()))?;
        u16::try_from(port)
            .map_err(|e| Error::configuration_with_source(format!("Port number is not valid: {}", port), e))
    }
}

impl std::fmt::Debug for ConnectionProfileBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfileBuilder")
            .field("preset", &self.settings.preset)
            .field("pre_connect", &self.pre_connect.is_some())
            .finish_non_exhaustive()
    }
}
