//! Connection profile builder tests
//!
//! Tests for assembling connection profiles from node attributes, project and
//! framework properties, secure options and key storage.

mod common;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;

use winrm_exec::config::{Preset, Settings};
use winrm_exec::context::ExecutionContext;
use winrm_exec::node::NodeTarget;
use winrm_exec::profile::{
    AuthMechanism, CertificateTrust, ConnectionProfile, ConnectionProfileBuilder,
    HostnameVerification, KerberosOptions, PrincipalRequest, Protocol,
};
use winrm_exec::properties::{FrameworkProperties, PropertyResolver};
use winrm_exec::secrets::{
    FileStorageTree, MemoryStorageTree, PasswordStrategy, SensitiveString,
};
use winrm_exec::Result;

use common::{basic_node, context, framework, kerberos_node, RecordingListener, PASSWORD, PROJECT};

fn builder() -> ConnectionProfileBuilder {
    ConnectionProfileBuilder::new(Arc::new(Settings::current()))
}

fn legacy_builder() -> ConnectionProfileBuilder {
    ConnectionProfileBuilder::new(Arc::new(Settings::for_preset(Preset::Legacy)))
}

fn ctx() -> ExecutionContext {
    context(RecordingListener::new())
}

async fn build(node: &NodeTarget) -> Result<ConnectionProfile> {
    builder().build(&ctx(), node, &framework()).await
}

// ============================================================================
// Basic profiles
// ============================================================================

#[tokio::test]
async fn test_basic_http_profile() {
    let profile = build(&basic_node()).await.unwrap();

    assert_eq!(profile.address, "web01.corp.example.com");
    assert_eq!(profile.port, 5985);
    assert_eq!(profile.username, "svc_deploy");
    assert_eq!(profile.password.expose(), PASSWORD);
    assert_eq!(profile.protocol, Protocol::Http);
    assert_eq!(profile.auth, AuthMechanism::Basic);
    assert!(profile.kerberos.is_none());
    assert!(profile.cert_trust.is_none());
    assert!(profile.hostname_verification.is_none());
    assert_eq!(profile.connection_timeout_millis, 15_000);
    assert_eq!(profile.locale.as_deref(), Some("en-us"));
    assert_eq!(profile.winrm_timeout.as_deref(), Some("PT120.000S"));
    assert_eq!(profile.endpoint_url(), "http://web01.corp.example.com:5985/wsman");
}

#[tokio::test]
async fn test_defaults_are_kerberos_over_https() {
    let profile = build(&kerberos_node()).await.unwrap();

    assert_eq!(profile.protocol, Protocol::Https);
    assert_eq!(profile.port, 5986);
    assert_eq!(profile.auth, AuthMechanism::Kerberos);
    assert_eq!(profile.username, "alice@APP01.CORP.EXAMPLE.COM");
    assert_eq!(profile.cert_trust, Some(CertificateTrust::Strict));
    assert_eq!(
        profile.hostname_verification,
        Some(HostnameVerification::BrowserCompatible)
    );
    assert_eq!(profile.kerberos, Some(KerberosOptions::default()));
}

#[tokio::test]
async fn test_build_is_repeatable() {
    let node = kerberos_node().with_attribute("winrm-is-domain-member", "true");
    let b = builder();
    let fw = framework();
    let first = b.build(&ctx(), &node, &fw).await.unwrap();
    let second = b.build(&ctx(), &node, &fw).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_hostname() {
    let node = NodeTarget {
        name: "ghost".into(),
        username: Some("svc".into()),
        ..Default::default()
    };
    let err = build(&node).await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(
        err.to_string(),
        "Hostname must be set to connect to remote node 'ghost'"
    );
}

#[tokio::test]
async fn test_default_username_from_current_layout() {
    let node = NodeTarget::new("web01", "web01.corp.example.com")
        .with_attribute("winrm-auth-type", "basic");
    let profile = build(&node).await.unwrap();
    assert_eq!(profile.username, "winrmUser");
}

#[tokio::test]
async fn test_username_property_used_when_node_has_none() {
    let node = NodeTarget::new("web01", "web01.corp.example.com")
        .with_username("   ")
        .with_attribute("winrm-auth-type", "basic");
    let fw = framework().with_project_property(PROJECT, "project.winrm-user-option", "deployer");
    let profile = builder().build(&ctx(), &node, &fw).await.unwrap();
    assert_eq!(profile.username, "deployer");
}

#[tokio::test]
async fn test_username_data_reference_substituted() {
    let node = basic_node().with_username("${job.user}");
    let ctx = ctx().with_data("job", "user", "batch_runner");
    let profile = builder().build(&ctx, &node, &framework()).await.unwrap();
    assert_eq!(profile.username, "batch_runner");
}

// ============================================================================
// Kerberos
// ============================================================================

#[tokio::test]
async fn test_kerberos_domain_member_drops_host_label() {
    let node = kerberos_node().with_attribute("winrm-is-domain-member", "true");
    let profile = build(&node).await.unwrap();
    assert_eq!(profile.username, "alice@CORP.EXAMPLE.COM");
}

#[tokio::test]
async fn test_kerberos_domain_override_wins() {
    let node = kerberos_node()
        .with_attribute("winrm-is-domain-member", "true")
        .with_attribute("winrm-domain", "ad.example.org");
    let profile = build(&node).await.unwrap();
    assert_eq!(profile.username, "alice@AD.EXAMPLE.ORG");
}

#[tokio::test]
async fn test_kerberos_realm_ignores_hostname_port() {
    let node = NodeTarget::new("app01", "app01.corp.example.com:15986").with_username("alice");
    let profile = build(&node).await.unwrap();
    assert_eq!(profile.address, "app01.corp.example.com");
    assert_eq!(profile.port, 15986);
    assert_eq!(profile.username, "alice@APP01.CORP.EXAMPLE.COM");
}

#[tokio::test]
async fn test_domain_member_without_dot_is_a_fault() {
    let node = NodeTarget::new("app01", "app01")
        .with_username("alice")
        .with_attribute("winrm-is-domain-member", "true");
    let err = build(&node).await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(
        err.to_string(),
        "Node FQDN is not correct for configuration as domain member (no '.' found:APP01)"
    );
}

#[tokio::test]
async fn test_at_sign_forces_kerberos_under_basic() {
    let node = basic_node().with_username("svc@corp.example.com");
    let profile = build(&node).await.unwrap();
    assert_eq!(profile.auth, AuthMechanism::Kerberos);
    assert_eq!(profile.username, "svc@CORP.EXAMPLE.COM");
    assert!(profile.kerberos.is_some());
}

#[tokio::test]
async fn test_leading_at_sign_does_not_force_kerberos() {
    let node = basic_node().with_username("@svc");
    let profile = build(&node).await.unwrap();
    assert_eq!(profile.auth, AuthMechanism::Basic);
    assert_eq!(profile.username, "@svc");
}

#[tokio::test]
async fn test_kerberos_options_resolved_across_scopes() {
    let node = kerberos_node().with_attribute("winrm-spn-add-port", "true");
    let fw = framework()
        .with_project_property(PROJECT, "project.winrm-spn-use-http", "TRUE")
        .with_framework_property("framework.kerberos-cache", "true")
        .with_framework_property("framework.winrm-kerberos-debug", "yes");
    let profile = builder().build(&ctx(), &node, &fw).await.unwrap();
    assert_eq!(
        profile.kerberos,
        Some(KerberosOptions {
            debug: false,
            spn_add_port: true,
            spn_use_http: true,
            ticket_cache: true,
        })
    );
}

#[tokio::test]
async fn test_auth_type_matches_exactly() {
    let node = NodeTarget::new("app01", "app01.corp.example.com")
        .with_username("alice")
        .with_attribute("winrm-auth-type", "KERBEROS")
        .with_attribute("winrm-protocol", "HTTPS");
    let profile = build(&node).await.unwrap();
    // Only the lower-case auth type selects Kerberos; the protocol ignores case
    assert_eq!(profile.auth, AuthMechanism::Basic);
    assert_eq!(profile.username, "alice");
    assert!(profile.kerberos.is_none());
    assert_eq!(profile.protocol, Protocol::Https);
    assert_eq!(profile.port, 5986);
}

#[tokio::test]
async fn test_custom_username_strategy() {
    let b = builder().with_username_strategy(|req: &PrincipalRequest<'_>| -> Result<String> {
        Ok(format!("{}@EXAMPLE.TEST", req.username.to_uppercase()))
    });
    let profile = b.build(&ctx(), &kerberos_node(), &framework()).await.unwrap();
    assert_eq!(profile.username, "ALICE@EXAMPLE.TEST");
}

// ============================================================================
// Password
// ============================================================================

#[tokio::test]
async fn test_password_missing() {
    let ctx = ExecutionContext::new(PROJECT);
    let err = builder()
        .build(&ctx, &basic_node(), &framework())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Password was not set");
}

#[tokio::test]
async fn test_empty_password_counts_as_missing() {
    let ctx = ExecutionContext::new(PROJECT).with_private_data("option", "winrmPassword", "");
    let err = builder()
        .build(&ctx, &basic_node(), &framework())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Password was not set");
}

#[tokio::test]
async fn test_password_option_with_explicit_dataset() {
    let node = basic_node().with_attribute("winrm-password-option", "secure.adminPass");
    let ctx = ExecutionContext::new(PROJECT).with_private_data("secure", "adminPass", "p@ss");
    let profile = builder().build(&ctx, &node, &framework()).await.unwrap();
    assert_eq!(profile.password.expose(), "p@ss");
}

#[tokio::test]
async fn test_storage_path_takes_precedence_over_option() {
    let storage = MemoryStorageTree::new();
    storage.insert("keys/ops/winrm.password", "from-storage").unwrap();
    let ctx = ctx().with_storage(Arc::new(storage));
    let node = basic_node().with_attribute("winrm-password-storage-path", "keys/ops/winrm.password");

    let profile = builder().build(&ctx, &node, &framework()).await.unwrap();
    assert_eq!(profile.password.expose(), "from-storage");
}

#[tokio::test]
async fn test_storage_path_substitutes_data_references() {
    let storage = MemoryStorageTree::new();
    storage.insert("keys/ops/web01.password", "per-node").unwrap();
    let ctx = ctx()
        .with_storage(Arc::new(storage))
        .with_data("node", "name", "web01");
    let fw = framework().with_project_property(
        PROJECT,
        "project.winrm-password-storage-path",
        "keys/ops/${node.name}.password",
    );

    let profile = builder().build(&ctx, &basic_node(), &fw).await.unwrap();
    assert_eq!(profile.password.expose(), "per-node");
}

#[tokio::test]
async fn test_storage_failure_does_not_fall_back_to_option() {
    let ctx = ctx().with_storage(Arc::new(MemoryStorageTree::new()));
    let node = basic_node().with_attribute("winrm-password-storage-path", "keys/missing");

    let err = builder().build(&ctx, &node, &framework()).await.unwrap_err();
    assert!(err.is_configuration());
    assert!(err
        .to_string()
        .starts_with("Failed to read the winrm password for storage path: keys/missing"));
}

#[tokio::test]
async fn test_storage_path_without_storage_tree() {
    let node = basic_node().with_attribute("winrm-password-storage-path", "keys/ops/pw");
    let err = build(&node).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to read the winrm password for storage path: keys/ops/pw: no key storage is available"
    );
}

#[tokio::test]
async fn test_blank_storage_path_uses_option() {
    let ctx = ctx().with_storage(Arc::new(MemoryStorageTree::new()));
    let node = basic_node().with_attribute("winrm-password-storage-path", "   ");
    let profile = builder().build(&ctx, &node, &framework()).await.unwrap();
    assert_eq!(profile.password.expose(), PASSWORD);
}

#[tokio::test]
async fn test_file_storage_tree() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("keys").join("ops")).unwrap();
    std::fs::write(dir.path().join("keys").join("ops").join("winrm"), "on-disk").unwrap();

    let ctx = ctx().with_storage(Arc::new(FileStorageTree::new(dir.path())));
    let node = basic_node().with_attribute("winrm-password-storage-path", "/keys/ops/winrm");
    let profile = builder().build(&ctx, &node, &framework()).await.unwrap();
    assert_eq!(profile.password.expose(), "on-disk");
}

#[tokio::test]
async fn test_storage_path_escaping_tree_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx().with_storage(Arc::new(FileStorageTree::new(dir.path())));
    let node = basic_node().with_attribute("winrm-password-storage-path", "keys/../../etc/shadow");
    let err = builder().build(&ctx, &node, &framework()).await.unwrap_err();
    assert!(err.is_configuration());
}

struct FixedPassword(&'static str);

#[async_trait]
impl PasswordStrategy for FixedPassword {
    async fn password(
        &self,
        _properties: &PropertyResolver<'_>,
        _ctx: &ExecutionContext,
    ) -> Result<Option<SensitiveString>> {
        Ok(Some(SensitiveString::new(self.0)))
    }
}

#[tokio::test]
async fn test_custom_password_strategy() {
    let b = builder().with_password_strategy(FixedPassword("vaulted"));
    let profile = b
        .build(&ExecutionContext::new(PROJECT), &basic_node(), &framework())
        .await
        .unwrap();
    assert_eq!(profile.password.expose(), "vaulted");
}

// ============================================================================
// TLS, port and timeouts
// ============================================================================

#[tokio::test]
async fn test_https_trust_policies() {
    let node = kerberos_node()
        .with_attribute("winrm-cert-trust", "self-signed")
        .with_attribute("winrm-hostname-trust", "strict");
    let profile = build(&node).await.unwrap();
    assert_eq!(profile.cert_trust, Some(CertificateTrust::SelfSigned));
    assert_eq!(profile.hostname_verification, Some(HostnameVerification::Strict));

    let node = kerberos_node()
        .with_attribute("winrm-cert-trust", "all")
        .with_attribute("winrm-hostname-trust", "all");
    let profile = build(&node).await.unwrap();
    assert_eq!(profile.cert_trust, Some(CertificateTrust::AllowAll));
    assert_eq!(profile.hostname_verification, Some(HostnameVerification::AllowAll));
}

#[tokio::test]
async fn test_unknown_trust_values_fall_back() {
    let node = kerberos_node()
        .with_attribute("winrm-cert-trust", "Self-Signed")
        .with_attribute("winrm-hostname-trust", "lenient");
    let profile = build(&node).await.unwrap();
    assert_eq!(profile.cert_trust, Some(CertificateTrust::Strict));
    assert_eq!(
        profile.hostname_verification,
        Some(HostnameVerification::BrowserCompatible)
    );
}

#[tokio::test]
async fn test_http_ignores_trust_properties() {
    let node = basic_node()
        .with_attribute("winrm-cert-trust", "all")
        .with_attribute("winrm-hostname-trust", "%%%");
    let profile = build(&node).await.unwrap();
    assert!(profile.cert_trust.is_none());
    assert!(profile.hostname_verification.is_none());
}

#[tokio::test]
async fn test_node_port_must_be_numeric_even_with_property() {
    let node = basic_node()
        .with_port("abc")
        .with_attribute("winrm-port", "5999");
    let err = build(&node).await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(err.to_string(), "Port number is not valid: abc");
}

#[tokio::test]
async fn test_node_port_wins_over_property() {
    let node = basic_node().with_port("6000").with_attribute("winrm-port", "5999");
    assert_eq!(build(&node).await.unwrap().port, 6000);
}

#[tokio::test]
async fn test_port_property_from_project() {
    let fw = framework().with_project_property(PROJECT, "project.winrm-port", "5999");
    let profile = builder().build(&ctx(), &basic_node(), &fw).await.unwrap();
    assert_eq!(profile.port, 5999);
}

#[tokio::test]
async fn test_malformed_port_property() {
    let fw = framework().with_framework_property("framework.winrm-port", "http");
    let err = builder()
        .build(&ctx(), &basic_node(), &fw)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Not a valid integer: winrm-port: http");
}

#[tokio::test]
async fn test_connection_timeout() {
    let node = basic_node().with_attribute("winrm-connection-timeout", "60000");
    assert_eq!(build(&node).await.unwrap().connection_timeout_millis, 60_000);

    let node = basic_node().with_attribute("winrm-connection-timeout", "1m");
    let err = build(&node).await.unwrap_err();
    assert_eq!(err.to_string(), "Not a valid long: winrm-connection-timeout: 1m");
}

#[tokio::test]
async fn test_first_fault_is_reported() {
    // Username is resolved before the password and the port
    let node = NodeTarget::new("web01", "web01.corp.example.com")
        .with_port("abc")
        .with_attribute("winrm-auth-type", "basic");
    let err = legacy_builder()
        .build(&ExecutionContext::new(PROJECT), &node, &framework())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Username must be set to connect to remote node 'web01'"
    );
}

// ============================================================================
// Legacy layout
// ============================================================================

#[tokio::test]
async fn test_legacy_username_key() {
    let node = NodeTarget::new("web01", "web01.corp.example.com")
        .with_attribute("winrm-auth-type", "basic")
        .with_attribute("winrm-user", "legacy_svc")
        .with_attribute("winrm-user-option", "ignored");
    let profile = legacy_builder().build(&ctx(), &node, &framework()).await.unwrap();
    assert_eq!(profile.username, "legacy_svc");
}

#[tokio::test]
async fn test_legacy_has_no_default_username() {
    let node = NodeTarget::new("web01", "web01.corp.example.com");
    let err = legacy_builder()
        .build(&ctx(), &node, &framework())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Username must be set to connect to remote node 'web01'"
    );
}

#[tokio::test]
async fn test_legacy_realm_is_hostname_verbatim() {
    let node = kerberos_node()
        .with_attribute("winrm-domain", "ignored.example")
        .with_attribute("winrm-is-domain-member", "true");
    let profile = legacy_builder().build(&ctx(), &node, &framework()).await.unwrap();
    assert_eq!(profile.username, "alice@app01.corp.example.com");
    assert_eq!(profile.kerberos.map(|k| k.ticket_cache), Some(false));
}

#[tokio::test]
async fn test_legacy_ignores_storage_path() {
    let node = basic_node()
        .with_attribute("winrm-user", "svc")
        .with_attribute("winrm-password-storage-path", "keys/unused");
    let profile = legacy_builder().build(&ctx(), &node, &framework()).await.unwrap();
    assert_eq!(profile.password.expose(), PASSWORD);
}

#[tokio::test]
async fn test_legacy_option_requires_dataset() {
    let node = basic_node().with_attribute("winrm-password-option", "winrmPassword");
    let err = legacy_builder()
        .build(&ctx(), &node, &framework())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Password was not set");
}

// ============================================================================
// Hooks
// ============================================================================

#[tokio::test]
async fn test_pre_connect_hook_can_reject() {
    let b = builder().with_pre_connect_hook(|p: ConnectionProfile| -> Result<ConnectionProfile> {
        if p.protocol == Protocol::Http {
            return Err(winrm_exec::Error::configuration("plain HTTP is not allowed"));
        }
        Ok(p)
    });
    let err = b.build(&ctx(), &basic_node(), &framework()).await.unwrap_err();
    assert_eq!(err.to_string(), "plain HTTP is not allowed");
    assert!(b.build(&ctx(), &kerberos_node(), &framework()).await.is_ok());
}

#[tokio::test]
async fn test_profile_serialization_redacts_password() {
    let profile = build(&basic_node()).await.unwrap();
    let json = serde_json::to_string(&profile).unwrap();
    assert!(json.contains("[REDACTED]"));
    assert!(!json.contains(PASSWORD));
    assert!(!format!("{:?}", profile).contains(PASSWORD));
}

#[tokio::test]
async fn test_framework_properties_from_toml() {
    let fw = FrameworkProperties::from_toml(
        r#"
        [framework]
        "framework.winrm-protocol" = "http"
        "framework.winrm-auth-type" = "basic"

        [projects.ops]
        "project.winrm-port" = 8085
        "#,
    )
    .unwrap();
    let node = NodeTarget::new("web01", "web01.corp.example.com").with_username("svc");
    let profile = builder().build(&ctx(), &node, &fw).await.unwrap();
    assert_eq!(profile.port, 8085);
    assert_eq!(profile.auth, AuthMechanism::Basic);
    assert_eq!(profile.endpoint_url(), "http://web01.corp.example.com:8085/wsman");
}
