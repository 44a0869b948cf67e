//! Entry points called by the orchestration runtime.
//!
//! [`WinRmNodeExecutor`] runs a command on a node and [`WinRmFileCopier`]
//! places content on it. Both resolve a fresh profile for every call, report
//! configuration faults before anything touches the network, and hand the
//! action to a [`RemoteActionExecutor`].

use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::info;

use crate::command::{CommandLineBuilder, CommandStyle};
use crate::config::{Settings, PROVIDER_NAME};
use crate::connection::Transport;
use crate::context::{ExecutionContext, LogLevel};
use crate::error::Error;
use crate::executor::{report_failure, ActionFailure, ActionOutcome, FailureReason, RemoteActionExecutor};
use crate::node::NodeTarget;
use crate::profile::{ConnectionProfile, ConnectionProfileBuilder};
use crate::properties::{FrameworkSource, PropertyResolver};

fn configuration_failure(ctx: &ExecutionContext, err: Error) -> ActionFailure {
    report_failure(ctx, FailureReason::ConfigurationFailure, &err.to_string());
    err.into()
}

// ============================================================================
// Node executor
// ============================================================================

/// Executes commands on Windows nodes.
#[derive(Clone)]
pub struct WinRmNodeExecutor {
    framework: Arc<dyn FrameworkSource>,
    builder: ConnectionProfileBuilder,
    executor: RemoteActionExecutor,
}

impl WinRmNodeExecutor {
    pub fn new(
        framework: Arc<dyn FrameworkSource>,
        transport: Arc<dyn Transport>,
        settings: Arc<Settings>,
    ) -> Self {
        let executor =
            RemoteActionExecutor::new(transport).with_temp_file_prefix(settings.temp_file_prefix.clone());
        Self {
            framework,
            builder: ConnectionProfileBuilder::new(settings),
            executor,
        }
    }

    /// Use a customised profile builder
    pub fn with_profile_builder(mut self, builder: ConnectionProfileBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn profile_builder(&self) -> &ConnectionProfileBuilder {
        &self.builder
    }

    /// Run `args` on `node`.
    ///
    /// The command style comes from the `winrm-cmd` property.
    pub async fn execute_command<S: AsRef<str> + Sync>(
        &self,
        ctx: &ExecutionContext,
        args: &[S],
        node: &NodeTarget,
    ) -> ActionOutcome {
        if node.extract_hostname().is_none() {
            return Err(configuration_failure(
                ctx,
                Error::configuration(format!(
                    "Hostname must be set to connect to remote node '{}'",
                    node.name
                )),
            ));
        }

        let profile = self
            .builder
            .build(ctx, node, self.framework.as_ref())
            .await
            .map_err(|e| configuration_failure(ctx, e))?;

        let settings = self.builder.settings();
        let props = PropertyResolver::new(node, &ctx.project, self.framework.as_ref());
        let style = props
            .resolve_optional(settings.keys.command_type.as_deref(), None)
            .map_or(settings.default_command_style, |v| {
                CommandStyle::from_property(Some(&v))
            });

        let command = CommandLineBuilder::build(args, style);
        info!(node = %node.name, style = %style, "executing remote command");
        self.executor.execute_command(ctx, &profile, &command).await
    }
}

// ============================================================================
// File copier
// ============================================================================

/// Copies files and scripts to Windows nodes.
#[derive(Clone)]
pub struct WinRmFileCopier {
    framework: Arc<dyn FrameworkSource>,
    builder: ConnectionProfileBuilder,
    executor: RemoteActionExecutor,
}

impl WinRmFileCopier {
    pub fn new(
        framework: Arc<dyn FrameworkSource>,
        transport: Arc<dyn Transport>,
        settings: Arc<Settings>,
    ) -> Self {
        let executor =
            RemoteActionExecutor::new(transport).with_temp_file_prefix(settings.temp_file_prefix.clone());
        Self {
            framework,
            builder: ConnectionProfileBuilder::new(settings),
            executor,
        }
    }

    /// Use a customised profile builder
    pub fn with_profile_builder(mut self, builder: ConnectionProfileBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Copy the content of `source` to `node`, returning the remote path.
    pub async fn copy_file_stream(
        &self,
        ctx: &ExecutionContext,
        source: &mut (dyn AsyncRead + Send + Unpin),
        node: &NodeTarget,
        destination: Option<&str>,
    ) -> ActionOutcome<String> {
        let profile = self.profile(ctx, node).await?;
        info!(node = %node.name, "copying file to remote node");
        self.executor.copy(ctx, &profile, source, destination).await
    }

    /// Copy a local file to `node`. A missing, unreadable or non-regular
    /// file fails before any connection is made.
    pub async fn copy_file(
        &self,
        ctx: &ExecutionContext,
        path: &Path,
        node: &NodeTarget,
        destination: Option<&str>,
    ) -> ActionOutcome<String> {
        let unreadable = |e: io::Error| {
            let message = format!("Cannot read {}: {}", path.display(), e);
            report_failure(ctx, FailureReason::SourceNotReadable, &message);
            ActionFailure::new(FailureReason::SourceNotReadable, message).with_source(e)
        };

        let mut file = tokio::fs::File::open(path).await.map_err(unreadable)?;
        let metadata = file.metadata().await.map_err(unreadable)?;
        if !metadata.is_file() {
            return Err(unreadable(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        self.copy_file_stream(ctx, &mut file, node, destination).await
    }

    /// Write `script` to a file on `node`.
    pub async fn copy_script_content(
        &self,
        ctx: &ExecutionContext,
        script: &str,
        node: &NodeTarget,
        destination: Option<&str>,
    ) -> ActionOutcome<String> {
        let mut content = script.as_bytes();
        self.copy_file_stream(ctx, &mut content, node, destination).await
    }

    /// Resolve the profile, attach the destination directory and run the
    /// pre-connect hook.
    async fn profile(
        &self,
        ctx: &ExecutionContext,
        node: &NodeTarget,
    ) -> ActionOutcome<ConnectionProfile> {
        let prompt = format!(
            "[{}:{}] ",
            PROVIDER_NAME,
            node.extract_hostname().unwrap_or_default()
        );
        ctx.log(LogLevel::Verbose, &prompt);

        let framework = self.framework.as_ref();
        let mut profile = self
            .builder
            .resolve(ctx, node, framework)
            .await
            .map_err(|e| configuration_failure(ctx, e))?;

        let props = PropertyResolver::new(node, &ctx.project, framework);
        profile.destination_dir =
            props.resolve(&self.builder.settings().keys.file_copy_destination_dir, None);

        let profile = self
            .builder
            .apply_pre_connect(profile)
            .map_err(|e| configuration_failure(ctx, e))?;

        ctx.log(LogLevel::Verbose, &format!("{}{:?}", prompt, profile));
        Ok(profile)
    }
}
