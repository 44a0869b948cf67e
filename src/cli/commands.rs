//! Subcommand implementations.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tracing::debug;

use winrm_exec::command::CommandLineBuilder;
use winrm_exec::config::Settings;
use winrm_exec::context::ExecutionContext;
use winrm_exec::node::NodeTarget;
use winrm_exec::profile::ConnectionProfileBuilder;
use winrm_exec::properties::FrameworkProperties;
use winrm_exec::secrets::FileStorageTree;

use super::{CmdlineArgs, ProfileArgs};

/// Split `group.key=value`.
fn parse_assignment(raw: &str) -> Result<(String, String, String)> {
    let (path, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected group.key=value, got '{}'", raw))?;
    let (group, key) = path
        .split_once('.')
        .ok_or_else(|| anyhow!("expected group.key=value, got '{}'", raw))?;
    if group.is_empty() || key.is_empty() {
        return Err(anyhow!("expected group.key=value, got '{}'", raw));
    }
    Ok((group.to_string(), key.to_string(), value.to_string()))
}

impl ProfileArgs {
    /// Resolve the profile and print it as JSON. Configuration faults are
    /// printed and turned into the error's exit code.
    pub async fn execute(&self) -> Result<i32> {
        let framework = match FrameworkProperties::from_file(&self.config) {
            Ok(framework) => framework,
            Err(e) => {
                eprintln!("error: {}", e);
                return Ok(e.exit_code());
            }
        };
        let node = match NodeTarget::from_file(&self.node) {
            Ok(node) => node,
            Err(e) => {
                eprintln!("error: {}", e);
                return Ok(e.exit_code());
            }
        };

        let mut ctx = ExecutionContext::new(self.project.clone());
        for raw in &self.secure_options {
            let (group, key, value) = parse_assignment(raw)
                .with_context(|| "invalid --secure-option".to_string())?;
            ctx = ctx.with_private_data(group, key, value);
        }
        for raw in &self.data {
            let (group, key, value) =
                parse_assignment(raw).with_context(|| "invalid --data".to_string())?;
            ctx = ctx.with_data(group, key, value);
        }
        if let Some(root) = &self.key_storage {
            ctx = ctx.with_storage(Arc::new(FileStorageTree::new(root)));
        }

        debug!(preset = %self.preset, project = %self.project, "resolving profile");
        let builder = ConnectionProfileBuilder::new(Arc::new(Settings::for_preset(self.preset)));
        match builder.build(&ctx, &node, &framework).await {
            Ok(profile) => {
                let json = serde_json::to_string_pretty(&profile)
                    .context("failed to serialize profile")?;
                println!("{}", json);
                Ok(0)
            }
            Err(e) => {
                eprintln!("error: {}", e);
                Ok(e.exit_code())
            }
        }
    }
}

impl CmdlineArgs {
    /// Print the command tokens as a JSON array.
    pub fn execute(&self) -> Result<i32> {
        let spec = CommandLineBuilder::build(&self.args, self.style);
        println!(
            "{}",
            serde_json::to_string_pretty(&spec.tokens).context("failed to serialize tokens")?
        );
        Ok(0)
    }
}
