//! CLI module for winrm-exec
//!
//! Argument parsing for the `winrm-exec` binary. The binary never connects
//! anywhere; it shows what the library would resolve for a node.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use winrm_exec::command::CommandStyle;
use winrm_exec::config::Preset;

/// winrm-exec - WinRM connection profile inspector
#[derive(Parser, Debug, Clone)]
#[command(name = "winrm-exec")]
#[command(author = "winrm-exec Contributors")]
#[command(version)]
#[command(about = "Resolve WinRM connection profiles and preview remote command lines", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Resolve and print the connection profile for a node
    Profile(ProfileArgs),

    /// Print the command tokens that would be sent to a node
    Cmdline(CmdlineArgs),
}

/// Arguments for the profile command
#[derive(Parser, Debug, Clone)]
pub struct ProfileArgs {
    /// Framework and project properties (TOML)
    #[arg(short = 'c', long, env = "WINRM_EXEC_CONFIG")]
    pub config: PathBuf,

    /// Node description (TOML)
    #[arg(short = 'n', long)]
    pub node: PathBuf,

    /// Project the node belongs to
    #[arg(short = 'p', long, default_value = "default")]
    pub project: String,

    /// Property key layout
    #[arg(long, default_value = "current", value_parser = parse_preset)]
    pub preset: Preset,

    /// Directory used as the key storage tree
    #[arg(long)]
    pub key_storage: Option<PathBuf>,

    /// Secure option value, as dataset.name=value
    #[arg(long = "secure-option", action = clap::ArgAction::Append)]
    pub secure_options: Vec<String>,

    /// Data context value, as group.key=value
    #[arg(long = "data", action = clap::ArgAction::Append)]
    pub data: Vec<String>,
}

/// Arguments for the cmdline command
#[derive(Parser, Debug, Clone)]
pub struct CmdlineArgs {
    /// Command style
    #[arg(long, default_value = "raw", value_parser = parse_style)]
    pub style: CommandStyle,

    /// Command arguments
    #[arg(last = true, required = true)]
    pub args: Vec<String>,
}

fn parse_preset(s: &str) -> Result<Preset, String> {
    s.parse()
}

fn parse_style(s: &str) -> Result<CommandStyle, String> {
    s.parse()
}
