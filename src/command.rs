//! Remote command lines.
//!
//! Arguments are turned into the token list handed to the transport. Raw
//! commands are passed through untouched. PowerShell commands are folded into
//! one script token so arbitrary script text can be run, at the cost of losing
//! per-argument boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interpreter the command is run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStyle {
    /// Tokens are executed as given (`CMD`)
    #[default]
    Raw,
    /// Tokens are joined into a script for `powershell`
    PowerShell,
}

impl CommandStyle {
    /// `PowerShell` (any case) selects PowerShell; `CMD` and anything else is raw.
    pub fn from_property(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("powershell") => CommandStyle::PowerShell,
            _ => CommandStyle::Raw,
        }
    }
}

impl fmt::Display for CommandStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStyle::Raw => write!(f, "raw"),
            CommandStyle::PowerShell => write!(f, "powershell"),
        }
    }
}

impl std::str::FromStr for CommandStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" | "cmd" => Ok(CommandStyle::Raw),
            "powershell" | "ps" => Ok(CommandStyle::PowerShell),
            _ => Err(format!("Unknown command style: {}", s)),
        }
    }
}

/// Ordered command tokens plus the style they were built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub style: CommandStyle,
    pub tokens: Vec<String>,
}

impl CommandSpec {
    /// Tokens joined with single spaces, for display
    pub fn command_line(&self) -> String {
        self.tokens.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Builds [`CommandSpec`]s from argument vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLineBuilder;

impl CommandLineBuilder {
    /// Build the command for `args` in the given style.
    ///
    /// Raw arguments are neither quoted nor escaped. For PowerShell the result
    /// is exactly two tokens: `powershell` and the space-joined arguments with
    /// every `"` escaped as `\"`.
    pub fn build<S: AsRef<str>>(args: &[S], style: CommandStyle) -> CommandSpec {
        let tokens = match style {
            CommandStyle::Raw => args.iter().map(|a| a.as_ref().to_string()).collect(),
            CommandStyle::PowerShell => {
                let script = args
                    .iter()
                    .map(AsRef::as_ref)
                    .collect::<Vec<&str>>()
                    .join(" ")
                    .replace('"', "\\\"");
                vec!["powershell".to_string(), script]
            }
        };
        CommandSpec { style, tokens }
    }
}
