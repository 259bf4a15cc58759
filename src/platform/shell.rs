use std::fmt;
use std::path::Path;
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::config::OUTPUT_PLACEHOLDER;

/// Executes one shell command line and reports what it printed.
pub type CommandRunner = Arc<dyn Fn(&str) -> Result<CommandOutput> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Runner backed by `sh -c`.
pub fn shell_runner() -> CommandRunner {
    Arc::new(|command| run_shell(command))
}

fn run_shell(command: &str) -> Result<CommandOutput> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .with_context(|| format!("failed to spawn shell for command: {command}"))?;

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `command` and turn a non-zero exit into an error carrying stderr.
pub fn run_checked(runner: &CommandRunner, command: &str) -> Result<CommandOutput> {
    let output = runner(command)?;
    if !output.success() {
        let exit = output
            .status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        bail!(
            "command `{command}` exited with {exit}: {}",
            output.stderr.trim()
        );
    }
    Ok(output)
}

/// A command line with an `@OUTPUT@` slot for a file path.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
}

impl CommandTemplate {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn needs_output(&self) -> bool {
        self.raw.contains(OUTPUT_PLACEHOLDER)
    }

    pub fn render(&self, output: &Path) -> String {
        self.raw
            .replace(OUTPUT_PLACEHOLDER, &shell_quote(&output.to_string_lossy()))
    }
}

impl fmt::Debug for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Single-quote `value` for `sh`, escaping embedded quotes.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:=@,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
