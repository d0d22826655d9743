//! Allowlisted command execution tool.
//!
//! Commands are split with shell quoting rules but never run through a
//! shell: no pipes, redirection or substitution. Only read-only system
//! inspection commands are allowed.

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use super::{parse_args, schema_of, Tool, ToolError};

/// Commands that are allowed to be executed.
const ALLOWED_COMMANDS: &[&str] = &[
    // System information
    "date", "uptime", "whoami", "hostname", "uname", "sw_vers", "system_profiler", "pmset",
    // Disk and processes
    "df", "du", "ps", "ls", "wc", "mdfind",
    // Network
    "ifconfig", "networksetup", "scutil", "ping",
];

/// Default timeout for command execution.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Output longer than this is cut before it reaches the model.
const MAX_OUTPUT_CHARS: usize = 8_000;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunCommandArgs {
    /// The command to run, e.g. "df -h" or "pmset -g batt".
    pub command: String,
}

/// Run an allowlisted system command and return its output.
#[derive(Debug, Clone)]
pub struct RunCommandTool {
    timeout: Duration,
}

impl Default for RunCommandTool {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RunCommandTool {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Split `command` and check the program against the allowlist.
    pub fn prepare(command: &str) -> Result<(String, Vec<String>), ToolError> {
        let mut parts = shlex::split(command)
            .ok_or_else(|| ToolError::InvalidArguments(format!("unbalanced quotes in `{command}`")))?
            .into_iter();
        let program = parts.next().ok_or_else(|| ToolError::CommandNotAllowed {
            command: String::new(),
        })?;
        if !ALLOWED_COMMANDS.contains(&program.as_str()) {
            return Err(ToolError::CommandNotAllowed { command: program });
        }
        Ok((program, parts.collect()))
    }
}

fn clip(output: String) -> String {
    match output.char_indices().nth(MAX_OUTPUT_CHARS) {
        Some((cut, _)) => format!("{}\n[output truncated]", &output[..cut]),
        None => output,
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a read-only system command (no shell). Allowed: date, uptime, whoami, hostname, \
         uname, sw_vers, system_profiler, pmset, df, du, ps, ls, wc, mdfind, ifconfig, \
         networksetup, scutil, ping."
    }

    fn parameters(&self) -> serde_json::Value {
        schema_of::<RunCommandArgs>()
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let args: RunCommandArgs = parse_args(args)?;
        let (program, argv) = Self::prepare(&args.command)?;

        // Run in a blocking task to avoid blocking the async runtime
        let result = tokio::task::spawn_blocking(move || -> Result<String, ToolError> {
            let out = std::process::Command::new(&program).args(&argv).output()?;
            let stdout = String::from_utf8_lossy(&out.stdout);
            let stderr = String::from_utf8_lossy(&out.stderr);
            if out.status.success() {
                Ok(format!("{stdout}{stderr}"))
            } else {
                // Non-zero exits are output, not errors, so the model can read them
                let code = out.status.code().unwrap_or(-1);
                Ok(format!(
                    "EXIT CODE: {code}\nSTDOUT:\n{stdout}\nSTDERR:\n{stderr}"
                ))
            }
        });

        match tokio::time::timeout(self.timeout, result).await {
            Ok(Ok(r)) => r.map(clip),
            Ok(Err(e)) => Err(ToolError::Io(std::io::Error::other(format!(
                "task join error: {e}"
            )))),
            Err(_) => Err(ToolError::Timeout {
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}
