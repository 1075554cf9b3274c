//! Raw requests: shell commands run on a worker and recorded in the history.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::PrompterConfig;
use crate::dispatcher::{EventLogAccess, Outcome, TaskId};
use crate::panel::HistoryAccess;
use crate::ui_loop::UiLoop;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRequest {
    pub command: String,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl RawRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn envs(mut self, overrides: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(overrides);
        self
    }

    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

pub trait CommandRunner: Send + Sync {
    /// Runs the request to completion. An `Err` means the command could not
    /// be started; a non-zero exit code is still `Ok`.
    fn run(&self, request: &RawRequest) -> Result<CommandOutput>;
}

/// Exit code reported when the process was terminated by a signal.
pub const SIGNALED_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommandRunner {
    shell: String,
    shell_flag: String,
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SHELL)
    }
}

impl ShellCommandRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        let shell = shell.into();
        let shell_flag = shell_flag_for(&shell).to_string();
        Self { shell, shell_flag }
    }

    pub fn from_config(config: &PrompterConfig) -> Self {
        Self::new(config.shell.clone())
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

fn shell_flag_for(shell: &str) -> &'static str {
    let program = shell
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(shell)
        .to_ascii_lowercase();
    match program.as_str() {
        "cmd" | "cmd.exe" => "/C",
        "powershell" | "powershell.exe" | "pwsh" | "pwsh.exe" => "-Command",
        _ => "-c",
    }
}

impl CommandRunner for ShellCommandRunner {
    fn run(&self, request: &RawRequest) -> Result<CommandOutput> {
        let mut command = Command::new(&self.shell);
        command
            .arg(&self.shell_flag)
            .arg(&request.command)
            .envs(&request.env)
            .stdin(Stdio::null());
        if let Some(dir) = request.working_dir.as_ref() {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .with_context(|| format!("failed to start {}", self.shell))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(SIGNALED_EXIT_CODE),
        })
    }
}

/// Submits `request` as a background task.
///
/// On success the result is appended to the history and a completion line is
/// logged. When the command cannot be started nothing is recorded; the
/// dispatcher's `Error:` line is the only trace.
pub fn submit_raw_request<S>(
    ui: &mut UiLoop<S>,
    runner: Arc<dyn CommandRunner>,
    request: RawRequest,
) -> TaskId
where
    S: EventLogAccess + HistoryAccess + 'static,
{
    let command = request.command.clone();
    ui.submit(
        move || runner.run(&request),
        move |state: &mut S, outcome: Outcome<CommandOutput>| {
            let Outcome::Success(output) = outcome else {
                return;
            };
            let exit_code = output.exit_code;
            let ordinal =
                state
                    .history_mut()
                    .record(command, output.stdout, output.stderr, exit_code);
            state.event_log_mut().append(format!(
                "Request #{ordinal} finished with exit code {exit_code}"
            ));
        },
    )
}
