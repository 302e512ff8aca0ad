//! Installer and agent-run commands with their exit-status checks.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::process::{CommandRunner, ExecOutput};
use crate::remote::RemoteExec;
use crate::shell;

/// The vendor product installer, run once on the primary.
#[derive(Debug, Clone)]
pub struct VendorInstaller {
    pub path: String,
    pub config_file: PathBuf,
}

impl VendorInstaller {
    pub fn new(path: impl Into<String>, config_file: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config_file: config_file.into(),
        }
    }

    pub fn command(&self) -> String {
        let config_file = self.config_file.display().to_string();
        shell::join([self.path.as_str(), "-c", config_file.as_str()])
    }

    pub fn run(&self, runner: &dyn CommandRunner, host: &str) -> Result<()> {
        require_file(&self.config_file)?;
        info!(installer = self.path, "running vendor installer");
        let output = runner.run(&self.command())?;
        check(output, "vendor installer", host, &[0])
    }
}

/// One configuration-management agent run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub command: String,
    /// Exit statuses meaning "converged" (2 is "changes applied")
    pub success_statuses: Vec<i32>,
}

impl AgentRun {
    pub fn new(command: impl Into<String>, success_statuses: Vec<i32>) -> Self {
        Self {
            command: command.into(),
            success_statuses,
        }
    }

    pub fn run_local(&self, runner: &dyn CommandRunner, host: &str) -> Result<()> {
        let output = runner.run(&self.command)?;
        check(output, "agent run", host, &self.success_statuses)
    }

    pub fn run_remote(&self, bridge: &dyn RemoteExec, host: &str) -> Result<()> {
        let output = bridge
            .exec(host, &self.command)
            .map_err(|source| Error::Bridge {
                step: "agent run".to_string(),
                host: host.to_string(),
                source,
            })?;
        check(output, "agent run", host, &self.success_statuses)
    }
}

pub(crate) fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::MissingFile {
            path: path.to_path_buf(),
        })
    }
}

/// Turn an exit status outside `accepted` into [`Error::CommandFailed`].
pub(crate) fn check(output: ExecOutput, step: &str, host: &str, accepted: &[i32]) -> Result<()> {
    if accepted.contains(&output.status) {
        return Ok(());
    }
    Err(Error::CommandFailed {
        step: step.to_string(),
        host: host.to_string(),
        status: output.status,
        output: output.output.trim().to_string(),
    })
}
