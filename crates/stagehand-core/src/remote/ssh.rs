//! `ssh`-based implementation of the bridge.
//!
//! Host keys are neither verified nor remembered. That is only acceptable on an
//! ephemeral, isolated test network and must not be reused anywhere else.

use std::process::Command;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{BridgeError, CredentialHelper, ExecOutput, RemoteExec};
use crate::config::RemoteConfig;
use crate::error::Error;
use crate::process::{RunError, run_cancellable, tool_on_path};
use crate::shell;

/// Exit status `ssh` reserves for its own failures.
pub const SSH_CONNECTION_FAILURE: i32 = 255;

const REDACTED: &str = "********";

/// Runs commands as a fixed service account over password-authenticated `ssh`.
#[derive(Debug, Clone)]
pub struct SshBridge {
    program: String,
    user: String,
    helper: CredentialHelper,
    connect_timeout_secs: u64,
    cancel: CancellationToken,
}

impl SshBridge {
    pub fn new(
        program: impl Into<String>,
        user: impl Into<String>,
        helper: CredentialHelper,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            program: program.into(),
            user: user.into(),
            helper,
            connect_timeout_secs: 10,
            cancel,
        }
    }

    pub fn from_config(config: &RemoteConfig, cancel: CancellationToken) -> Self {
        Self::new(
            config.ssh_program.clone(),
            config.user.clone(),
            CredentialHelper::new(config.credential_helper.clone()),
            cancel,
        )
        .with_connect_timeout(config.connect_timeout_secs)
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Check that the client and the credential helper are present before any hop.
    pub fn preflight(&self) -> crate::error::Result<()> {
        if !tool_on_path(&self.program) {
            return Err(Error::ToolNotFound {
                tool: self.program.clone(),
            });
        }
        if !self.helper.exists() {
            return Err(Error::ToolNotFound {
                tool: self.helper.program().display().to_string(),
            });
        }
        Ok(())
    }

    /// Arguments passed to `ssh` for one command.
    ///
    /// `-tt` forces a pty even without a local terminal: `sudo` only accepts the
    /// password from a terminal.
    pub fn ssh_args(&self, host: &str, command: &str) -> Vec<String> {
        let remote = shell::join(["sudo", "-p", "", "--", "sh", "-c", command]);
        let mut args: Vec<String> = vec!["-tt".to_string()];
        for option in [
            "StrictHostKeyChecking=no".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "LogLevel=ERROR".to_string(),
            "PubkeyAuthentication=no".to_string(),
            "PreferredAuthentications=password,keyboard-interactive".to_string(),
            "NumberOfPasswordPrompts=1".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ] {
            args.push("-o".to_string());
            args.push(option);
        }
        args.push(format!("{}@{}", self.user, host));
        args.push(remote);
        args
    }
}

impl RemoteExec for SshBridge {
    fn exec(&self, host: &str, command: &str) -> Result<ExecOutput, BridgeError> {
        let secret = self.helper.fetch()?;
        debug!(host, command, "remote exec");

        let mut cmd = Command::new(&self.program);
        cmd.args(self.ssh_args(host, command))
            .env("SSH_ASKPASS", self.helper.program())
            .env("SSH_ASKPASS_REQUIRE", "force");
        if std::env::var_os("DISPLAY").is_none() {
            cmd.env("DISPLAY", ":0");
        }

        let stdin = format!("{}\n", secret).into_bytes();
        let finished = match run_cancellable(cmd, Some(stdin), &self.cancel) {
            Ok(finished) => finished,
            Err(RunError::Cancelled) => return Err(BridgeError::Cancelled),
            Err(RunError::Spawn(source)) | Err(RunError::Io(source)) => {
                return Err(BridgeError::Launch {
                    program: self.program.clone(),
                    source,
                });
            }
        };

        let output = redact(&finished.combined().replace("\r\n", "\n"), &secret);
        match finished.status.code() {
            None => Err(BridgeError::Terminated {
                host: host.to_string(),
            }),
            Some(SSH_CONNECTION_FAILURE) => Err(BridgeError::Connect {
                host: host.to_string(),
                message: output
                    .lines()
                    .rev()
                    .find(|line| !line.trim().is_empty())
                    .unwrap_or("ssh exited with status 255")
                    .trim()
                    .to_string(),
            }),
            Some(status) => Ok(ExecOutput { output, status }),
        }
    }
}

fn redact(output: &str, secret: &str) -> String {
    output.replace(secret, REDACTED)
}
