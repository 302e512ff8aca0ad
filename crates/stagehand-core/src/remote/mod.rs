//! Remote Execution Bridge.
//!
//! The certificate authority and the classification service on the primary only
//! accept local connections, so anything that must happen *on* the primary from
//! another node goes through [`RemoteExec::exec`]. Any transport that can run one
//! privileged command and report its exit status can implement the trait.

mod credential;
mod ssh;

use thiserror::Error;

pub use crate::process::ExecOutput;
pub use credential::CredentialHelper;
pub use ssh::{SSH_CONNECTION_FAILURE, SshBridge};

/// Failure to run a remote command at all.
///
/// A command that ran and exited non-zero is *not* a `BridgeError`; it is an
/// `Ok(ExecOutput)` with a non-zero status.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Host unreachable, name resolution failed or authentication rejected.
    #[error("connection to {host} failed: {message}")]
    Connect { host: String, message: String },

    /// The local remote-shell client could not be started.
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The credential helper failed or printed nothing.
    #[error("credential helper {helper} failed: {message}")]
    Credential { helper: String, message: String },

    /// The remote-shell client was killed by a signal.
    #[error("remote shell to {host} terminated by a signal")]
    Terminated { host: String },

    #[error("remote command cancelled")]
    Cancelled,
}

impl BridgeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled)
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, BridgeError::Connect { .. })
    }
}

/// Executes a single command with elevated privileges on a named host.
pub trait RemoteExec {
    fn exec(&self, host: &str, command: &str) -> Result<ExecOutput, BridgeError>;
}
