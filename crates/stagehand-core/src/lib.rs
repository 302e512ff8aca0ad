//! Stagehand Core Library
//!
//! Brings up a small configuration-management cluster: one primary, a pool of
//! load-balanced secondaries and plain agents. Provides the remote execution
//! bridge, certificate enrollment, classification updates, the per-role install
//! state machine and the second-stage bootstrap script generator.

pub mod bootstrap;
pub mod certs;
pub mod classifier;
pub mod config;
pub mod error;
pub mod install;
pub mod inventory;
pub mod process;
pub mod remote;
pub mod shell;
pub mod types;

pub use error::{Error, ErrorCategory, Result};

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::Config;

    // Errors
    pub use crate::error::{Error, ErrorCategory, Result};

    // Nodes
    pub use crate::inventory::Inventory;
    pub use crate::types::{Node, Role};

    // Collaborators
    pub use crate::certs::{CaTool, CertificateAuthority, Sleeper, ThreadSleeper};
    pub use crate::classifier::{ClassificationApi, Classifier, HttpClassifier, Outcome};
    pub use crate::process::{CommandRunner, ExecOutput, SystemRunner};
    pub use crate::remote::{BridgeError, RemoteExec, SshBridge};

    // Install
    pub use crate::install::{InstallReport, InstallState, Provisioner};

    // Bootstrap
    pub use crate::bootstrap::{GeneratedBundle, MissingCredentialPolicy, ScriptGenerator};
}
