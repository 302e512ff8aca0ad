//! Role install state machine.
//!
//! Each role walks a fixed path of [`InstallState`]s. Every completed step is
//! recorded in an [`InstallReport`] so the CLI can show what happened, including
//! steps that were skipped because the cluster was already in the desired state.

mod commands;
mod machine;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::Role;

pub use commands::{AgentRun, VendorInstaller};
pub use machine::Provisioner;

/// Every state of every role path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    Uninstalled,
    InstallerRun,
    AgentSelfConverged,
    SupportToolingInstalled,
    AgentInstallerRun,
    AwaitingSigning,
    Signed,
    PinnedToPrimaryGroup,
    PoolAddressConfigured,
    PeerConverged,
    Ready,
}

impl InstallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallState::Uninstalled => "uninstalled",
            InstallState::InstallerRun => "installer run",
            InstallState::AgentSelfConverged => "agent self-converged",
            InstallState::SupportToolingInstalled => "support tooling installed",
            InstallState::AgentInstallerRun => "agent installer run",
            InstallState::AwaitingSigning => "awaiting signing",
            InstallState::Signed => "signed",
            InstallState::PinnedToPrimaryGroup => "pinned to primary group",
            InstallState::PoolAddressConfigured => "pool address configured",
            InstallState::PeerConverged => "peer converged",
            InstallState::Ready => "ready",
        }
    }

    /// States a role passes through, in order.
    pub fn path(role: Role) -> &'static [InstallState] {
        use InstallState::*;
        match role {
            Role::Primary => &[
                Uninstalled,
                InstallerRun,
                AgentSelfConverged,
                SupportToolingInstalled,
                Ready,
            ],
            Role::Secondary => &[
                Uninstalled,
                AgentInstallerRun,
                AwaitingSigning,
                Signed,
                PinnedToPrimaryGroup,
                PoolAddressConfigured,
                PeerConverged,
                Ready,
            ],
            Role::Agent => &[Uninstalled, AgentInstallerRun, AwaitingSigning, Signed, Ready],
        }
    }
}

impl std::fmt::Display for InstallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub state: InstallState,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// What a role run did, step by step.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub role: Role,
    pub hostname: String,
    pub steps: Vec<StepRecord>,
}

impl InstallReport {
    pub fn new(role: Role, hostname: impl Into<String>) -> Self {
        Self {
            role,
            hostname: hostname.into(),
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, state: InstallState, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::info!(host = self.hostname, state = %state, detail, "step complete");
        self.steps.push(StepRecord {
            state,
            detail,
            at: Utc::now(),
        });
    }

    pub fn states(&self) -> Vec<InstallState> {
        self.steps.iter().map(|s| s.state).collect()
    }

    pub fn reached(&self, state: InstallState) -> bool {
        self.steps.iter().any(|s| s.state == state)
    }
}
