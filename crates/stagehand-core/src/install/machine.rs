//! Per-role provisioning flows and the primary-side post-install step.

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::commands::{AgentRun, VendorInstaller, check};
use super::{InstallReport, InstallState};
use crate::certs::{CertificateAuthority, PollPolicy, Sleeper, await_subject_certificate};
use crate::classifier::{
    ClassificationApi, Classifier, Classes, GroupDefinition, Outcome, PoolTopology, pin_rule,
};
use crate::config::{Config, expand};
use crate::error::{Error, Result};
use crate::inventory::Inventory;
use crate::process::CommandRunner;
use crate::remote::RemoteExec;
use crate::shell;
use crate::types::{Node, Role};

const PRIMARY_AGENT_PASSES: usize = 2;

/// Drives one node through its role path.
///
/// Every collaborator that reaches outside the process is injected, so the whole
/// machine runs against fakes in tests.
pub struct Provisioner<'a> {
    config: &'a Config,
    hostname: String,
    inventory: Inventory,
    runner: &'a dyn CommandRunner,
    bridge: &'a dyn RemoteExec,
    ca: &'a dyn CertificateAuthority,
    classifier: Option<&'a dyn ClassificationApi>,
    sleeper: &'a dyn Sleeper,
    cancel: CancellationToken,
    installer_version: Option<String>,
    forward_debug: bool,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        config: &'a Config,
        hostname: impl Into<String>,
        runner: &'a dyn CommandRunner,
        bridge: &'a dyn RemoteExec,
        ca: &'a dyn CertificateAuthority,
        sleeper: &'a dyn Sleeper,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            hostname: hostname.into(),
            inventory: Inventory::from_config(&config.inventory),
            runner,
            bridge,
            ca,
            classifier: None,
            sleeper,
            cancel,
            installer_version: None,
            forward_debug: false,
        }
    }

    /// Classification service, needed only for secondary post-install.
    pub fn with_classifier(mut self, api: &'a dyn ClassificationApi) -> Self {
        self.classifier = Some(api);
        self
    }

    pub fn with_installer_version(mut self, version: Option<String>) -> Self {
        self.installer_version = version;
        self
    }

    /// Pass `--debug` on to the post-install hop.
    pub fn with_forwarded_debug(mut self, debug: bool) -> Self {
        self.forward_debug = debug;
        self
    }

    pub fn run(&self, role: Role, ordinal: Option<u32>) -> Result<InstallReport> {
        match role {
            Role::Primary => self.install_primary(),
            Role::Secondary => self.install_secondary(ordinal),
            Role::Agent => self.install_agent(),
        }
    }

    pub fn install_primary(&self) -> Result<InstallReport> {
        let node = Node::primary(&self.hostname);
        self.inventory.verify(&node)?;
        let mut report = InstallReport::new(Role::Primary, &self.hostname);
        report.record(InstallState::Uninstalled, "");

        let installer = VendorInstaller::new(
            self.config.installer_path(self.installer_version.as_deref()),
            self.config.installer.config_file.clone(),
        );
        self.checkpoint()?;
        installer.run(self.runner, &self.hostname)?;
        report.record(InstallState::InstallerRun, installer.command());

        let agent = self.agent_run();
        for _ in 0..PRIMARY_AGENT_PASSES {
            self.checkpoint()?;
            agent.run_local(self.runner, &self.hostname)?;
        }
        report.record(
            InstallState::AgentSelfConverged,
            format!("{} agent runs", PRIMARY_AGENT_PASSES),
        );

        for command in &self.config.installer.support_commands {
            self.checkpoint()?;
            let output = self.runner.run(command)?;
            check(output, "support tooling", &self.hostname, &[0])?;
        }
        report.record(
            InstallState::SupportToolingInstalled,
            format!("{} commands", self.config.installer.support_commands.len()),
        );

        report.record(InstallState::Ready, "");
        Ok(report)
    }

    pub fn install_secondary(&self, ordinal: Option<u32>) -> Result<InstallReport> {
        let node = self
            .inventory
            .node(Role::Secondary, &self.hostname, ordinal)?;
        let ordinal = node.ordinal.unwrap_or(1);
        self.inventory.verify(&node)?;

        let mut report = InstallReport::new(Role::Secondary, &self.hostname);
        report.record(InstallState::Uninstalled, format!("ordinal {}", ordinal));

        let install = expand(
            &self.config.agent.secondary_install_command,
            &[
                ("primary", self.inventory.primary()),
                ("pool_address", self.inventory.pool_address()),
                ("hostname", self.hostname.as_str()),
            ],
        );
        self.install_agent_package(&install, &mut report)?;

        self.hop_to_primary(Role::Secondary, Some(ordinal), &mut report)?;
        report.record(InstallState::PinnedToPrimaryGroup, "");
        report.record(
            InstallState::PoolAddressConfigured,
            self.inventory.pool_address().to_string(),
        );

        let agent = self.agent_run();
        for peer in self.inventory.secondaries(ordinal) {
            self.checkpoint()?;
            info!(peer = peer.hostname, "converging peer");
            agent.run_remote(self.bridge, &peer.hostname)?;
        }
        report.record(
            InstallState::PeerConverged,
            format!("secondaries 1..={}", ordinal),
        );

        report.record(InstallState::Ready, "");
        Ok(report)
    }

    pub fn install_agent(&self) -> Result<InstallReport> {
        let node = Node::agent(&self.hostname);
        self.inventory.verify(&node)?;

        let mut report = InstallReport::new(Role::Agent, &self.hostname);
        report.record(InstallState::Uninstalled, "");

        let install = expand(
            &self.config.agent.install_command,
            &[("primary", self.inventory.primary())],
        );
        self.install_agent_package(&install, &mut report)?;
        self.hop_to_primary(Role::Agent, None, &mut report)?;

        report.record(InstallState::Ready, "");
        Ok(report)
    }

    /// Sign `subject` and, for secondaries, wire it into the pool.
    ///
    /// Runs on the primary only. Every step is skipped when the cluster is
    /// already in the desired state, so repeating it is harmless.
    pub fn post_install(&self, role: Role, subject: &str) -> Result<InstallReport> {
        self.inventory.require_primary(&self.hostname)?;
        if role == Role::Primary {
            return Err(Error::Usage(
                "post-install applies to secondary and agent nodes".to_string(),
            ));
        }

        let mut report = InstallReport::new(role, subject);
        self.sign(role, subject, &mut report)?;

        if role == Role::Secondary {
            let api = self.classifier.ok_or_else(|| {
                Error::Usage(
                    "post-install for a secondary needs the classification service".to_string(),
                )
            })?;
            let changed = self.configure_pool(api, subject, &mut report)?;

            if changed.changed() {
                self.checkpoint()?;
                self.agent_run().run_local(self.runner, &self.hostname)?;
                info!("primary re-converged");
            } else {
                info!("classification unchanged, skipping primary re-convergence");
            }
        }

        report.record(InstallState::Ready, "");
        Ok(report)
    }

    fn sign(&self, role: Role, subject: &str, report: &mut InstallReport) -> Result<()> {
        if self.ca.is_signed(subject)? {
            report.record(InstallState::Signed, "already signed");
            return Ok(());
        }

        report.record(InstallState::AwaitingSigning, subject.to_string());
        let policy = PollPolicy::from(&self.config.poll);
        await_subject_certificate(self.ca, subject, &policy, self.sleeper, &self.cancel)?;

        self.checkpoint()?;
        self.ca.sign(subject, role == Role::Secondary)?;
        report.record(InstallState::Signed, subject.to_string());
        Ok(())
    }

    fn configure_pool(
        &self,
        api: &dyn ClassificationApi,
        subject: &str,
        report: &mut InstallReport,
    ) -> Result<Outcome> {
        let settings = &self.config.classifier;
        let classifier = Classifier::new(
            api,
            settings.environment.clone(),
            settings.root_group.clone(),
        );

        let primary_group = classifier.find_group_id(&settings.primary_group)?;
        let pinned = classifier.pin_node(&primary_group, subject)?;
        report.record(InstallState::PinnedToPrimaryGroup, settings.primary_group.clone());

        let (agent_group, created) = classifier.ensure_group(GroupDefinition {
            name: settings.secondary_agent_group.clone(),
            rule: pin_rule([self.inventory.primary()]),
            classes: Classes::new(),
        })?;
        let pinned_agent = classifier.pin_node(&agent_group.id, subject)?;

        let topology = PoolTopology::from_config(self.config);
        let mut configured = Outcome::Unchanged;
        for setting in topology.desired_settings(settings) {
            configured = configured.or(classifier.apply_setting(&setting)?);
        }
        report.record(
            InstallState::PoolAddressConfigured,
            if configured.changed() { "updated" } else { "already consistent" },
        );

        Ok(pinned.or(created).or(pinned_agent).or(configured))
    }

    fn install_agent_package(&self, command: &str, report: &mut InstallReport) -> Result<()> {
        self.checkpoint()?;
        let output = self.runner.run(command)?;
        check(output, "agent install", &self.hostname, &[0])?;
        report.record(InstallState::AgentInstallerRun, command.to_string());
        Ok(())
    }

    /// Ask the primary to sign (and for secondaries, classify) this node.
    fn hop_to_primary(
        &self,
        role: Role,
        ordinal: Option<u32>,
        report: &mut InstallReport,
    ) -> Result<()> {
        let primary = self.inventory.primary();
        let command = self.post_install_command(role, ordinal);
        report.record(InstallState::AwaitingSigning, primary.to_string());

        self.checkpoint()?;
        let output = self
            .bridge
            .exec(primary, &command)
            .map_err(|source| Error::Bridge {
                step: "post-install".to_string(),
                host: primary.to_string(),
                source,
            })?;
        check(output, "post-install", primary, &[0])?;
        report.record(InstallState::Signed, primary.to_string());
        Ok(())
    }

    /// Command line the primary runs for this node's post-install step.
    pub fn post_install_command(&self, role: Role, ordinal: Option<u32>) -> String {
        let remote = &self.config.remote;
        let mut words = vec![
            remote.orchestrator_path.clone(),
            "--config".to_string(),
            remote.orchestrator_config.clone(),
        ];
        if self.forward_debug {
            words.push("--debug".to_string());
        }
        words.push(role.as_str().to_string());
        words.push("--post-install".to_string());
        if let Some(ordinal) = ordinal {
            words.push("--ordinal".to_string());
            words.push(ordinal.to_string());
        }
        words.push("--subject".to_string());
        words.push(self.hostname.clone());
        shell::join(words)
    }

    fn agent_run(&self) -> AgentRun {
        AgentRun::new(
            self.config.agent.run_command.clone(),
            self.config.agent.success_statuses.clone(),
        )
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}
