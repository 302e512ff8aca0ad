//! Configuration schema for stagehand.toml
//!
//! Every section is optional; omitted fields fall back to the defaults of the
//! reference test network (one `master.vm`, compile nodes behind `compile.vm`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::bootstrap::MissingCredentialPolicy;

/// Root configuration structure for stagehand.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Abort the whole run after this many seconds
    pub timeout_secs: Option<u64>,
    pub inventory: InventoryConfig,
    pub remote: RemoteConfig,
    pub installer: InstallerConfig,
    pub agent: AgentConfig,
    pub ca: CaConfig,
    pub poll: PollConfig,
    pub classifier: ClassifierConfig,
    pub topology: TopologyConfig,
    pub bootstrap: BootstrapConfig,
}

/// Hostnames of the cluster and where they are declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub primary: String,
    /// Shared load-balanced address of the secondary pool
    pub pool_address: String,
    /// Secondary hostname template; `{n}` is the 1-based ordinal
    pub secondary_pattern: String,
    pub secondary_count: u32,
    pub hosts_file: PathBuf,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            primary: "master.vm".to_string(),
            pool_address: "compile.vm".to_string(),
            secondary_pattern: "compile{n}.vm".to_string(),
            secondary_count: 2,
            hosts_file: PathBuf::from("/etc/hosts"),
        }
    }
}

/// Remote shell settings used by the execution bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Service account used for every hop
    pub user: String,
    /// Local program printing the service account password on stdout
    pub credential_helper: PathBuf,
    pub ssh_program: String,
    pub connect_timeout_secs: u64,
    /// Path of the stagehand binary on the primary node
    pub orchestrator_path: String,
    /// Path of the configuration file on the primary node
    pub orchestrator_config: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            user: "vagrant".to_string(),
            credential_helper: PathBuf::from("/vagrant/bin/askpass"),
            ssh_program: "ssh".to_string(),
            connect_timeout_secs: 10,
            orchestrator_path: "/vagrant/bin/stagehand".to_string(),
            orchestrator_config: "/vagrant/stagehand.toml".to_string(),
        }
    }
}

/// Vendor installer used on the primary node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Installer path; `{version}` is replaced by the product version
    pub path: String,
    pub version: String,
    /// Answer file passed with `-c`
    pub config_file: PathBuf,
    /// Shell commands installing support tooling after convergence
    pub support_commands: Vec<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            path: "/vagrant/pe/puppet-enterprise-{version}-el-7-x86_64/puppet-enterprise-installer"
                .to_string(),
            version: "2016.4.2".to_string(),
            config_file: PathBuf::from("/vagrant/pe.conf"),
            support_commands: Vec::new(),
        }
    }
}

/// Agent installation and convergence commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent install command; `{primary}` is replaced by the primary hostname
    pub install_command: String,
    /// Install command for secondaries; also accepts `{pool_address}` and `{hostname}`
    pub secondary_install_command: String,
    pub run_command: String,
    /// Exit statuses of `run_command` that count as converged
    pub success_statuses: Vec<i32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            install_command: "curl -k https://{primary}:8140/packages/current/install.bash | bash"
                .to_string(),
            secondary_install_command: "curl -k https://{primary}:8140/packages/current/install.bash | bash -s main:dns_alt_names={pool_address},{hostname}".to_string(),
            run_command: "puppet agent -t".to_string(),
            success_statuses: vec![0, 2],
        }
    }
}

/// Certificate authority command line on the primary node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaConfig {
    pub list_command: String,
    pub list_all_command: String,
    pub sign_command: String,
    pub alt_names_flag: String,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            list_command: "puppet cert list".to_string(),
            list_all_command: "puppet cert list --all".to_string(),
            sign_command: "puppet cert sign".to_string(),
            alt_names_flag: "--allow-dns-alt-names".to_string(),
        }
    }
}

/// Bounds for the pending-certificate poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval_secs: 5,
        }
    }
}

/// Classification service endpoint and the groups stagehand manages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub url: String,
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca_cert: PathBuf,
    pub request_timeout_secs: u64,
    pub environment: String,
    /// Top-level group every created group hangs off
    pub root_group: String,
    /// Group secondaries are pinned into
    pub primary_group: String,
    /// Group of ordinary agents, pointed at the secondary pool
    pub agent_group: String,
    /// Group of infrastructure agents, pointed at the primary
    pub secondary_agent_group: String,
    /// Class carrying the server and broker lists
    pub agent_class: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: "https://master.vm:4433/classifier-api/v1".to_string(),
            cert: PathBuf::from("/etc/puppetlabs/puppet/ssl/certs/master.vm.pem"),
            key: PathBuf::from("/etc/puppetlabs/puppet/ssl/private_keys/master.vm.pem"),
            ca_cert: PathBuf::from("/etc/puppetlabs/puppet/ssl/certs/ca.pem"),
            request_timeout_secs: 30,
            environment: "production".to_string(),
            root_group: "All Nodes".to_string(),
            primary_group: "Primary Group".to_string(),
            agent_group: "Agent Group".to_string(),
            secondary_agent_group: "Secondary Agent Group".to_string(),
            agent_class: "puppet_enterprise::profile::agent".to_string(),
        }
    }
}

/// Ports used when rendering server and broker lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub server_port: u16,
    pub broker_port: u16,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            server_port: 8140,
            broker_port: 8142,
        }
    }
}

/// Inputs and outputs of the bootstrap script generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub manifest: PathBuf,
    /// Directory modules are installed into on the target nodes
    pub module_dir: String,
    /// Local source tree holding the archived subdirectories
    pub source_root: PathBuf,
    /// Subdirectories of `source_root` packed into the side archive
    pub include: Vec<String>,
    /// Directory the side archive is unpacked into on the target nodes
    pub archive_dest: String,
    /// Where the script and archive are written; must be visible to every node
    pub output_dir: PathBuf,
    /// SSH private key for private remotes
    pub credential: Option<PathBuf>,
    pub missing_credential: MissingCredentialPolicy,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("Puppetfile"),
            module_dir: "/etc/puppetlabs/code/environments/production/modules".to_string(),
            source_root: PathBuf::from("."),
            include: vec!["site".to_string()],
            archive_dest: "/etc/puppetlabs/code/environments/production".to_string(),
            output_dir: PathBuf::from("/vagrant/bootstrap"),
            credential: None,
            missing_credential: MissingCredentialPolicy::Skip,
        }
    }
}
