//! Stagehand - multi-node bootstrap orchestrator
//!
//! Usage:
//!   stagehand primary                       # Install the primary node
//!   stagehand secondary                     # Enroll this secondary into the pool
//!   stagehand agent                         # Enroll this agent
//!   stagehand secondary --post-install ...  # Primary-side enrollment (run over the bridge)
//!   stagehand bootstrap render              # Write bootstrap.sh and site.zip
//!   stagehand bootstrap deploy              # Run bootstrap.sh on every enrolled node

mod output;
mod signals;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stagehand_core::bootstrap::{deploy, generate_bundle};
use stagehand_core::certs::{CaTool, ThreadSleeper};
use stagehand_core::classifier::HttpClassifier;
use stagehand_core::config::Config;
use stagehand_core::install::Provisioner;
use stagehand_core::inventory::Inventory;
use stagehand_core::process::SystemRunner;
use stagehand_core::remote::SshBridge;
use stagehand_core::types::Role;
use stagehand_core::{Error, ErrorCategory};

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Multi-node bootstrap orchestrator", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Configuration file (default: ./stagehand.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show progress logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Show debug logs, including every command run
    #[arg(long, global = true)]
    debug: bool,

    /// Override the detected local hostname
    #[arg(long, global = true)]
    hostname: Option<String>,

    #[command(flatten)]
    role: RoleArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args)]
struct RoleArgs {
    /// Role of this node (primary, secondary, agent)
    role: Option<Role>,

    /// Product version, overriding installer.version
    #[arg(long)]
    installer_version: Option<String>,

    /// Run the primary-side enrollment steps for --subject
    #[arg(long, requires = "subject")]
    post_install: bool,

    /// Secondary ordinal (default: parsed from the hostname)
    #[arg(long)]
    ordinal: Option<u32>,

    /// Node being enrolled (post-install only)
    #[arg(long)]
    subject: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate or run the second-stage bootstrap script
    #[command(subcommand)]
    Bootstrap(BootstrapCommand),
}

#[derive(Subcommand)]
enum BootstrapCommand {
    /// Write bootstrap.sh and the site archive into bootstrap.output_dir
    Render,
    /// Run bootstrap.sh on the primary, then on every secondary
    Deploy,
}

#[derive(Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum OutputFormat {
    /// Human-readable steps
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match usage_failure(&err) {
            Some((code, message)) => {
                output::print_message(ErrorCategory::Usage, &message);
                std::process::exit(code);
            }
            None => err.exit(),
        },
    };
    init_tracing(cli.verbose, cli.debug);

    if let Err(err) = run(cli) {
        let category = err
            .downcast_ref::<Error>()
            .map(Error::category)
            .unwrap_or(ErrorCategory::External);
        output::print_error(category, &err);
        std::process::exit(category.exit_code());
    }
}

/// Exit status and message for a bad command line; `None` for `--help` and `--version`.
fn usage_failure(err: &clap::Error) -> Option<(i32, String)> {
    if !err.use_stderr() {
        return None;
    }
    let rendered = err.to_string();
    let message = rendered.trim();
    let message = message.strip_prefix("error: ").unwrap_or(message);
    Some((ErrorCategory::Usage.exit_code(), message.to_string()))
}

fn init_tracing(verbose: bool, debug: bool) {
    let default = if debug {
        "stagehand_core=debug,stagehand=debug,info"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let cancel = CancellationToken::new();
    signals::spawn_watcher(cancel.clone(), config.timeout_secs.map(Duration::from_secs));

    match cli.command {
        Some(Commands::Bootstrap(command)) => run_bootstrap(&config, command, cancel),
        None => {
            let role = cli.role.role.ok_or_else(|| {
                Error::Usage(
                    "a role (primary, secondary or agent) or a subcommand is required".to_string(),
                )
            })?;
            let hostname = match cli.hostname {
                Some(hostname) => hostname,
                None => local_hostname()?,
            };
            run_role(&config, role, hostname, cli.role, cli.debug, cancel)
        }
    }
}

fn run_role(
    config: &Config,
    role: Role,
    hostname: String,
    args: RoleArgs,
    debug: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let runner = SystemRunner::new(cancel.clone());
    let bridge = SshBridge::from_config(&config.remote, cancel.clone());
    let ca = CaTool::new(&runner, config.ca.clone(), config.inventory.primary.clone());
    let sleeper = ThreadSleeper;

    let classifier = if args.post_install && role == Role::Secondary {
        Inventory::from_config(&config.inventory).require_primary(&hostname)?;
        Some(HttpClassifier::from_config(&config.classifier)?)
    } else {
        None
    };

    let mut provisioner =
        Provisioner::new(config, hostname, &runner, &bridge, &ca, &sleeper, cancel)
            .with_installer_version(args.installer_version)
            .with_forwarded_debug(debug);
    if let Some(classifier) = &classifier {
        provisioner = provisioner.with_classifier(classifier);
    }

    let report = if args.post_install {
        let subject = args
            .subject
            .ok_or_else(|| Error::Usage("--post-install needs --subject".to_string()))?;
        provisioner.post_install(role, &subject)?
    } else {
        if role != Role::Primary {
            bridge.preflight()?;
        }
        provisioner.run(role, args.ordinal)?
    };

    match args.format {
        OutputFormat::Table => output::print_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn run_bootstrap(
    config: &Config,
    command: BootstrapCommand,
    cancel: CancellationToken,
) -> Result<()> {
    match command {
        BootstrapCommand::Render => {
            let bundle = generate_bundle(&config.bootstrap)?;
            output::print_bundle(&bundle);
        }
        BootstrapCommand::Deploy => {
            let bridge = SshBridge::from_config(&config.remote, cancel);
            bridge.preflight()?;
            let inventory = Inventory::from_config(&config.inventory);
            let hosts = deploy(&bridge, &inventory, &config.bootstrap.output_dir)?;
            for host in hosts {
                output::progress(&format!("bootstrap script completed on {}", host));
            }
        }
    }
    Ok(())
}

fn local_hostname() -> Result<String> {
    if let Ok(contents) = std::fs::read_to_string("/etc/hostname") {
        let name = contents.trim();
        if !name.is_empty() {
            return Ok(name.to_string());
        }
    }
    let output = std::process::Command::new("hostname")
        .output()
        .context("Failed to determine the local hostname")?;
    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if name.is_empty() {
        anyhow::bail!("Failed to determine the local hostname; pass --hostname");
    }
    Ok(name)
}
