//! Certificate authority access on the primary node.
//!
//! The CA is driven through its command line; [`CaTool`] parses the list output
//! of that tool. Signing is only possible on the primary, so every caller of
//! this module runs there.

mod poller;

use tracing::info;

use crate::config::CaConfig;
use crate::error::{Error, Result};
use crate::process::CommandRunner;
use crate::shell;

pub use poller::{
    PollPolicy, Sleeper, ThreadSleeper, await_pending_certificate, await_subject_certificate,
};

/// Operations the orchestrator needs from the certificate authority.
pub trait CertificateAuthority {
    /// Subjects with an enrollment request awaiting signature.
    fn pending(&self) -> Result<Vec<String>>;

    fn is_signed(&self, subject: &str) -> Result<bool>;

    /// Sign a pending request. `allow_alt_names` accepts DNS alt names in the CSR.
    fn sign(&self, subject: &str, allow_alt_names: bool) -> Result<()>;
}

/// One line of the CA list output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertEntry {
    pub subject: String,
    pub signed: bool,
}

/// Parse the output of the CA `list` command.
///
/// Accepts lines like `  "compile1.vm" (SHA256) AB:CD:…`; signed entries start
/// with `+`, revoked ones with `-`. Headers ending in `:` are ignored.
pub fn parse_cert_list(output: &str) -> Vec<CertEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with(':') && !line.starts_with("No "))
        .filter_map(|line| {
            let signed = line.starts_with('+');
            let rest = line.trim_start_matches(['+', '-']).trim_start();
            let subject = rest.split_whitespace().next()?.trim_matches('"');
            if subject.is_empty() {
                return None;
            }
            Some(CertEntry {
                subject: subject.to_string(),
                signed,
            })
        })
        .collect()
}

/// [`CertificateAuthority`] backed by the vendor CA command line.
pub struct CaTool<'a> {
    runner: &'a dyn CommandRunner,
    config: CaConfig,
    host: String,
}

impl<'a> CaTool<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: CaConfig, host: impl Into<String>) -> Self {
        Self {
            runner,
            config,
            host: host.into(),
        }
    }

    fn run(&self, step: &str, command: &str) -> Result<String> {
        let out = self.runner.run(command)?;
        if !out.success() {
            return Err(Error::CommandFailed {
                step: step.to_string(),
                host: self.host.clone(),
                status: out.status,
                output: out.output.trim().to_string(),
            });
        }
        Ok(out.output)
    }
}

impl CertificateAuthority for CaTool<'_> {
    fn pending(&self) -> Result<Vec<String>> {
        let output = self.run("certificate list", &self.config.list_command)?;
        Ok(parse_cert_list(&output)
            .into_iter()
            .filter(|entry| !entry.signed)
            .map(|entry| entry.subject)
            .collect())
    }

    fn is_signed(&self, subject: &str) -> Result<bool> {
        let output = self.run("certificate list", &self.config.list_all_command)?;
        Ok(parse_cert_list(&output)
            .iter()
            .any(|entry| entry.signed && entry.subject == subject))
    }

    fn sign(&self, subject: &str, allow_alt_names: bool) -> Result<()> {
        let mut command = self.config.sign_command.clone();
        if allow_alt_names {
            command.push(' ');
            command.push_str(&self.config.alt_names_flag);
        }
        command.push(' ');
        command.push_str(&shell::quote(subject));
        self.run("certificate sign", &command)?;
        info!(subject, "signed certificate");
        Ok(())
    }
}
