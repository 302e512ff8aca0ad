//! Bootstrap script rendering.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::archive::{SiteArchive, build_archive};
use super::manifest::{BootstrapModule, parse_manifest_file};
use super::statement::{InstallStatement, Planned, SkipDiagnostic, plan};
use crate::config::BootstrapConfig;
use crate::error::Result;
use crate::shell;

pub const SCRIPT_NAME: &str = "bootstrap.sh";
pub const ARCHIVE_NAME: &str = "site.zip";

/// Turns a parsed manifest into a second-stage bootstrap script.
///
/// Rendering is pure: it never touches the network or a remote host, and the
/// same inputs always give the same script.
pub struct ScriptGenerator<'a> {
    config: &'a BootstrapConfig,
}

/// Result of planning every module in a manifest, in manifest order.
#[derive(Debug, Clone, Default)]
pub struct ScriptPlan {
    pub entries: Vec<Planned>,
}

impl ScriptPlan {
    pub fn statements(&self) -> impl Iterator<Item = &InstallStatement> {
        self.entries.iter().filter_map(|entry| match entry {
            Planned::Install(statement) => Some(statement),
            Planned::Skipped(_) => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = &SkipDiagnostic> {
        self.entries.iter().filter_map(|entry| match entry {
            Planned::Skipped(diag) => Some(diag),
            Planned::Install(_) => None,
        })
    }
}

/// Files written by [`generate_bundle`].
#[derive(Debug, Clone)]
pub struct GeneratedBundle {
    pub script_path: PathBuf,
    pub archive_path: Option<PathBuf>,
    pub digest: Option<String>,
    pub revision: Option<String>,
    pub installed: usize,
    pub skipped: Vec<SkipDiagnostic>,
}

impl<'a> ScriptGenerator<'a> {
    pub fn new(config: &'a BootstrapConfig) -> Self {
        Self { config }
    }

    pub fn plan(&self, modules: &[BootstrapModule]) -> Result<ScriptPlan> {
        let credential = self.config.credential.as_deref();
        let entries = modules
            .iter()
            .map(|module| plan(module, credential, self.config.missing_credential))
            .collect::<Result<Vec<_>>>()?;
        Ok(ScriptPlan { entries })
    }

    /// Script text for `plan`, unpacking `archive` when one was built.
    pub fn render(&self, plan: &ScriptPlan, archive: Option<&SiteArchive>) -> String {
        let module_dir = self.config.module_dir.as_str();
        let mut lines = vec![
            "#!/bin/sh".to_string(),
            format!("# Generated by stagehand {}", env!("CARGO_PKG_VERSION")),
        ];
        if let Some(archive) = archive {
            if let Some(revision) = &archive.revision {
                lines.push(format!("# source revision: {}", revision));
            }
            lines.push(format!("# {} blake3: {}", ARCHIVE_NAME, archive.digest));
        }
        lines.push("set -eu".to_string());
        lines.push(String::new());
        lines.push(shell::join(["mkdir", "-p", module_dir]));

        for entry in &plan.entries {
            match entry {
                Planned::Install(statement) => {
                    lines.push(format!("# {}", statement.module()));
                    lines.extend(statement.render(module_dir));
                }
                Planned::Skipped(diag) => {
                    lines.push(format!(
                        "# skipped {} ({}): {}",
                        diag.module, diag.remote, diag.reason
                    ));
                }
            }
        }

        if archive.is_some() {
            let archive_path = self.archive_path().display().to_string();
            let dest = self.config.archive_dest.as_str();
            lines.push(String::new());
            lines.push(shell::join(["mkdir", "-p", dest]));
            lines.push(shell::join(["unzip", "-oq", archive_path.as_str(), "-d", dest]));
        }

        let mut script = lines.join("\n");
        script.push('\n');
        script
    }

    pub fn script_path(&self) -> PathBuf {
        self.config.output_dir.join(SCRIPT_NAME)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.config.output_dir.join(ARCHIVE_NAME)
    }
}

/// Parse the manifest, build the side archive and write both files to the output directory.
pub fn generate_bundle(config: &BootstrapConfig) -> Result<GeneratedBundle> {
    let modules = parse_manifest_file(&config.manifest)?;
    let generator = ScriptGenerator::new(config);
    let plan = generator.plan(&modules)?;

    let archive = if config.include.is_empty() {
        None
    } else {
        Some(build_archive(&config.source_root, &config.include)?)
    };

    let script = generator.render(&plan, archive.as_ref());
    fs::create_dir_all(&config.output_dir)?;
    write_script(&generator.script_path(), &script)?;
    let archive_path = match &archive {
        Some(archive) => {
            let path = generator.archive_path();
            fs::write(&path, &archive.bytes)?;
            Some(path)
        }
        None => None,
    };

    let skipped: Vec<SkipDiagnostic> = plan.skipped().cloned().collect();
    let installed = plan.statements().count();
    info!(
        script = %generator.script_path().display(),
        installed,
        skipped = skipped.len(),
        "bootstrap bundle written"
    );

    Ok(GeneratedBundle {
        script_path: generator.script_path(),
        archive_path,
        digest: archive.as_ref().map(|a| a.digest.clone()),
        revision: archive.and_then(|a| a.revision),
        installed,
        skipped,
    })
}

fn write_script(path: &Path, script: &str) -> Result<()> {
    fs::write(path, script)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}
