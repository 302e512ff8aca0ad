//! Install statements rendered into the bootstrap script.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::manifest::{BootstrapModule, ModuleSource};
use crate::error::{Error, Result};
use crate::shell;

const PUBLIC_HOST: &str = "github.com";

/// What to do with a private remote when no credential was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingCredentialPolicy {
    /// Leave the module out and record a diagnostic
    #[default]
    Skip,
    /// Abort generation
    Fail,
}

/// One module installation, one variant per fetch mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStatement {
    /// Module repository install, forced and without dependency resolution
    VersionedPackage {
        module: String,
        version: Option<semver::Version>,
    },
    /// Tarball of a public repository at a reference
    PublicArchiveFetch {
        module: String,
        directory: String,
        url: String,
    },
    /// `git archive` over SSH with the supplied key
    CredentialedArchiveFetch {
        module: String,
        directory: String,
        remote: String,
        reference: String,
        key: PathBuf,
    },
}

/// A module left out of the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipDiagnostic {
    pub module: String,
    pub remote: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Planned {
    Install(InstallStatement),
    Skipped(SkipDiagnostic),
}

/// Choose the statement for a module.
pub fn plan(
    module: &BootstrapModule,
    credential: Option<&Path>,
    policy: MissingCredentialPolicy,
) -> Result<Planned> {
    let (remote, reference) = match &module.source {
        ModuleSource::Package { version } => {
            return Ok(Planned::Install(InstallStatement::VersionedPackage {
                module: module.name.clone(),
                version: version.clone(),
            }));
        }
        ModuleSource::Git { remote, reference } => (remote, reference.as_deref()),
    };

    if let Some((owner, repo)) = public_repo(remote) {
        let mut url = format!("https://api.{}/repos/{}/{}/tarball", PUBLIC_HOST, owner, repo);
        if let Some(reference) = reference {
            url.push('/');
            url.push_str(reference);
        }
        return Ok(Planned::Install(InstallStatement::PublicArchiveFetch {
            module: module.name.clone(),
            directory: module.short_name().to_string(),
            url,
        }));
    }

    if let Some(key) = credential {
        return Ok(Planned::Install(InstallStatement::CredentialedArchiveFetch {
            module: module.name.clone(),
            directory: module.short_name().to_string(),
            remote: remote.clone(),
            reference: reference.unwrap_or("HEAD").to_string(),
            key: key.to_path_buf(),
        }));
    }

    match policy {
        MissingCredentialPolicy::Fail => Err(Error::MissingCredential {
            module: module.name.clone(),
            remote: remote.clone(),
        }),
        MissingCredentialPolicy::Skip => {
            warn!(module = module.name, remote, "no credential for private remote, skipping");
            Ok(Planned::Skipped(SkipDiagnostic {
                module: module.name.clone(),
                remote: remote.clone(),
                reason: "no credential supplied for a private remote".to_string(),
            }))
        }
    }
}

/// Owner and repository of a remote on the public host.
///
/// Accepts `https://github.com/org/repo`, `git@github.com:org/repo.git` and
/// `github:org/repo`.
pub fn public_repo(remote: &str) -> Option<(String, String)> {
    let path = if let Some(rest) = remote.strip_prefix("github:") {
        rest.to_string()
    } else if let Some(rest) = remote.strip_prefix(&format!("git@{}:", PUBLIC_HOST)) {
        rest.to_string()
    } else {
        let url = url::Url::parse(remote).ok()?;
        let host = url.host_str()?;
        if host != PUBLIC_HOST && host != format!("www.{}", PUBLIC_HOST) {
            return None;
        }
        url.path().trim_start_matches('/').to_string()
    };

    let mut parts = path.trim_end_matches('/').splitn(3, '/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next().filter(|s| !s.is_empty())?;
    if parts.next().is_some() {
        return None;
    }
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    Some((owner.to_string(), repo.to_string()))
}

impl InstallStatement {
    pub fn module(&self) -> &str {
        match self {
            InstallStatement::VersionedPackage { module, .. }
            | InstallStatement::PublicArchiveFetch { module, .. }
            | InstallStatement::CredentialedArchiveFetch { module, .. } => module,
        }
    }

    /// Shell lines installing the module under `module_dir`.
    pub fn render(&self, module_dir: &str) -> Vec<String> {
        match self {
            InstallStatement::VersionedPackage { module, version } => {
                let mut words = vec!["puppet", "module", "install", module.as_str()];
                let version = version.as_ref().map(|v| v.to_string());
                if let Some(version) = &version {
                    words.extend(["--version", version.as_str()]);
                }
                words.extend(["--force", "--ignore-dependencies", "--target-dir", module_dir]);
                vec![shell::join(words)]
            }
            InstallStatement::PublicArchiveFetch { directory, url, .. } => {
                let dest = format!("{}/{}", module_dir, directory);
                let mut lines = reset_dir(&dest);
                lines.push(format!(
                    "{} | {}",
                    shell::join(["curl", "-fsSL", url.as_str()]),
                    shell::join(["tar", "-xz", "--strip-components=1", "-C", dest.as_str()])
                ));
                lines
            }
            InstallStatement::CredentialedArchiveFetch {
                directory,
                remote,
                reference,
                key,
                ..
            } => {
                let dest = format!("{}/{}", module_dir, directory);
                let key = key.display().to_string();
                let ssh = shell::join([
                    "ssh",
                    "-i",
                    key.as_str(),
                    "-o",
                    "StrictHostKeyChecking=no",
                ]);
                let remote = format!("--remote={}", remote);
                let mut lines = reset_dir(&dest);
                lines.push(format!(
                    "GIT_SSH_COMMAND={} {} | {}",
                    shell::quote(&ssh),
                    shell::join([
                        "git",
                        "archive",
                        "--format=tar",
                        remote.as_str(),
                        reference.as_str(),
                    ]),
                    shell::join(["tar", "-x", "-C", dest.as_str()])
                ));
                lines
            }
        }
    }
}

fn reset_dir(dest: &str) -> Vec<String> {
    vec![shell::join(["rm", "-rf", dest]), shell::join(["mkdir", "-p", dest])]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git(name: &str, remote: &str, reference: Option<&str>) -> BootstrapModule {
        BootstrapModule {
            name: name.to_string(),
            source: ModuleSource::Git {
                remote: remote.to_string(),
                reference: reference.map(str::to_string),
            },
        }
    }

    #[test]
    fn recognises_public_remotes() {
        let expected = Some(("org".to_string(), "repo".to_string()));
        assert_eq!(public_repo("https://github.com/org/repo"), expected);
        assert_eq!(public_repo("https://github.com/org/repo.git"), expected);
        assert_eq!(public_repo("git@github.com:org/repo.git"), expected);
        assert_eq!(public_repo("github:org/repo"), expected);
        assert_eq!(public_repo("git@host:org/repo"), None);
        assert_eq!(public_repo("https://gitlab.com/org/repo"), None);
        assert_eq!(public_repo("https://github.com/org"), None);
        assert_eq!(public_repo("https://github.com/org/repo/tree/main"), None);
    }

    #[test]
    fn public_remote_uses_tarball_api() {
        let planned = plan(
            &git("example-role", "https://github.com/example/role", Some("v1.0.0")),
            None,
            MissingCredentialPolicy::Skip,
        )
        .unwrap();
        let Planned::Install(statement) = planned else {
            panic!("expected an install statement");
        };
        assert_eq!(
            statement.render("/modules"),
            vec![
                "rm -rf /modules/role",
                "mkdir -p /modules/role",
                "curl -fsSL https://api.github.com/repos/example/role/tarball/v1.0.0 | tar -xz --strip-components=1 -C /modules/role",
            ]
        );
    }

    #[test]
    fn private_remote_with_credential_uses_git_archive() {
        let planned = plan(
            &git("site_profile", "git@git.example.com:ops/profile.git", Some("main")),
            Some(Path::new("/root/.ssh/deploy")),
            MissingCredentialPolicy::Skip,
        )
        .unwrap();
        let Planned::Install(statement) = planned else {
            panic!("expected an install statement");
        };
        let lines = statement.render("/modules");
        assert_eq!(
            lines[2],
            "GIT_SSH_COMMAND='ssh -i /root/.ssh/deploy -o StrictHostKeyChecking=no' git archive --format=tar --remote=git@git.example.com:ops/profile.git main | tar -x -C /modules/site_profile"
        );
    }

    #[test]
    fn private_remote_without_reference_archives_head() {
        let planned = plan(
            &git("x", "ssh://git.example.com/x.git", None),
            Some(Path::new("/k")),
            MissingCredentialPolicy::Skip,
        )
        .unwrap();
        assert!(matches!(
            planned,
            Planned::Install(InstallStatement::CredentialedArchiveFetch { ref reference, .. }) if reference == "HEAD"
        ));
    }

    #[test]
    fn missing_credential_fails_under_fail_policy() {
        let err = plan(
            &git("x", "git@host:org/repo", Some("main")),
            None,
            MissingCredentialPolicy::Fail,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingCredential { .. }));
    }

    #[test]
    fn unversioned_package_has_no_version_flag() {
        let statement = InstallStatement::VersionedPackage {
            module: "puppetlabs-ntp".to_string(),
            version: None,
        };
        assert_eq!(
            statement.render("/modules"),
            vec!["puppet module install puppetlabs-ntp --force --ignore-dependencies --target-dir /modules"]
        );
    }

    #[test]
    fn hostile_names_are_quoted() {
        let statement = InstallStatement::VersionedPackage {
            module: "x; rm -rf /".to_string(),
            version: None,
        };
        assert!(statement.render("/modules")[0].contains("'x; rm -rf /'"));
    }
}
