//! Node inventory: hostnames, secondary ordinals and the hosts file they live in.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::InventoryConfig;
use crate::error::{Error, Result};
use crate::types::{Node, Role};

const ORDINAL: &str = "{n}";

#[derive(Debug, Clone)]
pub struct Inventory {
    primary: String,
    pool_address: String,
    secondary_pattern: String,
    secondary_count: u32,
    hosts_file: PathBuf,
}

impl Inventory {
    pub fn from_config(config: &InventoryConfig) -> Self {
        Self {
            primary: config.primary.clone(),
            pool_address: config.pool_address.clone(),
            secondary_pattern: config.secondary_pattern.clone(),
            secondary_count: config.secondary_count,
            hosts_file: config.hosts_file.clone(),
        }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn pool_address(&self) -> &str {
        &self.pool_address
    }

    pub fn secondary_count(&self) -> u32 {
        self.secondary_count
    }

    pub fn secondary_hostname(&self, ordinal: u32) -> String {
        self.secondary_pattern.replace(ORDINAL, &ordinal.to_string())
    }

    /// Secondaries 1..=`up_to`, oldest first.
    pub fn secondaries(&self, up_to: u32) -> Vec<Node> {
        (1..=up_to)
            .map(|n| Node::secondary(self.secondary_hostname(n), n))
            .collect()
    }

    /// Ordinal encoded in a secondary hostname.
    pub fn ordinal_of(&self, hostname: &str) -> Result<u32> {
        let unknown = || Error::UnknownOrdinal {
            hostname: hostname.to_string(),
            pattern: self.secondary_pattern.clone(),
        };
        let (prefix, suffix) = self
            .secondary_pattern
            .split_once(ORDINAL)
            .ok_or_else(unknown)?;
        let digits = hostname
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
            .ok_or_else(unknown)?;
        match digits.parse::<u32>() {
            Ok(n) if n >= 1 && digits.chars().all(|c| c.is_ascii_digit()) => Ok(n),
            _ => Err(unknown()),
        }
    }

    /// The node `hostname` is, given the role it is being provisioned as.
    ///
    /// A secondary's ordinal must lie in `1..=secondary_count`: `bootstrap deploy`
    /// only reaches that range.
    pub fn node(&self, role: Role, hostname: &str, ordinal: Option<u32>) -> Result<Node> {
        Ok(match role {
            Role::Primary => Node::primary(hostname),
            Role::Agent => Node::agent(hostname),
            Role::Secondary => {
                let ordinal = match ordinal {
                    Some(n) => n,
                    None => self.ordinal_of(hostname)?,
                };
                if ordinal == 0 || ordinal > self.secondary_count {
                    return Err(Error::OrdinalOutOfRange {
                        hostname: hostname.to_string(),
                        ordinal,
                        count: self.secondary_count,
                    });
                }
                Node::secondary(hostname, ordinal)
            }
        })
    }

    /// Fail unless `hostname` is the primary.
    pub fn require_primary(&self, hostname: &str) -> Result<()> {
        if hostname == self.primary {
            return Ok(());
        }
        Err(Error::NotOnPrimary {
            hostname: hostname.to_string(),
            primary: self.primary.clone(),
        })
    }

    /// Names that must be resolvable before a node of `role` is provisioned.
    pub fn required_names(&self, node: &Node) -> Vec<String> {
        let mut names = vec![self.primary.clone()];
        if node.role != Role::Primary {
            names.push(self.pool_address.clone());
        }
        if node.role == Role::Secondary {
            names.push(node.hostname.clone());
        }
        names
    }

    /// Check that every required name has an entry in the hosts file.
    pub fn verify(&self, node: &Node) -> Result<()> {
        let known = read_host_names(&self.hosts_file);
        for name in self.required_names(node) {
            if !known.contains(&name) {
                return Err(Error::MissingInventoryEntry {
                    name,
                    hosts_file: self.hosts_file.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Hostnames and aliases declared in a hosts(5) file. Unreadable files declare nothing.
fn read_host_names(path: &Path) -> HashSet<String> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return HashSet::new();
    };
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(|line| line.split_whitespace().skip(1))
        .map(str::to_string)
        .collect()
}
