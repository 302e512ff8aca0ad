//! Core types shared across stagehand.

use serde::{Deserialize, Serialize};

/// Role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Hosts the certificate authority and classification service
    Primary,
    /// Load-balanced compile node behind the pool address
    Secondary,
    /// Plain managed node
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Secondary => "secondary",
            Role::Agent => "agent",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" | "master" => Ok(Role::Primary),
            "secondary" | "compile" => Ok(Role::Secondary),
            "agent" => Ok(Role::Agent),
            _ => Err(crate::Error::Usage(format!(
                "Unknown role: {}. Use 'primary', 'secondary' or 'agent'",
                s
            ))),
        }
    }
}

/// A node known to the inventory.
///
/// Identity is the hostname; secondaries additionally carry their 1-based ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub hostname: String,
    pub role: Role,
    pub ordinal: Option<u32>,
}

impl Node {
    pub fn primary(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            role: Role::Primary,
            ordinal: None,
        }
    }

    pub fn secondary(hostname: impl Into<String>, ordinal: u32) -> Self {
        Self {
            hostname: hostname.into(),
            role: Role::Secondary,
            ordinal: Some(ordinal),
        }
    }

    pub fn agent(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            role: Role::Agent,
            ordinal: None,
        }
    }
}
