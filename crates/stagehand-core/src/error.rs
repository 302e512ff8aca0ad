//! Error taxonomy for orchestration runs.

use std::path::PathBuf;

use thiserror::Error;

use crate::remote::BridgeError;

/// Result type alias for stagehand operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of a failure, used to pick the exit status and the diagnostic tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad arguments or a missing required local file. Nothing was attempted.
    Usage,
    /// Inventory entries or external tools are missing. Nothing was attempted.
    Precondition,
    /// An installer, remote host, CA or REST call failed.
    External,
    /// The classification service state cannot be reconciled safely.
    Consistency,
    /// The run was aborted by the operator or the orchestrator timeout.
    Cancelled,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Usage => "usage",
            ErrorCategory::Precondition => "precondition",
            ErrorCategory::External => "external",
            ErrorCategory::Consistency => "consistency",
            ErrorCategory::Cancelled => "cancelled",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCategory::Usage => 1,
            ErrorCategory::Precondition => 2,
            ErrorCategory::External => 3,
            ErrorCategory::Consistency => 4,
            ErrorCategory::Cancelled => 130,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while provisioning a node
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("Required file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Post-install mode must run on the primary node ({primary}), not on {hostname}")]
    NotOnPrimary { hostname: String, primary: String },

    #[error("Inventory entry '{name}' is missing from {}", hosts_file.display())]
    MissingInventoryEntry { name: String, hosts_file: PathBuf },

    #[error("Hostname '{hostname}' does not match the secondary pattern '{pattern}'")]
    UnknownOrdinal { hostname: String, pattern: String },

    #[error(
        "Secondary '{hostname}' has ordinal {ordinal}, outside inventory.secondary_count ({count})"
    )]
    OrdinalOutOfRange {
        hostname: String,
        ordinal: u32,
        count: u32,
    },

    #[error("Required tool not found on PATH: {tool}")]
    ToolNotFound { tool: String },

    #[error("{step} failed on {host} with exit status {status}: {output}")]
    CommandFailed {
        step: String,
        host: String,
        status: i32,
        output: String,
    },

    #[error("{step} on {host}: {source}")]
    Bridge {
        step: String,
        host: String,
        #[source]
        source: BridgeError,
    },

    #[error("No enrollment request observed after {attempts} attempts")]
    NoEnrollmentRequest { attempts: u32 },

    #[error("Classification request {method} {url} failed: {message}")]
    Http {
        method: &'static str,
        url: String,
        message: String,
    },

    #[error("Classification group '{name}' not found")]
    GroupNotFound { name: String },

    #[error("Classification group name '{name}' matches {count} groups")]
    AmbiguousGroup { name: String, count: usize },

    #[error("Classification group id '{id}' not found")]
    GroupIdNotFound { id: String },

    #[error("Manifest line {line}: {message}")]
    Manifest { line: usize, message: String },

    #[error("Module '{module}' needs a credential to fetch from {remote}")]
    MissingCredential { module: String, remote: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Usage(_)
            | Error::MissingFile { .. }
            | Error::ConfigNotFound { .. }
            | Error::InvalidConfig { .. }
            | Error::NotOnPrimary { .. }
            | Error::Manifest { .. } => ErrorCategory::Usage,
            Error::MissingInventoryEntry { .. }
            | Error::UnknownOrdinal { .. }
            | Error::OrdinalOutOfRange { .. }
            | Error::ToolNotFound { .. }
            | Error::MissingCredential { .. } => ErrorCategory::Precondition,
            Error::GroupNotFound { .. }
            | Error::AmbiguousGroup { .. }
            | Error::GroupIdNotFound { .. } => ErrorCategory::Consistency,
            Error::Cancelled => ErrorCategory::Cancelled,
            Error::Bridge { source, .. } if source.is_cancelled() => ErrorCategory::Cancelled,
            Error::CommandFailed { .. }
            | Error::Bridge { .. }
            | Error::NoEnrollmentRequest { .. }
            | Error::Http { .. }
            | Error::Io(_)
            | Error::Toml(_)
            | Error::Json(_)
            | Error::Archive(_) => ErrorCategory::External,
        }
    }
}
