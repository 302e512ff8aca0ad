//! Local helper that supplies the service account password.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::BridgeError;

/// A program whose trimmed stdout is the shared service-account password.
///
/// The same program doubles as `SSH_ASKPASS`, so `ssh` never prompts.
#[derive(Debug, Clone)]
pub struct CredentialHelper {
    program: PathBuf,
}

impl CredentialHelper {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn exists(&self) -> bool {
        self.program.is_file()
    }

    /// Run the helper and return the password.
    pub fn fetch(&self) -> Result<String, BridgeError> {
        let output = Command::new(&self.program)
            .output()
            .map_err(|e| self.error(e.to_string()))?;
        if !output.status.success() {
            return Err(self.error(format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let secret = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if secret.is_empty() {
            return Err(self.error("printed an empty credential".to_string()));
        }
        Ok(secret)
    }

    fn error(&self, message: String) -> BridgeError {
        BridgeError::Credential {
            helper: self.program.display().to_string(),
            message,
        }
    }
}
