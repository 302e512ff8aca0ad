//! Config path resolution helpers.

use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "stagehand.toml";

/// First existing config file among the working directory and the user config dir.
pub fn default_config_path() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok();
    let global = dirs::config_dir().map(|dir| dir.join("stagehand"));
    first_existing(cwd.as_deref(), global.as_deref())
}

fn first_existing(project_root: Option<&Path>, global_dir: Option<&Path>) -> Option<PathBuf> {
    [project_root, global_dir]
        .into_iter()
        .flatten()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|path| path.exists())
}
