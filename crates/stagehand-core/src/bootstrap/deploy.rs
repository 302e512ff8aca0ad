//! Running the generated script on enrolled nodes.

use std::path::Path;

use tracing::info;

use super::render::SCRIPT_NAME;
use crate::error::{Error, Result};
use crate::inventory::Inventory;
use crate::remote::RemoteExec;
use crate::shell;

const STEP: &str = "bootstrap script";

/// Run `<output_dir>/bootstrap.sh` on the primary, then on secondaries 1..N.
///
/// Nodes are handled one at a time and the first failure stops the run.
/// Returns the hosts the script completed on.
pub fn deploy(
    bridge: &dyn RemoteExec,
    inventory: &Inventory,
    output_dir: &Path,
) -> Result<Vec<String>> {
    let script = output_dir.join(SCRIPT_NAME).display().to_string();
    let command = shell::join(["sh", script.as_str()]);

    let mut hosts = vec![inventory.primary().to_string()];
    hosts.extend(
        inventory
            .secondaries(inventory.secondary_count())
            .into_iter()
            .map(|node| node.hostname),
    );

    let mut done = Vec::with_capacity(hosts.len());
    for host in hosts {
        info!(host, "running bootstrap script");
        let output = bridge.exec(&host, &command).map_err(|source| Error::Bridge {
            step: STEP.to_string(),
            host: host.clone(),
            source,
        })?;
        if !output.success() {
            return Err(Error::CommandFailed {
                step: STEP.to_string(),
                host,
                status: output.status,
                output: output.output,
            });
        }
        done.push(host);
    }
    Ok(done)
}
