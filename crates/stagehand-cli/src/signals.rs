//! Run-wide cancellation.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Cancel `cancel` on Ctrl-C or once `timeout` elapses.
///
/// The watcher owns a small runtime on its own thread; the orchestration itself
/// stays synchronous.
pub fn spawn_watcher(cancel: CancellationToken, timeout: Option<Duration>) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(error = %err, "cancellation watcher unavailable");
                return;
            }
        };

        runtime.block_on(async move {
            let deadline = async {
                match timeout {
                    Some(timeout) => tokio::time::sleep(timeout).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => warn!("interrupted, cancelling"),
                _ = deadline => warn!(?timeout, "orchestrator timeout elapsed, cancelling"),
                _ = cancel.cancelled() => return,
            }
            cancel.cancel();
        });
    });
}
