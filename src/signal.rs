//! Interrupt handling.
//!
//! SIGINT and SIGTERM cancel a shared token; long-running pipelines observe
//! it between and during stages and roll back their partial state.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit status reported when a command was interrupted.
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Spawns a task that cancels `token` on the first SIGINT or SIGTERM.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_interrupt_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to install SIGINT handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("received SIGINT"),
            () = terminate => info!("received SIGTERM"),
            () = token.cancelled() => return,
        }
        token.cancel();
    })
}
