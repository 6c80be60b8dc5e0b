//! Background refresh loop for the event snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::snapshot::SnapshotManager;

/// Run the time-based refresh loop until `shutdown` flips to true.
///
/// Each tick forces a feed fetch and epoch rollover. A failed tick logs and
/// leaves the current epoch in place; the next tick tries again.
pub async fn run_refresh_loop(
    manager: Arc<SnapshotManager>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), "event refresh loop starting");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("event refresh loop shutting down");
                    break;
                }
            }
            _ = sleep(interval) => {
                match manager.refresh().await {
                    Ok(epoch) => info!(epoch, "scheduled refresh complete"),
                    Err(err) => {
                        warn!(error = %err, "scheduled refresh failed, keeping current epoch");
                    }
                }
            }
        }
    }
}
