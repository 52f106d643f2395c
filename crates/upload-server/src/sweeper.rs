//! Periodic reclamation of abandoned upload sessions.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::{MIN_SWEEP_INTERVAL, SweepConfig};
use crate::service::UploadService;

/// Spawns a task that sweeps expired sessions every `config.interval` until
/// `cancel` fires. The first sweep runs immediately. Intervals below
/// [`MIN_SWEEP_INTERVAL`] are raised to it.
pub fn spawn_sweeper(
    service: UploadService,
    config: SweepConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = config.interval.max(MIN_SWEEP_INTERVAL);
        if period != config.interval {
            warn!(
                configured_ms = config.interval.as_millis() as u64,
                "sweep interval too short, using {}s",
                period.as_secs()
            );
        }
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match service.sweep(config.max_age).await {
                        Ok(report) => debug!(
                            removed = report.removed,
                            orphans = report.orphans,
                            failed = report.failed,
                            "session sweep tick"
                        ),
                        Err(e) => error!("session sweep failed: {e}"),
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("session sweeper stopped");
                    break;
                }
            }
        }
    })
}
