use chrono::Utc;
use farebox_order::ReconciliationService;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Periodic reconciliation: reclaim lapsed holds, complete departed trips,
/// clean orphans. Every pass is idempotent, so cadence is a tuning knob,
/// not a correctness requirement; lazy reclamation covers the gaps.
pub async fn start_reconciliation_worker(recon: Arc<ReconciliationService>, interval: Duration) {
    info!("reconciliation worker started, interval {:?}", interval);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match recon.sweep_holds().await {
            Ok(summary) if summary.reclaimed > 0 => {
                info!(reclaimed = summary.reclaimed, "worker reclaimed lapsed holds");
            }
            Ok(_) => {}
            Err(err) => error!("hold sweep failed: {}", err),
        }

        let now = Utc::now();
        if let Err(err) = recon.complete_past_trips(now).await {
            error!("past-trip completion failed: {}", err);
        }
        if let Err(err) = recon.purge_orphans(now).await {
            error!("orphan cleanup failed: {}", err);
        }
    }
}
