//! Periodic cleanup and statistics reconciliation.

use crate::job::Priority;
use crate::metrics::QueueMetrics;
use crate::service::QueueCore;
use crate::stats::QueueStats;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

/// Evicts terminal jobs that finished more than `retention` ago.
pub(crate) fn cleanup(core: &QueueCore, retention: Duration) -> usize {
    let cutoff = chrono::Duration::from_std(retention)
        .ok()
        .and_then(|d| Utc::now().checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let evicted = core.queues.evict_finished(cutoff);
    if evicted > 0 {
        QueueMetrics::evicted(evicted);
        info!(evicted, "Cleaned up finished jobs");
    }
    evicted
}

/// Recounts pending jobs per tier from the queues.
pub(crate) fn reconcile(core: &QueueCore) -> QueueStats {
    let pending: BTreeMap<Priority, u64> = Priority::ALL
        .iter()
        .map(|p| (*p, core.queues.queued_len(*p) as u64))
        .collect();

    for (priority, count) in &pending {
        QueueMetrics::queue_depth(*priority, *count);
    }

    let stats = core.stats.reconcile(pending);
    QueueMetrics::in_flight(stats.in_flight);
    debug!(pending = stats.pending_total(), in_flight = stats.in_flight, "Reconciled statistics");
    stats
}

/// Spawns a loop that runs `task` every `period` until shutdown.
fn spawn_periodic(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    core: Arc<QueueCore>,
    task: impl Fn(&QueueCore) + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    let span = tracing::info_span!("housekeeping", task = name);
    tokio::spawn(
        async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => task(&core),
                }
            }

            debug!("Housekeeping loop stopped");
        }
        .instrument(span),
    )
}

/// Spawns the cleanup loop.
pub(crate) fn spawn_cleanup(
    core: Arc<QueueCore>,
    interval: Duration,
    retention: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    spawn_periodic("cleanup", interval, shutdown, core, move |core| {
        cleanup(core, retention);
    })
}

/// Spawns the statistics reconciliation loop.
pub(crate) fn spawn_reconcile(
    core: Arc<QueueCore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    spawn_periodic("reconcile", interval, shutdown, core, |core| {
        reconcile(core);
    })
}
