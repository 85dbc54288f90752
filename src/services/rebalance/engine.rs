// SPDX-License-Identifier: MIT

use crate::common::metrics::{EngineStats, spawn_metrics_server};
use crate::domain::error::AppError;
use crate::infrastructure::data::store::ProposalStore;
use crate::services::rebalance::notifier::{Notifier, ProposalEvent};
use crate::services::rebalance::scheduler::Scheduler;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Top-level wiring: metrics endpoint, notifier, and (unless disabled)
/// the periodic scheduler, joined on one task until shutdown.
pub struct Engine<S> {
    scheduler: Option<Scheduler<S>>,
    notifier: Notifier,
    events_rx: UnboundedReceiver<ProposalEvent>,
    stats: Arc<EngineStats>,
    metrics_port: u16,
    shutdown: CancellationToken,
}

impl<S: ProposalStore> Engine<S> {
    pub fn new(
        scheduler: Option<Scheduler<S>>,
        notifier: Notifier,
        events_rx: UnboundedReceiver<ProposalEvent>,
        stats: Arc<EngineStats>,
        metrics_port: u16,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            scheduler,
            notifier,
            events_rx,
            stats,
            metrics_port,
            shutdown,
        }
    }

    pub async fn run(self) -> Result<(), AppError> {
        let Engine {
            scheduler,
            notifier,
            events_rx,
            stats,
            metrics_port,
            shutdown,
        } = self;

        let _metrics_addr = spawn_metrics_server(metrics_port, stats).await;

        match scheduler {
            Some(scheduler) => {
                tokio::try_join!(scheduler.run(shutdown.clone()), async {
                    notifier.run(events_rx, shutdown.clone()).await;
                    Ok::<(), AppError>(())
                })
                .map(|_| ())
            }
            None => {
                tracing::info!("Scheduler disabled; running notifier only");
                notifier.run(events_rx, shutdown).await;
                Ok(())
            }
        }
    }
}
