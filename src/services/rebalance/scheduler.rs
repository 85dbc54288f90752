// SPDX-License-Identifier: MIT

use crate::common::metrics::EngineStats;
use crate::domain::balance::{Allocation, TokenBalance};
use crate::domain::error::AppError;
use crate::domain::proposal::{Proposal, ProposalStatus};
use crate::infrastructure::data::store::ProposalStore;
use crate::infrastructure::network::price_feed::PriceFeed;
use crate::infrastructure::network::treasury::TreasuryReader;
use crate::services::rebalance::decision::{DecisionConfig, analyze_allocations};
use crate::services::rebalance::lifecycle::ProposalService;
use crate::services::rebalance::notifier::ProposalEvent;
use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Periodic orchestrator: reads chain state, runs the decision engine,
/// persists fresh proposals, and sweeps approved proposals into execution
/// when auto-execution is on.
pub struct Scheduler<S> {
    reader: Arc<TreasuryReader>,
    feed: PriceFeed,
    store: Arc<S>,
    service: Arc<ProposalService<S>>,
    decision: DecisionConfig,
    tokens: Vec<Address>,
    interval: Duration,
    events: UnboundedSender<ProposalEvent>,
    stats: Arc<EngineStats>,
}

impl<S: ProposalStore> Scheduler<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: Arc<TreasuryReader>,
        feed: PriceFeed,
        store: Arc<S>,
        service: Arc<ProposalService<S>>,
        decision: DecisionConfig,
        tokens: Vec<Address>,
        interval: Duration,
        events: UnboundedSender<ProposalEvent>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            reader,
            feed,
            store,
            service,
            decision,
            tokens,
            interval,
            events,
            stats,
        }
    }

    /// Tick loop. The cycle runs inline on this task, so a tick that
    /// overlaps a still-running cycle is skipped, never run concurrently.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), AppError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            target: "scheduler",
            interval_secs = self.interval.as_secs(),
            tokens = self.tokens.len(),
            "Allocation checks scheduled"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            match self.run_cycle().await {
                Ok(created) => {
                    self.stats.cycles_run.fetch_add(1, Ordering::Relaxed);
                    if created > 0 {
                        tracing::info!(target: "scheduler", created, "Rebalancing proposals persisted");
                    } else {
                        tracing::debug!(target: "scheduler", "No rebalancing needed");
                    }
                }
                Err(e) => {
                    // Transient by design: skip this cycle, retry next tick.
                    self.stats.cycles_skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(target: "scheduler", error = %e, "Allocation check skipped");
                    let _ = self.events.send(ProposalEvent::SystemError {
                        context: "Allocation check".to_string(),
                        message: e.to_string(),
                    });
                }
            }

            self.sweep_approved().await;
        }
    }

    /// One allocation check. Returns how many proposals were persisted.
    pub async fn run_cycle(&self) -> Result<usize, AppError> {
        if self.tokens.len() < 2 {
            tracing::debug!(
                target: "scheduler",
                "Allocation check requires at least 2 configured tokens"
            );
            return Ok(0);
        }

        let (balances, targets) = self.observe().await?;
        let analysis = analyze_allocations(&balances, &targets, &self.decision);

        for row in &analysis.allocations {
            if !row.within_threshold {
                let symbol = symbol_for(&balances, row.token);
                let _ = self.events.send(ProposalEvent::RebalanceNeeded {
                    symbol,
                    current_bps: row.current_bps,
                    target_bps: row.target_bps,
                    deviation_bps: row.deviation_bps,
                });
            }
        }

        self.persist_proposals(analysis.proposals).await
    }

    /// Persist freshly synthesized proposals, enforcing at most one open
    /// proposal per (token, strategy) pair. Returns how many were saved.
    pub async fn persist_proposals(&self, proposals: Vec<Proposal>) -> Result<usize, AppError> {
        let mut created = 0;
        for proposal in proposals {
            if let Some(open) = self
                .store
                .find_open(proposal.token, proposal.strategy)
                .await?
            {
                tracing::debug!(
                    target: "scheduler",
                    token = %proposal.token,
                    open = %open.id,
                    "Pair already has an open proposal; skipping"
                );
                continue;
            }
            self.store.save(&proposal).await?;
            self.stats.proposals_created.fetch_add(1, Ordering::Relaxed);
            let _ = self.events.send(ProposalEvent::Created(proposal));
            created += 1;
        }

        Ok(created)
    }

    /// Allocation snapshot for the status surface; same observation path
    /// as the periodic check, without persisting anything.
    pub async fn allocations_snapshot(&self) -> Result<Vec<Allocation>, AppError> {
        let (balances, targets) = self.observe().await?;
        Ok(analyze_allocations(&balances, &targets, &self.decision).allocations)
    }

    async fn observe(&self) -> Result<(Vec<TokenBalance>, HashMap<Address, u64>), AppError> {
        let mut targets = HashMap::new();
        for token in &self.tokens {
            targets.insert(*token, self.reader.target_allocation(*token).await?);
        }

        let mut balances = self
            .reader
            .balances(&self.tokens, self.decision.default_strategy)
            .await?;
        for balance in &mut balances {
            match self.feed.get_price(&balance.symbol).await {
                Ok(quote) => balance.price_e8 = Some(quote.price_e8),
                Err(e) => {
                    tracing::warn!(
                        target: "scheduler",
                        symbol = %balance.symbol,
                        error = %e,
                        "No price; token excluded from deviation calculation"
                    );
                }
            }
        }

        Ok((balances, targets))
    }

    /// Drive approved proposals into execution. Picks up both fresh quorum
    /// approvals and proposals recovered as `approved` after a restart.
    async fn sweep_approved(&self) {
        if !self.service.auto_execute_enabled() {
            return;
        }
        let approved = match self.store.all().await {
            Ok(all) => all
                .into_iter()
                .filter(|p| p.status == ProposalStatus::Approved)
                .collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(target: "scheduler", error = %e, "Approved sweep could not list proposals");
                return;
            }
        };

        for proposal in approved {
            match self.service.execute(&proposal.id).await {
                Ok(tx_hash) => {
                    tracing::info!(target: "scheduler", proposal = %proposal.id, tx_hash = %tx_hash, "Auto-executed");
                }
                Err(AppError::AlreadyExecuting(_)) => {}
                Err(AppError::Validation { .. }) => {}
                Err(e) => {
                    tracing::warn!(
                        target: "scheduler",
                        proposal = %proposal.id,
                        error = %e,
                        "Auto-execution failed"
                    );
                }
            }
        }
    }
}

fn symbol_for(balances: &[TokenBalance], token: Address) -> String {
    balances
        .iter()
        .find(|b| b.token == token)
        .map(|b| b.symbol.clone())
        .unwrap_or_else(|| token.to_string())
}
