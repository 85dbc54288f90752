// SPDX-License-Identifier: MIT

use crate::common::ids::new_proposal_id;
use crate::common::metrics::EngineStats;
use crate::common::time::current_unix_ms;
use crate::domain::error::AppError;
use crate::domain::proposal::{Proposal, ProposalDraft, ProposalKind, ProposalStatus};
use crate::infrastructure::data::store::{ProposalStore, ProposalUpdate};
use crate::infrastructure::network::relayer::Relayer;
use crate::services::rebalance::guard::ExecutionGuard;
use crate::services::rebalance::multisig::MultiSig;
use crate::services::rebalance::notifier::ProposalEvent;
use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc::UnboundedSender;

/// Fallbacks for caller-omitted draft fields.
#[derive(Clone, Copy, Debug)]
pub struct ServiceDefaults {
    pub token: Address,
    pub strategy: Address,
}

/// Orchestrating facade over the proposal lifecycle: creation, owner
/// confirmation, quorum transitions, and relayer execution. This is the
/// surface the HTTP layer binds to.
///
/// Execution authority is an explicit capability: a deployment without a
/// relayer key simply has `execution_enabled() == false`, and no nullable
/// relayer is threaded through the call paths.
pub struct ProposalService<S> {
    store: Arc<S>,
    multisig: Option<MultiSig<S>>,
    relayer: Option<Arc<Relayer>>,
    guard: ExecutionGuard,
    events: UnboundedSender<ProposalEvent>,
    stats: Arc<EngineStats>,
    defaults: ServiceDefaults,
    auto_execute: bool,
}

impl<S: ProposalStore> ProposalService<S> {
    pub fn new(
        store: Arc<S>,
        multisig: Option<MultiSig<S>>,
        relayer: Option<Arc<Relayer>>,
        events: UnboundedSender<ProposalEvent>,
        stats: Arc<EngineStats>,
        defaults: ServiceDefaults,
        auto_execute: bool,
    ) -> Self {
        Self {
            store,
            multisig,
            relayer,
            guard: ExecutionGuard::new(),
            events,
            stats,
            defaults,
            auto_execute,
        }
    }

    pub fn execution_enabled(&self) -> bool {
        self.relayer.is_some()
    }

    pub fn auto_execute_enabled(&self) -> bool {
        self.auto_execute && self.relayer.is_some()
    }

    pub fn multisig_enabled(&self) -> bool {
        self.multisig.is_some()
    }

    /// All proposals in stable creation order.
    pub async fn proposals(&self) -> Result<Vec<Proposal>, AppError> {
        self.store.all().await
    }

    pub async fn proposal(&self, id: &str) -> Result<Proposal, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    /// Create a proposal from caller-supplied fields, defaulting the rest.
    /// Always starts `pending`.
    pub async fn create(&self, draft: ProposalDraft) -> Result<Proposal, AppError> {
        let amount = match &draft.amount {
            Some(raw) => raw.parse::<U256>().map_err(|e| AppError::Validation {
                field: "amount".to_string(),
                message: format!("invalid amount '{raw}': {e}"),
            })?,
            None => U256::ZERO,
        };

        let proposal = Proposal {
            id: new_proposal_id(),
            timestamp: current_unix_ms(),
            kind: draft.kind.unwrap_or(ProposalKind::Deposit),
            token: draft.token.unwrap_or(self.defaults.token),
            amount,
            strategy: draft.strategy.unwrap_or(self.defaults.strategy),
            reason: draft
                .reason
                .unwrap_or_else(|| "Manual proposal".to_string()),
            status: ProposalStatus::Pending,
            tx_hash: None,
            execution_time: draft.execution_time,
        };

        self.store.save(&proposal).await?;
        self.stats.proposals_created.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(ProposalEvent::Created(proposal.clone()));
        Ok(proposal)
    }

    /// Record an owner approval. On quorum the proposal moves to
    /// `approved`; with auto-execution enabled the relayer is invoked
    /// immediately, and any execution failure lands on the proposal record
    /// rather than failing the confirmation.
    pub async fn confirm(&self, id: &str, owner: Address) -> Result<Proposal, AppError> {
        let Some(multisig) = &self.multisig else {
            return Err(AppError::Validation {
                field: "multisig".to_string(),
                message: "owner set is not configured".to_string(),
            });
        };

        let proposal = self.proposal(id).await?;
        if proposal.status.is_terminal() {
            return Err(AppError::InvalidTransition {
                id: id.to_string(),
                from: proposal.status,
                to: ProposalStatus::Approved,
            });
        }

        let count = multisig.confirm(id, owner).await?;
        self.stats
            .confirmations_recorded
            .fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(ProposalEvent::Confirmed {
            id: id.to_string(),
            owner,
            count,
            quorum: multisig.quorum(),
        });

        if proposal.status == ProposalStatus::Pending && count >= multisig.quorum() {
            self.store
                .update(id, ProposalUpdate::status(ProposalStatus::Approved))
                .await?;
            let _ = self
                .events
                .send(ProposalEvent::Approved { id: id.to_string() });

            if self.auto_execute_enabled() {
                match self.execute(id).await {
                    Ok(_) => {}
                    Err(AppError::AlreadyExecuting(_)) => {}
                    Err(e) => {
                        tracing::warn!(
                            target: "lifecycle",
                            proposal = id,
                            error = %e,
                            "Auto-execution after quorum did not complete"
                        );
                    }
                }
            }
        }

        self.proposal(id).await
    }

    /// Execute an approved proposal through the relayer. At most one
    /// submission ever happens per proposal id: the permit serializes
    /// racing callers, and a loser arriving after completion observes the
    /// winner's recorded result.
    pub async fn execute(&self, id: &str) -> Result<String, AppError> {
        let Some(relayer) = self.relayer.clone() else {
            return Err(AppError::Validation {
                field: "relayer".to_string(),
                message: "relayer is not configured".to_string(),
            });
        };

        let _permit = self.guard.begin(id)?;

        let proposal = self.proposal(id).await?;
        match proposal.status {
            ProposalStatus::Executed => {
                return Ok(proposal.tx_hash.clone().unwrap_or_default());
            }
            ProposalStatus::Failed => {
                return Err(AppError::InvalidTransition {
                    id: id.to_string(),
                    from: ProposalStatus::Failed,
                    to: ProposalStatus::Executed,
                });
            }
            ProposalStatus::Pending => {
                if self.multisig.is_some() {
                    // Quorum-gated deployments never skip approval.
                    return Err(AppError::InvalidTransition {
                        id: id.to_string(),
                        from: ProposalStatus::Pending,
                        to: ProposalStatus::Executed,
                    });
                }
                // Single-key deployments approve explicitly before
                // executing, keeping the state machine linear.
                self.store
                    .update(id, ProposalUpdate::status(ProposalStatus::Approved))
                    .await?;
                let _ = self
                    .events
                    .send(ProposalEvent::Approved { id: id.to_string() });
            }
            ProposalStatus::Approved => {
                if let Some(multisig) = &self.multisig
                    && !multisig.has_quorum(id).await?
                {
                    return Err(AppError::Validation {
                        field: "quorum".to_string(),
                        message: format!(
                            "{}/{} confirmations",
                            multisig.confirmation_count(id).await?,
                            multisig.quorum()
                        ),
                    });
                }
            }
        }

        if let Some(at) = proposal.execution_time
            && current_unix_ms() < at
        {
            return Err(AppError::Validation {
                field: "executionTime".to_string(),
                message: format!("scheduled for {at}"),
            });
        }

        match relayer.execute(&proposal).await {
            Ok(tx_hash) => {
                self.mark_executed(id, &tx_hash).await?;
                Ok(tx_hash)
            }
            Err(AppError::ExecutionFailed { id: pid, reason }) => {
                self.mark_failed(id, &reason).await;
                Err(AppError::ExecutionFailed { id: pid, reason })
            }
            Err(AppError::UnknownOutcome { id: pid, tx_hash }) => {
                // Keep the hash on the record while the outcome is open;
                // status stays approved so nothing is lost on restart.
                if let Err(e) = self
                    .store
                    .update(
                        id,
                        ProposalUpdate {
                            status: None,
                            tx_hash: Some(tx_hash.clone()),
                            execution_time: None,
                        },
                    )
                    .await
                {
                    tracing::warn!(target: "lifecycle", proposal = id, error = %e, "Failed to record pending tx hash");
                }

                match relayer.reconcile(&tx_hash).await {
                    Ok(Some(true)) => {
                        self.mark_executed(id, &tx_hash).await?;
                        Ok(tx_hash)
                    }
                    Ok(Some(false)) => {
                        let reason = format!("Transaction {tx_hash} reverted");
                        self.mark_failed(id, &reason).await;
                        Err(AppError::ExecutionFailed { id: pid, reason })
                    }
                    Ok(None) | Err(_) => {
                        let _ = self.events.send(ProposalEvent::SystemError {
                            context: format!("Execute proposal {id}"),
                            message: format!("outcome of {tx_hash} still unknown"),
                        });
                        Err(AppError::UnknownOutcome { id: pid, tx_hash })
                    }
                }
            }
            // Pre-broadcast failures leave the proposal approved; a later
            // execute call is safe because nothing reached the chain.
            Err(other) => Err(other),
        }
    }

    async fn mark_executed(&self, id: &str, tx_hash: &str) -> Result<(), AppError> {
        self.store
            .update(
                id,
                ProposalUpdate {
                    status: Some(ProposalStatus::Executed),
                    tx_hash: Some(tx_hash.to_string()),
                    execution_time: None,
                },
            )
            .await?;
        self.clear_confirmations(id).await;
        self.stats.proposals_executed.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(ProposalEvent::Executed {
            id: id.to_string(),
            tx_hash: tx_hash.to_string(),
        });
        Ok(())
    }

    async fn mark_failed(&self, id: &str, reason: &str) {
        if let Err(e) = self
            .store
            .update(id, ProposalUpdate::status(ProposalStatus::Failed))
            .await
        {
            tracing::warn!(target: "lifecycle", proposal = id, error = %e, "Failed to mark proposal failed");
        }
        self.clear_confirmations(id).await;
        self.stats.proposals_failed.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(ProposalEvent::Failed {
            id: id.to_string(),
            reason: reason.to_string(),
        });
    }

    async fn clear_confirmations(&self, id: &str) {
        if let Some(multisig) = &self.multisig
            && let Err(e) = multisig.clear(id).await
        {
            tracing::warn!(target: "lifecycle", proposal = id, error = %e, "Failed to clear confirmations");
        }
    }
}
