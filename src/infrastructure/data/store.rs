// SPDX-License-Identifier: MIT

use crate::domain::error::AppError;
use crate::domain::proposal::{Proposal, ProposalStatus};
use alloy::primitives::Address;

/// Partial proposal mutation. Status changes are validated against the
/// lifecycle state machine; other fields apply unconditionally.
#[derive(Clone, Debug, Default)]
pub struct ProposalUpdate {
    pub status: Option<ProposalStatus>,
    pub tx_hash: Option<String>,
    pub execution_time: Option<i64>,
}

impl ProposalUpdate {
    pub fn status(status: ProposalStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Durable source of truth for proposals and their confirmation ledger.
///
/// Implementations must guarantee that a crash between two updates leaves
/// the last committed state readable: a proposal approved but not yet
/// executed survives restart as `approved`, never lost, never silently
/// re-executed.
#[allow(async_fn_in_trait)]
pub trait ProposalStore: Send + Sync {
    /// Persist a new proposal. Fails `DuplicateId` when the id exists.
    async fn save(&self, proposal: &Proposal) -> Result<(), AppError>;

    async fn get(&self, id: &str) -> Result<Option<Proposal>, AppError>;

    /// All proposals ordered by creation time, most recent last.
    async fn all(&self) -> Result<Vec<Proposal>, AppError>;

    /// Apply a partial update. Fails `NotFound` for unknown ids and
    /// `InvalidTransition` for illegal status changes. Returns the
    /// updated proposal.
    async fn update(&self, id: &str, update: ProposalUpdate) -> Result<Proposal, AppError>;

    /// Oldest non-terminal proposal for a (token, strategy) pair, if any.
    async fn find_open(
        &self,
        token: Address,
        strategy: Address,
    ) -> Result<Option<Proposal>, AppError>;

    /// Record an owner approval. Re-confirming is a no-op, not an error.
    async fn add_confirmation(&self, id: &str, owner: Address) -> Result<(), AppError>;

    async fn confirmations(&self, id: &str) -> Result<Vec<Address>, AppError>;

    async fn clear_confirmations(&self, id: &str) -> Result<(), AppError>;
}

pub(crate) fn check_transition(
    id: &str,
    from: ProposalStatus,
    to: ProposalStatus,
) -> Result<(), AppError> {
    if ProposalStatus::can_transition(from, to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition {
            id: id.to_string(),
            from,
            to,
        })
    }
}
