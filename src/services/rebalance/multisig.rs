// SPDX-License-Identifier: MIT

use crate::domain::error::AppError;
use crate::infrastructure::data::store::ProposalStore;
use alloy::primitives::Address;
use std::sync::Arc;

/// Off-chain ledger of owner approvals. Holds no chain state and moves no
/// funds; execution authority belongs to the relayer once quorum is
/// independently verified. Confirmations live in the proposal store so they
/// are exactly as durable as the proposals they approve.
pub struct MultiSig<S> {
    owners: Vec<Address>,
    store: Arc<S>,
}

impl<S: ProposalStore> MultiSig<S> {
    pub fn new(owners: Vec<Address>, store: Arc<S>) -> Self {
        Self { owners, store }
    }

    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    pub fn is_owner(&self, who: Address) -> bool {
        self.owners.contains(&who)
    }

    /// Confirmations required: strictly more than half the owner set.
    pub fn quorum(&self) -> usize {
        self.owners.len() / 2 + 1
    }

    /// Record an owner's approval. Fails `NotAnOwner` for addresses outside
    /// the owner set; re-confirming is a no-op. Returns the confirmation
    /// count after the call.
    pub async fn confirm(&self, proposal_id: &str, owner: Address) -> Result<usize, AppError> {
        if !self.is_owner(owner) {
            return Err(AppError::NotAnOwner(owner.to_string()));
        }
        self.store.add_confirmation(proposal_id, owner).await?;
        self.confirmation_count(proposal_id).await
    }

    pub async fn confirmation_count(&self, proposal_id: &str) -> Result<usize, AppError> {
        Ok(self.store.confirmations(proposal_id).await?.len())
    }

    pub async fn has_quorum(&self, proposal_id: &str) -> Result<bool, AppError> {
        Ok(self.confirmation_count(proposal_id).await? >= self.quorum())
    }

    /// Drop the confirmation record once its proposal is terminal.
    pub async fn clear(&self, proposal_id: &str) -> Result<(), AppError> {
        self.store.clear_confirmations(proposal_id).await
    }
}
