// SPDX-License-Identifier: MIT

use crate::domain::error::AppError;
use crate::domain::proposal::Proposal;
use crate::infrastructure::data::store::{ProposalStore, ProposalUpdate, check_transition};
use alloy::primitives::Address;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

/// Non-durable store backed by process memory. Used by tests and by
/// ephemeral runs without a database; the lifecycle logic is identical to
/// the SQLite backend.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    proposals: HashMap<String, Proposal>,
    order: Vec<String>,
    confirmations: HashMap<String, BTreeSet<Address>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProposalStore for MemoryStore {
    async fn save(&self, proposal: &Proposal) -> Result<(), AppError> {
        let mut inner = self.lock();
        if inner.proposals.contains_key(&proposal.id) {
            return Err(AppError::DuplicateId(proposal.id.clone()));
        }
        inner.order.push(proposal.id.clone());
        inner
            .proposals
            .insert(proposal.id.clone(), proposal.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Proposal>, AppError> {
        Ok(self.lock().proposals.get(id).cloned())
    }

    async fn all(&self) -> Result<Vec<Proposal>, AppError> {
        let inner = self.lock();
        let mut out: Vec<Proposal> = inner
            .order
            .iter()
            .filter_map(|id| inner.proposals.get(id).cloned())
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        out.sort_by_key(|p| p.timestamp);
        Ok(out)
    }

    async fn update(&self, id: &str, update: ProposalUpdate) -> Result<Proposal, AppError> {
        let mut inner = self.lock();
        let current = inner
            .proposals
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        if let Some(next) = update.status {
            check_transition(id, current.status, next)?;
            current.status = next;
        }
        if let Some(tx_hash) = update.tx_hash {
            current.tx_hash = Some(tx_hash);
        }
        if let Some(execution_time) = update.execution_time {
            current.execution_time = Some(execution_time);
        }
        Ok(current.clone())
    }

    async fn find_open(
        &self,
        token: Address,
        strategy: Address,
    ) -> Result<Option<Proposal>, AppError> {
        let inner = self.lock();
        let mut open: Vec<&Proposal> = inner
            .proposals
            .values()
            .filter(|p| p.token == token && p.strategy == strategy && !p.status.is_terminal())
            .collect();
        open.sort_by_key(|p| p.timestamp);
        Ok(open.first().map(|p| (*p).clone()))
    }

    async fn add_confirmation(&self, id: &str, owner: Address) -> Result<(), AppError> {
        self.lock()
            .confirmations
            .entry(id.to_string())
            .or_default()
            .insert(owner);
        Ok(())
    }

    async fn confirmations(&self, id: &str) -> Result<Vec<Address>, AppError> {
        Ok(self
            .lock()
            .confirmations
            .get(id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn clear_confirmations(&self, id: &str) -> Result<(), AppError> {
        self.lock().confirmations.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::proposal::{ProposalKind, ProposalStatus};
    use alloy::primitives::{U256, address};

    fn proposal(id: &str, timestamp: i64) -> Proposal {
        Proposal {
            id: id.to_string(),
            timestamp,
            kind: ProposalKind::Withdraw,
            token: address!("1111111111111111111111111111111111111111"),
            amount: U256::from(5u64),
            strategy: address!("2222222222222222222222222222222222222222"),
            reason: "test".to_string(),
            status: ProposalStatus::Pending,
            tx_hash: None,
            execution_time: None,
        }
    }

    #[tokio::test]
    async fn behaves_like_the_durable_store() {
        let store = MemoryStore::new();
        store.save(&proposal("a", 10)).await.unwrap();

        let err = store.save(&proposal("a", 11)).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateId(_)));

        let err = store
            .update("a", ProposalUpdate::status(ProposalStatus::Executed))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        store
            .update("a", ProposalUpdate::status(ProposalStatus::Approved))
            .await
            .unwrap();
        assert_eq!(
            store.get("a").await.unwrap().unwrap().status,
            ProposalStatus::Approved
        );
    }
}
