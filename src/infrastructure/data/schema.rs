// SPDX-License-Identifier: MIT

use crate::domain::error::AppError;
use crate::domain::proposal::{Proposal, ProposalKind, ProposalStatus};
use alloy::primitives::{Address, U256};
use std::str::FromStr;

/// Raw proposal row as stored in SQLite. Addresses and amounts are TEXT;
/// parsing back into domain types happens in `TryFrom`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProposalRow {
    pub id: String,
    pub timestamp: i64,
    pub kind: String,
    pub token: String,
    pub amount: String,
    pub strategy: String,
    pub reason: String,
    pub status: String,
    pub tx_hash: Option<String>,
    pub execution_time: Option<i64>,
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = AppError;

    fn try_from(row: ProposalRow) -> Result<Self, Self::Error> {
        let decode = |what: &str, err: String| {
            AppError::Initialization(format!("Proposal row {what} decode failed: {err}"))
        };
        Ok(Proposal {
            kind: ProposalKind::from_str(&row.kind).map_err(|e| decode("kind", e))?,
            token: Address::from_str(&row.token).map_err(|e| decode("token", e.to_string()))?,
            amount: U256::from_str(&row.amount).map_err(|e| decode("amount", e.to_string()))?,
            strategy: Address::from_str(&row.strategy)
                .map_err(|e| decode("strategy", e.to_string()))?,
            status: ProposalStatus::from_str(&row.status).map_err(|e| decode("status", e))?,
            id: row.id,
            timestamp: row.timestamp,
            reason: row.reason,
            tx_hash: row.tx_hash,
            execution_time: row.execution_time,
        })
    }
}
