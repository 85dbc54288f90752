// SPDX-License-Identifier: MIT

use crate::domain::error::AppError;
use crate::domain::proposal::Proposal;
use crate::infrastructure::data::schema::ProposalRow;
use crate::infrastructure::data::store::{ProposalStore, ProposalUpdate, check_transition};
use alloy::primitives::Address;
use sqlx::{
    Pool, Row, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

const SELECT_COLUMNS: &str =
    "id, timestamp, kind, token, amount, strategy, reason, status, tx_hash, execution_time";

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Migration failed: {}", e)))?;

        Ok(Self { pool })
    }
}

impl ProposalStore for Database {
    async fn save(&self, proposal: &Proposal) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO proposals
                (id, timestamp, kind, token, amount, strategy, reason, status, tx_hash, execution_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&proposal.id)
        .bind(proposal.timestamp)
        .bind(proposal.kind.as_str())
        .bind(proposal.token.to_string())
        .bind(proposal.amount.to_string())
        .bind(proposal.strategy.to_string())
        .bind(&proposal.reason)
        .bind(proposal.status.as_str())
        .bind(proposal.tx_hash.as_deref())
        .bind(proposal.execution_time)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::DuplicateId(proposal.id.clone())
            }
            _ => AppError::Initialization(format!("Proposal insert failed: {}", e)),
        })?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Proposal>, AppError> {
        let row = sqlx::query_as::<_, ProposalRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM proposals WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Initialization(format!("Proposal load failed: {}", e)))?;

        row.map(Proposal::try_from).transpose()
    }

    async fn all(&self) -> Result<Vec<Proposal>, AppError> {
        let rows = sqlx::query_as::<_, ProposalRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM proposals ORDER BY timestamp ASC, rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Initialization(format!("Proposal list failed: {}", e)))?;

        rows.into_iter().map(Proposal::try_from).collect()
    }

    async fn update(&self, id: &str, update: ProposalUpdate) -> Result<Proposal, AppError> {
        // Read + validate + write under one transaction so racing updates
        // serialize on the store, not on the caller.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Initialization(format!("Proposal update begin failed: {}", e)))?;

        let row = sqlx::query_as::<_, ProposalRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM proposals WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Initialization(format!("Proposal load failed: {}", e)))?;

        let mut current: Proposal = row
            .ok_or_else(|| AppError::NotFound(id.to_string()))?
            .try_into()?;

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

        sqlx::query(
            "UPDATE proposals SET status = ?, tx_hash = ?, execution_time = ? WHERE id = ?",
        )
        .bind(current.status.as_str())
        .bind(current.tx_hash.as_deref())
        .bind(current.execution_time)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Initialization(format!("Proposal update failed: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Initialization(format!("Proposal update commit failed: {}", e)))?;

        Ok(current)
    }

    async fn find_open(
        &self,
        token: Address,
        strategy: Address,
    ) -> Result<Option<Proposal>, AppError> {
        let row = sqlx::query_as::<_, ProposalRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM proposals
            WHERE token = ? AND strategy = ? AND status IN ('pending', 'approved')
            ORDER BY timestamp ASC, rowid ASC
            LIMIT 1
            "#
        ))
        .bind(token.to_string())
        .bind(strategy.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Initialization(format!("Open proposal lookup failed: {}", e)))?;

        row.map(Proposal::try_from).transpose()
    }

    async fn add_confirmation(&self, id: &str, owner: Address) -> Result<(), AppError> {
        sqlx::query("INSERT OR IGNORE INTO confirmations (proposal_id, owner) VALUES (?, ?)")
            .bind(id)
            .bind(owner.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Initialization(format!("Confirmation insert failed: {}", e)))?;
        Ok(())
    }

    async fn confirmations(&self, id: &str) -> Result<Vec<Address>, AppError> {
        let rows = sqlx::query("SELECT owner FROM confirmations WHERE proposal_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Initialization(format!("Confirmation load failed: {}", e)))?;

        let mut out = Vec::new();
        for row in rows {
            let raw: String = row.get("owner");
            match Address::from_str(&raw) {
                Ok(addr) => out.push(addr),
                Err(_) => {
                    tracing::warn!(
                        target: "store",
                        proposal = id,
                        owner = %raw,
                        "Invalid owner address stored"
                    );
                }
            }
        }
        Ok(out)
    }

    async fn clear_confirmations(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM confirmations WHERE proposal_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Initialization(format!("Confirmation clear failed: {}", e)))?;
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
            kind: ProposalKind::Deposit,
            token: address!("1111111111111111111111111111111111111111"),
            amount: U256::from(1_000u64),
            strategy: address!("2222222222222222222222222222222222222222"),
            reason: "test".to_string(),
            status: ProposalStatus::Pending,
            tx_hash: None,
            execution_time: None,
        }
    }

    #[tokio::test]
    async fn save_and_read_back_roundtrips() {
        let db = Database::new("sqlite::memory:").await.expect("db");
        let p = proposal("a", 10);
        db.save(&p).await.unwrap();

        let back = db.get("a").await.unwrap().expect("stored proposal");
        assert_eq!(back, p);
        assert!(back.tx_hash.is_none());
        assert!(back.execution_time.is_none());
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let db = Database::new("sqlite::memory:").await.expect("db");
        db.save(&proposal("a", 10)).await.unwrap();
        let err = db.save(&proposal("a", 11)).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateId(id) if id == "a"));
    }

    #[tokio::test]
    async fn listing_orders_by_creation_time() {
        let db = Database::new("sqlite::memory:").await.expect("db");
        db.save(&proposal("b", 20)).await.unwrap();
        db.save(&proposal("a", 10)).await.unwrap();
        db.save(&proposal("c", 30)).await.unwrap();

        let ids: Vec<String> = db.all().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn terminal_state_rejects_further_transitions() {
        let db = Database::new("sqlite::memory:").await.expect("db");
        db.save(&proposal("a", 10)).await.unwrap();
        db.update("a", ProposalUpdate::status(ProposalStatus::Approved))
            .await
            .unwrap();
        db.update("a", ProposalUpdate::status(ProposalStatus::Executed))
            .await
            .unwrap();

        let err = db
            .update("a", ProposalUpdate::status(ProposalStatus::Pending))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: ProposalStatus::Executed,
                to: ProposalStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_not_found() {
        let db = Database::new("sqlite::memory:").await.expect("db");
        let err = db
            .update("missing", ProposalUpdate::status(ProposalStatus::Approved))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn confirmations_are_idempotent_and_clearable() {
        let db = Database::new("sqlite::memory:").await.expect("db");
        db.save(&proposal("a", 10)).await.unwrap();

        let owner = address!("3333333333333333333333333333333333333333");
        db.add_confirmation("a", owner).await.unwrap();
        db.add_confirmation("a", owner).await.unwrap();
        assert_eq!(db.confirmations("a").await.unwrap(), vec![owner]);

        db.clear_confirmations("a").await.unwrap();
        assert!(db.confirmations("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_pair_lookup_ignores_terminal_proposals() {
        let db = Database::new("sqlite::memory:").await.expect("db");
        let p = proposal("a", 10);
        db.save(&p).await.unwrap();

        let open = db.find_open(p.token, p.strategy).await.unwrap();
        assert_eq!(open.map(|p| p.id), Some("a".to_string()));

        db.update("a", ProposalUpdate::status(ProposalStatus::Failed))
            .await
            .unwrap();
        assert!(db.find_open(p.token, p.strategy).await.unwrap().is_none());
    }
}
