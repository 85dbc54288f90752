// SPDX-License-Identifier: MIT

use crate::domain::error::AppError;
use crate::domain::proposal::{Proposal, ProposalKind};
use crate::infrastructure::network::nonce::NonceManager;
use crate::infrastructure::network::provider::HttpProvider;
use crate::infrastructure::network::treasury::TreasuryController;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, keccak256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use url::Url;

/// Receipt polling knobs, from configuration.
#[derive(Clone, Copy, Debug)]
pub struct ReceiptPolicy {
    pub poll_ms: u64,
    pub timeout_ms: u64,
    pub confirm_blocks: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReceiptStatus {
    ConfirmedSuccess,
    ConfirmedRevert,
    UnknownTimeout,
}

/// Privileged signer that turns an approved proposal into exactly one
/// treasury transaction. Callers guarantee at-most-once invocation per
/// proposal id; this type never re-checks quorum.
pub struct Relayer {
    wallet_provider: DynProvider,
    read_provider: HttpProvider,
    nonce: NonceManager,
    controller: Address,
    signer_address: Address,
    receipts: ReceiptPolicy,
    dry_run: bool,
    submissions: AtomicU64,
}

impl Relayer {
    pub fn new(
        rpc_url: &str,
        read_provider: HttpProvider,
        signer: PrivateKeySigner,
        controller: Address,
        receipts: ReceiptPolicy,
        dry_run: bool,
    ) -> Result<Self, AppError> {
        let url =
            Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))?;
        let signer_address = signer.address();
        let wallet_provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        Ok(Self {
            nonce: NonceManager::new(read_provider.clone(), signer_address),
            wallet_provider,
            read_provider,
            controller,
            signer_address,
            receipts,
            dry_run,
            submissions: AtomicU64::new(0),
        })
    }

    pub fn signer_address(&self) -> Address {
        self.signer_address
    }

    /// Total transactions submitted (dry-run submissions included).
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    /// Submit the proposal's on-chain action and wait for inclusion.
    ///
    /// Exactly one transaction per call. Returns the transaction hash on
    /// confirmed success; `ExecutionFailed` on confirmed revert;
    /// `UnknownOutcome` when the receipt did not land within the timeout,
    /// in which case the caller must reconcile before any retry.
    pub async fn execute(&self, proposal: &Proposal) -> Result<String, AppError> {
        if self.dry_run {
            let pseudo = format!("{:#x}", keccak256(proposal.id.as_bytes()));
            self.submissions.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                target: "relayer",
                proposal = %proposal.id,
                kind = %proposal.kind,
                tx_hash = %pseudo,
                "Dry-run: skipping on-chain submission"
            );
            return Ok(pseudo);
        }

        let contract = TreasuryController::new(self.controller, self.wallet_provider.clone());
        let nonce = self.nonce.next_nonce().await?;

        let sent = match proposal.kind {
            ProposalKind::Deposit => {
                contract
                    .depositToStrategy(proposal.token, proposal.amount, proposal.strategy)
                    .nonce(nonce)
                    .send()
                    .await
            }
            ProposalKind::Withdraw => {
                contract
                    .withdrawFromStrategy(proposal.token, proposal.amount, proposal.strategy)
                    .nonce(nonce)
                    .send()
                    .await
            }
            ProposalKind::Harvest => {
                contract
                    .harvestRewards(proposal.strategy)
                    .nonce(nonce)
                    .send()
                    .await
            }
        };

        let pending = match sent {
            Ok(pending) => pending,
            Err(e) => {
                self.nonce.invalidate();
                let reason = e.to_string();
                // Nothing reached the chain on transport failures; the
                // proposal stays approved and may be retried safely.
                if reason.to_lowercase().contains("revert") {
                    return Err(AppError::ExecutionFailed {
                        id: proposal.id.clone(),
                        reason,
                    });
                }
                return Err(AppError::ChainUnavailable(format!(
                    "Submission failed before broadcast: {reason}"
                )));
            }
        };

        let tx_hash = *pending.tx_hash();
        self.submissions.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            target: "relayer",
            proposal = %proposal.id,
            kind = %proposal.kind,
            tx_hash = %format!("{:#x}", tx_hash),
            nonce,
            "Transaction submitted"
        );

        match self.await_receipt(&tx_hash).await {
            ReceiptStatus::ConfirmedSuccess => Ok(format!("{:#x}", tx_hash)),
            ReceiptStatus::ConfirmedRevert => Err(AppError::ExecutionFailed {
                id: proposal.id.clone(),
                reason: format!("Transaction {:#x} reverted", tx_hash),
            }),
            ReceiptStatus::UnknownTimeout => {
                self.nonce.invalidate();
                Err(AppError::UnknownOutcome {
                    id: proposal.id.clone(),
                    tx_hash: format!("{:#x}", tx_hash),
                })
            }
        }
    }

    /// Re-read chain state for a submission whose outcome timed out.
    /// `Some(true)` = landed successfully, `Some(false)` = reverted,
    /// `None` = still unknown.
    pub async fn reconcile(&self, tx_hash: &str) -> Result<Option<bool>, AppError> {
        let hash = B256::from_str(tx_hash)
            .map_err(|e| AppError::Validation {
                field: "tx_hash".to_string(),
                message: e.to_string(),
            })?;
        let receipt = self
            .read_provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| AppError::ChainUnavailable(format!("Receipt lookup failed: {}", e)))?;
        Ok(receipt.map(|r| r.status()))
    }

    async fn await_receipt(&self, hash: &B256) -> ReceiptStatus {
        let timeout = Duration::from_millis(self.receipts.timeout_ms.max(1));
        let poll = Duration::from_millis(self.receipts.poll_ms.max(1));
        let started = Instant::now();

        loop {
            if started.elapsed() >= timeout {
                break;
            }

            match self.read_provider.get_transaction_receipt(*hash).await {
                Ok(Some(rcpt)) => {
                    if !rcpt.status() {
                        return ReceiptStatus::ConfirmedRevert;
                    }
                    let Some(receipt_block) = rcpt.block_number else {
                        return ReceiptStatus::ConfirmedSuccess;
                    };
                    let head = self
                        .read_provider
                        .get_block_number()
                        .await
                        .unwrap_or(receipt_block);
                    if receipt_is_confirmed(
                        head.max(receipt_block),
                        receipt_block,
                        self.receipts.confirm_blocks.max(1),
                    ) {
                        return ReceiptStatus::ConfirmedSuccess;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        target: "relayer",
                        error = %e,
                        hash = %format!("{:#x}", hash),
                        "Receipt lookup error; retrying"
                    );
                }
            }

            tokio::time::sleep(poll).await;
        }

        ReceiptStatus::UnknownTimeout
    }
}

fn receipt_is_confirmed(current_head: u64, receipt_block: u64, confirm_blocks: u64) -> bool {
    let needed_head = receipt_block.saturating_add(confirm_blocks.saturating_sub(1));
    current_head >= needed_head
}
