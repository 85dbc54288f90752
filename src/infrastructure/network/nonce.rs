// SPDX-License-Identifier: MIT

use crate::common::retry::retry_async;
use crate::domain::error::AppError;
use crate::infrastructure::network::provider::HttpProvider;
use alloy::primitives::Address;
use alloy::providers::Provider;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Tracks the relayer account's next nonce. Submissions are serialized by
/// the execution guard, so a simple cache with explicit resync is enough;
/// the cache is dropped after any unknown-outcome submission.
#[derive(Clone)]
pub struct NonceManager {
    provider: HttpProvider,
    address: Address,
    cache: Arc<Mutex<Option<u64>>>,
}

impl NonceManager {
    pub fn new(provider: HttpProvider, address: Address) -> Self {
        Self {
            provider,
            address,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Nonce to use for the next submission. Consumes the cached value so
    /// consecutive calls without an intervening resync stay monotonic.
    pub async fn next_nonce(&self) -> Result<u64, AppError> {
        if let Some(cached) = self.cache.lock().unwrap().take() {
            return Ok(cached);
        }

        let provider = self.provider.clone();
        let address = self.address;
        let on_chain_nonce: u64 = retry_async(
            move |_| {
                let provider = provider.clone();
                async move { provider.get_transaction_count(address).pending().await }
            },
            3,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::ChainUnavailable(format!("Failed to fetch nonce: {}", e)))?;

        Ok(on_chain_nonce)
    }

    /// Forget the cached nonce so the next submission re-reads the chain.
    /// Required after an unknown-outcome submission: the transaction may or
    /// may not have landed, so the local view cannot be trusted.
    pub fn invalidate(&self) {
        *self.cache.lock().unwrap() = None;
    }
}
