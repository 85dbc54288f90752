// SPDX-License-Identifier: MIT

use crate::domain::balance::TokenBalance;
use crate::domain::constants::{NATIVE_DECIMALS, NATIVE_TOKEN, native_symbol};
use crate::domain::error::AppError;
use crate::infrastructure::network::provider::HttpProvider;
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::sol;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Mutex;

sol! {
    #[sol(rpc)]
    interface TreasuryController {
        function targetAllocations(address token) external view returns (uint256);
        function getCurrentAllocation(address token) external view returns (uint256);
        function getStrategyBalance(address token, address strategy) external view returns (uint256);
        function strategies(address strategy) external view returns (bool);
        function relayer() external view returns (address);

        function depositToStrategy(address token, uint256 amount, address strategy) external;
        function withdrawFromStrategy(address token, uint256 amount, address strategy) external;
        function harvestRewards(address strategy) external;
    }

    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }
}

/// Read-only view of the treasury controller and its token holdings.
/// Every read is a point-in-time snapshot against current confirmed state;
/// no side effects.
pub struct TreasuryReader {
    provider: HttpProvider,
    controller: Address,
    chain_id: u64,
    // Symbol/decimals never change for a deployed token.
    meta_cache: Mutex<HashMap<Address, (String, u8)>>,
}

impl TreasuryReader {
    pub fn new(provider: HttpProvider, controller: Address, chain_id: u64) -> Self {
        Self {
            provider,
            controller,
            chain_id,
            meta_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn controller(&self) -> Address {
        self.controller
    }

    /// Snapshot treasury + strategy holdings for every token. A single
    /// failed read fails the whole batch; callers must not act on partial
    /// data.
    pub async fn balances(
        &self,
        tokens: &[Address],
        strategy: Address,
    ) -> Result<Vec<TokenBalance>, AppError> {
        try_join_all(
            tokens
                .iter()
                .map(|token| self.token_balance(*token, strategy)),
        )
        .await
    }

    async fn token_balance(
        &self,
        token: Address,
        strategy: Address,
    ) -> Result<TokenBalance, AppError> {
        let (symbol, decimals) = self.token_meta(token).await?;

        let treasury_balance = if token == NATIVE_TOKEN {
            self.provider
                .get_balance(self.controller)
                .await
                .map_err(|e| {
                    AppError::ChainUnavailable(format!("Native balance read failed: {}", e))
                })?
        } else {
            IERC20::new(token, self.provider.clone())
                .balanceOf(self.controller)
                .call()
                .await
                .map_err(|e| {
                    AppError::ChainUnavailable(format!("balanceOf({symbol}) failed: {}", e))
                })?
        };

        let strategy_balance = self.strategy_balance(token, strategy).await?;

        Ok(TokenBalance {
            token,
            symbol,
            balance: treasury_balance + strategy_balance,
            decimals,
            treasury_balance: Some(treasury_balance.to_string()),
            strategy_balance: Some(strategy_balance.to_string()),
            price_e8: None,
        })
    }

    async fn token_meta(&self, token: Address) -> Result<(String, u8), AppError> {
        if token == NATIVE_TOKEN {
            return Ok((native_symbol(self.chain_id).to_string(), NATIVE_DECIMALS));
        }
        if let Some(meta) = self.meta_cache.lock().unwrap().get(&token) {
            return Ok(meta.clone());
        }

        let erc20 = IERC20::new(token, self.provider.clone());
        let symbol = erc20
            .symbol()
            .call()
            .await
            .map_err(|e| AppError::ChainUnavailable(format!("symbol({token}) failed: {}", e)))?;
        let decimals = erc20
            .decimals()
            .call()
            .await
            .map_err(|e| AppError::ChainUnavailable(format!("decimals({token}) failed: {}", e)))?;

        let meta = (symbol, decimals);
        self.meta_cache.lock().unwrap().insert(token, meta.clone());
        Ok(meta)
    }

    /// Target allocation for a token in basis points, as configured on the
    /// controller contract.
    pub async fn target_allocation(&self, token: Address) -> Result<u64, AppError> {
        let raw = TreasuryController::new(self.controller, self.provider.clone())
            .targetAllocations(token)
            .call()
            .await
            .map_err(|e| {
                AppError::ChainUnavailable(format!("targetAllocations read failed: {}", e))
            })?;
        Ok(u64::try_from(raw).unwrap_or(0))
    }

    pub async fn current_allocation(&self, token: Address) -> Result<u64, AppError> {
        let raw = TreasuryController::new(self.controller, self.provider.clone())
            .getCurrentAllocation(token)
            .call()
            .await
            .map_err(|e| {
                AppError::ChainUnavailable(format!("getCurrentAllocation read failed: {}", e))
            })?;
        Ok(u64::try_from(raw).unwrap_or(0))
    }

    pub async fn strategy_balance(
        &self,
        token: Address,
        strategy: Address,
    ) -> Result<U256, AppError> {
        TreasuryController::new(self.controller, self.provider.clone())
            .getStrategyBalance(token, strategy)
            .call()
            .await
            .map_err(|e| {
                AppError::ChainUnavailable(format!("getStrategyBalance read failed: {}", e))
            })
    }

    pub async fn is_strategy_whitelisted(&self, strategy: Address) -> Result<bool, AppError> {
        TreasuryController::new(self.controller, self.provider.clone())
            .strategies(strategy)
            .call()
            .await
            .map_err(|e| AppError::ChainUnavailable(format!("strategies read failed: {}", e)))
    }

    /// Connectivity health check.
    pub async fn is_connected(&self) -> bool {
        self.provider.get_chain_id().await.is_ok()
    }
}
