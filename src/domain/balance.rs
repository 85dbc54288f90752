// SPDX-License-Identifier: MIT

use crate::domain::constants::PRICE_SCALE;
use alloy::primitives::{Address, U256};
use serde::Serialize;

/// Point-in-time balance snapshot for one token. Recomputed every poll
/// cycle, never persisted.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub token: Address,
    pub symbol: String,
    /// Combined treasury + strategy holdings, raw units.
    #[serde(with = "crate::domain::proposal::amount_serde")]
    pub balance: U256,
    pub decimals: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treasury_balance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_balance: Option<String>,
    /// USD price in 1e8 fixed-point units; `None` when no feed answered.
    #[serde(skip)]
    pub price_e8: Option<U256>,
}

impl TokenBalance {
    /// USD value in 1e8 fixed-point units, or `None` without a price.
    pub fn value_e8(&self) -> Option<U256> {
        let price = self.price_e8?;
        let scale = U256::from(10u64).pow(U256::from(self.decimals));
        if scale.is_zero() {
            return None;
        }
        Some(self.balance * price / scale)
    }

    /// Display-level USD value. Never used for amount arithmetic.
    pub fn value_usd(&self) -> Option<f64> {
        let value = self.value_e8()?;
        Some(value.to_string().parse::<f64>().ok()? / PRICE_SCALE as f64)
    }
}

/// Per-token allocation snapshot row for the status surface.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub token: Address,
    pub target_bps: u64,
    pub current_bps: u64,
    pub deviation_bps: u64,
    pub within_threshold: bool,
}
