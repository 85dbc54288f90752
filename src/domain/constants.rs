// SPDX-License-Identifier: MIT

use alloy::primitives::Address;

/// Denominator for basis-point percentages; 10000bp = 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// USD prices are carried as integers scaled by 1e8 (Chainlink convention).
pub const PRICE_SCALE: u64 = 100_000_000;

/// The zero address denotes the chain's native token in balance queries.
pub const NATIVE_TOKEN: Address = Address::ZERO;

pub const NATIVE_DECIMALS: u8 = 18;

pub const CHAIN_ETHEREUM: u64 = 1;
pub const CHAIN_BSC: u64 = 56;
pub const CHAIN_BSC_TESTNET: u64 = 97;

pub fn native_symbol(chain_id: u64) -> &'static str {
    match chain_id {
        CHAIN_BSC | CHAIN_BSC_TESTNET => "BNB",
        _ => "ETH",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_symbol_covers_bsc_and_defaults_to_eth() {
        assert_eq!(native_symbol(CHAIN_BSC), "BNB");
        assert_eq!(native_symbol(CHAIN_BSC_TESTNET), "BNB");
        assert_eq!(native_symbol(CHAIN_ETHEREUM), "ETH");
        assert_eq!(native_symbol(137), "ETH");
    }
}
