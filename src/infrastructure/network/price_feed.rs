// SPDX-License-Identifier: MIT

use crate::domain::constants::PRICE_SCALE;
use crate::domain::error::AppError;
use crate::infrastructure::network::provider::HttpProvider;
use alloy::primitives::{Address, U256};
use alloy::sol;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const CACHE_TTL: u64 = 60; // Cache prices for 60 seconds
const CHAINLINK_STALENESS_SECS: u64 = 600;
const STALE_CACHE_GRACE_SECS: u64 = 900; // Accept up to 15m old cache on failures

sol! {
    #[sol(rpc)]
    interface AggregatorV3 {
        function latestRoundData()
            external
            view
            returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound);
        function decimals() external view returns (uint8);
    }
}

#[derive(Deserialize, Debug)]
struct BinanceTicker {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

/// USD quote in 1e8 fixed-point units. Amount arithmetic never touches
/// floating point; `f64` appears only at HTTP-source boundaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceQuote {
    pub price_e8: U256,
    pub source: String,
}

#[derive(Clone)]
pub struct PriceFeed {
    client: Client,
    // Map: Symbol -> (Quote, Timestamp)
    cache: Arc<RwLock<HashMap<String, (PriceQuote, Instant)>>>,
    chainlink_feeds: HashMap<String, Address>,
    provider: HttpProvider,
}

impl PriceFeed {
    pub fn new(provider: HttpProvider, chainlink_feeds: HashMap<String, Address>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            cache: Arc::new(RwLock::new(HashMap::new())),
            chainlink_feeds,
            provider,
        }
    }

    /// USD price for a token symbol. Chainlink first, then public market
    /// data endpoints. A failed lookup is not fatal to the caller's cycle;
    /// the token is simply excluded from that cycle's deviation math.
    pub async fn get_price(&self, symbol: &str) -> Result<PriceQuote, AppError> {
        let key = normalize_symbol(symbol);

        if is_usd_stable(&key) {
            return Ok(PriceQuote {
                price_e8: U256::from(PRICE_SCALE),
                source: "stable".to_string(),
            });
        }

        if let Some(quote) = self.cached_if_fresh(&key, CACHE_TTL).await {
            return Ok(quote);
        }

        if let Some(quote) = self.try_chainlink(&key).await {
            self.store_cache(&key, quote.clone()).await;
            return Ok(quote);
        }

        if let Some(quote) = self.try_binance(&key).await {
            self.store_cache(&key, quote.clone()).await;
            return Ok(quote);
        }

        if let Some(quote) = self.try_coingecko(&key).await {
            self.store_cache(&key, quote.clone()).await;
            return Ok(quote);
        }

        // All sources down: fall back to a recent-enough cache entry.
        if let Some(quote) = self.cached_if_fresh(&key, STALE_CACHE_GRACE_SECS).await {
            tracing::warn!(symbol = %key, "All price sources failed; using stale cache");
            return Ok(quote);
        }

        Err(AppError::ChainUnavailable(format!(
            "No price source answered for {key}"
        )))
    }

    async fn cached_if_fresh(&self, key: &str, max_age_secs: u64) -> Option<PriceQuote> {
        let cache = self.cache.read().await;
        let (quote, at) = cache.get(key)?;
        if at.elapsed() <= Duration::from_secs(max_age_secs) {
            Some(quote.clone())
        } else {
            None
        }
    }

    async fn store_cache(&self, key: &str, quote: PriceQuote) {
        self.cache
            .write()
            .await
            .insert(key.to_string(), (quote, Instant::now()));
    }

    async fn try_chainlink(&self, symbol: &str) -> Option<PriceQuote> {
        let feed = *self.chainlink_feeds.get(symbol)?;
        let aggregator = AggregatorV3::new(feed, self.provider.clone());

        let round = match aggregator.latestRoundData().call().await {
            Ok(round) => round,
            Err(e) => {
                tracing::debug!(symbol, error = %e, "Chainlink read failed");
                return None;
            }
        };
        let decimals = aggregator.decimals().call().await.ok()?;

        let updated_at = u64::try_from(round.updatedAt).ok()?;
        let age = crate::common::time::current_unix().saturating_sub(updated_at);
        if age > CHAINLINK_STALENESS_SECS {
            tracing::warn!(symbol, age, "Chainlink answer is stale; skipping");
            return None;
        }

        if round.answer.is_negative() || round.answer.is_zero() {
            return None;
        }
        let price_e8 = rescale_to_e8(round.answer.unsigned_abs(), decimals)?;

        Some(PriceQuote {
            price_e8,
            source: "chainlink".to_string(),
        })
    }

    async fn try_binance(&self, symbol: &str) -> Option<PriceQuote> {
        let pair = format!("{symbol}USDT");
        let url = format!("https://api.binance.com/api/v3/ticker/price?symbol={pair}");
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let ticker: BinanceTicker = resp.json().await.ok()?;
        let price: f64 = ticker.price.parse().ok()?;
        Some(PriceQuote {
            price_e8: price_to_e8(price)?,
            source: "binance".to_string(),
        })
    }

    async fn try_coingecko(&self, symbol: &str) -> Option<PriceQuote> {
        let id = coingecko_id(symbol)?;
        let url =
            format!("https://api.coingecko.com/api/v3/simple/price?ids={id}&vs_currencies=usd");
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: HashMap<String, HashMap<String, f64>> = resp.json().await.ok()?;
        let price = *body.get(id)?.get("usd")?;
        Some(PriceQuote {
            price_e8: price_to_e8(price)?,
            source: "coingecko".to_string(),
        })
    }
}

fn normalize_symbol(symbol: &str) -> String {
    match symbol.trim().to_uppercase().as_str() {
        "WETH" => "ETH".to_string(),
        "WBNB" => "BNB".to_string(),
        "WBTC" => "BTC".to_string(),
        other => other.to_string(),
    }
}

fn is_usd_stable(symbol: &str) -> bool {
    matches!(symbol, "USDT" | "USDC" | "DAI" | "BUSD")
}

fn coingecko_id(symbol: &str) -> Option<&'static str> {
    match symbol {
        "ETH" => Some("ethereum"),
        "BNB" => Some("binancecoin"),
        "BTC" => Some("bitcoin"),
        _ => None,
    }
}

/// Convert a float price from an HTTP source into 1e8 fixed-point.
pub fn price_to_e8(price: f64) -> Option<U256> {
    if !price.is_finite() || price <= 0.0 {
        return None;
    }
    let scaled = (price * PRICE_SCALE as f64).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        return None;
    }
    Some(U256::from(scaled.min(u128::MAX as f64) as u128))
}

fn rescale_to_e8(answer: U256, feed_decimals: u8) -> Option<U256> {
    match feed_decimals {
        8 => Some(answer),
        d if d < 8 => Some(answer * U256::from(10u64).pow(U256::from(8 - d))),
        d => {
            let divisor = U256::from(10u64).pow(U256::from(d - 8));
            if divisor.is_zero() {
                None
            } else {
                Some(answer / divisor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_symbols_quote_exactly_one_dollar() {
        assert!(is_usd_stable("USDC"));
        assert!(!is_usd_stable("ETH"));
    }

    #[test]
    fn float_prices_round_to_e8() {
        assert_eq!(price_to_e8(3500.0), Some(U256::from(350_000_000_000u64)));
        assert_eq!(price_to_e8(0.000001), Some(U256::from(100u64)));
        assert_eq!(price_to_e8(-1.0), None);
        assert_eq!(price_to_e8(f64::NAN), None);
    }

    #[test]
    fn chainlink_answers_rescale_to_e8() {
        assert_eq!(
            rescale_to_e8(U256::from(350_000_000_000u64), 8),
            Some(U256::from(350_000_000_000u64))
        );
        assert_eq!(
            rescale_to_e8(U256::from(3_500u64), 0),
            Some(U256::from(350_000_000_000u64))
        );
        assert_eq!(
            rescale_to_e8(U256::from(3_500_000_000_000_000_000_000u128), 18),
            Some(U256::from(350_000_000_000u64))
        );
    }

    #[test]
    fn wrapped_symbols_normalize() {
        assert_eq!(normalize_symbol("weth"), "ETH");
        assert_eq!(normalize_symbol("WBNB"), "BNB");
        assert_eq!(normalize_symbol("mtk"), "MTK");
    }
}
