// SPDX-License-Identifier: MIT

use crate::domain::constants::BPS_DENOMINATOR;
use crate::domain::error::AppError;
use crate::infrastructure::network::relayer::ReceiptPolicy;
use crate::services::rebalance::decision::DecisionConfig;
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    // General
    #[serde(default = "default_debug")]
    pub debug: bool,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    pub database_url: Option<String>,

    // Chain access
    pub rpc_url: String,

    // Contracts
    pub treasury_controller: Address,
    pub guardian: Option<Address>,
    pub default_strategy: Address,
    #[serde(default)]
    pub tokens: Vec<Address>,

    // Decision engine
    #[serde(default = "default_rebalance_threshold_bps")]
    pub rebalance_threshold_bps: u64,
    #[serde(default = "default_min_rebalance_amount")]
    pub min_rebalance_amount: String,
    #[serde(default = "default_check_interval_minutes")]
    pub check_interval_minutes: u64,
    #[serde(default = "default_true")]
    pub scheduler_enabled: bool,

    // Multisig
    #[serde(default)]
    pub owners: Vec<Address>,

    // Relayer
    pub relayer_key: Option<String>,
    #[serde(default = "default_false")]
    pub auto_execute: bool,
    #[serde(default = "default_false")]
    pub dry_run: bool,
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,
    #[serde(default = "default_receipt_confirm_blocks")]
    pub receipt_confirm_blocks: u64,

    // Pricing
    pub chainlink_feeds: Option<HashMap<String, String>>, // Symbol -> aggregator address

    // Observability
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    pub discord_webhook_url: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

// Defaults
fn default_debug() -> bool {
    false
}
fn default_chain_id() -> u64 {
    31337
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_rebalance_threshold_bps() -> u64 {
    500
}
fn default_min_rebalance_amount() -> String {
    "0".to_string()
}
fn default_check_interval_minutes() -> u64 {
    5
}
fn default_receipt_poll_ms() -> u64 {
    500
}
fn default_receipt_timeout_ms() -> u64 {
    12_000
}
fn default_receipt_confirm_blocks() -> u64 {
    4
}
fn default_metrics_port() -> u16 {
    9000
}

impl GlobalSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(Path::new(path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Deterministic precedence: CLI (in main) > env/.env > config file.
        builder = builder.add_source(Environment::default());

        let settings: GlobalSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_with_path(None)
    }

    /// Fatal-at-startup checks; a process with bad configuration must not
    /// reach the first allocation cycle.
    fn validate(&self) -> Result<(), AppError> {
        if self.rpc_url.trim().is_empty() {
            return Err(AppError::Config("RPC_URL is missing".to_string()));
        }
        if self.rebalance_threshold_bps > BPS_DENOMINATOR {
            return Err(AppError::Config(format!(
                "rebalance_threshold_bps {} exceeds {}",
                self.rebalance_threshold_bps, BPS_DENOMINATOR
            )));
        }
        self.min_rebalance_amount()?;
        if self.check_interval_minutes == 0 {
            return Err(AppError::Config(
                "check_interval_minutes must be at least 1".to_string(),
            ));
        }
        let unique: HashSet<Address> = self.owners.iter().copied().collect();
        if unique.len() != self.owners.len() {
            return Err(AppError::Config(
                "owners contains duplicate addresses".to_string(),
            ));
        }
        if self.auto_execute && self.relayer_key.is_none() {
            return Err(AppError::Config(
                "auto_execute requires relayer_key".to_string(),
            ));
        }
        self.relayer_signer()?;
        self.chainlink_feed_addresses()?;
        Ok(())
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.database_url.clone())
            .unwrap_or_else(|| "sqlite://equilibra.db".to_string())
    }

    pub fn min_rebalance_amount(&self) -> Result<U256, AppError> {
        self.min_rebalance_amount.trim().parse::<U256>().map_err(|e| {
            AppError::Config(format!(
                "min_rebalance_amount '{}' is not a valid integer: {}",
                self.min_rebalance_amount, e
            ))
        })
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_minutes.max(1) * 60)
    }

    pub fn receipt_poll_ms_value(&self) -> u64 {
        self.receipt_poll_ms.max(100)
    }

    pub fn receipt_timeout_ms_value(&self) -> u64 {
        self.receipt_timeout_ms.max(self.receipt_poll_ms_value())
    }

    pub fn receipt_confirm_blocks_value(&self) -> u64 {
        self.receipt_confirm_blocks.max(1)
    }

    pub fn receipt_policy(&self) -> ReceiptPolicy {
        ReceiptPolicy {
            poll_ms: self.receipt_poll_ms_value(),
            timeout_ms: self.receipt_timeout_ms_value(),
            confirm_blocks: self.receipt_confirm_blocks_value(),
        }
    }

    pub fn decision_config(&self) -> Result<DecisionConfig, AppError> {
        Ok(DecisionConfig {
            rebalance_threshold_bps: self.rebalance_threshold_bps,
            min_rebalance_amount: self.min_rebalance_amount()?,
            default_strategy: self.default_strategy,
        })
    }

    pub fn multisig_enabled(&self) -> bool {
        !self.owners.is_empty()
    }

    /// Parsed relayer signing key, when one is configured.
    pub fn relayer_signer(&self) -> Result<Option<PrivateKeySigner>, AppError> {
        let Some(raw) = &self.relayer_key else {
            return Ok(None);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        PrivateKeySigner::from_str(trimmed)
            .map(Some)
            .map_err(|e| AppError::Config(format!("relayer_key is invalid: {}", e)))
    }

    pub fn chainlink_feed_addresses(&self) -> Result<HashMap<String, Address>, AppError> {
        match &self.chainlink_feeds {
            Some(map) => parse_address_map(map, "chainlink_feeds"),
            None => Ok(HashMap::new()),
        }
    }
}

fn parse_address_map(
    raw: &HashMap<String, String>,
    field: &str,
) -> Result<HashMap<String, Address>, AppError> {
    raw.iter()
        .map(|(k, v)| {
            Address::from_str(v)
                .map(|addr| (k.to_uppercase(), addr))
                .map_err(|_| AppError::InvalidAddress(format!("{field}:{k} -> {v}")))
        })
        .collect()
}
