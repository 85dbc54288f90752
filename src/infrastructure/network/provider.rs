// SPDX-License-Identifier: MIT

use crate::domain::error::AppError;
use alloy::network::Ethereum;
use alloy::providers::RootProvider;
use url::Url;

pub type HttpProvider = RootProvider<Ethereum>;

pub struct ConnectionFactory;

impl ConnectionFactory {
    pub fn http(rpc_url: &str) -> Result<HttpProvider, AppError> {
        let url =
            Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))?;

        let provider = RootProvider::new_http(url);
        Ok(provider)
    }
}
