// SPDX-License-Identifier: MIT

pub mod nonce;
pub mod price_feed;
pub mod provider;
pub mod relayer;
pub mod treasury;
