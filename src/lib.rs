// SPDX-License-Identifier: MIT

pub mod app;
pub mod common;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Short paths for the frequently used layers.
pub use infrastructure::data;
pub use infrastructure::network;
pub use services::rebalance;
