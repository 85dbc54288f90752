// SPDX-License-Identifier: MIT

pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStore;
pub use sqlite::Database;
pub use store::{ProposalStore, ProposalUpdate};
