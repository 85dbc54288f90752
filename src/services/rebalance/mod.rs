// SPDX-License-Identifier: MIT

pub mod decision;
pub mod engine;
pub mod guard;
pub mod lifecycle;
pub mod multisig;
pub mod notifier;
pub mod scheduler;

pub use decision::{AllocationAnalysis, DecisionConfig, analyze_allocations};
pub use engine::Engine;
pub use lifecycle::{ProposalService, ServiceDefaults};
pub use multisig::MultiSig;
pub use scheduler::Scheduler;
