// SPDX-License-Identifier: MIT

use crate::domain::proposal::ProposalStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Chain unavailable: {0}")]
    ChainUnavailable(String),

    #[error("Proposal {0} already exists")]
    DuplicateId(String),

    #[error("Proposal {0} not found")]
    NotFound(String),

    #[error("Invalid transition for proposal {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ProposalStatus,
        to: ProposalStatus,
    },

    #[error("Address {0} is not an owner")]
    NotAnOwner(String),

    #[error("Proposal {0} is already executing")]
    AlreadyExecuting(String),

    #[error("Execution failed for proposal {id}: {reason}")]
    ExecutionFailed { id: String, reason: String },

    #[error("Unknown outcome for proposal {id}: tx {tx_hash} unconfirmed within timeout")]
    UnknownOutcome { id: String, tx_hash: String },

    #[error("Validation failed for field {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Address {0} is invalid or not checksummed")]
    InvalidAddress(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
