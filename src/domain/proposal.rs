// SPDX-License-Identifier: MIT

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// On-chain action a proposal authorizes against the treasury controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalKind {
    Deposit,
    Withdraw,
    Harvest,
}

impl ProposalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalKind::Deposit => "deposit",
            ProposalKind::Withdraw => "withdraw",
            ProposalKind::Harvest => "harvest",
        }
    }
}

impl fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(ProposalKind::Deposit),
            "withdraw" => Ok(ProposalKind::Withdraw),
            "harvest" => Ok(ProposalKind::Harvest),
            other => Err(format!("unknown proposal kind '{other}'")),
        }
    }
}

/// Lifecycle state. `Executed` and `Failed` are terminal; the store rejects
/// any transition out of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Executed,
    Failed,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Executed => "executed",
            ProposalStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProposalStatus::Executed | ProposalStatus::Failed)
    }

    /// Legal state-machine edges. `Pending -> Executed` is deliberately
    /// absent: single-key deployments approve first, then execute.
    pub fn can_transition(from: ProposalStatus, to: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (from, to),
            (Pending, Approved) | (Pending, Failed) | (Approved, Executed) | (Approved, Failed)
        )
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProposalStatus::Pending),
            "approved" => Ok(ProposalStatus::Approved),
            "executed" => Ok(ProposalStatus::Executed),
            "failed" => Ok(ProposalStatus::Failed),
            other => Err(format!("unknown proposal status '{other}'")),
        }
    }
}

/// Auditable rebalancing action. Wire/persistence field names are stable;
/// amounts serialize as base-10 strings since raw token amounts exceed
/// native numeric precision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: String,
    /// Creation time, unix milliseconds.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: ProposalKind,
    pub token: Address,
    #[serde(with = "amount_serde")]
    pub amount: U256,
    pub strategy: Address,
    pub reason: String,
    pub status: ProposalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<i64>,
}

pub(crate) mod amount_serde {
    use alloy::primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<U256>()
            .map_err(|e| D::Error::custom(format!("invalid amount '{raw}': {e}")))
    }
}

/// Caller-supplied fields for manual proposal creation; unset fields get
/// defaults from configuration. Created proposals always start `pending`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDraft {
    #[serde(rename = "type")]
    pub kind: Option<ProposalKind>,
    pub token: Option<Address>,
    pub amount: Option<String>,
    pub strategy: Option<Address>,
    pub reason: Option<String>,
    pub execution_time: Option<i64>,
}
