// SPDX-License-Identifier: MIT

use crate::common::ids::new_proposal_id;
use crate::common::time::current_unix_ms;
use crate::domain::balance::{Allocation, TokenBalance};
use crate::domain::constants::BPS_DENOMINATOR;
use crate::domain::proposal::{Proposal, ProposalKind, ProposalStatus};
use alloy::primitives::{Address, U256};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct DecisionConfig {
    /// Deviation (basis points) at which rebalancing triggers; inclusive.
    pub rebalance_threshold_bps: u64,
    /// Smallest raw transfer amount worth proposing.
    pub min_rebalance_amount: U256,
    /// Strategy contract synthesized proposals execute against.
    pub default_strategy: Address,
}

#[derive(Clone, Debug)]
pub struct AllocationAnalysis {
    pub needs_rebalancing: bool,
    pub proposals: Vec<Proposal>,
    pub allocations: Vec<Allocation>,
}

/// Compare current against target allocations and synthesize rebalancing
/// proposals for every token whose deviation reaches the threshold.
///
/// Pure computation over integer fixed-point values. A token without a
/// price is excluded from the deviation math for this cycle; a token in
/// `targets` with no balance entry counts as balance zero (and, having no
/// price, is likewise excluded). Zero total value produces no proposals.
pub fn analyze_allocations(
    balances: &[TokenBalance],
    targets: &HashMap<Address, u64>,
    cfg: &DecisionConfig,
) -> AllocationAnalysis {
    let denominator = U256::from(BPS_DENOMINATOR);

    let priced: Vec<(&TokenBalance, U256)> = balances
        .iter()
        .filter_map(|b| b.value_e8().map(|v| (b, v)))
        .collect();
    let total_value: U256 = priced.iter().fold(U256::ZERO, |acc, (_, v)| acc + *v);

    if total_value.is_zero() {
        return AllocationAnalysis {
            needs_rebalancing: false,
            proposals: Vec::new(),
            allocations: Vec::new(),
        };
    }

    let mut proposals = Vec::new();
    let mut allocations = Vec::new();

    for (balance, value) in &priced {
        let Some(&target_bps) = targets.get(&balance.token) else {
            continue;
        };
        let current_bps = u64::try_from(*value * denominator / total_value).unwrap_or(0);
        let deviation_bps = current_bps.abs_diff(target_bps);
        let within_threshold = deviation_bps < cfg.rebalance_threshold_bps;

        allocations.push(Allocation {
            token: balance.token,
            target_bps,
            current_bps,
            deviation_bps,
            within_threshold,
        });

        if within_threshold {
            continue;
        }

        let target_value = total_value * U256::from(target_bps) / denominator;
        let diff_value = value.abs_diff(target_value);
        let Some(price_e8) = balance.price_e8 else {
            continue;
        };
        let scale = U256::from(10u64).pow(U256::from(balance.decimals));
        if price_e8.is_zero() {
            continue;
        }
        // Floor division: the transfer closes the deviation without ever
        // overshooting the target.
        let amount = diff_value * scale / price_e8;

        if amount.is_zero() || amount < cfg.min_rebalance_amount {
            tracing::debug!(
                target: "decision",
                token = %balance.token,
                amount = %amount,
                "Deviation over threshold but transfer below minimum"
            );
            continue;
        }

        let kind = if *value < target_value {
            ProposalKind::Deposit
        } else {
            ProposalKind::Withdraw
        };

        proposals.push(Proposal {
            id: new_proposal_id(),
            timestamp: current_unix_ms(),
            kind,
            token: balance.token,
            amount,
            strategy: cfg.default_strategy,
            reason: format!(
                "{} at {}bp vs target {}bp: deviation {}bp >= threshold {}bp",
                balance.symbol,
                current_bps,
                target_bps,
                deviation_bps,
                cfg.rebalance_threshold_bps
            ),
            status: ProposalStatus::Pending,
            tx_hash: None,
            execution_time: None,
        });
    }

    AllocationAnalysis {
        needs_rebalancing: !proposals.is_empty(),
        proposals,
        allocations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constants::PRICE_SCALE;

    const STRATEGY: Address = Address::new([0x22; 20]);

    fn cfg(threshold_bps: u64, min_amount: u64) -> DecisionConfig {
        DecisionConfig {
            rebalance_threshold_bps: threshold_bps,
            min_rebalance_amount: U256::from(min_amount),
            default_strategy: STRATEGY,
        }
    }

    fn balance(token: Address, units: u64, price_usd: u64) -> TokenBalance {
        TokenBalance {
            token,
            symbol: format!("T{}", token.0[0]),
            balance: U256::from(units),
            decimals: 0,
            treasury_balance: None,
            strategy_balance: None,
            price_e8: Some(U256::from(price_usd * PRICE_SCALE)),
        }
    }

    fn token(marker: u8) -> Address {
        Address::new([marker; 20])
    }

    #[test]
    fn balanced_portfolio_needs_no_rebalancing() {
        let a = token(1);
        let b = token(2);
        let balances = vec![balance(a, 50, 1), balance(b, 50, 1)];
        let targets = HashMap::from([(a, 5000), (b, 5000)]);

        let result = analyze_allocations(&balances, &targets, &cfg(500, 1));
        assert!(!result.needs_rebalancing);
        assert!(result.proposals.is_empty());
        assert!(result.allocations.iter().all(|a| a.within_threshold));
    }

    #[test]
    fn underweight_token_gets_deposit_sized_exactly_to_target() {
        // 30% current vs 50% target with a 5% threshold.
        let a = token(1);
        let b = token(2);
        let balances = vec![balance(a, 30, 1), balance(b, 70, 1)];
        let targets = HashMap::from([(a, 5000)]);

        let result = analyze_allocations(&balances, &targets, &cfg(500, 1));
        assert!(result.needs_rebalancing);
        assert_eq!(result.proposals.len(), 1);

        let p = &result.proposals[0];
        assert_eq!(p.kind, ProposalKind::Deposit);
        assert_eq!(p.token, a);
        assert_eq!(p.strategy, STRATEGY);
        assert_eq!(p.status, ProposalStatus::Pending);
        // Total value $100, target 50% = $50, current $30: close exactly $20.
        assert_eq!(p.amount, U256::from(20u64));
    }

    #[test]
    fn overweight_token_gets_withdraw_capped_at_target() {
        let a = token(1);
        let b = token(2);
        let balances = vec![balance(a, 80, 1), balance(b, 20, 1)];
        let targets = HashMap::from([(a, 5000)]);

        let result = analyze_allocations(&balances, &targets, &cfg(500, 1));
        let p = &result.proposals[0];
        assert_eq!(p.kind, ProposalKind::Withdraw);
        assert_eq!(p.amount, U256::from(30u64));
        // Withdrawing never exceeds the held balance.
        assert!(p.amount <= U256::from(80u64));
    }

    #[test]
    fn deviation_exactly_at_threshold_triggers() {
        // 45% current vs 50% target, threshold 500bp: inclusive boundary.
        let a = token(1);
        let b = token(2);
        let balances = vec![balance(a, 45, 1), balance(b, 55, 1)];
        let targets = HashMap::from([(a, 5000)]);

        let result = analyze_allocations(&balances, &targets, &cfg(500, 1));
        assert!(result.needs_rebalancing);
        assert_eq!(result.proposals[0].amount, U256::from(5u64));
    }

    #[test]
    fn zero_total_value_yields_no_proposals() {
        let a = token(1);
        let balances = vec![balance(a, 0, 1)];
        let targets = HashMap::from([(a, 5000)]);

        let result = analyze_allocations(&balances, &targets, &cfg(500, 1));
        assert!(!result.needs_rebalancing);
        assert!(result.proposals.is_empty());
    }

    #[test]
    fn token_without_price_is_excluded_not_fatal() {
        let a = token(1);
        let b = token(2);
        let c = token(3);
        let mut unpriced = balance(c, 1_000_000, 1);
        unpriced.price_e8 = None;
        let balances = vec![balance(a, 50, 1), balance(b, 50, 1), unpriced];
        let targets = HashMap::from([(a, 5000), (b, 5000), (c, 9000)]);

        // The unpriced token neither aborts the cycle nor skews the total.
        let result = analyze_allocations(&balances, &targets, &cfg(500, 1));
        assert!(!result.needs_rebalancing);
        assert_eq!(result.allocations.len(), 2);
    }

    #[test]
    fn transfer_below_minimum_is_not_proposed() {
        let a = token(1);
        let b = token(2);
        let balances = vec![balance(a, 30, 1), balance(b, 70, 1)];
        let targets = HashMap::from([(a, 5000)]);

        let result = analyze_allocations(&balances, &targets, &cfg(500, 100));
        assert!(!result.needs_rebalancing);
        // The deviation is still reported on the allocation row.
        assert!(!result.allocations[0].within_threshold);
    }

    #[test]
    fn target_token_missing_from_balances_counts_as_zero() {
        let a = token(1);
        let missing = token(9);
        let balances = vec![balance(a, 100, 1)];
        let targets = HashMap::from([(a, 10000), (missing, 5000)]);

        // No balance entry means no price either, so the missing token is
        // excluded rather than erroring.
        let result = analyze_allocations(&balances, &targets, &cfg(500, 1));
        assert!(!result.needs_rebalancing);
    }
}
