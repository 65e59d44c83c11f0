//! Edge filtering, ranking and vote formatting.

use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, U256};

use crate::types::Delegation;

/// Decimals of raw vote amounts.
pub const VOTE_DECIMALS: u8 = 18;

/// `floor(score * 10^18)`. Non-finite and negative scores count as zero.
pub fn to_raw_score(score: f64) -> U256 {
    if !score.is_finite() || score <= 0.0 {
        return U256::ZERO;
    }
    let scaled = (score * 1e18).floor();
    // `{:.0}` prints the exact integer value of the float
    U256::from_str_radix(&format!("{scaled:.0}"), 10).unwrap_or(U256::MAX)
}

/// Human-readable decimal, e.g. `2500000000000000000` -> `2.5`, `10^18` -> `1.0`.
pub fn format_units(raw: U256, decimals: u8) -> String {
    let unit = U256::from(10u64).pow(U256::from(decimals));
    let whole = raw / unit;
    let fraction = raw % unit;

    let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{fraction}")
    }
}

/// Edges that are global or scoped to `governance`.
pub fn scope_delegations(delegations: &[Delegation], governance: &str) -> Vec<Delegation> {
    delegations
        .iter()
        .filter(|d| d.applies_to(governance))
        .cloned()
        .collect()
}

/// Edges whose delegate is on the allow-list.
pub fn restrict_to_whitelist(delegations: Vec<Delegation>, whitelist: &[Address]) -> Vec<Delegation> {
    let allowed: HashSet<&Address> = whitelist.iter().collect();
    delegations
        .into_iter()
        .filter(|d| allowed.contains(&d.delegate))
        .collect()
}

/// Delegates in order of first appearance.
pub fn delegates_in_order(delegations: &[Delegation]) -> Vec<Address> {
    let mut seen = HashSet::new();
    delegations
        .iter()
        .map(|d| d.delegate)
        .filter(|a| seen.insert(*a))
        .collect()
}

/// Distinct delegators per delegate.
pub fn delegator_counts(delegations: &[Delegation]) -> HashMap<Address, usize> {
    let mut delegators: HashMap<Address, HashSet<Address>> = HashMap::new();
    for delegation in delegations {
        delegators
            .entry(delegation.delegate)
            .or_default()
            .insert(delegation.delegator);
    }
    delegators
        .into_iter()
        .map(|(delegate, set)| (delegate, set.len()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedDelegate {
    pub user: Address,
    pub score: U256,
    pub represented: usize,
}

/// Rank delegates by score, highest first.
///
/// Only positive scores are kept. Ties keep the order in which delegates first
/// appear in `delegations`. Whitelisted delegates without a positive score are
/// appended with a zero score, in whitelist order.
pub fn rank_delegates(
    delegations: &[Delegation],
    scores: &HashMap<Address, U256>,
    whitelist: Option<&[Address]>,
) -> Vec<RankedDelegate> {
    let counts = delegator_counts(delegations);
    let represented = |user: &Address| counts.get(user).copied().unwrap_or(0);

    let mut ranked: Vec<RankedDelegate> = delegates_in_order(delegations)
        .into_iter()
        .filter_map(|user| {
            let score = scores.get(&user).copied().unwrap_or_default();
            (score > U256::ZERO).then(|| RankedDelegate {
                user,
                score,
                represented: represented(&user),
            })
        })
        .collect();

    ranked.sort_by(|a, b| b.score.cmp(&a.score));

    if let Some(whitelist) = whitelist {
        let mut present: HashSet<Address> = ranked.iter().map(|d| d.user).collect();
        for user in whitelist {
            if present.insert(*user) {
                ranked.push(RankedDelegate {
                    user: *user,
                    score: U256::ZERO,
                    represented: represented(user),
                });
            }
        }
    }

    ranked
}

/// Governance-level aggregate of one compute pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceSummary {
    pub current_delegates: usize,
    pub total_delegates: usize,
    pub delegated_votes_raw: U256,
}

impl GovernanceSummary {
    pub fn new(delegations: &[Delegation], ranked: &[RankedDelegate]) -> Self {
        let delegators: HashSet<Address> = delegations.iter().map(|d| d.delegator).collect();
        let delegated_votes_raw = ranked
            .iter()
            .fold(U256::ZERO, |acc, d| acc.saturating_add(d.score));

        Self {
            current_delegates: ranked.len(),
            total_delegates: delegators.len(),
            delegated_votes_raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn edge(delegator: u8, delegate: u8, space: &str) -> Delegation {
        Delegation {
            delegator: address(delegator),
            delegate: address(delegate),
            space: space.to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_to_raw_score() {
        assert_eq!(to_raw_score(2.5), U256::from(2_500_000_000_000_000_000u128));
        assert_eq!(to_raw_score(0.0), U256::ZERO);
        assert_eq!(to_raw_score(-1.0), U256::ZERO);
        assert_eq!(to_raw_score(f64::NAN), U256::ZERO);
        // larger than u128
        assert!(to_raw_score(1e30) > U256::from(u128::MAX));
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::from(2_500_000_000_000_000_000u128), 18), "2.5");
        assert_eq!(format_units(U256::from(1_000_000_000_000_000_000u128), 18), "1.0");
        assert_eq!(format_units(U256::ZERO, 18), "0.0");
        assert_eq!(format_units(U256::from(1u64), 18), "0.000000000000000001");
    }

    #[test]
    fn test_scope_delegations() {
        let edges = vec![edge(1, 2, ""), edge(3, 2, "test.eth"), edge(4, 2, "other.eth")];
        let scoped = scope_delegations(&edges, "test.eth");
        assert_eq!(scoped.len(), 2);
        assert!(scoped.iter().all(|d| d.space != "other.eth"));
    }

    #[test]
    fn test_rank_stable_descending_without_zero() {
        let edges = vec![edge(1, 10, ""), edge(2, 11, ""), edge(3, 12, ""), edge(4, 13, "")];
        let scores = HashMap::from([
            (address(10), U256::from(5u64)),
            (address(11), U256::from(9u64)),
            (address(12), U256::from(5u64)),
            (address(13), U256::ZERO),
        ]);

        let ranked = rank_delegates(&edges, &scores, None);
        let users: Vec<Address> = ranked.iter().map(|d| d.user).collect();
        // 12 ties with 10 and stays behind it
        assert_eq!(users, vec![address(11), address(10), address(12)]);
    }

    #[test]
    fn test_whitelist_backfill_after_positive_scores() {
        let edges = restrict_to_whitelist(
            vec![edge(1, 10, ""), edge(2, 11, ""), edge(3, 12, "")],
            &[address(10), address(12), address(20)],
        );
        assert_eq!(edges.len(), 2);

        let scores = HashMap::from([(address(10), U256::from(3u64))]);
        let whitelist = [address(20), address(10), address(12)];
        let ranked = rank_delegates(&edges, &scores, Some(&whitelist));

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].user, address(10));
        assert_eq!(ranked[1], RankedDelegate { user: address(20), score: U256::ZERO, represented: 0 });
        assert_eq!(ranked[2], RankedDelegate { user: address(12), score: U256::ZERO, represented: 1 });
    }

    #[test]
    fn test_represented_counts_distinct_delegators() {
        let edges = vec![edge(1, 10, ""), edge(1, 10, "test.eth"), edge(2, 10, "")];
        let scores = HashMap::from([(address(10), U256::from(1u64))]);
        let ranked = rank_delegates(&edges, &scores, None);
        assert_eq!(ranked[0].represented, 2);
    }

    #[test]
    fn test_governance_summary() {
        let edges = vec![edge(1, 10, ""), edge(2, 10, ""), edge(3, 11, "")];
        let ranked = vec![
            RankedDelegate { user: address(10), score: U256::from(7u64), represented: 2 },
            RankedDelegate { user: address(11), score: U256::from(3u64), represented: 1 },
        ];
        let summary = GovernanceSummary::new(&edges, &ranked);
        assert_eq!(summary.current_delegates, 2);
        assert_eq!(summary.total_delegates, 3);
        assert_eq!(summary.delegated_votes_raw, U256::from(10u64));
    }
}
