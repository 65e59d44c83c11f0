//! Core data types shared by the compute pipeline.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DelegatesError, Result};

/// Parse an address in any letter case.
pub fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).map_err(|_| DelegatesError::InvalidAddress(raw.to_string()))
}

/// Canonical (EIP-55 checksum) rendering of an address.
pub fn checksum(address: &Address) -> String {
    address.to_checksum(None)
}

/// One delegator -> delegate edge.
///
/// `space` is empty for delegations that apply to every space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: Address,
    pub delegate: Address,
    #[serde(default)]
    pub space: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: u64,
}

impl Delegation {
    /// Identity used for deduplication.
    pub fn key(&self) -> (Address, Address, &str) {
        (self.delegator, self.delegate, self.space.as_str())
    }

    /// Whether the edge applies to `governance`.
    pub fn applies_to(&self, governance: &str) -> bool {
        self.space.is_empty() || self.space == governance
    }
}

/// Subgraphs return `BigInt` columns as strings and `Int` columns as numbers.
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Block tag used when querying subgraphs and the score API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Snapshot {
    #[default]
    Latest,
    Block(u64),
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Snapshot::Latest => serializer.serialize_str("latest"),
            Snapshot::Block(number) => serializer.serialize_u64(*number),
        }
    }
}

/// A voting strategy as published by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Strategy {
    /// Network the strategy's delegations live on.
    pub fn delegation_network<'a>(&'a self, space_network: &'a str) -> &'a str {
        self.params
            .get("delegationNetwork")
            .and_then(|v| v.as_str())
            .or(self.network.as_deref())
            .unwrap_or(space_network)
    }

    /// Explicit delegate allow-list, if the strategy declares a non-empty one.
    ///
    /// Any entry that is not an address is an error.
    pub fn whitelist(&self) -> Result<Option<Vec<Address>>> {
        let Some(entries) = self.params.get("whitelist").and_then(|v| v.as_array()) else {
            return Ok(None);
        };
        if entries.is_empty() {
            return Ok(None);
        }

        entries
            .iter()
            .map(|entry| match entry.as_str() {
                Some(raw) => parse_address(raw),
                None => Err(DelegatesError::InvalidAddress(entry.to_string())),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

/// Hub-registered space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceSpace {
    pub id: String,
    pub network: String,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
}

/// Governance sourced from an on-chain delegate registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomGovernance {
    /// Full governance identifier (`prefix:viewId`)
    pub id: String,
    pub network: String,
    pub view_id: String,
    pub delegation_registry: Address,
    pub subgraph_url: String,
}

/// A governance identifier after resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedGovernance {
    Space(GovernanceSpace),
    Custom(CustomGovernance),
}

impl ResolvedGovernance {
    pub fn id(&self) -> &str {
        match self {
            ResolvedGovernance::Space(space) => &space.id,
            ResolvedGovernance::Custom(custom) => &custom.id,
        }
    }

    pub fn network(&self) -> &str {
        match self {
            ResolvedGovernance::Space(space) => &space.network,
            ResolvedGovernance::Custom(custom) => &custom.network,
        }
    }
}

impl fmt::Display for ResolvedGovernance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedGovernance::Space(space) => write!(f, "space {} (network {})", space.id, space.network),
            ResolvedGovernance::Custom(custom) => {
                write!(f, "custom governance {} (network {})", custom.id, custom.network)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_address_any_case() {
        let lower = parse_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        let upper = parse_address("0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(checksum(&lower), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert!(parse_address("not-an-address").is_err());
    }

    #[test]
    fn test_delegation_timestamp_formats() {
        let numeric: Delegation = serde_json::from_value(json!({
            "delegator": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "delegate": "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359",
            "space": "test.eth",
            "timestamp": 1700000000
        }))
        .unwrap();
        let text: Delegation = serde_json::from_value(json!({
            "delegator": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "delegate": "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359",
            "space": "test.eth",
            "timestamp": "1700000000"
        }))
        .unwrap();
        assert_eq!(numeric, text);
        assert!(numeric.applies_to("test.eth"));
        assert!(!numeric.applies_to("other.eth"));
    }

    #[test]
    fn test_strategy_network_and_whitelist() {
        let strategy: Strategy = serde_json::from_value(json!({
            "name": "delegation",
            "network": "1",
            "params": {
                "delegationNetwork": "10",
                "whitelist": ["0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"]
            }
        }))
        .unwrap();
        assert_eq!(strategy.delegation_network("137"), "10");
        assert_eq!(strategy.whitelist().unwrap().unwrap().len(), 1);

        let plain: Strategy = serde_json::from_value(json!({ "name": "delegation" })).unwrap();
        assert_eq!(plain.delegation_network("137"), "137");
        assert!(plain.whitelist().unwrap().is_none());

        let empty: Strategy =
            serde_json::from_value(json!({ "name": "delegation", "params": { "whitelist": [] } })).unwrap();
        assert!(empty.whitelist().unwrap().is_none());
    }

    #[test]
    fn test_invalid_whitelist_entry_is_an_error() {
        for entries in [json!(["junk"]), json!(["0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed", "junk"]), json!([42])] {
            let strategy: Strategy =
                serde_json::from_value(json!({ "name": "delegation", "params": { "whitelist": entries } })).unwrap();
            let err = strategy.whitelist().unwrap_err();
            assert!(matches!(err, DelegatesError::InvalidAddress(_)));
        }
    }

    #[test]
    fn test_snapshot_serialization() {
        assert_eq!(serde_json::to_value(Snapshot::Latest).unwrap(), json!("latest"));
        assert_eq!(serde_json::to_value(Snapshot::Block(42)).unwrap(), json!(42));
    }
}
