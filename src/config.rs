//! Configuration for delegates-api

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("delegates-api")
        .join("delegates.db")
}

/// Statically configured governance backed by an on-chain delegate registry.
///
/// Selected by identifier prefix: `<prefix>:<viewId>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomGovernanceConfig {
    /// Chain id of the registry
    pub network: String,
    /// Delegate registry contract address
    pub delegation_registry: Address,
    /// Subgraph indexing the registry's delegation events
    pub subgraph_url: String,
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hub service used to resolve space metadata
    #[serde(default = "default_hub_url")]
    pub hub_url: String,

    /// Score API used by the off-chain score engine
    #[serde(default = "default_score_api_url")]
    pub score_api_url: String,

    /// JSON-RPC endpoint, `{network}` is replaced by the chain id
    #[serde(default = "default_rpc_url_template")]
    pub rpc_url_template: String,

    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Minimum seconds between two computes of the same governance
    #[serde(default = "default_cooldown")]
    pub space_cooldown_secs: u64,

    /// Seconds a network's delegation set stays cached
    #[serde(default = "default_cooldown")]
    pub network_cooldown_secs: u64,

    /// Addresses per score API request
    #[serde(default = "default_score_chunk_size")]
    pub score_chunk_size: usize,

    /// Rows per subgraph page
    #[serde(default = "default_subgraph_page_size")]
    pub subgraph_page_size: usize,

    /// HTTP request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Strategy names that carry delegated voting power
    #[serde(default = "default_delegation_strategies")]
    pub delegation_strategies: Vec<String>,

    /// Delegation index subgraph per network
    #[serde(default)]
    pub delegation_subgraphs: HashMap<String, String>,

    /// Custom governances keyed by identifier prefix
    #[serde(default)]
    pub custom_governances: HashMap<String, CustomGovernanceConfig>,
}

fn default_hub_url() -> String {
    "https://hub.snapshot.org".to_string()
}

fn default_score_api_url() -> String {
    "https://score.snapshot.org".to_string()
}

fn default_rpc_url_template() -> String {
    "https://rpc.snapshot.org/{network}".to_string()
}

fn default_cooldown() -> u64 {
    60 * 60 // 1 hour
}

fn default_score_chunk_size() -> usize {
    500
}

fn default_subgraph_page_size() -> usize {
    1000
}

fn default_request_timeout() -> u64 {
    60
}

fn default_delegation_strategies() -> Vec<String> {
    [
        "delegation",
        "erc20-balance-of-delegation",
        "delegation-with-cap",
        "delegation-with-overrides",
        "with-delegation",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub_url: default_hub_url(),
            score_api_url: default_score_api_url(),
            rpc_url_template: default_rpc_url_template(),
            database_path: default_database_path(),
            space_cooldown_secs: default_cooldown(),
            network_cooldown_secs: default_cooldown(),
            score_chunk_size: default_score_chunk_size(),
            subgraph_page_size: default_subgraph_page_size(),
            request_timeout_secs: default_request_timeout(),
            delegation_strategies: default_delegation_strategies(),
            delegation_subgraphs: HashMap::new(),
            custom_governances: HashMap::new(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.hub_url, "https://hub.snapshot.org");
        assert_eq!(config.space_cooldown_secs, 3600);
        assert_eq!(config.score_chunk_size, 500);
        assert_eq!(config.subgraph_page_size, 1000);
        assert!(config.delegation_strategies.contains(&"delegation".to_string()));
        assert!(config.custom_governances.is_empty());
    }

    #[test]
    fn test_custom_governances_table() {
        let config: Config = toml::from_str(
            r#"
            space_cooldown_secs = 86400

            [delegation_subgraphs]
            "1" = "https://example.com/subgraphs/delegation"

            [custom_governances.s-tn]
            network = "11155111"
            delegation_registry = "0x469788fE6E9E9681C6ebF3bF78e7Fd26Fc015446"
            subgraph_url = "https://example.com/subgraphs/registry"
            "#,
        )
        .unwrap();

        assert_eq!(config.space_cooldown_secs, 86400);
        assert_eq!(config.network_cooldown_secs, 3600);
        assert_eq!(config.delegation_subgraphs.len(), 1);
        let custom = config.custom_governances.get("s-tn").unwrap();
        assert_eq!(custom.network, "11155111");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.score_chunk_size = 250;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.score_chunk_size, 250);
        assert_eq!(loaded.rpc_url_template, "https://rpc.snapshot.org/{network}");
    }
}
