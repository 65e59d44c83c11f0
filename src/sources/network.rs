//! Network-wide delegations from the off-chain delegation index.
//!
//! One network backs many spaces, so the cache is keyed by network and holds
//! the unfiltered set. Filtering to a single governance happens in the
//! orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::subgraph::{paginate_delegations, DelegationPages, SpaceFilter};
use crate::error::{DelegatesError, Result};
use crate::types::{Delegation, Snapshot};

/// Cached delegation set for one network.
#[derive(Debug, Clone)]
pub struct NetworkCacheEntry {
    /// Unix seconds of the fetch
    pub timestamp: i64,
    pub data: Arc<Vec<Delegation>>,
}

/// Per-network cache, owned by the orchestrator's pass state.
#[derive(Debug, Clone, Default)]
pub struct NetworkDelegationCache {
    entries: HashMap<String, NetworkCacheEntry>,
}

impl NetworkDelegationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, network: &str) -> Option<&NetworkCacheEntry> {
        self.entries.get(network)
    }

    pub fn insert(&mut self, network: &str, timestamp: i64, data: Vec<Delegation>) -> Arc<Vec<Delegation>> {
        let data = Arc::new(data);
        self.entries.insert(
            network.to_string(),
            NetworkCacheEntry {
                timestamp,
                data: Arc::clone(&data),
            },
        );
        data
    }
}

/// Generic delegation source adapter.
pub struct NetworkDelegationSource {
    pages: Arc<dyn DelegationPages>,
    subgraphs: HashMap<String, String>,
    cooldown: i64,
    page_size: usize,
}

impl NetworkDelegationSource {
    pub fn new(
        pages: Arc<dyn DelegationPages>,
        subgraphs: HashMap<String, String>,
        cooldown_secs: u64,
        page_size: usize,
    ) -> Self {
        Self {
            pages,
            subgraphs,
            cooldown: i64::try_from(cooldown_secs).unwrap_or(i64::MAX),
            page_size,
        }
    }

    /// Delegations for `space` (or the whole network when `None`) straight from the index.
    pub async fn delegations_by_space(
        &self,
        network: &str,
        space: Option<&str>,
        snapshot: Snapshot,
    ) -> Result<Vec<Delegation>> {
        let url = self.subgraphs.get(network).ok_or_else(|| {
            DelegatesError::Config(format!("no delegation subgraph configured for network {network}"))
        })?;

        let filter = match space {
            Some(space) => SpaceFilter::SpaceIn(vec![space.to_string(), String::new()]),
            None => SpaceFilter::Any,
        };

        paginate_delegations(self.pages.as_ref(), url, filter, snapshot, self.page_size).await
    }

    /// Every delegation on `network`, served from `cache` while it is fresh.
    pub async fn fetch_network_delegations(
        &self,
        cache: &mut NetworkDelegationCache,
        network: &str,
        now: i64,
    ) -> Result<Arc<Vec<Delegation>>> {
        if let Some(entry) = cache.get(network) {
            if now.saturating_sub(entry.timestamp) < self.cooldown {
                debug!(network, cached = entry.data.len(), "Using cached network delegations");
                return Ok(Arc::clone(&entry.data));
            }
        }

        let delegations = self.delegations_by_space(network, None, Snapshot::Latest).await?;
        info!(network, count = delegations.len(), "Fetched network delegations");

        Ok(cache.insert(network, now, delegations))
    }
}
