//! Delegation sources
//!
//! - `network` - generic off-chain delegation index, cached per network
//! - `subgraph` - timestamp-cursor pagination, also used directly for custom governances

pub mod network;
pub mod subgraph;

pub use network::{NetworkCacheEntry, NetworkDelegationCache, NetworkDelegationSource};
pub use subgraph::{
    fetch_custom_governance_delegations, paginate_delegations, DelegationPages, PageQuery,
    SpaceFilter, SubgraphClient, PAGE_SIZE,
};
