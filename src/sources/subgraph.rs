//! Cursor pagination over delegation subgraphs.
//!
//! Pages are requested with `timestamp_gte: pivot` in ascending timestamp
//! order and the pivot moves to the last timestamp of each page. Rows seen
//! twice (the pivot row is always refetched) are dropped by
//! `(delegator, delegate, space)` identity. A full page whose rows all share
//! one timestamp cannot advance the pivot and fails the fetch.

use std::collections::HashSet;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{DelegatesError, Result};
use crate::graphql::GraphqlClient;
use crate::types::{CustomGovernance, Delegation, Snapshot};

/// Default rows per page.
pub const PAGE_SIZE: usize = 1000;

const DELEGATIONS_QUERY: &str = r#"
query Delegations($where: Delegation_filter!, $first: Int!) {
  delegations(where: $where, first: $first, skip: 0, orderBy: timestamp, orderDirection: asc) {
    delegator
    space
    delegate
    timestamp
  }
}
"#;

const DELEGATIONS_AT_BLOCK_QUERY: &str = r#"
query Delegations($where: Delegation_filter!, $first: Int!, $block: Int!) {
  delegations(where: $where, first: $first, skip: 0, orderBy: timestamp, orderDirection: asc, block: { number: $block }) {
    delegator
    space
    delegate
    timestamp
  }
}
"#;

/// Which delegations a page request selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceFilter {
    /// Every delegation on the subgraph.
    Any,
    /// `space_in`, by decoded space id.
    SpaceIn(Vec<String>),
    /// `space_raw`, by raw registry id.
    SpaceRaw(String),
}

/// One page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub filter: SpaceFilter,
    pub timestamp_gte: u64,
    pub first: usize,
    pub snapshot: Snapshot,
}

impl PageQuery {
    fn where_clause(&self) -> Value {
        let mut clause = json!({ "timestamp_gte": self.timestamp_gte });
        match &self.filter {
            SpaceFilter::Any => {}
            SpaceFilter::SpaceIn(spaces) => clause["space_in"] = json!(spaces),
            SpaceFilter::SpaceRaw(raw) => clause["space_raw"] = json!(raw),
        }
        clause
    }

    /// GraphQL document and variables for this page.
    pub fn to_request(&self) -> (&'static str, Value) {
        match self.snapshot {
            Snapshot::Latest => (
                DELEGATIONS_QUERY,
                json!({ "where": self.where_clause(), "first": self.first }),
            ),
            Snapshot::Block(number) => (
                DELEGATIONS_AT_BLOCK_QUERY,
                json!({ "where": self.where_clause(), "first": self.first, "block": number }),
            ),
        }
    }
}

/// Fetches a single page of delegations.
#[async_trait]
pub trait DelegationPages: Send + Sync {
    async fn fetch_page(&self, url: &str, query: &PageQuery) -> Result<Vec<Delegation>>;
}

/// Subgraph HTTP client.
pub struct SubgraphClient {
    graphql: GraphqlClient,
}

#[derive(Debug, Deserialize)]
struct DelegationsData {
    #[serde(default)]
    delegations: Vec<Delegation>,
}

impl SubgraphClient {
    pub fn new(graphql: GraphqlClient) -> Self {
        Self { graphql }
    }
}

#[async_trait]
impl DelegationPages for SubgraphClient {
    async fn fetch_page(&self, url: &str, query: &PageQuery) -> Result<Vec<Delegation>> {
        let (document, variables) = query.to_request();
        let data: DelegationsData = self
            .graphql
            .query("subgraph", url, document, variables)
            .await?;
        Ok(data.delegations)
    }
}

fn is_stalled(page: &[Delegation], page_size: usize) -> bool {
    match (page.first(), page.last()) {
        (Some(first), Some(last)) => page.len() == page_size && first.timestamp == last.timestamp,
        _ => false,
    }
}

/// Fetch every delegation matching `filter`, deduplicated, in first-seen order.
pub async fn paginate_delegations(
    pages: &dyn DelegationPages,
    url: &str,
    filter: SpaceFilter,
    snapshot: Snapshot,
    page_size: usize,
) -> Result<Vec<Delegation>> {
    let page_size = page_size.max(1);
    let mut seen: HashSet<(Address, Address, String)> = HashSet::new();
    let mut result = Vec::new();
    let mut query = PageQuery {
        filter,
        timestamp_gte: 0,
        first: page_size,
        snapshot,
    };

    loop {
        let page = pages.fetch_page(url, &query).await?;

        if is_stalled(&page, page_size) {
            return Err(DelegatesError::PaginationStalled {
                url: url.to_string(),
                timestamp: query.timestamp_gte,
            });
        }

        let fetched = page.len();
        for delegation in page {
            query.timestamp_gte = delegation.timestamp;
            let (delegator, delegate, space) = delegation.key();
            if seen.insert((delegator, delegate, space.to_string())) {
                result.push(delegation);
            }
        }

        debug!(url, fetched, total = result.len(), pivot = query.timestamp_gte, "Fetched delegation page");

        if fetched < page_size {
            break;
        }
    }

    Ok(result)
}

/// Every delegation recorded by a custom governance's registry subgraph.
pub async fn fetch_custom_governance_delegations(
    pages: &dyn DelegationPages,
    governance: &CustomGovernance,
    page_size: usize,
) -> Result<Vec<Delegation>> {
    paginate_delegations(
        pages,
        &governance.subgraph_url,
        SpaceFilter::SpaceRaw(governance.view_id.clone()),
        Snapshot::Latest,
        page_size,
    )
    .await
}
