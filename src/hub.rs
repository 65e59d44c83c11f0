//! Hub metadata client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::Result;
use crate::graphql::GraphqlClient;
use crate::types::GovernanceSpace;

const SPACE_QUERY: &str = r#"
query Space($id: String!) {
  space(id: $id) {
    id
    network
    strategies {
      name
      network
      params
    }
  }
}
"#;

/// Read-only access to space metadata.
#[async_trait]
pub trait SpaceProvider: Send + Sync {
    /// `None` when the hub does not know the space.
    async fn space(&self, id: &str) -> Result<Option<GovernanceSpace>>;
}

/// Hub GraphQL client.
pub struct HubClient {
    graphql: GraphqlClient,
    url: String,
}

#[derive(Debug, Deserialize)]
struct SpaceData {
    space: Option<GovernanceSpace>,
}

impl HubClient {
    pub fn new(graphql: GraphqlClient, hub_url: &str) -> Self {
        Self {
            graphql,
            url: format!("{}/graphql", hub_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl SpaceProvider for HubClient {
    async fn space(&self, id: &str) -> Result<Option<GovernanceSpace>> {
        let data: SpaceData = self
            .graphql
            .query("hub", &self.url, SPACE_QUERY, json!({ "id": id }))
            .await?;
        Ok(data.space)
    }
}
