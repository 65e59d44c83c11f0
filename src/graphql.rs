//! Minimal GraphQL-over-HTTP client shared by the hub and subgraph adapters.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DelegatesError, Result};

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Clone)]
pub struct GraphqlClient {
    client: Client,
}

impl GraphqlClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// POST a query and decode `data`. GraphQL `errors` become upstream errors.
    pub async fn query<T: DeserializeOwned>(
        &self,
        service: &'static str,
        url: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        debug!(service, url, "GraphQL request");

        let response = self
            .client
            .post(url)
            .json(&GraphqlRequest { query, variables })
            .send()
            .await?
            .error_for_status()?;

        let body: GraphqlResponse<T> = response.json().await?;

        if let Some(error) = body.errors.first() {
            return Err(DelegatesError::upstream(service, error.message.clone()));
        }

        body.data
            .ok_or_else(|| DelegatesError::upstream(service, "response carried no data"))
    }
}
