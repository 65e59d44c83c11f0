//! Off-chain score engine.
//!
//! Delegate addresses are sent to the score API in fixed-size chunks. The API
//! answers with one score map per strategy; maps are summed per address across
//! strategies and across chunks. A failing chunk fails the whole computation.

use std::collections::HashMap;

use alloy_primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DelegatesError, Result};
use crate::types::{checksum, parse_address, Snapshot, Strategy};

/// Default addresses per score request.
pub const SCORE_CHUNK_SIZE: usize = 500;

/// Parameters of one score request.
#[derive(Debug, Clone, Copy)]
pub struct ScoreRequest<'a> {
    pub space: &'a str,
    pub network: &'a str,
    pub snapshot: Snapshot,
    pub strategies: &'a [Strategy],
    pub addresses: &'a [Address],
}

/// Scoring service. Returns one map per strategy, in strategy order.
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    async fn get_scores(&self, request: ScoreRequest<'_>) -> Result<Vec<HashMap<Address, f64>>>;
}

/// Strategies of a space that carry delegated voting power.
pub fn eligible_strategies(strategies: &[Strategy], allow_list: &[String]) -> Vec<Strategy> {
    strategies
        .iter()
        .filter(|s| allow_list.iter().any(|name| name == &s.name))
        .cloned()
        .collect()
}

/// Sum of every strategy's score per address, computed chunk by chunk.
pub async fn compute_scores(
    provider: &dyn ScoreProvider,
    network: &str,
    governance: &str,
    strategies: &[Strategy],
    addresses: &[Address],
    chunk_size: usize,
) -> Result<HashMap<Address, f64>> {
    let mut totals: HashMap<Address, f64> = HashMap::new();

    for (index, chunk) in addresses.chunks(chunk_size.max(1)).enumerate() {
        let per_strategy = provider
            .get_scores(ScoreRequest {
                space: governance,
                network,
                snapshot: Snapshot::Latest,
                strategies,
                addresses: chunk,
            })
            .await?;

        debug!(governance, chunk = index, size = chunk.len(), "Scored address chunk");

        for scores in per_strategy {
            for (address, score) in scores {
                *totals.entry(address).or_insert(0.0) += score;
            }
        }
    }

    Ok(totals)
}

/// Score API client (`POST {url}/api/scores`).
pub struct ScoreApiClient {
    client: Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct ScoreApiBody<'a> {
    params: ScoreApiParams<'a>,
}

#[derive(Debug, Serialize)]
struct ScoreApiParams<'a> {
    space: &'a str,
    network: &'a str,
    snapshot: Snapshot,
    strategies: &'a [Strategy],
    addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ScoreApiResponse {
    result: Option<ScoreApiResult>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ScoreApiResult {
    scores: Vec<HashMap<String, f64>>,
}

impl ScoreApiClient {
    pub fn new(client: Client, score_api_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/api/scores", score_api_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ScoreProvider for ScoreApiClient {
    async fn get_scores(&self, request: ScoreRequest<'_>) -> Result<Vec<HashMap<Address, f64>>> {
        let body = ScoreApiBody {
            params: ScoreApiParams {
                space: request.space,
                network: request.network,
                snapshot: request.snapshot,
                strategies: request.strategies,
                addresses: request.addresses.iter().map(checksum).collect(),
            },
        };

        let response: ScoreApiResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(DelegatesError::upstream("score-api", error.to_string()));
        }

        let result = response
            .result
            .ok_or_else(|| DelegatesError::upstream("score-api", "response carried no result"))?;

        result
            .scores
            .into_iter()
            .map(|scores| {
                scores
                    .into_iter()
                    .map(|(address, score)| Ok((parse_address(&address)?, score)))
                    .collect::<Result<HashMap<_, _>>>()
            })
            .collect()
    }
}
