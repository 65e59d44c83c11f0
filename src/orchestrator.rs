//! Compute orchestrator.
//!
//! One pass at a time, process-wide: the gate, the network cache and the
//! sequence counter live inside the pass mutex, so they are only touched while
//! it is held. Governances in a batch are processed in order; a failure is
//! logged and the batch moves on.
//!
//! ```text
//! gate -> sequence++ -> resolve -> delegations -> whitelist/scope -> scores -> rank -> store -> gate mark
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::Config;
use crate::db::{delegate_id, DelegateRow, DelegatesDb, GovernanceRow, SequenceCounter};
use crate::error::Result;
use crate::gate::ComputeGate;
use crate::graphql::GraphqlClient;
use crate::http::json_client;
use crate::hub::HubClient;
use crate::onchain::{compute_onchain_scores, JsonRpcMulticall, Multicall};
use crate::ranking::{
    delegates_in_order, format_units, rank_delegates, restrict_to_whitelist, scope_delegations,
    to_raw_score, GovernanceSummary, RankedDelegate, VOTE_DECIMALS,
};
use crate::resolver::GovernanceResolver;
use crate::scores::{compute_scores, eligible_strategies, ScoreApiClient, ScoreProvider};
use crate::sources::{
    fetch_custom_governance_delegations, DelegationPages, NetworkDelegationCache,
    NetworkDelegationSource, SubgraphClient,
};
use crate::types::{checksum, CustomGovernance, Delegation, GovernanceSpace, ResolvedGovernance};

/// Tunables of a compute pass.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub space_cooldown_secs: u64,
    pub delegation_strategies: Vec<String>,
    pub score_chunk_size: usize,
    pub subgraph_page_size: usize,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            space_cooldown_secs: config.space_cooldown_secs,
            delegation_strategies: config.delegation_strategies.clone(),
            score_chunk_size: config.score_chunk_size,
            subgraph_page_size: config.subgraph_page_size,
        }
    }
}

/// External collaborators of the pipeline.
pub struct Pipeline {
    pub resolver: GovernanceResolver,
    pub network_source: NetworkDelegationSource,
    pub subgraph: Arc<dyn DelegationPages>,
    pub scores: Arc<dyn ScoreProvider>,
    pub multicall: Arc<dyn Multicall>,
}

impl Pipeline {
    /// HTTP-backed collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = json_client(config.request_timeout())?;
        let graphql = GraphqlClient::new(client.clone());
        let subgraph: Arc<dyn DelegationPages> = Arc::new(SubgraphClient::new(graphql.clone()));
        let hub = Arc::new(HubClient::new(graphql, &config.hub_url));

        Ok(Self {
            resolver: GovernanceResolver::new(hub, config.custom_governances.clone()),
            network_source: NetworkDelegationSource::new(
                Arc::clone(&subgraph),
                config.delegation_subgraphs.clone(),
                config.network_cooldown_secs,
                config.subgraph_page_size,
            ),
            subgraph,
            scores: Arc::new(ScoreApiClient::new(client.clone(), &config.score_api_url)),
            multicall: Arc::new(JsonRpcMulticall::new(client, config.rpc_url_template.clone())),
        })
    }
}

/// Mutable state guarded by the pass mutex.
struct PassState {
    gate: ComputeGate,
    cache: NetworkDelegationCache,
    sequence: SequenceCounter,
}

/// Result of one governance's pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceOutcome {
    pub governance: String,
    pub block: i64,
    pub delegates: usize,
    pub closed: usize,
}

/// What happened to each governance of a batch.
#[derive(Debug, Default)]
pub struct ComputeReport {
    pub computed: Vec<GovernanceOutcome>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Delegations and scores for one governance, before ranking.
struct Scored {
    delegations: Vec<Delegation>,
    scores: HashMap<Address, U256>,
    whitelist: Option<Vec<Address>>,
}

pub struct Orchestrator {
    pipeline: Pipeline,
    settings: PipelineSettings,
    db: Arc<DelegatesDb>,
    clock: Arc<dyn Clock>,
    state: Mutex<PassState>,
}

impl Orchestrator {
    /// Loads the sequence counter from `db`.
    pub fn new(
        pipeline: Pipeline,
        settings: PipelineSettings,
        db: Arc<DelegatesDb>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let sequence = SequenceCounter::load(&db)?;
        info!(sequence = sequence.current(), "Orchestrator ready");

        Ok(Self {
            state: Mutex::new(PassState {
                gate: ComputeGate::new(settings.space_cooldown_secs),
                cache: NetworkDelegationCache::new(),
                sequence,
            }),
            pipeline,
            settings,
            db,
            clock,
        })
    }

    pub fn db(&self) -> &Arc<DelegatesDb> {
        &self.db
    }

    /// Start a pass in the background and return immediately.
    pub fn trigger(self: &Arc<Self>, governances: Vec<String>) -> JoinHandle<ComputeReport> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.compute(&governances).await })
    }

    /// Run a pass over `governances`, waiting for any pass already running.
    pub async fn compute(&self, governances: &[String]) -> ComputeReport {
        let mut state = self.state.lock().await;
        let mut report = ComputeReport::default();

        info!(?governances, "Compute governances");

        for governance in governances {
            let now = self.clock.now();
            if !state.gate.should_compute(governance, now) {
                info!(%governance, "Skipping governance within cooldown");
                report.skipped.push(governance.clone());
                continue;
            }

            match self.compute_governance(&mut state, governance).await {
                Ok(outcome) => {
                    state.gate.mark_computed(governance, self.clock.now());
                    info!(
                        %governance,
                        block = outcome.block,
                        delegates = outcome.delegates,
                        closed = outcome.closed,
                        "Governance computed"
                    );
                    report.computed.push(outcome);
                }
                Err(e) => {
                    error!(%governance, error = %e, "Failed to compute governance");
                    report.failed.push((governance.clone(), e.to_string()));
                }
            }
        }

        report
    }

    async fn compute_governance(&self, state: &mut PassState, governance: &str) -> Result<GovernanceOutcome> {
        // Not rolled back if anything below fails.
        let block = state.sequence.advance(&self.db)?;

        let resolved = self.pipeline.resolver.resolve(governance).await?;
        debug!(%governance, %resolved, network = resolved.network(), block, "Resolved governance");

        let scored = match &resolved {
            ResolvedGovernance::Space(space) => self.score_space(&mut state.cache, space).await?,
            ResolvedGovernance::Custom(custom) => self.score_custom(custom).await?,
        };

        let ranked = rank_delegates(&scored.delegations, &scored.scores, scored.whitelist.as_deref());
        let summary = GovernanceSummary::new(&scored.delegations, &ranked);

        let governance_row = GovernanceRow {
            id: governance.to_string(),
            current_delegates: summary.current_delegates as i64,
            total_delegates: summary.total_delegates as i64,
            delegated_votes_raw: summary.delegated_votes_raw.to_string(),
            delegated_votes: format_units(summary.delegated_votes_raw, VOTE_DECIMALS),
        };
        let delegate_rows: Vec<DelegateRow> = ranked
            .iter()
            .map(|delegate| delegate_row(governance, block, delegate))
            .collect();

        let closed = self.db.record_pass(&governance_row, block, &delegate_rows)?;

        Ok(GovernanceOutcome {
            governance: governance.to_string(),
            block,
            delegates: delegate_rows.len(),
            closed,
        })
    }

    async fn score_space(&self, cache: &mut NetworkDelegationCache, space: &GovernanceSpace) -> Result<Scored> {
        let strategies = eligible_strategies(&space.strategies, &self.settings.delegation_strategies);

        // Validated before any fetch.
        let mut whitelist: Option<Vec<Address>> = None;
        for strategy in &strategies {
            if let Some(more) = strategy.whitelist()? {
                let all = whitelist.get_or_insert_with(Vec::new);
                for address in more {
                    if !all.contains(&address) {
                        all.push(address);
                    }
                }
            }
        }

        let mut networks: Vec<&str> = Vec::new();
        for strategy in &strategies {
            let network = strategy.delegation_network(&space.network);
            if !networks.contains(&network) {
                networks.push(network);
            }
        }

        let mut seen = HashSet::new();
        let mut delegations = Vec::new();
        for network in networks {
            let network_delegations = self
                .pipeline
                .network_source
                .fetch_network_delegations(cache, network, self.clock.now())
                .await?;
            for delegation in scope_delegations(&network_delegations, &space.id) {
                let (delegator, delegate, scope) = delegation.key();
                if seen.insert((delegator, delegate, scope.to_string())) {
                    delegations.push(delegation);
                }
            }
        }

        if let Some(whitelist) = &whitelist {
            delegations = restrict_to_whitelist(delegations, whitelist);
        }

        let addresses = delegates_in_order(&delegations);
        let scores = if addresses.is_empty() {
            HashMap::new()
        } else {
            compute_scores(
                self.pipeline.scores.as_ref(),
                &space.network,
                &space.id,
                &strategies,
                &addresses,
                self.settings.score_chunk_size,
            )
            .await?
        };

        debug!(
            governance = %space.id,
            delegations = delegations.len(),
            scored = scores.len(),
            "Scored space delegates"
        );

        Ok(Scored {
            delegations,
            scores: scores.into_iter().map(|(a, s)| (a, to_raw_score(s))).collect(),
            whitelist,
        })
    }

    async fn score_custom(&self, governance: &CustomGovernance) -> Result<Scored> {
        // The registry subgraph query is already scoped to the view id.
        let delegations = fetch_custom_governance_delegations(
            self.pipeline.subgraph.as_ref(),
            governance,
            self.settings.subgraph_page_size,
        )
        .await?;

        let scores = compute_onchain_scores(self.pipeline.multicall.as_ref(), governance, &delegations).await?;

        Ok(Scored {
            delegations,
            scores,
            whitelist: None,
        })
    }
}

fn delegate_row(governance: &str, block: i64, delegate: &RankedDelegate) -> DelegateRow {
    let user = checksum(&delegate.user);
    DelegateRow {
        id: delegate_id(governance, &user),
        governance: governance.to_string(),
        user,
        delegated_votes_raw: delegate.score.to_string(),
        delegated_votes: format_units(delegate.score, VOTE_DECIMALS),
        token_holders_represented_amount: delegate.represented as i64,
        block_from: block,
        block_to: None,
    }
}
