//! Delegates API - delegate voting power rankings
//!
//! Given a governance identifier, discovers who delegates to whom, computes
//! each delegate's voting power and stores a ranked, versioned snapshot.
//!
//! ## Pipeline
//!
//! ```text
//! compute([ids]) ──► gate ──► resolver ──┬─► hub space ──► network delegations (cached) ──► score API
//!                                        └─► custom    ──► registry subgraph ──────────────► multicall balances
//!                                                                     │
//!                                                    rank ◄───────────┘
//!                                                      │
//!                                                      ▼
//!                                     governances + delegates (validity ranges)
//! ```
//!
//! Governance ids of the form `prefix:viewId` select a configured custom
//! governance; any other id is looked up on the hub.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod graphql;
pub mod http;
pub mod hub;
pub mod onchain;
pub mod orchestrator;
pub mod ranking;
pub mod resolver;
pub mod scores;
pub mod sources;
pub mod types;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, CustomGovernanceConfig};
pub use db::{DelegateRow, DelegatesDb, GovernanceRow, SequenceCounter};
pub use error::{DelegatesError, Result};
pub use gate::ComputeGate;
pub use orchestrator::{ComputeReport, GovernanceOutcome, Orchestrator, Pipeline, PipelineSettings};
pub use types::{CustomGovernance, Delegation, GovernanceSpace, ResolvedGovernance, Strategy};
