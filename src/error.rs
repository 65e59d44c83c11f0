//! Error types for delegates-api

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DelegatesError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown custom governance: {0}")]
    UnknownCustomGovernance(String),

    #[error("Space not found on hub: {0}")]
    SpaceNotFound(String),

    #[error("Unable to paginate delegations from {url}: full page stuck at timestamp {timestamp}")]
    PaginationStalled { url: String, timestamp: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream error from {service}: {message}")]
    Upstream { service: &'static str, message: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("ABI error: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DelegatesError {
    pub(crate) fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DelegatesError>;
