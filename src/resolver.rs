//! Governance identifier resolution.
//!
//! `prefix:viewId` selects a configured custom governance, anything else is a
//! hub space.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CustomGovernanceConfig;
use crate::error::{DelegatesError, Result};
use crate::hub::SpaceProvider;
use crate::types::{CustomGovernance, ResolvedGovernance};

/// Separates a custom governance prefix from its view id.
pub const CUSTOM_GOVERNANCE_SEPARATOR: char = ':';

pub struct GovernanceResolver {
    hub: Arc<dyn SpaceProvider>,
    custom_governances: HashMap<String, CustomGovernanceConfig>,
}

impl GovernanceResolver {
    pub fn new(
        hub: Arc<dyn SpaceProvider>,
        custom_governances: HashMap<String, CustomGovernanceConfig>,
    ) -> Self {
        Self {
            hub,
            custom_governances,
        }
    }

    fn resolve_custom(&self, id: &str, prefix: &str, view_id: &str) -> Result<CustomGovernance> {
        let config = self
            .custom_governances
            .get(prefix)
            .ok_or_else(|| DelegatesError::UnknownCustomGovernance(prefix.to_string()))?;

        Ok(CustomGovernance {
            id: id.to_string(),
            network: config.network.clone(),
            view_id: view_id.to_string(),
            delegation_registry: config.delegation_registry,
            subgraph_url: config.subgraph_url.clone(),
        })
    }

    pub async fn resolve(&self, id: &str) -> Result<ResolvedGovernance> {
        if let Some((prefix, view_id)) = id.split_once(CUSTOM_GOVERNANCE_SEPARATOR) {
            return self
                .resolve_custom(id, prefix, view_id)
                .map(ResolvedGovernance::Custom);
        }

        self.hub
            .space(id)
            .await?
            .map(ResolvedGovernance::Space)
            .ok_or_else(|| DelegatesError::SpaceNotFound(id.to_string()))
    }
}
