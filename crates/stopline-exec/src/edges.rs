//! Edge registry and command authorization.
//!
//! A command is authorized when its edge is configured and its base asset is
//! not on the denylist (stablecoins by default). Both checks run before any
//! exchange call.

use std::collections::{HashMap, HashSet};

use stopline_core::EdgeId;
use stopline_core::config::{AppConfig, EdgeConfig};
use thiserror::Error;

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("unknown edge '{0}'")]
    UnknownEdge(EdgeId),

    #[error("trading {0} is not allowed")]
    DeniedAsset(String),
}

/// Configured edges plus the denylist.
#[derive(Debug, Clone, Default)]
pub struct EdgeRegistry {
    edges: HashMap<EdgeId, EdgeConfig>,
    denied_base_assets: HashSet<String>,
}

impl EdgeRegistry {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            edges: config.edges.iter().map(|e| (e.name.clone(), e.clone())).collect(),
            denied_base_assets: config.denied_base_assets.iter().map(|a| a.trim().to_uppercase()).collect(),
        }
    }

    /// Config of `edge`, if it may trade `base_asset`.
    pub fn authorize(&self, edge: &EdgeId, base_asset: &str) -> Result<&EdgeConfig, AuthorizationError> {
        let config = self.edges.get(edge).ok_or_else(|| AuthorizationError::UnknownEdge(edge.clone()))?;
        let base_asset = base_asset.trim().to_uppercase();
        if self.denied_base_assets.contains(&base_asset) {
            return Err(AuthorizationError::DeniedAsset(base_asset));
        }
        Ok(config)
    }
}
