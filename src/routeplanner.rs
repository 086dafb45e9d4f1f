//! Pass-through wrapper for the node's route-planner endpoints.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::node::Node;

/// Route-planner state as reported by the node. `details` is passed through
/// untyped; its shape depends on the planner class in use.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutePlannerStatus {
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

pub struct RoutePlanner {
    node: Arc<Node>,
}

impl RoutePlanner {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    /// Current planner status, or `None` when the node runs no planner.
    pub async fn status(&self) -> Result<Option<RoutePlannerStatus>> {
        let status: RoutePlannerStatus = self.node.request("/routeplanner/status").await?;
        Ok(status.class.is_some().then_some(status))
    }

    /// Unmark one failing address. True on success.
    pub async fn free_address(&self, address: &str) -> Result<bool> {
        if address.is_empty() {
            return Err(Error::Validation(
                "'address' must be a non-empty string".into(),
            ));
        }
        let status = self
            .node
            .post_status("/routeplanner/free/address", Some(json!({ "address": address })))
            .await?;
        Ok(status == reqwest::StatusCode::NO_CONTENT)
    }

    /// Unmark every failing address. True on success.
    pub async fn free_all(&self) -> Result<bool> {
        let status = self.node.post_status("/routeplanner/free/all", None).await?;
        Ok(status == reqwest::StatusCode::NO_CONTENT)
    }
}
