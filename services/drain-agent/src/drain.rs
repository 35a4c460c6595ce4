//! Node drain transition.

use std::sync::Arc;

use tracing::info;

use crate::error::DrainError;
use crate::gateway::{ClusterManager, NodeHandle};

/// What [`DrainController::ensure_draining`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainTransition {
    /// The node was already draining; nothing was sent.
    AlreadyDraining,
    /// The node was asked to start draining.
    Started,
}

/// Moves nodes into DRAINING.
pub struct DrainController {
    cluster: Arc<dyn ClusterManager>,
}

impl DrainController {
    pub fn new(cluster: Arc<dyn ClusterManager>) -> Self {
        Self { cluster }
    }

    /// Put the node into DRAINING unless it already is.
    pub async fn ensure_draining(
        &self,
        cluster: &str,
        node: &NodeHandle,
    ) -> Result<DrainTransition, DrainError> {
        if node.is_draining() {
            return Ok(DrainTransition::AlreadyDraining);
        }

        info!(node = %node.native_id, status = %node.status, "Draining node");
        self.cluster
            .set_draining(cluster, &node.arn)
            .await
            .map_err(|source| DrainError::DrainTransitionFailed {
                node: node.arn.clone(),
                source,
            })?;

        Ok(DrainTransition::Started)
    }
}
