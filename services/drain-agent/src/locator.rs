//! Node lookup.

use std::sync::Arc;

use tracing::debug;

use crate::error::DrainError;
use crate::gateway::{ClusterManager, NodeHandle, MAX_DESCRIBE_BATCH};

/// Resolves a native node identifier to its cluster handle.
pub struct NodeLocator {
    cluster: Arc<dyn ClusterManager>,
}

impl NodeLocator {
    pub fn new(cluster: Arc<dyn ClusterManager>) -> Self {
        Self { cluster }
    }

    /// Find the node registered to `cluster` whose native id is `node_id`.
    pub async fn locate(&self, cluster: &str, node_id: &str) -> Result<NodeHandle, DrainError> {
        let not_found = || DrainError::NodeNotFound {
            cluster: cluster.to_string(),
            node_id: node_id.to_string(),
        };

        let arns = self
            .cluster
            .list_nodes(cluster)
            .await
            .map_err(DrainError::lookup("list nodes"))?;
        debug!(cluster, node_count = arns.len(), "Listed cluster nodes");

        for batch in arns.chunks(MAX_DESCRIBE_BATCH) {
            let nodes = self
                .cluster
                .describe_nodes(cluster, batch)
                .await
                .map_err(DrainError::lookup("describe nodes"))?;

            if let Some(node) = nodes.into_iter().find(|node| node.native_id == node_id) {
                return Ok(node);
            }
        }

        Err(not_found())
    }
}
