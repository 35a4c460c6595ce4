//! Error taxonomy for one drain invocation.
//!
//! Every variant is fatal for the invocation. Recovery is a fresh trigger
//! delivery, never an in-process retry.

use nodeevac_events::EventError;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors that abort a drain invocation.
#[derive(Debug, Error)]
pub enum DrainError {
    /// The trigger payload could not be decoded.
    #[error("malformed lifecycle event: {0}")]
    MalformedEvent(#[from] EventError),

    /// The node is not registered to the cluster.
    #[error("node {node_id} is not registered to cluster {cluster}")]
    NodeNotFound { cluster: String, node_id: String },

    /// A read-only cluster query failed.
    #[error("{operation} failed: {source}")]
    LookupFailed {
        operation: &'static str,
        #[source]
        source: GatewayError,
    },

    /// The node could not be moved to DRAINING.
    #[error("failed to drain node {node}: {source}")]
    DrainTransitionFailed {
        node: String,
        #[source]
        source: GatewayError,
    },

    /// A standalone workload could not be stopped.
    #[error("failed to stop workload {workload}: {source}")]
    WorkloadStopFailed {
        workload: String,
        #[source]
        source: GatewayError,
    },

    /// The continuation message could not be published.
    #[error("failed to resubmit trigger to {channel}: {source}")]
    ResubmissionFailed {
        channel: String,
        #[source]
        source: GatewayError,
    },

    /// The lifecycle hook could not be completed.
    #[error("failed to complete lifecycle hook {hook}: {source}")]
    CompletionFailed {
        hook: String,
        #[source]
        source: GatewayError,
    },
}

impl DrainError {
    pub(crate) fn lookup(operation: &'static str) -> impl FnOnce(GatewayError) -> Self {
        move |source| DrainError::LookupFailed { operation, source }
    }
}
