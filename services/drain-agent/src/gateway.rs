//! Collaborator interfaces.
//!
//! The drain pipeline talks to three external systems:
//! - the cluster manager (nodes and the workloads placed on them)
//! - the fleet manager (lifecycle hook completion)
//! - the resubmission channel (redelivery of the original trigger)
//!
//! Each is an async trait so the HTTP implementations in [`crate::client`]
//! and the recording doubles in [`crate::mock`] are interchangeable.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest id list accepted by a single describe call.
pub const MAX_DESCRIBE_BATCH: usize = 100;

/// Errors returned by collaborator calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The call succeeded but the collaborator refused part of it.
    #[error("request rejected: {reason}")]
    Rejected { reason: String },

    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failure raised by a test double.
    #[error("injected failure: {0}")]
    Injected(String),
}

impl GatewayError {
    /// Create an API error from response details.
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Drain status of a node as reported by the cluster manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeStatus {
    Active,
    Draining,
    Other(String),
}

impl NodeStatus {
    pub fn as_str(&self) -> &str {
        match self {
            NodeStatus::Active => "ACTIVE",
            NodeStatus::Draining => "DRAINING",
            NodeStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for NodeStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "ACTIVE" => NodeStatus::Active,
            "DRAINING" => NodeStatus::Draining,
            _ => NodeStatus::Other(raw),
        }
    }
}

impl From<NodeStatus> for String {
    fn from(status: NodeStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A node resolved against the cluster manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    /// Cluster-scoped handle (container instance ARN).
    pub arn: String,

    /// Native identifier (EC2 instance id).
    pub native_id: String,

    /// Current drain status.
    pub status: NodeStatus,
}

impl NodeHandle {
    pub fn is_draining(&self) -> bool {
        self.status == NodeStatus::Draining
    }
}

/// Last known state of a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkloadState {
    Running,
    Stopped,
    Other(String),
}

impl WorkloadState {
    pub fn as_str(&self) -> &str {
        match self {
            WorkloadState::Running => "RUNNING",
            WorkloadState::Stopped => "STOPPED",
            WorkloadState::Other(raw) => raw,
        }
    }
}

impl From<String> for WorkloadState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "RUNNING" => WorkloadState::Running,
            "STOPPED" => WorkloadState::Stopped,
            _ => WorkloadState::Other(raw),
        }
    }
}

impl From<WorkloadState> for String {
    fn from(state: WorkloadState) -> Self {
        state.as_str().to_string()
    }
}

/// A unit of work placed on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    /// Workload identifier (task ARN).
    pub arn: String,

    /// Owning-group tag, empty when the workload has none.
    pub group: String,

    pub state: WorkloadState,
}

/// Result sent when completing a lifecycle hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleActionResult {
    /// Let the fleet manager finish terminating the node.
    Continue,
}

impl LifecycleActionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleActionResult::Continue => "CONTINUE",
        }
    }
}

/// A lifecycle hook completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleAction {
    pub group_name: String,
    pub hook_name: String,
    pub instance_id: String,
    pub result: LifecycleActionResult,
}

/// Cluster manager: node registry and workload placement.
#[async_trait]
pub trait ClusterManager: Send + Sync {
    /// List the handles of every node registered to the cluster.
    async fn list_nodes(&self, cluster: &str) -> Result<Vec<String>, GatewayError>;

    /// Describe up to [`MAX_DESCRIBE_BATCH`] nodes.
    async fn describe_nodes(
        &self,
        cluster: &str,
        node_arns: &[String],
    ) -> Result<Vec<NodeHandle>, GatewayError>;

    /// Move a node to DRAINING.
    async fn set_draining(&self, cluster: &str, node_arn: &str) -> Result<(), GatewayError>;

    /// List the workloads currently placed on a node.
    async fn list_workloads(&self, cluster: &str, node_arn: &str)
        -> Result<Vec<String>, GatewayError>;

    /// Describe up to [`MAX_DESCRIBE_BATCH`] workloads.
    async fn describe_workloads(
        &self,
        cluster: &str,
        workload_arns: &[String],
    ) -> Result<Vec<Workload>, GatewayError>;

    /// Force-stop a workload.
    async fn stop_workload(
        &self,
        cluster: &str,
        workload_arn: &str,
        reason: &str,
    ) -> Result<(), GatewayError>;
}

/// Fleet manager: releases lifecycle hooks.
#[async_trait]
pub trait FleetManager: Send + Sync {
    async fn complete_lifecycle_action(&self, action: &LifecycleAction)
        -> Result<(), GatewayError>;
}

/// Resubmission channel: redelivers a payload to this pipeline.
#[async_trait]
pub trait ResubmissionChannel: Send + Sync {
    async fn publish(&self, channel: &str, subject: &str, payload: &Bytes)
        -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_status_from_wire() {
        assert_eq!(NodeStatus::from("ACTIVE".to_string()), NodeStatus::Active);
        assert_eq!(NodeStatus::from("DRAINING".to_string()), NodeStatus::Draining);
        assert_eq!(
            NodeStatus::from("REGISTERING".to_string()),
            NodeStatus::Other("REGISTERING".to_string())
        );
    }

    #[test]
    fn test_node_status_deserialization() {
        let status: NodeStatus = serde_json::from_str("\"DRAINING\"").unwrap();
        assert_eq!(status, NodeStatus::Draining);
        assert_eq!(status.to_string(), "DRAINING");
    }

    #[test]
    fn test_workload_state_from_wire() {
        assert_eq!(WorkloadState::from("RUNNING".to_string()), WorkloadState::Running);
        assert_eq!(WorkloadState::from("STOPPED".to_string()), WorkloadState::Stopped);
        assert_eq!(WorkloadState::from("PENDING".to_string()).as_str(), "PENDING");
    }

    #[test]
    fn test_lifecycle_result_wire_value() {
        assert_eq!(LifecycleActionResult::Continue.as_str(), "CONTINUE");
    }
}
