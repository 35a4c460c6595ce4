//! In-memory collaborators for testing.
//!
//! [`MockCloud`] implements all three collaborator traits over a small
//! in-memory cluster and records every call it receives, in order.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::gateway::{
    ClusterManager, FleetManager, GatewayError, LifecycleAction, NodeHandle, NodeStatus,
    ResubmissionChannel, Workload, WorkloadState,
};

/// Collaborator operations, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListNodes,
    DescribeNodes,
    SetDraining,
    ListWorkloads,
    DescribeWorkloads,
    StopWorkload,
    CompleteLifecycleAction,
    Publish,
}

/// A recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListNodes {
        cluster: String,
    },
    DescribeNodes {
        cluster: String,
        node_arns: Vec<String>,
    },
    SetDraining {
        cluster: String,
        node_arn: String,
    },
    ListWorkloads {
        cluster: String,
        node_arn: String,
    },
    DescribeWorkloads {
        cluster: String,
        workload_arns: Vec<String>,
    },
    StopWorkload {
        cluster: String,
        workload_arn: String,
        reason: String,
    },
    CompleteLifecycleAction(LifecycleAction),
    Publish {
        channel: String,
        subject: String,
        payload: Bytes,
    },
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::ListNodes { .. } => Operation::ListNodes,
            Call::DescribeNodes { .. } => Operation::DescribeNodes,
            Call::SetDraining { .. } => Operation::SetDraining,
            Call::ListWorkloads { .. } => Operation::ListWorkloads,
            Call::DescribeWorkloads { .. } => Operation::DescribeWorkloads,
            Call::StopWorkload { .. } => Operation::StopWorkload,
            Call::CompleteLifecycleAction(_) => Operation::CompleteLifecycleAction,
            Call::Publish { .. } => Operation::Publish,
        }
    }
}

#[derive(Debug, Clone)]
struct PlacedWorkload {
    node_arn: String,
    workload: Workload,
}

#[derive(Debug, Default)]
struct CloudState {
    nodes: Vec<NodeHandle>,
    workloads: Vec<PlacedWorkload>,
    calls: Vec<Call>,
    failing: HashSet<Operation>,
    failing_stops: HashSet<String>,
    undescribable: HashSet<String>,
}

/// Recording cluster manager, fleet manager and resubmission channel.
#[derive(Debug, Default)]
pub struct MockCloud {
    state: Mutex<CloudState>,
}

impl MockCloud {
    /// Create an empty mock cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node.
    pub fn with_node(self, arn: &str, native_id: &str, status: NodeStatus) -> Self {
        self.lock().nodes.push(NodeHandle {
            arn: arn.to_string(),
            native_id: native_id.to_string(),
            status,
        });
        self
    }

    /// Place a running workload on a node.
    pub fn with_workload(self, node_arn: &str, arn: &str, group: &str) -> Self {
        self.lock().workloads.push(PlacedWorkload {
            node_arn: node_arn.to_string(),
            workload: Workload {
                arn: arn.to_string(),
                group: group.to_string(),
                state: WorkloadState::Running,
            },
        });
        self
    }

    /// Fail every call of `operation`.
    pub fn failing_on(self, operation: Operation) -> Self {
        self.lock().failing.insert(operation);
        self
    }

    /// Leave one workload out of describe results while it stays listed.
    pub fn undescribable(self, workload_arn: &str) -> Self {
        self.lock().undescribable.insert(workload_arn.to_string());
        self
    }

    /// Fail stop calls for one workload.
    pub fn failing_stop_of(self, workload_arn: &str) -> Self {
        self.lock().failing_stops.insert(workload_arn.to_string());
        self
    }

    /// Remove every workload whose group starts with `prefix`, as a service
    /// scheduler would after moving them elsewhere.
    pub fn reschedule_group(&self, prefix: &str) {
        self.lock()
            .workloads
            .retain(|placed| !placed.workload.group.starts_with(prefix));
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls of a single operation.
    pub fn calls_of(&self, operation: Operation) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .cloned()
            .collect()
    }

    /// Current status of a node.
    pub fn node_status(&self, arn: &str) -> Option<NodeStatus> {
        self.lock()
            .nodes
            .iter()
            .find(|node| node.arn == arn)
            .map(|node| node.status.clone())
    }

    /// Current state of a workload.
    pub fn workload_state(&self, arn: &str) -> Option<WorkloadState> {
        self.lock()
            .workloads
            .iter()
            .find(|placed| placed.workload.arn == arn)
            .map(|placed| placed.workload.state.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a call, failing it if injection is configured.
    fn record(&self, call: Call) -> Result<(), GatewayError> {
        let mut state = self.lock();
        let operation = call.operation();
        let fail_stop = match &call {
            Call::StopWorkload { workload_arn, .. } => state.failing_stops.contains(workload_arn),
            _ => false,
        };
        state.calls.push(call);

        if fail_stop || state.failing.contains(&operation) {
            return Err(GatewayError::Injected(format!("{operation:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterManager for MockCloud {
    async fn list_nodes(&self, cluster: &str) -> Result<Vec<String>, GatewayError> {
        self.record(Call::ListNodes {
            cluster: cluster.to_string(),
        })?;
        Ok(self.lock().nodes.iter().map(|node| node.arn.clone()).collect())
    }

    async fn describe_nodes(
        &self,
        cluster: &str,
        node_arns: &[String],
    ) -> Result<Vec<NodeHandle>, GatewayError> {
        self.record(Call::DescribeNodes {
            cluster: cluster.to_string(),
            node_arns: node_arns.to_vec(),
        })?;
        Ok(self
            .lock()
            .nodes
            .iter()
            .filter(|node| node_arns.contains(&node.arn))
            .cloned()
            .collect())
    }

    async fn set_draining(&self, cluster: &str, node_arn: &str) -> Result<(), GatewayError> {
        self.record(Call::SetDraining {
            cluster: cluster.to_string(),
            node_arn: node_arn.to_string(),
        })?;
        let mut state = self.lock();
        match state.nodes.iter_mut().find(|node| node.arn == node_arn) {
            Some(node) => {
                node.status = NodeStatus::Draining;
                Ok(())
            }
            None => Err(GatewayError::Rejected {
                reason: format!("MISSING ({node_arn})"),
            }),
        }
    }

    async fn list_workloads(
        &self,
        cluster: &str,
        node_arn: &str,
    ) -> Result<Vec<String>, GatewayError> {
        self.record(Call::ListWorkloads {
            cluster: cluster.to_string(),
            node_arn: node_arn.to_string(),
        })?;
        Ok(self
            .lock()
            .workloads
            .iter()
            .filter(|placed| {
                placed.node_arn == node_arn && placed.workload.state != WorkloadState::Stopped
            })
            .map(|placed| placed.workload.arn.clone())
            .collect())
    }

    async fn describe_workloads(
        &self,
        cluster: &str,
        workload_arns: &[String],
    ) -> Result<Vec<Workload>, GatewayError> {
        self.record(Call::DescribeWorkloads {
            cluster: cluster.to_string(),
            workload_arns: workload_arns.to_vec(),
        })?;
        let state = self.lock();
        Ok(state
            .workloads
            .iter()
            .filter(|placed| workload_arns.contains(&placed.workload.arn))
            .filter(|placed| !state.undescribable.contains(&placed.workload.arn))
            .map(|placed| placed.workload.clone())
            .collect())
    }

    async fn stop_workload(
        &self,
        cluster: &str,
        workload_arn: &str,
        reason: &str,
    ) -> Result<(), GatewayError> {
        self.record(Call::StopWorkload {
            cluster: cluster.to_string(),
            workload_arn: workload_arn.to_string(),
            reason: reason.to_string(),
        })?;
        info!(workload = %workload_arn, "[MOCK] Stopping workload");
        if let Some(placed) = self
            .lock()
            .workloads
            .iter_mut()
            .find(|placed| placed.workload.arn == workload_arn)
        {
            placed.workload.state = WorkloadState::Stopped;
        }
        Ok(())
    }
}

#[async_trait]
impl FleetManager for MockCloud {
    async fn complete_lifecycle_action(
        &self,
        action: &LifecycleAction,
    ) -> Result<(), GatewayError> {
        self.record(Call::CompleteLifecycleAction(action.clone()))
    }
}

#[async_trait]
impl ResubmissionChannel for MockCloud {
    async fn publish(
        &self,
        channel: &str,
        subject: &str,
        payload: &Bytes,
    ) -> Result<(), GatewayError> {
        self.record(Call::Publish {
            channel: channel.to_string(),
            subject: subject.to_string(),
            payload: payload.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stopped_workloads_drop_out_of_listing() {
        let cloud = MockCloud::new()
            .with_node("ci/1", "i-1", NodeStatus::Active)
            .with_workload("ci/1", "task/a", "family:batch");

        assert_eq!(cloud.list_workloads("prod", "ci/1").await.unwrap(), vec!["task/a"]);
        cloud.stop_workload("prod", "task/a", "drain").await.unwrap();
        assert!(cloud.list_workloads("prod", "ci/1").await.unwrap().is_empty());
        assert_eq!(cloud.workload_state("task/a"), Some(WorkloadState::Stopped));
    }

    #[tokio::test]
    async fn test_injected_failure_is_still_recorded() {
        let cloud = MockCloud::new().failing_on(Operation::ListNodes);

        assert!(cloud.list_nodes("prod").await.is_err());
        assert_eq!(cloud.calls_of(Operation::ListNodes).len(), 1);
    }
}
