//! Workload audit for a draining node.
//!
//! The auditor:
//! - Lists the workloads placed on the node
//! - Force-stops every standalone workload
//! - Leaves service-owned workloads for their scheduler to move
//! - Reports whether any service-owned workload is still there

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::DrainError;
use crate::gateway::{ClusterManager, NodeHandle, Workload, MAX_DESCRIBE_BATCH};

/// Result of one audit pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Service-owned work is still placed on the node.
    ManagedWorkRemains,
    /// Nothing service-owned is left; the node can go.
    NoManagedWork,
}

/// How a workload is treated during drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadClass {
    /// Owned by a service that reschedules it elsewhere.
    Managed,
    /// Not owned by a service; stopped immediately.
    Standalone,
}

/// Classifies workloads by their owning-group prefix.
#[derive(Debug, Clone)]
pub struct WorkloadClassifier {
    managed_prefix: String,
}

impl WorkloadClassifier {
    pub fn new(managed_prefix: impl Into<String>) -> Self {
        Self {
            managed_prefix: managed_prefix.into(),
        }
    }

    pub fn classify(&self, workload: &Workload) -> WorkloadClass {
        if workload.group.starts_with(&self.managed_prefix) {
            WorkloadClass::Managed
        } else {
            WorkloadClass::Standalone
        }
    }
}

/// Counts from one audit pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditReport {
    /// Service-owned workloads still on the node, plus listed workloads the
    /// cluster manager could not describe.
    pub managed: usize,
    /// Standalone workloads stopped during this pass.
    pub stopped: usize,
}

impl AuditReport {
    pub fn outcome(&self) -> ResolutionOutcome {
        if self.managed > 0 {
            ResolutionOutcome::ManagedWorkRemains
        } else {
            ResolutionOutcome::NoManagedWork
        }
    }
}

/// Audits and evicts the workloads on a node.
pub struct WorkloadAuditor {
    cluster: Arc<dyn ClusterManager>,
    classifier: WorkloadClassifier,
    stop_reason: String,
}

impl WorkloadAuditor {
    pub fn new(
        cluster: Arc<dyn ClusterManager>,
        classifier: WorkloadClassifier,
        stop_reason: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            classifier,
            stop_reason: stop_reason.into(),
        }
    }

    /// Run one audit pass over `node`.
    ///
    /// A failed stop aborts the pass. Stops already issued are not rolled
    /// back; the next pass issues them again.
    pub async fn audit(&self, cluster: &str, node: &NodeHandle) -> Result<AuditReport, DrainError> {
        let arns = self
            .cluster
            .list_workloads(cluster, &node.arn)
            .await
            .map_err(DrainError::lookup("list workloads"))?;

        let mut report = AuditReport {
            managed: 0,
            stopped: 0,
        };

        if arns.is_empty() {
            info!(node = %node.native_id, running_task_count = 0, "No workloads on node");
            return Ok(report);
        }

        let mut workloads = Vec::with_capacity(arns.len());
        for batch in arns.chunks(MAX_DESCRIBE_BATCH) {
            let described = self
                .cluster
                .describe_workloads(cluster, batch)
                .await
                .map_err(DrainError::lookup("describe workloads"))?;
            workloads.extend(described);
        }

        let unresolved = arns
            .iter()
            .filter(|arn| !workloads.iter().any(|workload| &workload.arn == *arn))
            .count();
        if unresolved > 0 {
            warn!(
                node = %node.native_id,
                unresolved,
                "Listed workloads missing from describe results, counting them as managed"
            );
            report.managed += unresolved;
        }

        for workload in &workloads {
            match self.classifier.classify(workload) {
                WorkloadClass::Managed => {
                    debug!(workload = %workload.arn, group = %workload.group, "Leaving managed workload");
                    report.managed += 1;
                }
                WorkloadClass::Standalone => {
                    info!(workload = %workload.arn, group = %workload.group, "Stopping standalone workload");
                    self.cluster
                        .stop_workload(cluster, &workload.arn, &self.stop_reason)
                        .await
                        .map_err(|source| DrainError::WorkloadStopFailed {
                            workload: workload.arn.clone(),
                            source,
                        })?;
                    report.stopped += 1;
                }
            }
        }

        info!(
            node = %node.native_id,
            running_task_count = report.managed,
            stopped_task_count = report.stopped,
            "Audited workloads on node"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{NodeStatus, WorkloadState};
    use crate::mock::{Call, MockCloud, Operation};
    use rstest::rstest;

    fn node() -> NodeHandle {
        NodeHandle {
            arn: "ci/1".to_string(),
            native_id: "i-1".to_string(),
            status: NodeStatus::Draining,
        }
    }

    fn auditor(cloud: Arc<MockCloud>) -> WorkloadAuditor {
        WorkloadAuditor::new(cloud, WorkloadClassifier::new("service:"), "drain")
    }

    #[rstest]
    #[case("service:web", WorkloadClass::Managed)]
    #[case("service:", WorkloadClass::Managed)]
    #[case("family:batch-job", WorkloadClass::Standalone)]
    #[case("", WorkloadClass::Standalone)]
    #[case("Service:web", WorkloadClass::Standalone)]
    #[case("my-service:web", WorkloadClass::Standalone)]
    fn test_classify(#[case] group: &str, #[case] expected: WorkloadClass) {
        let workload = Workload {
            arn: "task/1".to_string(),
            group: group.to_string(),
            state: WorkloadState::Running,
        };
        assert_eq!(WorkloadClassifier::new("service:").classify(&workload), expected);
    }

    #[tokio::test]
    async fn test_empty_node_has_no_managed_work() {
        let cloud = Arc::new(MockCloud::new());
        let report = auditor(cloud.clone()).audit("prod", &node()).await.unwrap();

        assert_eq!(report.outcome(), ResolutionOutcome::NoManagedWork);
        assert!(cloud.calls_of(Operation::DescribeWorkloads).is_empty());
        assert!(cloud.calls_of(Operation::StopWorkload).is_empty());
    }

    #[tokio::test]
    async fn test_standalone_stopped_managed_left() {
        let cloud = Arc::new(
            MockCloud::new()
                .with_workload("ci/1", "task/web", "service:web")
                .with_workload("ci/1", "task/cron", "family:cron")
                .with_workload("ci/1", "task/adhoc", ""),
        );
        let report = auditor(cloud.clone()).audit("prod", &node()).await.unwrap();

        assert_eq!(report, AuditReport { managed: 1, stopped: 2 });
        assert_eq!(report.outcome(), ResolutionOutcome::ManagedWorkRemains);

        let stopped: Vec<String> = cloud
            .calls_of(Operation::StopWorkload)
            .into_iter()
            .map(|call| match call {
                Call::StopWorkload {
                    workload_arn,
                    reason,
                    ..
                } => {
                    assert_eq!(reason, "drain");
                    workload_arn
                }
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(stopped, vec!["task/cron", "task/adhoc"]);
        assert_eq!(cloud.workload_state("task/web"), Some(WorkloadState::Running));
    }

    #[tokio::test]
    async fn test_only_standalone_work_means_no_managed_work() {
        let cloud = Arc::new(MockCloud::new().with_workload("ci/1", "task/cron", "family:cron"));
        let report = auditor(cloud.clone()).audit("prod", &node()).await.unwrap();

        assert_eq!(report.outcome(), ResolutionOutcome::NoManagedWork);
        assert_eq!(cloud.calls_of(Operation::StopWorkload).len(), 1);
    }

    #[tokio::test]
    async fn test_stop_failure_aborts_pass() {
        let cloud = Arc::new(
            MockCloud::new()
                .with_workload("ci/1", "task/a", "")
                .with_workload("ci/1", "task/b", "")
                .with_workload("ci/1", "task/c", "")
                .failing_stop_of("task/b"),
        );
        let err = auditor(cloud.clone()).audit("prod", &node()).await.unwrap_err();

        assert!(matches!(err, DrainError::WorkloadStopFailed { ref workload, .. } if workload == "task/b"));
        assert_eq!(cloud.calls_of(Operation::StopWorkload).len(), 2);
    }

    #[tokio::test]
    async fn test_describe_failure_is_lookup_error() {
        let cloud = Arc::new(
            MockCloud::new()
                .with_workload("ci/1", "task/a", "")
                .failing_on(Operation::DescribeWorkloads),
        );
        let err = auditor(cloud.clone()).audit("prod", &node()).await.unwrap_err();

        assert!(matches!(err, DrainError::LookupFailed { .. }));
        assert!(cloud.calls_of(Operation::StopWorkload).is_empty());
    }

    #[tokio::test]
    async fn test_undescribed_workload_counts_as_managed() {
        let cloud = Arc::new(
            MockCloud::new()
                .with_workload("ci/1", "task/gone", "family:batch")
                .undescribable("task/gone"),
        );

        let report = auditor(cloud.clone()).audit("prod", &node()).await.unwrap();

        assert_eq!(report.managed, 1);
        assert_eq!(report.outcome(), ResolutionOutcome::ManagedWorkRemains);
        assert!(cloud.calls_of(Operation::StopWorkload).is_empty());
    }
}
