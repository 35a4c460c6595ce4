//! One drain invocation, end to end.
//!
//! The pipeline:
//! - Decodes the trigger and ignores anything but a terminate transition
//! - Resolves the node and moves it to DRAINING if needed
//! - Stops standalone workloads and counts managed ones
//! - Resubmits the trigger or releases the lifecycle hook
//!
//! Nothing is kept between invocations. Every run re-reads the node and its
//! workloads from the cluster manager, so overlapping runs for the same node
//! are safe.

use std::sync::Arc;
use std::time::Duration;

use nodeevac_events::{decode_notification, LifecycleEvent, LifecycleTransition};
use tracing::info;

use crate::audit::{WorkloadAuditor, WorkloadClassifier};
use crate::client::{AutoScalingClient, EcsClient, SnsClient};
use crate::config::{
    Config, DEFAULT_MANAGED_GROUP_PREFIX, DEFAULT_RESUBMIT_SUBJECT, DEFAULT_STOP_REASON,
};
use crate::dispatch::{Resolution, ResolutionDispatcher};
use crate::drain::{DrainController, DrainTransition};
use crate::error::DrainError;
use crate::gateway::{ClusterManager, FleetManager, GatewayError, ResubmissionChannel};
use crate::locator::NodeLocator;

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Owning-group prefix of service-owned workloads.
    pub managed_group_prefix: String,

    /// Reason attached to forced stops.
    pub stop_reason: String,

    /// Subject of resubmitted triggers.
    pub resubmit_subject: String,

    /// Pause before resubmitting.
    pub resubmit_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            managed_group_prefix: DEFAULT_MANAGED_GROUP_PREFIX.to_string(),
            stop_reason: DEFAULT_STOP_REASON.to_string(),
            resubmit_subject: DEFAULT_RESUBMIT_SUBJECT.to_string(),
            resubmit_delay: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            managed_group_prefix: config.managed_group_prefix.clone(),
            stop_reason: config.stop_reason.clone(),
            resubmit_subject: config.resubmit_subject.clone(),
            resubmit_delay: config.resubmit_delay(),
        }
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// The trigger was not a terminate transition; nothing was called.
    Ignored { transition: LifecycleTransition },
    /// Managed work remains; the trigger was resubmitted.
    Resubmitted,
    /// The node is empty; the lifecycle hook was released.
    Completed,
}

/// The drain pipeline.
pub struct DrainPipeline {
    locator: NodeLocator,
    drain: DrainController,
    auditor: WorkloadAuditor,
    dispatcher: ResolutionDispatcher,
}

impl DrainPipeline {
    /// Create a pipeline over the given collaborators.
    pub fn new(
        cluster: Arc<dyn ClusterManager>,
        fleet: Arc<dyn FleetManager>,
        channel: Arc<dyn ResubmissionChannel>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            locator: NodeLocator::new(Arc::clone(&cluster)),
            drain: DrainController::new(Arc::clone(&cluster)),
            auditor: WorkloadAuditor::new(
                cluster,
                WorkloadClassifier::new(config.managed_group_prefix),
                config.stop_reason,
            ),
            dispatcher: ResolutionDispatcher::new(
                fleet,
                channel,
                config.resubmit_subject,
                config.resubmit_delay,
            ),
        }
    }

    /// Create a pipeline backed by the HTTP clients.
    pub fn connect(config: &Config) -> Result<Self, GatewayError> {
        Ok(Self::new(
            Arc::new(EcsClient::new(config)?),
            Arc::new(AutoScalingClient::new(config)?),
            Arc::new(SnsClient::new(config)?),
            PipelineConfig::from(config),
        ))
    }

    /// Decode a raw trigger and handle it.
    pub async fn run(&self, payload: &[u8]) -> Result<Invocation, DrainError> {
        let event = decode_notification(payload)?;
        self.handle(&event).await
    }

    /// Handle a decoded trigger.
    pub async fn handle(&self, event: &LifecycleEvent) -> Result<Invocation, DrainError> {
        if !event.requires_drain() {
            info!(transition = %event.transition, "Ignoring lifecycle transition");
            return Ok(Invocation::Ignored {
                transition: event.transition.clone(),
            });
        }

        info!(
            node_id = %event.node_id,
            cluster = %event.cluster,
            "Checking node status"
        );
        let node = self.locator.locate(&event.cluster, &event.node_id).await?;
        info!(node_id = %event.node_id, status = %node.status, "Node status checked");

        if self.drain.ensure_draining(&event.cluster, &node).await? == DrainTransition::Started {
            info!(node_id = %event.node_id, "Draining started");
        }

        info!(node_id = %event.node_id, "Checking running workloads");
        let report = self.auditor.audit(&event.cluster, &node).await?;

        match self.dispatcher.dispatch(event, report.outcome()).await? {
            Resolution::Continue(_) => Ok(Invocation::Resubmitted),
            Resolution::Complete(_) => Ok(Invocation::Completed),
        }
    }
}
