//! Resolution of an audit pass.
//!
//! The decision and its delivery are separate steps. [`ResolutionDispatcher::decide`]
//! turns an outcome into a [`Resolution`] value; [`ResolutionDispatcher::deliver`]
//! performs the single external call it names.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use nodeevac_events::LifecycleEvent;
use tracing::info;

use crate::audit::ResolutionOutcome;
use crate::error::DrainError;
use crate::gateway::{FleetManager, LifecycleAction, LifecycleActionResult, ResubmissionChannel};

/// A request to run the whole pipeline again later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    /// Where to publish.
    pub channel: String,

    pub subject: String,

    /// The original trigger message, unmodified.
    pub payload: Bytes,
}

/// What to do once an audit pass is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Managed work remains: resubmit the trigger.
    Continue(Continuation),
    /// The node is empty: release the lifecycle hook.
    Complete(LifecycleAction),
}

/// Decides and delivers the resolution of an audit pass.
pub struct ResolutionDispatcher {
    fleet: Arc<dyn FleetManager>,
    channel: Arc<dyn ResubmissionChannel>,
    subject: String,
    settle_delay: Duration,
}

impl ResolutionDispatcher {
    pub fn new(
        fleet: Arc<dyn FleetManager>,
        channel: Arc<dyn ResubmissionChannel>,
        subject: impl Into<String>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            fleet,
            channel,
            subject: subject.into(),
            settle_delay,
        }
    }

    pub fn decide(&self, event: &LifecycleEvent, outcome: ResolutionOutcome) -> Resolution {
        match outcome {
            ResolutionOutcome::ManagedWorkRemains => Resolution::Continue(Continuation {
                channel: event.resubmission_channel.clone(),
                subject: self.subject.clone(),
                payload: event.raw_message.clone(),
            }),
            ResolutionOutcome::NoManagedWork => Resolution::Complete(LifecycleAction {
                group_name: event.group_name.clone(),
                hook_name: event.hook_name.clone(),
                instance_id: event.node_id.clone(),
                result: LifecycleActionResult::Continue,
            }),
        }
    }

    pub async fn deliver(&self, resolution: &Resolution) -> Result<(), DrainError> {
        match resolution {
            Resolution::Continue(continuation) => {
                if !self.settle_delay.is_zero() {
                    tokio::time::sleep(self.settle_delay).await;
                }
                self.channel
                    .publish(
                        &continuation.channel,
                        &continuation.subject,
                        &continuation.payload,
                    )
                    .await
                    .map_err(|source| DrainError::ResubmissionFailed {
                        channel: continuation.channel.clone(),
                        source,
                    })?;
                info!(channel = %continuation.channel, "Managed work remains, trigger resubmitted");
            }
            Resolution::Complete(action) => {
                self.fleet
                    .complete_lifecycle_action(action)
                    .await
                    .map_err(|source| DrainError::CompletionFailed {
                        hook: action.hook_name.clone(),
                        source,
                    })?;
                info!(
                    group = %action.group_name,
                    hook = %action.hook_name,
                    instance_id = %action.instance_id,
                    "Node is empty, lifecycle action completed"
                );
            }
        }
        Ok(())
    }

    /// Decide and deliver in one step.
    pub async fn dispatch(
        &self,
        event: &LifecycleEvent,
        outcome: ResolutionOutcome,
    ) -> Result<Resolution, DrainError> {
        let resolution = self.decide(event, outcome);
        self.deliver(&resolution).await?;
        Ok(resolution)
    }
}
