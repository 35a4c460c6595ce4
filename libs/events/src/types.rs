//! Decoded lifecycle event types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Wire value of the terminate transition.
pub const TERMINATING_TRANSITION: &str = "autoscaling:EC2_INSTANCE_TERMINATING";

/// Wire value of the launch transition.
pub const LAUNCHING_TRANSITION: &str = "autoscaling:EC2_INSTANCE_LAUNCHING";

/// The lifecycle transition a hook notification reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleTransition {
    /// The instance is being removed from its group.
    InstanceTerminating,
    /// The instance is being added to its group.
    InstanceLaunching,
    /// Anything else, including an empty transition.
    Other(String),
}

impl LifecycleTransition {
    /// Returns true for the transition that requires a drain.
    pub fn is_terminating(&self) -> bool {
        matches!(self, Self::InstanceTerminating)
    }

    /// The wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::InstanceTerminating => TERMINATING_TRANSITION,
            Self::InstanceLaunching => LAUNCHING_TRANSITION,
            Self::Other(raw) => raw,
        }
    }
}

impl From<&str> for LifecycleTransition {
    fn from(raw: &str) -> Self {
        match raw {
            TERMINATING_TRANSITION => Self::InstanceTerminating,
            LAUNCHING_TRANSITION => Self::InstanceLaunching,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for LifecycleTransition {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            TERMINATING_TRANSITION => Self::InstanceTerminating,
            LAUNCHING_TRANSITION => Self::InstanceLaunching,
            _ => Self::Other(raw),
        }
    }
}

impl From<LifecycleTransition> for String {
    fn from(transition: LifecycleTransition) -> Self {
        match transition {
            LifecycleTransition::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for LifecycleTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(raw) if raw.is_empty() => write!(f, "<empty>"),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

/// One decoded lifecycle hook trigger.
///
/// Built by [`crate::decode_notification`]. Every field of a terminate event
/// has been validated; for other transitions only `transition` has, and the
/// remaining fields are empty when they were absent. `raw_message` holds the inner notification message exactly as it was
/// delivered and is what gets republished to `resubmission_channel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Native identifier of the node (EC2 instance id).
    pub node_id: String,

    /// The transition being reported.
    pub transition: LifecycleTransition,

    /// Scaling group that owns the node.
    pub group_name: String,

    /// Lifecycle hook holding the termination.
    pub hook_name: String,

    /// Cluster the node is registered to, from the notification metadata.
    pub cluster: String,

    /// Topic the trigger arrived on.
    pub resubmission_channel: String,

    /// The inner notification message, byte-for-byte.
    pub raw_message: Bytes,
}

impl LifecycleEvent {
    /// Returns true if this event asks for the node to be drained.
    pub fn requires_drain(&self) -> bool {
        self.transition.is_terminating()
    }
}
