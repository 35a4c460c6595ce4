//! Trigger envelope decoding.
//!
//! A lifecycle trigger arrives wrapped three times:
//!
//! ```text
//! { "Records": [ { "Sns": { "TopicArn": "...", "Message": "<json>" } } ] }
//!                                                  |
//!   { "EC2InstanceId": "...", "LifecycleTransition": "...",
//!     "LifecycleHookName": "...", "AutoScalingGroupName": "...",
//!     "NotificationMetadata": "<json>" }            |
//!                                                   |
//!                                 { "ClusterName": "..." }
//! ```
//!
//! Each layer is decoded into its own schema and every required field is
//! checked by name, so a bad payload reports exactly which field of which
//! layer is missing or of the wrong type.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::EventError;
use crate::types::{LifecycleEvent, LifecycleTransition};

/// The nesting level a decoding error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// Outer notification envelope (`Records[0].Sns`).
    Envelope,
    /// Lifecycle hook message carried in `Sns.Message`.
    Message,
    /// Notification metadata carried in `NotificationMetadata`.
    Metadata,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::Envelope => write!(f, "notification envelope"),
            Layer::Message => write!(f, "lifecycle message"),
            Layer::Metadata => write!(f, "notification metadata"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NotificationEnvelope {
    #[serde(rename = "Records")]
    records: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct NotificationRecord {
    #[serde(rename = "Sns")]
    sns: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SnsNotification {
    #[serde(rename = "TopicArn")]
    topic_arn: Option<Value>,
    #[serde(rename = "Message")]
    message: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LifecycleHookMessage {
    #[serde(rename = "EC2InstanceId")]
    ec2_instance_id: Option<Value>,
    #[serde(rename = "LifecycleTransition")]
    lifecycle_transition: Option<Value>,
    #[serde(rename = "LifecycleHookName")]
    lifecycle_hook_name: Option<Value>,
    #[serde(rename = "AutoScalingGroupName")]
    auto_scaling_group_name: Option<Value>,
    #[serde(rename = "NotificationMetadata")]
    notification_metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct NotificationMetadata {
    #[serde(rename = "ClusterName", alias = "clusterName")]
    cluster_name: Option<Value>,
}

/// Decode one field into its expected type. Absent and `null` are `None`.
fn field<T: DeserializeOwned>(
    value: Option<Value>,
    layer: Layer,
    field: &'static str,
) -> Result<Option<T>, EventError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|_| EventError::InvalidField { layer, field }),
    }
}

fn present<T>(value: Option<T>, layer: Layer, field: &'static str) -> Result<T, EventError> {
    value.ok_or(EventError::MissingField { layer, field })
}

/// A non-blank string field.
fn required(value: Option<Value>, layer: Layer, name: &'static str) -> Result<String, EventError> {
    match field::<String>(value, layer, name)? {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(EventError::MissingField { layer, field: name }),
    }
}

/// A string field read without validation; anything but a string is empty.
fn lenient(value: Option<Value>) -> String {
    match value {
        Some(Value::String(value)) => value,
        _ => String::new(),
    }
}

/// Decode a full notification envelope.
///
/// Only the first record is consumed; any further records are dropped with a
/// warning.
pub fn decode_notification(payload: &[u8]) -> Result<LifecycleEvent, EventError> {
    let envelope: NotificationEnvelope = serde_json::from_slice(payload)
        .map_err(|e| EventError::invalid_json(Layer::Envelope, e))?;

    let mut records: Vec<NotificationRecord> = present(
        field(envelope.records, Layer::Envelope, "Records")?,
        Layer::Envelope,
        "Records",
    )?;
    if records.is_empty() {
        return Err(EventError::NoRecords);
    }
    if records.len() > 1 {
        warn!(
            record_count = records.len(),
            "Envelope carries more than one record, only the first is processed"
        );
    }

    let record = records.swap_remove(0);
    let sns: SnsNotification = present(
        field(record.sns, Layer::Envelope, "Sns")?,
        Layer::Envelope,
        "Sns",
    )?;
    let topic_arn = required(sns.topic_arn, Layer::Envelope, "TopicArn")?;
    let message = required(sns.message, Layer::Envelope, "Message")?;

    decode_message(message, topic_arn)
}

/// Decode a bare lifecycle hook message that arrived on `channel`.
///
/// The message text is kept verbatim as the event's raw payload. The
/// transition is read first; for anything but a terminate transition the
/// remaining fields are taken as found and the metadata is not decoded.
pub fn decode_message(
    message: impl Into<String>,
    channel: impl Into<String>,
) -> Result<LifecycleEvent, EventError> {
    let message = message.into();
    let hook: LifecycleHookMessage = serde_json::from_str(&message)
        .map_err(|e| EventError::invalid_json(Layer::Message, e))?;

    let transition = present(
        field::<String>(hook.lifecycle_transition, Layer::Message, "LifecycleTransition")?,
        Layer::Message,
        "LifecycleTransition",
    )
    .map(LifecycleTransition::from)?;

    if !transition.is_terminating() {
        return Ok(LifecycleEvent {
            node_id: lenient(hook.ec2_instance_id),
            transition,
            group_name: lenient(hook.auto_scaling_group_name),
            hook_name: lenient(hook.lifecycle_hook_name),
            cluster: String::new(),
            resubmission_channel: channel.into(),
            raw_message: Bytes::from(message),
        });
    }

    let node_id = required(hook.ec2_instance_id, Layer::Message, "EC2InstanceId")?;
    let hook_name = required(hook.lifecycle_hook_name, Layer::Message, "LifecycleHookName")?;
    let group_name = required(
        hook.auto_scaling_group_name,
        Layer::Message,
        "AutoScalingGroupName",
    )?;
    let metadata_raw = required(
        hook.notification_metadata,
        Layer::Message,
        "NotificationMetadata",
    )?;

    let metadata: NotificationMetadata = serde_json::from_str(&metadata_raw)
        .map_err(|e| EventError::invalid_json(Layer::Metadata, e))?;
    let cluster = required(metadata.cluster_name, Layer::Metadata, "ClusterName")?;

    Ok(LifecycleEvent {
        node_id,
        transition,
        group_name,
        hook_name,
        cluster,
        resubmission_channel: channel.into(),
        raw_message: Bytes::from(message),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TERMINATING_TRANSITION;

    const TOPIC: &str = "arn:aws:sns:us-east-1:123456789012:drain-hook";

    fn hook_message(transition: &str) -> String {
        serde_json::json!({
            "AutoScalingGroupName": "ecs-workers",
            "Service": "AWS Auto Scaling",
            "Time": "2025-12-17T12:00:00.000Z",
            "AccountId": "123456789012",
            "LifecycleTransition": transition,
            "RequestId": "f0a1b2c3-0000-4000-8000-000000000000",
            "LifecycleActionToken": "c0ffee00-0000-4000-8000-000000000000",
            "EC2InstanceId": "i-0abc123def4567890",
            "LifecycleHookName": "drain-hook",
            "NotificationMetadata": "{\"ClusterName\":\"prod-cluster\"}"
        })
        .to_string()
    }

    fn envelope(messages: &[String]) -> Vec<u8> {
        let records: Vec<_> = messages
            .iter()
            .map(|message| {
                serde_json::json!({
                    "EventSource": "aws:sns",
                    "Sns": { "TopicArn": TOPIC, "Subject": null, "Message": message }
                })
            })
            .collect();
        serde_json::to_vec(&serde_json::json!({ "Records": records })).unwrap()
    }

    #[test]
    fn test_decode_terminating_notification() {
        let message = hook_message(TERMINATING_TRANSITION);
        let event = decode_notification(&envelope(&[message.clone()])).unwrap();

        assert_eq!(event.node_id, "i-0abc123def4567890");
        assert_eq!(event.transition, LifecycleTransition::InstanceTerminating);
        assert_eq!(event.group_name, "ecs-workers");
        assert_eq!(event.hook_name, "drain-hook");
        assert_eq!(event.cluster, "prod-cluster");
        assert_eq!(event.resubmission_channel, TOPIC);
        assert_eq!(event.raw_message.as_ref(), message.as_bytes());
    }

    #[test]
    fn test_only_first_record_is_used() {
        let first = hook_message(TERMINATING_TRANSITION);
        let second = hook_message("autoscaling:EC2_INSTANCE_LAUNCHING");
        let event = decode_notification(&envelope(&[first.clone(), second])).unwrap();
        assert_eq!(event.raw_message.as_ref(), first.as_bytes());
    }

    #[test]
    fn test_empty_records() {
        let err = decode_notification(br#"{"Records": []}"#).unwrap_err();
        assert_eq!(err, EventError::NoRecords);
    }

    #[test]
    fn test_missing_records() {
        let err = decode_notification(br#"{"Other": 1}"#).unwrap_err();
        assert_eq!(err.missing_field(), Some("Records"));
    }

    #[test]
    fn test_outer_layer_not_json() {
        let err = decode_notification(b"not json").unwrap_err();
        assert!(matches!(
            err,
            EventError::InvalidJson {
                layer: Layer::Envelope,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_message_field_is_named() {
        let message = serde_json::json!({
            "LifecycleTransition": TERMINATING_TRANSITION,
            "LifecycleHookName": "drain-hook",
            "AutoScalingGroupName": "ecs-workers",
            "NotificationMetadata": "{\"ClusterName\":\"prod-cluster\"}"
        })
        .to_string();

        let err = decode_message(message, TOPIC).unwrap_err();
        assert_eq!(
            err,
            EventError::MissingField {
                layer: Layer::Message,
                field: "EC2InstanceId"
            }
        );
        assert_eq!(
            err.to_string(),
            "lifecycle message is missing required field `EC2InstanceId`"
        );
    }

    #[test]
    fn test_blank_identifier_counts_as_missing() {
        let message = hook_message(TERMINATING_TRANSITION).replace("drain-hook", "  ");
        let err = decode_message(message, TOPIC).unwrap_err();
        assert_eq!(err.missing_field(), Some("LifecycleHookName"));
    }

    #[test]
    fn test_mistyped_field_is_named() {
        let message = hook_message(TERMINATING_TRANSITION)
            .replace("\"i-0abc123def4567890\"", "42");
        let err = decode_message(message, TOPIC).unwrap_err();
        assert_eq!(
            err,
            EventError::InvalidField {
                layer: Layer::Message,
                field: "EC2InstanceId"
            }
        );
        assert!(err.to_string().contains("EC2InstanceId"));
    }

    #[test]
    fn test_mistyped_transition_is_named() {
        let message = serde_json::json!({ "LifecycleTransition": ["terminate"] }).to_string();
        let err = decode_message(message, TOPIC).unwrap_err();
        assert_eq!(err.field(), Some("LifecycleTransition"));
    }

    #[test]
    fn test_mistyped_cluster_name_is_named() {
        let message = hook_message(TERMINATING_TRANSITION)
            .replace("\\\"prod-cluster\\\"", "7");
        let err = decode_message(message, TOPIC).unwrap_err();
        assert_eq!(
            err,
            EventError::InvalidField {
                layer: Layer::Metadata,
                field: "ClusterName"
            }
        );
    }

    #[test]
    fn test_mistyped_envelope_fields_are_named() {
        let cases: [(&[u8], &str); 4] = [
            (br#"{"Records": {"Sns": {}}}"#, "Records"),
            (br#"{"Records": [{"Sns": "text"}]}"#, "Sns"),
            (br#"{"Records": [{"Sns": {"TopicArn": 1, "Message": "{}"}}]}"#, "TopicArn"),
            (br#"{"Records": [{"Sns": {"TopicArn": "arn:t", "Message": {}}}]}"#, "Message"),
        ];
        for (payload, name) in cases {
            let err = decode_notification(payload).unwrap_err();
            assert_eq!(
                err,
                EventError::InvalidField {
                    layer: Layer::Envelope,
                    field: name
                }
            );
        }
    }

    #[test]
    fn test_launch_without_metadata_decodes() {
        let message = serde_json::json!({
            "EC2InstanceId": "i-0abc123def4567890",
            "LifecycleTransition": "autoscaling:EC2_INSTANCE_LAUNCHING",
            "LifecycleHookName": "launch-hook",
            "AutoScalingGroupName": "ecs-workers"
        })
        .to_string();

        let event = decode_message(message, TOPIC).unwrap();
        assert_eq!(event.transition, LifecycleTransition::InstanceLaunching);
        assert!(!event.requires_drain());
        assert_eq!(event.node_id, "i-0abc123def4567890");
        assert!(event.cluster.is_empty());
    }

    #[test]
    fn test_non_terminating_skips_field_checks() {
        let message = serde_json::json!({
            "LifecycleTransition": "autoscaling:TEST_NOTIFICATION",
            "EC2InstanceId": 42
        })
        .to_string();

        let event = decode_message(message, TOPIC).unwrap();
        assert!(event.node_id.is_empty());
        assert!(event.hook_name.is_empty());
    }

    #[test]
    fn test_missing_transition_is_named() {
        let message = serde_json::json!({ "EC2InstanceId": "i-0abc123def4567890" }).to_string();
        let err = decode_message(message, TOPIC).unwrap_err();
        assert_eq!(err.missing_field(), Some("LifecycleTransition"));
    }

    #[test]
    fn test_metadata_missing_cluster_name() {
        let message = hook_message(TERMINATING_TRANSITION)
            .replace("ClusterName", "Cluster");
        let err = decode_message(message, TOPIC).unwrap_err();
        assert_eq!(
            err,
            EventError::MissingField {
                layer: Layer::Metadata,
                field: "ClusterName"
            }
        );
    }

    #[test]
    fn test_metadata_not_json() {
        let message = serde_json::json!({
            "EC2InstanceId": "i-0abc123def4567890",
            "LifecycleTransition": TERMINATING_TRANSITION,
            "LifecycleHookName": "drain-hook",
            "AutoScalingGroupName": "ecs-workers",
            "NotificationMetadata": "cluster=prod"
        })
        .to_string();
        let err = decode_message(message, TOPIC).unwrap_err();
        assert!(matches!(
            err,
            EventError::InvalidJson {
                layer: Layer::Metadata,
                ..
            }
        ));
    }

    #[test]
    fn test_metadata_camel_case_cluster_name() {
        let message = hook_message(TERMINATING_TRANSITION).replace("ClusterName", "clusterName");
        let event = decode_message(message, TOPIC).unwrap();
        assert_eq!(event.cluster, "prod-cluster");
    }

    #[test]
    fn test_empty_transition_is_not_terminating() {
        let event = decode_message(hook_message(""), TOPIC).unwrap();
        assert_eq!(event.transition, LifecycleTransition::Other(String::new()));
        assert!(!event.requires_drain());
    }
}
