//! Error types for trigger decoding.

use thiserror::Error;

use crate::envelope::Layer;

/// Errors that can occur when decoding a lifecycle trigger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A layer of the envelope is not valid JSON for its schema.
    #[error("invalid {layer}: {message}")]
    InvalidJson { layer: Layer, message: String },

    /// The outer envelope carries no notification records.
    #[error("notification envelope has no records")]
    NoRecords,

    /// A required field is absent or blank.
    #[error("{layer} is missing required field `{field}`")]
    MissingField { layer: Layer, field: &'static str },

    /// A field is present but not of the expected type.
    #[error("{layer} field `{field}` has the wrong type")]
    InvalidField { layer: Layer, field: &'static str },
}

impl EventError {
    pub(crate) fn invalid_json(layer: Layer, err: serde_json::Error) -> Self {
        EventError::InvalidJson {
            layer,
            message: err.to_string(),
        }
    }

    /// Returns the name of the missing field, if this is a missing-field error.
    pub fn missing_field(&self) -> Option<&'static str> {
        match self {
            EventError::MissingField { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Returns the name of the offending field, whether missing or mistyped.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            EventError::MissingField { field, .. } | EventError::InvalidField { field, .. } => {
                Some(field)
            }
            _ => None,
        }
    }
}
