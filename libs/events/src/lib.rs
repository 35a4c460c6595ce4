//! # nodeevac-events
//!
//! Lifecycle hook trigger schema and decoding.
//!
//! ## Design Principles
//!
//! - Decoding is pure: no I/O, no clock, no global state
//! - Every envelope layer has its own typed schema
//! - A missing field is reported by layer and name
//! - The inner message is kept byte-for-byte so it can be republished
//!
//! ## Layers
//!
//! - Notification envelope (`Records[0].Sns`)
//! - Lifecycle hook message (`Sns.Message`)
//! - Notification metadata (`NotificationMetadata`)

mod envelope;
mod error;
mod types;

pub use envelope::{decode_message, decode_notification, Layer};
pub use error::EventError;
pub use types::*;
