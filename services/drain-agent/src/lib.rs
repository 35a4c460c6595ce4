//! nodeevac Drain Agent Library
//!
//! Drains a cluster node that a scaling group is about to terminate, then
//! releases the lifecycle hook holding the termination.
//!
//! ## Pipeline
//!
//! ```text
//! trigger ─► decode ─► locate node ─► ensure DRAINING ─► audit workloads
//!                                                            │
//!                          managed work remains ◄────────────┤
//!                          (resubmit trigger)                │
//!                                                            ▼
//!                                              no managed work (complete hook)
//! ```
//!
//! A run never waits for workloads to move. When managed work remains it
//! republishes the original trigger and exits; the next delivery runs the
//! whole pipeline again.
//!
//! ## Modules
//!
//! - `gateway`: collaborator traits and data types
//! - `client`: HTTP implementations of the collaborators
//! - `mock`: recording in-memory collaborators
//! - `locator`, `drain`, `audit`, `dispatch`: pipeline stages
//! - `pipeline`: one invocation, end to end

pub mod audit;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod drain;
pub mod error;
pub mod gateway;
pub mod locator;
pub mod mock;
pub mod pipeline;

// Re-export commonly used types
pub use audit::ResolutionOutcome;
pub use error::DrainError;
pub use gateway::{ClusterManager, FleetManager, GatewayError, ResubmissionChannel};
pub use pipeline::{DrainPipeline, Invocation, PipelineConfig};
