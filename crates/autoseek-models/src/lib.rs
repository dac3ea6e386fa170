//! Shared data model for the AutoSeek automation subsystem.
//!
//! This crate holds the serde types exchanged between the orchestration
//! core, the browser agent, the storage layer and operator-facing
//! consumers. It contains no I/O.

pub mod control;
pub mod delivery;
pub mod listing;
pub mod login;
pub mod session;

pub use control::{CancelScope, Command, StatusEvent};
pub use delivery::{DeliveryConfig, DeliveryJob, DeliveryStatus, DeliveryWindow};
pub use listing::JobListing;
pub use login::{LoginSession, LoginSignal, LoginStatus};
pub use session::{Cookie, SameSite, SessionArtifact, SessionValidity};
