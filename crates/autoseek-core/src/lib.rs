//! AutoSeek orchestration core.
//!
//! Coordinates the interactive login ceremony and the rate-limited
//! delivery loop against a third-party career platform that only exposes
//! its own web UI. The browser agent, persistence and data model live in
//! their own crates; this one owns the state machines, the per-tenant
//! scheduling, and the control-channel surface.

pub mod channel;
pub mod config;
pub mod cookies;
pub mod delivery;
pub mod detector;
pub mod error;
pub mod login;
pub mod service;
pub mod status;

pub use channel::{ControlChannel, PollControlChannel, PushControlChannel};
pub use config::AutomationConfig;
pub use delivery::ListingSource;
pub use error::{AutomationError, Result};
pub use service::AutomationService;
pub use status::StatusHub;
