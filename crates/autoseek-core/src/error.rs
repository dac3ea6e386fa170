//! Error types for the orchestration core.

use autoseek_models::CancelScope;
use autoseek_storage::SessionStoreError;
use thiserror::Error;

/// Setup and validation errors rejected synchronously at command issuance.
///
/// Operational failures inside a running state machine never surface here;
/// they become status events with a `failed`/`timeout`/`cancelled` tag.
#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("a {scope} run is already active for this tenant")]
    AlreadyRunning { scope: CancelScope },

    #[error("no usable session is stored for this tenant; run login first")]
    NoSession,

    #[error("session artifact is missing required cookies: {}", missing.join(", "))]
    IncompleteSession { missing: Vec<String> },

    #[error("invalid cookie payload: {0}")]
    InvalidCookiePayload(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<SessionStoreError> for AutomationError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::IncompleteSession { missing } => {
                Self::IncompleteSession { missing }
            }
            SessionStoreError::Storage(inner) => Self::Storage(inner),
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, AutomationError>;
