//! Login ceremony records and detector signals.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Operator-visible status of one login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    Pending,
    AwaitingScan,
    Success,
    Failed,
    Timeout,
}

impl LoginStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Timeout)
    }
}

/// One unit of noisy observation about the external login UI, produced by
/// the detector from an agent-reported page probe. The login state machine
/// transitions on these tags only, never on raw page content, so the
/// platform-specific heuristics can be tuned without touching the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginSignal {
    StillOnLoginPage,
    ErrorMarkerPresent,
    AuthenticatedMarkerPresent,
    NavigationFailed,
}

/// Ephemeral record of one login attempt for a tenant.
///
/// At most one non-terminal record exists per tenant. Terminal records stay
/// queryable for a grace window so the operator can observe the final state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSession {
    pub tenant_id: String,
    pub started_at_ms: i64,
    pub status: LoginStatus,
    /// Latest login QR snapshot as base64 PNG, when one has been captured.
    #[serde(default)]
    pub qr_image_b64: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub finished_at_ms: Option<i64>,
}

impl LoginSession {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            started_at_ms: Utc::now().timestamp_millis(),
            status: LoginStatus::Pending,
            qr_image_b64: None,
            last_error: None,
            finished_at_ms: None,
        }
    }

    /// Move to a terminal status, stamping the finish time.
    pub fn finish(&mut self, status: LoginStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.last_error = error;
        self.finished_at_ms = Some(Utc::now().timestamp_millis());
    }
}
