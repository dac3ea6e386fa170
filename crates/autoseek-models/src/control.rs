//! Control-channel message schema.
//!
//! Commands flow from the issuer to the orchestrator; status events flow
//! back. Both are tagged unions so transports can route without inspecting
//! payloads. Status events are snapshots: a consumer only ever needs the
//! latest one, and a dropped event is superseded by the next, never queued.

use serde::{Deserialize, Serialize};

use crate::delivery::{DeliveryConfig, DeliveryStatus};
use crate::login::LoginStatus;

/// Which running machine a cancel targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelScope {
    Login,
    Delivery,
}

impl std::fmt::Display for CancelScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Login => write!(f, "login"),
            Self::Delivery => write!(f, "delivery"),
        }
    }
}

/// A command issued over the control channel for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Start the interactive login ceremony.
    Login,
    /// Start a delivery run with the given configuration.
    Deliver { config: DeliveryConfig },
    /// Cancel the login ceremony or the delivery run.
    Cancel { scope: CancelScope },
}

/// A status snapshot published back to consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEvent {
    LoginStatus {
        status: LoginStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qr_image: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    DeliveryProgress {
        processed: u32,
        succeeded: u32,
        failed: u32,
        status: DeliveryStatus,
    },
    Error {
        message: String,
    },
}

impl StatusEvent {
    pub fn login(status: LoginStatus) -> Self {
        Self::LoginStatus {
            status,
            qr_image: None,
            message: None,
        }
    }

    pub fn login_with_qr(status: LoginStatus, qr_image: impl Into<String>) -> Self {
        Self::LoginStatus {
            status,
            qr_image: Some(qr_image.into()),
            message: None,
        }
    }

    pub fn login_with_message(status: LoginStatus, message: impl Into<String>) -> Self {
        Self::LoginStatus {
            status,
            qr_image: None,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let json = serde_json::to_string(&Command::Cancel {
            scope: CancelScope::Delivery,
        })
        .unwrap();
        assert_eq!(json, r#"{"action":"cancel","scope":"delivery"}"#);

        let parsed: Command = serde_json::from_str(r#"{"action":"login"}"#).unwrap();
        assert!(matches!(parsed, Command::Login));
    }

    #[test]
    fn test_deliver_command_carries_config() {
        let parsed: Command =
            serde_json::from_str(r#"{"action":"deliver","config":{"max_per_run":5}}"#).unwrap();
        match parsed {
            Command::Deliver { config } => assert_eq!(config.max_per_run, 5),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_status_event_skips_empty_fields() {
        let json = serde_json::to_string(&StatusEvent::login(LoginStatus::AwaitingScan)).unwrap();
        assert_eq!(json, r#"{"kind":"login_status","status":"awaiting_scan"}"#);
    }

    #[test]
    fn test_progress_event_wire_format() {
        let event = StatusEvent::DeliveryProgress {
            processed: 3,
            succeeded: 2,
            failed: 1,
            status: DeliveryStatus::Running,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"delivery_progress","processed":3,"succeeded":2,"failed":1,"status":"running"}"#
        );
    }
}
