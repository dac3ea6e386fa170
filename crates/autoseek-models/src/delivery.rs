//! Delivery job records and run configuration.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of one delivery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Permitted submission window as local hours of day, inclusive start,
/// exclusive end. A window of 22..6 wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryWindow {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl DeliveryWindow {
    pub fn contains(&self, hour: u8) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Operator-supplied configuration for one delivery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Listings whose title or company contains one of these (case
    /// insensitive) are skipped.
    #[serde(default)]
    pub keyword_blacklist: Vec<String>,
    #[serde(default)]
    pub company_blacklist: Vec<String>,
    /// Exact position titles to skip, case insensitive.
    #[serde(default)]
    pub position_blacklist: Vec<String>,
    /// Minimum acceptable salary; listings below it (or without salary data
    /// when set) are skipped.
    #[serde(default)]
    pub min_salary: Option<u32>,
    /// Allowed locations; empty means any.
    #[serde(default)]
    pub locations: Vec<String>,
    /// Hard cap on submissions counted per run.
    pub max_per_run: u32,
    /// Sleep between consecutive items, in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Permitted time-of-day window; outside it the loop pauses.
    #[serde(default)]
    pub window: Option<DeliveryWindow>,
    /// Overall run deadline override, in seconds.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

fn default_interval_secs() -> u64 {
    30
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            keyword_blacklist: Vec::new(),
            company_blacklist: Vec::new(),
            position_blacklist: Vec::new(),
            min_salary: None,
            locations: Vec::new(),
            max_per_run: 50,
            interval_secs: default_interval_secs(),
            window: None,
            deadline_secs: None,
        }
    }
}

/// One execution of the delivery loop for a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub id: String,
    pub tenant_id: String,
    pub started_at_ms: i64,
    pub config: DeliveryConfig,
    pub status: DeliveryStatus,
    pub processed: u32,
    pub succeeded: u32,
    pub failed: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub finished_at_ms: Option<i64>,
}

impl DeliveryJob {
    pub fn new(tenant_id: impl Into<String>, config: DeliveryConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            started_at_ms: Utc::now().timestamp_millis(),
            config,
            status: DeliveryStatus::Running,
            processed: 0,
            succeeded: 0,
            failed: 0,
            last_error: None,
            finished_at_ms: None,
        }
    }

    /// Move to a terminal status, stamping the finish time.
    pub fn finish(&mut self, status: DeliveryStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.last_error = error;
        self.finished_at_ms = Some(Utc::now().timestamp_millis());
    }
}
