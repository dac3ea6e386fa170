//! Candidate job listings handed to the delivery loop.

use serde::{Deserialize, Serialize};

/// One job opportunity as returned by the external matching component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListing {
    /// Platform-side identifier for the listing.
    pub id: String,
    /// Direct URL the agent navigates to for submission.
    pub url: String,
    /// Position title as displayed on the platform.
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
    /// Advertised salary, normalized to a monthly figure when known.
    #[serde(default)]
    pub salary: Option<u32>,
}

impl JobListing {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        company: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            company: company.into(),
            location: None,
            salary: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_salary(mut self, salary: u32) -> Self {
        self.salary = Some(salary);
        self
    }
}
