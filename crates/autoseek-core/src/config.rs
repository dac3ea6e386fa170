//! Runtime configuration for the automation core.

use std::time::Duration;

use autoseek_browser::PlatformSpec;

/// Tunables for both state machines.
///
/// Every suspension point carries its own timeout; a timeout terminates only
/// its own scope except the login ceremony bound, which ends the ceremony.
/// Detector heuristics (URL pattern, marker selectors) live in
/// [`PlatformSpec`] because they track the target platform's UI, not this
/// core's contract. The required cookie-key set lives with the session
/// store, the single component that enforces it.
#[derive(Debug, Clone)]
pub struct AutomationConfig {
    /// Hard wall-clock bound on the whole login ceremony.
    pub login_timeout: Duration,
    /// Cadence of the login detector poll.
    pub detector_interval: Duration,
    /// Cadence of QR snapshot refreshes while awaiting the scan.
    pub qr_refresh_interval: Duration,
    /// Timeout for a single page navigation.
    pub navigation_timeout: Duration,
    /// Timeout for probe/extraction round-trips.
    pub probe_timeout: Duration,
    /// Timeout for one submission attempt.
    pub submission_timeout: Duration,
    /// Default overall delivery run deadline (overridable per run).
    pub run_deadline: Duration,
    /// How long a terminal login record stays queryable.
    pub terminal_grace: Duration,
    /// How often a paused delivery loop rechecks its time-of-day window.
    pub window_recheck: Duration,
    /// Consecutive failed detector polls tolerated before the ceremony fails.
    pub max_probe_failures: u32,
    /// Domain assumed for manually entered cookies given as a header string.
    pub cookie_domain: String,
    /// User-agent recorded for manually entered jars, where no live browser
    /// context exists to extract one from.
    pub fallback_user_agent: String,
    /// Target platform URLs and selectors.
    pub platform: PlatformSpec,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            login_timeout: Duration::from_secs(300),
            detector_interval: Duration::from_millis(1500),
            qr_refresh_interval: Duration::from_secs(3),
            navigation_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            submission_timeout: Duration::from_secs(45),
            run_deadline: Duration::from_secs(3600),
            terminal_grace: Duration::from_secs(60),
            window_recheck: Duration::from_secs(60),
            max_probe_failures: 3,
            cookie_domain: ".zhaopin.example".to_string(),
            fallback_user_agent: concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36"
            )
            .to_string(),
            platform: PlatformSpec::default(),
        }
    }
}
