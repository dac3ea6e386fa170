//! Login detector - turns noisy page observations into tagged signals.
//!
//! The external UI is not contractually stable, so success is judged from
//! several signals rather than a single condition: DOM markers win over the
//! URL, and leaving the login path without an error marker also counts as
//! authenticated. The state machine consumes only the resulting tag.

use autoseek_browser::LoginProbe;
use autoseek_models::LoginSignal;

/// Classify one page probe into a login signal.
///
/// Precedence: an error marker always wins (platforms keep the URL on the
/// login path while showing a rejection), then the authenticated marker,
/// then URL movement away from the login path.
pub fn classify(probe: &LoginProbe, login_url_pattern: &str) -> LoginSignal {
    if probe.error_marker_present {
        LoginSignal::ErrorMarkerPresent
    } else if probe.authenticated_marker_present {
        LoginSignal::AuthenticatedMarkerPresent
    } else if !probe.current_url.contains(login_url_pattern) {
        LoginSignal::AuthenticatedMarkerPresent
    } else {
        LoginSignal::StillOnLoginPage
    }
}
