//! Login state machine.
//!
//! Drives one interactive login ceremony:
//! `Idle -> Launching -> AwaitingUserAction -> Verifying -> Succeeded |
//! Failed | TimedOut`. The machine owns its browser driver for the whole
//! ceremony and releases it on every exit path. Nothing is retried
//! automatically; the caller re-issues `login` after a failure.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use autoseek_browser::{BrowserDriver, BrowserMode, DriverFactory};
use autoseek_models::{LoginSession, LoginSignal, LoginStatus, SessionArtifact, SessionValidity, StatusEvent};
use autoseek_storage::{SessionStoreError, Storage};

use crate::config::AutomationConfig;
use crate::detector;
use crate::status::StatusHub;

pub(crate) struct LoginContext {
    pub tenant_id: String,
    pub storage: Arc<Storage>,
    pub factory: Arc<dyn DriverFactory>,
    pub hub: Arc<StatusHub>,
    pub config: Arc<AutomationConfig>,
    pub cancel: CancellationToken,
}

enum LoginOutcome {
    Succeeded,
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Run one login ceremony to completion. Never panics and never returns an
/// error: every outcome is recorded in storage and published as a status
/// event.
pub(crate) async fn run_login(ctx: LoginContext) {
    let mut record = LoginSession::new(&ctx.tenant_id);
    persist(&ctx, &record);
    ctx.hub
        .publish(&ctx.tenant_id, StatusEvent::login(LoginStatus::Pending));
    info!(tenant_id = %ctx.tenant_id, "login ceremony starting");

    let outcome = launch_and_drive(&ctx, &mut record).await;

    match outcome {
        LoginOutcome::Succeeded => {
            record.finish(LoginStatus::Success, None);
            info!(tenant_id = %ctx.tenant_id, "login ceremony succeeded");
            ctx.hub
                .publish(&ctx.tenant_id, StatusEvent::login(LoginStatus::Success));
        }
        LoginOutcome::Failed(message) => {
            warn!(tenant_id = %ctx.tenant_id, %message, "login ceremony failed");
            record.finish(LoginStatus::Failed, Some(message.clone()));
            ctx.hub.publish(
                &ctx.tenant_id,
                StatusEvent::login_with_message(LoginStatus::Failed, message),
            );
        }
        LoginOutcome::TimedOut => {
            warn!(tenant_id = %ctx.tenant_id, "login ceremony timed out");
            record.finish(LoginStatus::Timeout, None);
            ctx.hub
                .publish(&ctx.tenant_id, StatusEvent::login(LoginStatus::Timeout));
        }
        LoginOutcome::Cancelled => {
            info!(tenant_id = %ctx.tenant_id, "login ceremony cancelled");
            record.finish(LoginStatus::Failed, Some("cancelled by operator".to_string()));
            ctx.hub.publish(
                &ctx.tenant_id,
                StatusEvent::login_with_message(LoginStatus::Failed, "cancelled by operator"),
            );
        }
    }

    persist(&ctx, &record);
}

/// Launching state: acquire the interactive driver, run the ceremony, and
/// release the driver on every path.
async fn launch_and_drive(ctx: &LoginContext, record: &mut LoginSession) -> LoginOutcome {
    let mut driver = match ctx
        .factory
        .launch(&ctx.tenant_id, BrowserMode::Interactive, None)
        .await
    {
        Ok(driver) => driver,
        Err(e) => return LoginOutcome::Failed(format!("failed to launch browser: {e}")),
    };

    let outcome = ceremony(ctx, record, driver.as_mut()).await;

    if let Err(e) = driver.close().await {
        warn!(tenant_id = %ctx.tenant_id, error = %e, "failed to close interactive driver");
    }
    outcome
}

async fn ceremony(
    ctx: &LoginContext,
    record: &mut LoginSession,
    driver: &mut dyn BrowserDriver,
) -> LoginOutcome {
    let config = &ctx.config;

    if let Err(e) = driver
        .goto(&config.platform.login_url, config.navigation_timeout)
        .await
    {
        return LoginOutcome::Failed(format!("failed to open login page: {e}"));
    }

    record.status = LoginStatus::AwaitingScan;
    persist(ctx, record);
    ctx.hub
        .publish(&ctx.tenant_id, StatusEvent::login(LoginStatus::AwaitingScan));

    let deadline = Instant::now() + config.login_timeout;
    let mut next_qr_refresh = Instant::now();
    let mut probe_failures: u32 = 0;

    // AwaitingUserAction: poll the detector until a decisive signal, the
    // wall clock, or cancellation.
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return LoginOutcome::Cancelled,
            _ = tokio::time::sleep_until(deadline) => return LoginOutcome::TimedOut,
            _ = tokio::time::sleep(config.detector_interval) => {}
        }

        // QR snapshot cadence: best effort, at-least-once within the
        // cadence; a missed capture is superseded by the next one.
        if Instant::now() >= next_qr_refresh {
            next_qr_refresh = Instant::now() + config.qr_refresh_interval;
            match driver.capture_qr(config.probe_timeout).await {
                Ok(Some(image)) => {
                    record.qr_image_b64 = Some(image.clone());
                    persist(ctx, record);
                    ctx.hub.publish(
                        &ctx.tenant_id,
                        StatusEvent::login_with_qr(LoginStatus::AwaitingScan, image),
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(tenant_id = %ctx.tenant_id, error = %e, "qr capture skipped");
                }
            }
        }

        let signal = match driver.probe_login(config.probe_timeout).await {
            Ok(probe) => {
                probe_failures = 0;
                detector::classify(&probe, &config.platform.login_url_pattern)
            }
            Err(e) if e.is_transient() => {
                debug!(tenant_id = %ctx.tenant_id, error = %e, "detector poll failed");
                LoginSignal::NavigationFailed
            }
            Err(e) => return LoginOutcome::Failed(format!("browser agent failed: {e}")),
        };

        match signal {
            LoginSignal::StillOnLoginPage => continue,
            LoginSignal::ErrorMarkerPresent => {
                return LoginOutcome::Failed("login rejected by platform".to_string());
            }
            LoginSignal::NavigationFailed => {
                probe_failures += 1;
                if probe_failures >= config.max_probe_failures {
                    return LoginOutcome::Failed(
                        "login page stopped responding to the detector".to_string(),
                    );
                }
            }
            LoginSignal::AuthenticatedMarkerPresent => break,
        }
    }

    verify_and_store(ctx, driver).await
}

/// Verifying state: extract the jar and its user-agent, validate the
/// required-key set, and atomically replace the tenant's artifact. A half
/// jar is discarded, never written.
async fn verify_and_store(ctx: &LoginContext, driver: &mut dyn BrowserDriver) -> LoginOutcome {
    let config = &ctx.config;

    let cookies = match driver.export_cookies(config.probe_timeout).await {
        Ok(cookies) => cookies,
        Err(e) => return LoginOutcome::Failed(format!("cookie extraction failed: {e}")),
    };
    let user_agent = match driver.user_agent(config.probe_timeout).await {
        Ok(ua) => ua,
        Err(e) => return LoginOutcome::Failed(format!("user-agent extraction failed: {e}")),
    };

    let artifact =
        SessionArtifact::new(cookies, user_agent).with_validity(SessionValidity::Valid);

    match ctx.storage.sessions.put(&ctx.tenant_id, &artifact) {
        Ok(()) => LoginOutcome::Succeeded,
        Err(SessionStoreError::IncompleteSession { missing }) => LoginOutcome::Failed(format!(
            "incomplete session: missing cookies {}",
            missing.join(", ")
        )),
        Err(SessionStoreError::Storage(e)) => {
            LoginOutcome::Failed(format!("failed to store session: {e}"))
        }
    }
}

fn persist(ctx: &LoginContext, record: &LoginSession) {
    if let Err(e) = ctx.storage.login_sessions.put(record) {
        warn!(tenant_id = %ctx.tenant_id, error = %e, "failed to persist login session record");
    }
}
