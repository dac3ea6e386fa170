//! Delivery state machine.
//!
//! Consumes a valid session and an operator-supplied configuration, drives
//! the agent through a rate-limited submission loop, and reports progress
//! after every item. One bad listing never halts the run; a lost session
//! always does, and also invalidates the stored jar so a later `deliver`
//! cannot silently reuse it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use async_trait::async_trait;
use autoseek_browser::{BrowserDriver, BrowserMode, DriverFactory, DriverResult, SubmitOutcome};
use autoseek_models::{
    DeliveryConfig, DeliveryJob, DeliveryStatus, JobListing, LoginSignal, SessionArtifact,
    StatusEvent,
};
use autoseek_storage::Storage;

use crate::config::AutomationConfig;
use crate::detector;
use crate::status::StatusHub;

/// External matching component that supplies candidate listings for a
/// tenant's configured filters.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch(
        &self,
        tenant_id: &str,
        config: &DeliveryConfig,
    ) -> anyhow::Result<Vec<JobListing>>;
}

pub(crate) struct DeliveryContext {
    pub tenant_id: String,
    pub storage: Arc<Storage>,
    pub factory: Arc<dyn DriverFactory>,
    pub listings: Arc<dyn ListingSource>,
    pub hub: Arc<StatusHub>,
    pub config: Arc<AutomationConfig>,
    pub delivery_config: DeliveryConfig,
    pub cancel: CancellationToken,
}

enum DeliveryOutcome {
    Completed,
    Cancelled,
    Failed {
        message: String,
        /// Whether the stored session artifact must be invalidated.
        invalidate_session: bool,
    },
}

/// Run one delivery job to completion. Every outcome is recorded in storage
/// and published as a progress event; nothing is retried above the single
/// in-loop retry.
pub(crate) async fn run_delivery(ctx: DeliveryContext) {
    let mut job = DeliveryJob::new(&ctx.tenant_id, ctx.delivery_config.clone());
    persist(&ctx, &job);
    publish_progress(&ctx, &job);
    info!(tenant_id = %ctx.tenant_id, job_id = %job.id, "delivery run starting");

    let outcome = prepare_and_drive(&ctx, &mut job).await;

    match outcome {
        DeliveryOutcome::Completed => {
            info!(
                tenant_id = %ctx.tenant_id,
                processed = job.processed,
                succeeded = job.succeeded,
                failed = job.failed,
                "delivery run completed"
            );
            job.finish(DeliveryStatus::Completed, None);
        }
        DeliveryOutcome::Cancelled => {
            info!(tenant_id = %ctx.tenant_id, processed = job.processed, "delivery run cancelled");
            job.finish(DeliveryStatus::Cancelled, None);
        }
        DeliveryOutcome::Failed {
            message,
            invalidate_session,
        } => {
            warn!(tenant_id = %ctx.tenant_id, %message, "delivery run failed");
            if invalidate_session
                && let Err(e) = ctx.storage.sessions.invalidate(&ctx.tenant_id, &message)
            {
                warn!(tenant_id = %ctx.tenant_id, error = %e, "failed to invalidate session");
            }
            job.finish(DeliveryStatus::Failed, Some(message));
        }
    }

    persist(&ctx, &job);
    publish_progress(&ctx, &job);
}

/// Preparing state: load the jar, launch headless under the bound
/// user-agent, inject cookies, and confirm the context is authenticated
/// before entering the loop. The driver is released on every path.
async fn prepare_and_drive(ctx: &DeliveryContext, job: &mut DeliveryJob) -> DeliveryOutcome {
    let artifact = match ctx.storage.sessions.get_usable(&ctx.tenant_id) {
        Ok(Some(artifact)) => artifact,
        Ok(None) => {
            return DeliveryOutcome::Failed {
                message: "no usable session artifact".to_string(),
                invalidate_session: false,
            };
        }
        Err(e) => {
            return DeliveryOutcome::Failed {
                message: format!("session store read failed: {e}"),
                invalidate_session: false,
            };
        }
    };

    let mut driver = match ctx
        .factory
        .launch(
            &ctx.tenant_id,
            BrowserMode::Headless,
            Some(&artifact.source_user_agent),
        )
        .await
    {
        Ok(driver) => driver,
        Err(e) => {
            return DeliveryOutcome::Failed {
                message: format!("failed to launch headless browser: {e}"),
                invalidate_session: false,
            };
        }
    };

    let outcome = match inject_session(ctx, driver.as_mut(), &artifact).await {
        Ok(()) => delivery_loop(ctx, job, driver.as_mut()).await,
        Err(outcome) => outcome,
    };

    if let Err(e) = driver.close().await {
        warn!(tenant_id = %ctx.tenant_id, error = %e, "failed to close headless driver");
    }
    outcome
}

async fn inject_session(
    ctx: &DeliveryContext,
    driver: &mut dyn BrowserDriver,
    artifact: &SessionArtifact,
) -> Result<(), DeliveryOutcome> {
    let config = &ctx.config;

    if let Err(e) = driver
        .import_cookies(&artifact.cookies, config.probe_timeout)
        .await
    {
        return Err(DeliveryOutcome::Failed {
            message: format!("cookie injection failed: {e}"),
            invalidate_session: false,
        });
    }

    // The platform correlates the UA fingerprint with the session; a
    // mismatch would burn the jar, so it is a fatal setup error.
    match driver.user_agent(config.probe_timeout).await {
        Ok(live) if live == artifact.source_user_agent => {}
        Ok(live) => {
            return Err(DeliveryOutcome::Failed {
                message: format!(
                    "user-agent mismatch: session bound to {:?}, context reports {:?}",
                    artifact.source_user_agent, live
                ),
                invalidate_session: false,
            });
        }
        Err(e) => {
            return Err(DeliveryOutcome::Failed {
                message: format!("user-agent check failed: {e}"),
                invalidate_session: false,
            });
        }
    }

    // Confirm the injected jar actually authenticates before submitting.
    if let Err(e) = driver
        .goto(&config.platform.login_url, config.navigation_timeout)
        .await
    {
        return Err(DeliveryOutcome::Failed {
            message: format!("authentication check navigation failed: {e}"),
            invalidate_session: false,
        });
    }
    match driver.probe_login(config.probe_timeout).await {
        Ok(probe) => match detector::classify(&probe, &config.platform.login_url_pattern) {
            LoginSignal::AuthenticatedMarkerPresent => Ok(()),
            // Still on the login page, or an error marker: either way the
            // jar did not authenticate and must not be silently reused.
            _ => Err(DeliveryOutcome::Failed {
                message: "injected session is not authenticated".to_string(),
                invalidate_session: true,
            }),
        },
        Err(e) => Err(DeliveryOutcome::Failed {
            message: format!("authentication check failed: {e}"),
            invalidate_session: false,
        }),
    }
}

/// Running state: the rate-limited submission loop.
async fn delivery_loop(
    ctx: &DeliveryContext,
    job: &mut DeliveryJob,
    driver: &mut dyn BrowserDriver,
) -> DeliveryOutcome {
    let config = &ctx.config;
    let run_config = &ctx.delivery_config;

    let listings = match ctx.listings.fetch(&ctx.tenant_id, run_config).await {
        Ok(listings) => listings,
        Err(e) => {
            return DeliveryOutcome::Failed {
                message: format!("listing source failed: {e}"),
                invalidate_session: false,
            };
        }
    };

    let deadline = Instant::now()
        + run_config
            .deadline_secs
            .map(Duration::from_secs)
            .unwrap_or(config.run_deadline);

    // The cap bounds submission attempts; listings the eligibility filter
    // skips never consume the budget.
    let mut attempts: u32 = 0;

    for listing in listings {
        // Cap reached: the remaining queue is deliberately left untouched.
        if attempts >= run_config.max_per_run {
            debug!(tenant_id = %ctx.tenant_id, cap = run_config.max_per_run, "run cap reached");
            return DeliveryOutcome::Completed;
        }

        // Outside the permitted window the loop pauses with counters
        // frozen, still reporting Running, and resumes on its own.
        if let Some(window) = run_config.window {
            loop {
                let hour = chrono::Local::now().hour() as u8;
                if window.contains(hour) {
                    break;
                }
                debug!(tenant_id = %ctx.tenant_id, hour, "outside delivery window, pausing");
                publish_progress(ctx, job);
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return DeliveryOutcome::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => return DeliveryOutcome::Completed,
                    _ = tokio::time::sleep(config.window_recheck) => {}
                }
            }
        }

        if Instant::now() >= deadline {
            debug!(tenant_id = %ctx.tenant_id, "run deadline reached");
            return DeliveryOutcome::Completed;
        }

        if eligible(&listing, run_config) {
            attempts += 1;
            match submit_with_retry(driver, &listing.url, config.submission_timeout).await {
                Ok(SubmitOutcome::Submitted) => {
                    job.succeeded += 1;
                }
                Ok(SubmitOutcome::AlreadyApplied) => {
                    debug!(tenant_id = %ctx.tenant_id, listing = %listing.id, "already applied");
                }
                Ok(SubmitOutcome::AuthLost) => {
                    return DeliveryOutcome::Failed {
                        message: "authentication lost during delivery".to_string(),
                        invalidate_session: true,
                    };
                }
                Ok(SubmitOutcome::Rejected { message }) => {
                    debug!(tenant_id = %ctx.tenant_id, listing = %listing.id, %message, "submission rejected");
                    job.failed += 1;
                    job.last_error = Some(message);
                }
                Err(e) if e.is_transient() => {
                    // Second transient failure after the in-loop retry:
                    // record and move on, one bad listing must not halt
                    // the run.
                    job.failed += 1;
                    job.last_error = Some(e.to_string());
                }
                Err(e) => {
                    return DeliveryOutcome::Failed {
                        message: format!("browser agent failed: {e}"),
                        invalidate_session: false,
                    };
                }
            }
        } else {
            debug!(tenant_id = %ctx.tenant_id, listing = %listing.id, "listing filtered out");
        }

        job.processed += 1;
        persist(ctx, job);
        publish_progress(ctx, job);

        // Inter-item sleep doubles as the cancellation checkpoint: a
        // cancel takes effect after the in-flight item, never during it.
        tokio::select! {
            _ = ctx.cancel.cancelled() => return DeliveryOutcome::Cancelled,
            _ = tokio::time::sleep(Duration::from_secs(run_config.interval_secs)) => {}
        }
    }

    DeliveryOutcome::Completed
}

/// One automatic retry on a transient classification; anything else is
/// passed straight through.
async fn submit_with_retry(
    driver: &mut dyn BrowserDriver,
    url: &str,
    timeout: Duration,
) -> DriverResult<SubmitOutcome> {
    match driver.submit_application(url, timeout).await {
        Err(e) if e.is_transient() => {
            debug!(%url, error = %e, "transient submission failure, retrying once");
            tokio::time::sleep(Duration::from_secs(2)).await;
            driver.submit_application(url, timeout).await
        }
        other => other,
    }
}

/// Evaluate a listing against the operator's filters.
fn eligible(listing: &JobListing, config: &DeliveryConfig) -> bool {
    let title = listing.title.to_lowercase();
    let company = listing.company.to_lowercase();

    if config
        .keyword_blacklist
        .iter()
        .any(|kw| title.contains(&kw.to_lowercase()) || company.contains(&kw.to_lowercase()))
    {
        return false;
    }
    if config
        .company_blacklist
        .iter()
        .any(|name| company.contains(&name.to_lowercase()))
    {
        return false;
    }
    if config
        .position_blacklist
        .iter()
        .any(|position| title == position.to_lowercase())
    {
        return false;
    }
    if let Some(min_salary) = config.min_salary {
        match listing.salary {
            Some(salary) if salary >= min_salary => {}
            // No salary data counts as below the floor when one is set.
            _ => return false,
        }
    }
    if !config.locations.is_empty() {
        let Some(location) = &listing.location else {
            return false;
        };
        let location = location.to_lowercase();
        if !config
            .locations
            .iter()
            .any(|allowed| location.contains(&allowed.to_lowercase()))
        {
            return false;
        }
    }
    true
}

fn persist(ctx: &DeliveryContext, job: &DeliveryJob) {
    if let Err(e) = ctx.storage.delivery_jobs.put(job) {
        warn!(tenant_id = %ctx.tenant_id, error = %e, "failed to persist delivery job record");
    }
}

fn publish_progress(ctx: &DeliveryContext, job: &DeliveryJob) {
    ctx.hub.publish(
        &ctx.tenant_id,
        StatusEvent::DeliveryProgress {
            processed: job.processed,
            succeeded: job.succeeded,
            failed: job.failed,
            status: job.status,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> JobListing {
        JobListing::new("j1", "https://example.com/job/j1", "Backend Engineer", "Acme")
            .with_location("Shanghai")
            .with_salary(25_000)
    }

    #[test]
    fn test_eligible_with_empty_filters() {
        assert!(eligible(&listing(), &DeliveryConfig::default()));
    }

    #[test]
    fn test_keyword_blacklist_matches_title_and_company() {
        let config = DeliveryConfig {
            keyword_blacklist: vec!["backend".to_string()],
            ..Default::default()
        };
        assert!(!eligible(&listing(), &config));

        let config = DeliveryConfig {
            keyword_blacklist: vec!["acme".to_string()],
            ..Default::default()
        };
        assert!(!eligible(&listing(), &config));
    }

    #[test]
    fn test_position_blacklist_is_exact() {
        let config = DeliveryConfig {
            position_blacklist: vec!["Backend Engineer".to_string()],
            ..Default::default()
        };
        assert!(!eligible(&listing(), &config));

        let config = DeliveryConfig {
            position_blacklist: vec!["Engineer".to_string()],
            ..Default::default()
        };
        assert!(eligible(&listing(), &config));
    }

    #[test]
    fn test_salary_floor() {
        let config = DeliveryConfig {
            min_salary: Some(30_000),
            ..Default::default()
        };
        assert!(!eligible(&listing(), &config));

        let config = DeliveryConfig {
            min_salary: Some(20_000),
            ..Default::default()
        };
        assert!(eligible(&listing(), &config));

        // Missing salary data fails a configured floor.
        let mut unsalaried = listing();
        unsalaried.salary = None;
        let config = DeliveryConfig {
            min_salary: Some(1),
            ..Default::default()
        };
        assert!(!eligible(&unsalaried, &config));
    }

    #[test]
    fn test_location_allow_list() {
        let config = DeliveryConfig {
            locations: vec!["shanghai".to_string()],
            ..Default::default()
        };
        assert!(eligible(&listing(), &config));

        let config = DeliveryConfig {
            locations: vec!["Beijing".to_string()],
            ..Default::default()
        };
        assert!(!eligible(&listing(), &config));
    }
}
