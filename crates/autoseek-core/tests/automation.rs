//! End-to-end tests for the login and delivery state machines, driven
//! against a scripted in-memory browser driver.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Timelike;
use futures::StreamExt;

use autoseek_browser::{
    BrowserDriver, BrowserMode, DriverError, DriverFactory, DriverResult, LoginProbe,
    SubmitOutcome,
};
use autoseek_core::{
    AutomationConfig, AutomationError, AutomationService, ControlChannel, ListingSource,
    PollControlChannel, PushControlChannel,
};
use autoseek_models::{
    CancelScope, Command, Cookie, DeliveryConfig, DeliveryStatus, DeliveryWindow, JobListing,
    LoginStatus, SessionValidity, StatusEvent,
};
use autoseek_storage::Storage;

const TEST_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                       (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

fn on_login_page() -> LoginProbe {
    LoginProbe {
        current_url: "https://www.zhaopin.example/login".to_string(),
        error_marker_present: false,
        authenticated_marker_present: false,
    }
}

fn authenticated() -> LoginProbe {
    LoginProbe {
        current_url: "https://www.zhaopin.example/home".to_string(),
        error_marker_present: false,
        authenticated_marker_present: true,
    }
}

fn login_rejected() -> LoginProbe {
    LoginProbe {
        current_url: "https://www.zhaopin.example/login".to_string(),
        error_marker_present: true,
        authenticated_marker_present: false,
    }
}

fn complete_cookies() -> Vec<Cookie> {
    vec![
        Cookie::new("auth_token", "abc", ".zhaopin.example"),
        Cookie::new("session", "xyz", ".zhaopin.example"),
    ]
}

/// Driver whose observations and submission outcomes are scripted by the
/// test. Queues are shared with the factory so a test can keep feeding
/// signals while the machine runs.
struct ScriptedDriver {
    mode: BrowserMode,
    probes: Arc<Mutex<VecDeque<LoginProbe>>>,
    default_probe: LoginProbe,
    cookies: Vec<Cookie>,
    user_agent: String,
    submissions: Arc<Mutex<VecDeque<DriverResult<SubmitOutcome>>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    fn mode(&self) -> BrowserMode {
        self.mode
    }

    async fn goto(&mut self, _url: &str, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    async fn probe_login(&mut self, _timeout: Duration) -> DriverResult<LoginProbe> {
        let next = self.probes.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.default_probe.clone()))
    }

    async fn capture_qr(&mut self, _timeout: Duration) -> DriverResult<Option<String>> {
        Ok(Some("aVZCT1J3MEtHZ28=".to_string()))
    }

    async fn export_cookies(&mut self, _timeout: Duration) -> DriverResult<Vec<Cookie>> {
        Ok(self.cookies.clone())
    }

    async fn user_agent(&mut self, _timeout: Duration) -> DriverResult<String> {
        Ok(self.user_agent.clone())
    }

    async fn import_cookies(
        &mut self,
        _cookies: &[Cookie],
        _timeout: Duration,
    ) -> DriverResult<()> {
        Ok(())
    }

    async fn submit_application(
        &mut self,
        _listing_url: &str,
        _timeout: Duration,
    ) -> DriverResult<SubmitOutcome> {
        let next = self.submissions.lock().unwrap().pop_front();
        next.unwrap_or(Ok(SubmitOutcome::Submitted))
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedFactory {
    probes: Arc<Mutex<VecDeque<LoginProbe>>>,
    default_probe: LoginProbe,
    cookies: Vec<Cookie>,
    user_agent: String,
    submissions: Arc<Mutex<VecDeque<DriverResult<SubmitOutcome>>>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedFactory {
    fn new(default_probe: LoginProbe) -> Self {
        Self {
            probes: Arc::new(Mutex::new(VecDeque::new())),
            default_probe,
            cookies: complete_cookies(),
            user_agent: TEST_UA.to_string(),
            submissions: Arc::new(Mutex::new(VecDeque::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn push_probes(&self, probes: Vec<LoginProbe>) {
        self.probes.lock().unwrap().extend(probes);
    }

    fn push_submissions(&self, outcomes: Vec<DriverResult<SubmitOutcome>>) {
        self.submissions.lock().unwrap().extend(outcomes);
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    async fn launch(
        &self,
        _tenant_id: &str,
        mode: BrowserMode,
        _user_agent: Option<&str>,
    ) -> DriverResult<Box<dyn BrowserDriver>> {
        Ok(Box::new(ScriptedDriver {
            mode,
            probes: self.probes.clone(),
            default_probe: self.default_probe.clone(),
            cookies: self.cookies.clone(),
            user_agent: self.user_agent.clone(),
            submissions: self.submissions.clone(),
            closed: self.closed.clone(),
        }))
    }
}

struct StaticListings(Vec<JobListing>);

#[async_trait]
impl ListingSource for StaticListings {
    async fn fetch(
        &self,
        _tenant_id: &str,
        _config: &DeliveryConfig,
    ) -> anyhow::Result<Vec<JobListing>> {
        Ok(self.0.clone())
    }
}

fn listings(count: usize) -> Vec<JobListing> {
    (0..count)
        .map(|i| {
            JobListing::new(
                format!("job-{i}"),
                format!("https://www.zhaopin.example/job/{i}"),
                "Backend Engineer",
                "Acme",
            )
        })
        .collect()
}

fn fast_config() -> AutomationConfig {
    AutomationConfig {
        login_timeout: Duration::from_millis(500),
        detector_interval: Duration::from_millis(10),
        qr_refresh_interval: Duration::from_millis(20),
        fallback_user_agent: TEST_UA.to_string(),
        ..Default::default()
    }
}

fn build_service(
    factory: ScriptedFactory,
    listings: Vec<JobListing>,
    config: AutomationConfig,
) -> (tempfile::TempDir, Arc<Storage>, Arc<AutomationService>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("autoseek.db");
    let storage = Arc::new(
        Storage::new(
            db_path.to_str().unwrap(),
            vec!["auth_token".to_string(), "session".to_string()],
        )
        .unwrap(),
    );
    let service = Arc::new(AutomationService::new(
        storage.clone(),
        Arc::new(factory),
        Arc::new(StaticListings(listings)),
        config,
    ));
    (temp_dir, storage, service)
}

fn delivery_config(max_per_run: u32) -> DeliveryConfig {
    DeliveryConfig {
        max_per_run,
        interval_secs: 0,
        ..Default::default()
    }
}

fn seed_session(service: &AutomationService) {
    service
        .import_manual_cookies("u1", "auth_token=abc; session=xyz")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_happy_path_login_stores_valid_jar() {
    let factory = ScriptedFactory::new(on_login_page());
    factory.push_probes(vec![on_login_page(), authenticated()]);
    let (_guard, storage, service) = build_service(factory, Vec::new(), fast_config());

    service.start_login("u1").unwrap();
    service.join("u1").await;

    let record = service.login_session("u1").unwrap().unwrap();
    assert_eq!(record.status, LoginStatus::Success);

    let artifact = storage.sessions.get("u1").unwrap().unwrap();
    assert_eq!(artifact.validity, SessionValidity::Valid);
    assert!(!artifact.source_user_agent.is_empty());
    assert!(artifact.cookie("auth_token").is_some());

    match service.snapshot("u1") {
        Some(StatusEvent::LoginStatus { status, .. }) => {
            assert_eq!(status, LoginStatus::Success)
        }
        other => panic!("unexpected snapshot: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_login_success_makes_delivery_possible() {
    let factory = ScriptedFactory::new(authenticated());
    let (_guard, _storage, service) = build_service(factory, listings(1), fast_config());

    service.start_login("u1").unwrap();
    service.join("u1").await;

    // The stored jar carries a user-agent and is immediately usable.
    service.start_delivery("u1", delivery_config(1)).unwrap();
    service.join("u1").await;

    let job = service.delivery_job("u1").unwrap().unwrap();
    assert_eq!(job.status, DeliveryStatus::Completed);
    assert_eq!(job.succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_login_timeout_leaves_store_unchanged() {
    let factory = ScriptedFactory::new(on_login_page());
    let (_guard, storage, service) = build_service(factory, Vec::new(), fast_config());

    service.start_login("u2").unwrap();
    service.join("u2").await;

    let record = service.login_session("u2").unwrap().unwrap();
    assert_eq!(record.status, LoginStatus::Timeout);
    assert!(service.snapshot("u2").is_some());

    // No jar was ever written for this tenant.
    assert!(storage.sessions.get("u2").unwrap().is_none());
    assert!(matches!(
        service.start_delivery("u2", delivery_config(1)),
        Err(AutomationError::NoSession)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_login_rejected_by_platform() {
    let factory = ScriptedFactory::new(on_login_page());
    factory.push_probes(vec![login_rejected()]);
    let (_guard, _storage, service) = build_service(factory, Vec::new(), fast_config());

    service.start_login("u1").unwrap();
    service.join("u1").await;

    let record = service.login_session("u1").unwrap().unwrap();
    assert_eq!(record.status, LoginStatus::Failed);
    assert!(record.last_error.unwrap().contains("rejected"));
}

#[tokio::test(start_paused = true)]
async fn test_incomplete_extraction_fails_and_discards_jar() {
    let mut factory = ScriptedFactory::new(authenticated());
    factory.cookies = vec![Cookie::new("session", "xyz", ".zhaopin.example")];
    let (_guard, storage, service) = build_service(factory, Vec::new(), fast_config());

    service.start_login("u1").unwrap();
    service.join("u1").await;

    let record = service.login_session("u1").unwrap().unwrap();
    assert_eq!(record.status, LoginStatus::Failed);
    assert!(record.last_error.unwrap().contains("auth_token"));
    // The half jar was discarded, never written.
    assert!(storage.sessions.get("u1").unwrap().is_none());
    assert!(matches!(
        service.start_delivery("u1", delivery_config(1)),
        Err(AutomationError::NoSession)
    ));
}

#[tokio::test]
async fn test_second_login_rejected_while_active() {
    let factory = ScriptedFactory::new(on_login_page());
    let config = AutomationConfig {
        login_timeout: Duration::from_secs(60),
        detector_interval: Duration::from_millis(10),
        ..fast_config()
    };
    let (_guard, _storage, service) = build_service(factory, Vec::new(), config);

    service.start_login("u1").unwrap();
    assert!(matches!(
        service.start_login("u1"),
        Err(AutomationError::AlreadyRunning {
            scope: CancelScope::Login
        })
    ));

    service.cancel("u1", CancelScope::Login).unwrap();
    service.join("u1").await;

    let record = service.login_session("u1").unwrap().unwrap();
    assert_eq!(record.status, LoginStatus::Failed);
    assert!(record.last_error.unwrap().contains("cancelled"));

    // After the terminal state a new ceremony is admitted again.
    service.start_login("u1").unwrap();
    service.cancel("u1", CancelScope::Login).unwrap();
    service.join("u1").await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_cookie_import_requires_all_keys() {
    let factory = ScriptedFactory::new(authenticated());
    let (_guard, storage, service) = build_service(factory, Vec::new(), fast_config());

    let err = service
        .import_manual_cookies("u3", "session=xyz")
        .unwrap_err();
    assert!(matches!(
        err,
        AutomationError::IncompleteSession { ref missing } if missing == &vec!["auth_token".to_string()]
    ));
    assert!(storage.sessions.get("u3").unwrap().is_none());
    assert!(matches!(
        service.start_delivery("u3", delivery_config(1)),
        Err(AutomationError::NoSession)
    ));

    service
        .import_manual_cookies("u3", "auth_token=abc; session=xyz")
        .unwrap();
    service.start_delivery("u3", delivery_config(1)).unwrap();
    service.join("u3").await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_manual_payload_rejected() {
    let factory = ScriptedFactory::new(authenticated());
    let (_guard, _storage, service) = build_service(factory, Vec::new(), fast_config());

    assert!(matches!(
        service.import_manual_cookies("u1", "not a cookie"),
        Err(AutomationError::InvalidCookiePayload(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_delivery_respects_run_cap() {
    let factory = ScriptedFactory::new(authenticated());
    let (_guard, _storage, service) = build_service(factory, listings(10), fast_config());
    seed_session(&service);

    service.start_delivery("u1", delivery_config(3)).unwrap();
    service.join("u1").await;

    let job = service.delivery_job("u1").unwrap().unwrap();
    assert_eq!(job.status, DeliveryStatus::Completed);
    assert_eq!(job.processed, 3);
    assert_eq!(job.succeeded, 3);

    match service.snapshot("u1") {
        Some(StatusEvent::DeliveryProgress {
            processed, status, ..
        }) => {
            assert_eq!(processed, 3);
            assert_eq!(status, DeliveryStatus::Completed);
        }
        other => panic!("unexpected snapshot: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_auth_lost_fails_run_and_invalidates_session() {
    let factory = ScriptedFactory::new(authenticated());
    factory.push_submissions(vec![Ok(SubmitOutcome::Submitted), Ok(SubmitOutcome::AuthLost)]);
    let (_guard, storage, service) = build_service(factory, listings(5), fast_config());
    seed_session(&service);

    service.start_delivery("u1", delivery_config(5)).unwrap();
    service.join("u1").await;

    let job = service.delivery_job("u1").unwrap().unwrap();
    assert_eq!(job.status, DeliveryStatus::Failed);
    assert!(job.last_error.unwrap().contains("authentication lost"));

    // The stale jar must not be silently reusable.
    let artifact = storage.sessions.get("u1").unwrap().unwrap();
    assert_eq!(artifact.validity, SessionValidity::Invalid);
    assert!(matches!(
        service.start_delivery("u1", delivery_config(1)),
        Err(AutomationError::NoSession)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_retried_once_then_recorded() {
    let factory = ScriptedFactory::new(authenticated());
    factory.push_submissions(vec![
        // First item: transient then success on retry.
        Err(DriverError::Timeout("submit".to_string())),
        Ok(SubmitOutcome::Submitted),
        // Second item: transient twice, recorded as failed.
        Err(DriverError::Timeout("submit".to_string())),
        Err(DriverError::Navigation("net::ERR_TIMED_OUT".to_string())),
        // Third item: clean.
        Ok(SubmitOutcome::Submitted),
    ]);
    let (_guard, _storage, service) = build_service(factory, listings(3), fast_config());
    seed_session(&service);

    service.start_delivery("u1", delivery_config(10)).unwrap();
    service.join("u1").await;

    let job = service.delivery_job("u1").unwrap().unwrap();
    assert_eq!(job.status, DeliveryStatus::Completed);
    assert_eq!(job.processed, 3);
    assert_eq!(job.succeeded, 2);
    assert_eq!(job.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_user_agent_mismatch_is_fatal_setup_error() {
    let mut factory = ScriptedFactory::new(authenticated());
    factory.user_agent = "Mozilla/5.0 (Different)".to_string();
    let (_guard, _storage, service) = build_service(factory, listings(3), fast_config());
    seed_session(&service);

    service.start_delivery("u1", delivery_config(3)).unwrap();
    service.join("u1").await;

    let job = service.delivery_job("u1").unwrap().unwrap();
    assert_eq!(job.status, DeliveryStatus::Failed);
    assert!(job.last_error.unwrap().contains("user-agent mismatch"));
    assert_eq!(job.processed, 0);
}

#[tokio::test]
async fn test_cancel_stops_delivery_after_current_item() {
    let factory = ScriptedFactory::new(authenticated());
    let config = fast_config();
    let (_guard, _storage, service) = build_service(factory, listings(50), config);
    seed_session(&service);

    let run_config = DeliveryConfig {
        max_per_run: 50,
        interval_secs: 1,
        ..Default::default()
    };
    service.start_delivery("u1", run_config).unwrap();

    // Wait until at least one item went through, then cancel.
    let mut observed = 0;
    for _ in 0..200 {
        if let Some(job) = service.delivery_job("u1").unwrap() {
            observed = job.processed;
            if observed >= 1 {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(observed >= 1, "delivery never made progress");

    service.cancel("u1", CancelScope::Delivery).unwrap();
    service.join("u1").await;

    let job = service.delivery_job("u1").unwrap().unwrap();
    assert_eq!(job.status, DeliveryStatus::Cancelled);
    // Counters never go backwards.
    assert!(job.processed >= observed);
}

#[tokio::test(start_paused = true)]
async fn test_second_delivery_rejected_while_active() {
    let factory = ScriptedFactory::new(authenticated());
    let (_guard, _storage, service) = build_service(factory, listings(50), fast_config());
    seed_session(&service);

    let run_config = DeliveryConfig {
        max_per_run: 50,
        interval_secs: 60,
        ..Default::default()
    };
    service.start_delivery("u1", run_config).unwrap();
    assert!(matches!(
        service.start_delivery("u1", delivery_config(1)),
        Err(AutomationError::AlreadyRunning {
            scope: CancelScope::Delivery
        })
    ));

    service.cancel("u1", CancelScope::Delivery).unwrap();
    service.join("u1").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_admit_exactly_one() {
    let factory = ScriptedFactory::new(on_login_page());
    let config = AutomationConfig {
        login_timeout: Duration::from_secs(60),
        ..fast_config()
    };
    let (_guard, _storage, service) = build_service(factory, Vec::new(), config);

    for round in 0..50 {
        let barrier = Arc::new(tokio::sync::Barrier::new(8));
        let mut starts = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let barrier = barrier.clone();
            starts.push(tokio::spawn(async move {
                barrier.wait().await;
                service.start_login("u1").is_ok()
            }));
        }

        let mut admitted = 0;
        for start in starts {
            if start.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1, "round {round}: admission must be exclusive");

        service.cancel("u1", CancelScope::Login).unwrap();
        service.join("u1").await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_filtered_listings_do_not_consume_cap() {
    let factory = ScriptedFactory::new(authenticated());
    let mut items = Vec::new();
    for i in 0..5 {
        items.push(JobListing::new(
            format!("blocked-{i}"),
            format!("https://www.zhaopin.example/job/blocked-{i}"),
            "Backend Engineer",
            "BlockedCo",
        ));
    }
    items.extend(listings(5));
    let (_guard, _storage, service) = build_service(factory, items, fast_config());
    seed_session(&service);

    let run_config = DeliveryConfig {
        keyword_blacklist: vec!["blockedco".to_string()],
        max_per_run: 3,
        interval_secs: 0,
        ..Default::default()
    };
    service.start_delivery("u1", run_config).unwrap();
    service.join("u1").await;

    // Five skips plus three submissions; the skips left the budget alone.
    let job = service.delivery_job("u1").unwrap().unwrap();
    assert_eq!(job.status, DeliveryStatus::Completed);
    assert_eq!(job.processed, 8);
    assert_eq!(job.succeeded, 3);
    assert_eq!(job.failed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_delivery_pauses_outside_window_until_deadline() {
    let factory = ScriptedFactory::new(authenticated());
    let (_guard, _storage, service) = build_service(factory, listings(5), fast_config());
    seed_session(&service);

    let hour = chrono::Local::now().hour() as u8;
    let run_config = DeliveryConfig {
        max_per_run: 5,
        interval_secs: 0,
        window: Some(DeliveryWindow {
            start_hour: (hour + 2) % 24,
            end_hour: (hour + 3) % 24,
        }),
        deadline_secs: Some(180),
        ..Default::default()
    };
    service.start_delivery("u1", run_config).unwrap();

    // Past a few recheck cycles the machine still reports Running with
    // counters frozen.
    tokio::time::sleep(Duration::from_secs(150)).await;
    match service.snapshot("u1") {
        Some(StatusEvent::DeliveryProgress {
            processed, status, ..
        }) => {
            assert_eq!(processed, 0);
            assert_eq!(status, DeliveryStatus::Running);
        }
        other => panic!("unexpected snapshot: {other:?}"),
    }

    service.join("u1").await;
    let job = service.delivery_job("u1").unwrap().unwrap();
    assert_eq!(job.status, DeliveryStatus::Completed);
    assert_eq!(job.processed, 0);
    assert_eq!(job.succeeded, 0);
}

#[tokio::test(start_paused = true)]
async fn test_delivery_proceeds_inside_window() {
    let factory = ScriptedFactory::new(authenticated());
    let (_guard, _storage, service) = build_service(factory, listings(2), fast_config());
    seed_session(&service);

    let hour = chrono::Local::now().hour() as u8;
    let run_config = DeliveryConfig {
        max_per_run: 2,
        interval_secs: 0,
        window: Some(DeliveryWindow {
            start_hour: hour,
            end_hour: (hour + 2) % 24,
        }),
        ..Default::default()
    };
    service.start_delivery("u1", run_config).unwrap();
    service.join("u1").await;

    let job = service.delivery_job("u1").unwrap().unwrap();
    assert_eq!(job.status, DeliveryStatus::Completed);
    assert_eq!(job.succeeded, 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_deadline_bounds_the_loop() {
    let factory = ScriptedFactory::new(authenticated());
    let (_guard, _storage, service) = build_service(factory, listings(5), fast_config());
    seed_session(&service);

    let run_config = DeliveryConfig {
        max_per_run: 5,
        interval_secs: 120,
        deadline_secs: Some(60),
        ..Default::default()
    };
    service.start_delivery("u1", run_config).unwrap();
    service.join("u1").await;

    // One item fits before the deadline; the bound ends the run cleanly.
    let job = service.delivery_job("u1").unwrap().unwrap();
    assert_eq!(job.status, DeliveryStatus::Completed);
    assert_eq!(job.processed, 1);
    assert_eq!(job.succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unauthenticated_injection_invalidates_session() {
    let factory = ScriptedFactory::new(authenticated());
    // The post-injection probe reports an error marker on the login path.
    factory.push_probes(vec![login_rejected()]);
    let (_guard, storage, service) = build_service(factory, listings(2), fast_config());
    seed_session(&service);

    service.start_delivery("u1", delivery_config(2)).unwrap();
    service.join("u1").await;

    let job = service.delivery_job("u1").unwrap().unwrap();
    assert_eq!(job.status, DeliveryStatus::Failed);
    assert!(job.last_error.unwrap().contains("not authenticated"));
    assert_eq!(job.processed, 0);

    let artifact = storage.sessions.get("u1").unwrap().unwrap();
    assert_eq!(artifact.validity, SessionValidity::Invalid);
}

#[tokio::test(start_paused = true)]
async fn test_push_channel_folds_rejection_into_error_event() {
    let factory = ScriptedFactory::new(authenticated());
    let (_guard, _storage, service) = build_service(factory, Vec::new(), fast_config());
    let channel = PushControlChannel::new(service.clone());

    // No jar stored: the rejection surfaces as a status event, not a
    // synchronous error on the transport.
    channel
        .send(
            "u1",
            Command::Deliver {
                config: delivery_config(1),
            },
        )
        .await;

    match channel.latest("u1").await {
        Some(StatusEvent::Error { message }) => {
            assert!(message.contains("no usable session"));
        }
        other => panic!("unexpected snapshot: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_push_channel_stream_yields_latest_snapshot() {
    let factory = ScriptedFactory::new(authenticated());
    let (_guard, _storage, service) = build_service(factory, Vec::new(), fast_config());
    let channel = PushControlChannel::new(service.clone());
    let mut events = channel.status_events("u1");

    channel.send("u1", Command::Login).await;
    service.join("u1").await;

    // Intermediate snapshots were superseded; a late poll sees the final
    // state, never an earlier one.
    match events.next().await {
        Some(StatusEvent::LoginStatus { status, .. }) => {
            assert_eq!(status, LoginStatus::Success)
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_poll_channel_serves_current_snapshot() {
    let factory = ScriptedFactory::new(authenticated());
    let (_guard, _storage, service) = build_service(factory, Vec::new(), fast_config());
    let channel = PollControlChannel::new(service.clone(), Duration::from_millis(50));

    assert!(channel.latest("u1").await.is_none());

    channel.send("u1", Command::Login).await;
    service.join("u1").await;

    match channel.latest("u1").await {
        Some(StatusEvent::LoginStatus { status, .. }) => {
            assert_eq!(status, LoginStatus::Success)
        }
        other => panic!("unexpected snapshot: {other:?}"),
    }

    let mut events = channel.status_events("u1");
    match events.next().await {
        Some(StatusEvent::LoginStatus { status, .. }) => {
            assert_eq!(status, LoginStatus::Success)
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_tenants_run_independently() {
    let factory = ScriptedFactory::new(authenticated());
    let (_guard, _storage, service) = build_service(factory, listings(2), fast_config());

    service
        .import_manual_cookies("u1", "auth_token=abc; session=xyz")
        .unwrap();
    service
        .import_manual_cookies("u2", "auth_token=def; session=uvw")
        .unwrap();

    service.start_delivery("u1", delivery_config(2)).unwrap();
    service.start_delivery("u2", delivery_config(2)).unwrap();
    service.join("u1").await;
    service.join("u2").await;

    let job1 = service.delivery_job("u1").unwrap().unwrap();
    let job2 = service.delivery_job("u2").unwrap().unwrap();
    assert_eq!(job1.status, DeliveryStatus::Completed);
    assert_eq!(job2.status, DeliveryStatus::Completed);
    assert_eq!(job1.tenant_id, "u1");
    assert_eq!(job2.tenant_id, "u2");
}
