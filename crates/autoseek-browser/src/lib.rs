//! Browser automation agent for AutoSeek.
//!
//! This crate drives a real Chromium instance (via a Node.js/Playwright
//! runner process) on behalf of the login and delivery state machines. It
//! supports:
//! - Runtime probing for Node.js/Playwright prerequisites
//! - Interactive (headed) and headless launch modes
//! - Navigation, login-page probing and QR snapshot capture
//! - Cookie export/import and user-agent extraction
//! - Application submission against a listing URL
//!
//! A driver instance is an exclusively-owned resource: one state machine
//! holds it at a time, and switching modes means closing the instance and
//! launching a fresh one. The Playwright driver keeps one runner process
//! alive per instance and exchanges line-delimited JSON over stdio, with
//! results marked on stdout so Playwright's own logging never corrupts the
//! protocol.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use autoseek_models::{Cookie, SameSite};

const RESULT_MARKER: &str = "__AUTOSEEK_RESULT__=";
const READY_MARKER: &str = "__AUTOSEEK_READY__";
const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 60;

/// Browser launch mode.
///
/// Interactive mode shows a visible window so a human can complete the
/// login ceremony; headless mode is used for unattended delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserMode {
    Interactive,
    Headless,
}

impl BrowserMode {
    pub fn is_headless(&self) -> bool {
        matches!(self, Self::Headless)
    }
}

/// Platform-specific URLs and DOM selectors.
///
/// The target platform's UI is not contractually stable, so everything the
/// driver keys off lives here as configuration rather than in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSpec {
    /// Login entry point opened for the interactive ceremony.
    pub login_url: String,
    /// URL substring that identifies the login path; navigation away from
    /// it is one of the authenticated signals.
    pub login_url_pattern: String,
    /// Selector for the login QR image element.
    pub qr_selector: String,
    /// Selector that appears when the platform rejects the login.
    pub error_selector: String,
    /// Selector that only renders for an authenticated user.
    pub authenticated_selector: String,
    /// Selector that appears when an authenticated session has been
    /// dropped mid-run.
    pub auth_lost_selector: String,
    /// Selector for the apply/submit button on a listing page.
    pub apply_selector: String,
    /// Selector that confirms a submission went through.
    pub submitted_selector: String,
    /// Selector present when the listing was already applied to.
    pub already_applied_selector: String,
}

impl Default for PlatformSpec {
    fn default() -> Self {
        Self {
            login_url: "https://www.zhaopin.example/login".to_string(),
            login_url_pattern: "/login".to_string(),
            qr_selector: ".login-qr img".to_string(),
            error_selector: ".login-error, .risk-warning".to_string(),
            authenticated_selector: ".user-avatar, .header-username".to_string(),
            auth_lost_selector: ".login-dialog, .relogin-tip".to_string(),
            apply_selector: ".apply-button".to_string(),
            submitted_selector: ".apply-success, .applied-tag".to_string(),
            already_applied_selector: ".applied-tag".to_string(),
        }
    }
}

/// Raw observation of the login page, reported by the agent.
///
/// The detector turns one of these into a tagged login signal; the driver
/// itself draws no conclusions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginProbe {
    pub current_url: String,
    pub error_marker_present: bool,
    pub authenticated_marker_present: bool,
}

/// Outcome of one submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Submitted,
    AlreadyApplied,
    /// The platform dropped the authenticated session.
    AuthLost,
    /// The platform rejected the submission (listing closed, quota, ...).
    Rejected { message: String },
}

/// Driver-level errors, classified so the delivery loop can tell transient
/// failures (retried once per item) from fatal ones.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("browser operation timed out: {0}")]
    Timeout(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("browser process crashed: {0}")]
    Crashed(String),
    #[error("failed to launch browser runtime: {0}")]
    Launch(String),
    #[error("driver protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Whether a single retry is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Navigation(_))
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Navigation and extraction primitives the state machines drive.
///
/// Every round-trip carries an explicit timeout; none may block a scheduler
/// thread indefinitely.
#[async_trait]
pub trait BrowserDriver: Send {
    fn mode(&self) -> BrowserMode;

    /// Navigate the page to a URL.
    async fn goto(&mut self, url: &str, timeout: Duration) -> DriverResult<()>;

    /// Observe the current page state for the login detector.
    async fn probe_login(&mut self, timeout: Duration) -> DriverResult<LoginProbe>;

    /// Capture the login QR element as a base64 PNG, if it is rendered.
    async fn capture_qr(&mut self, timeout: Duration) -> DriverResult<Option<String>>;

    /// Export all cookies from the browser context.
    async fn export_cookies(&mut self, timeout: Duration) -> DriverResult<Vec<Cookie>>;

    /// The user-agent string of the live context.
    async fn user_agent(&mut self, timeout: Duration) -> DriverResult<String>;

    /// Inject cookies into the browser context.
    async fn import_cookies(&mut self, cookies: &[Cookie], timeout: Duration) -> DriverResult<()>;

    /// Navigate to a listing and attempt to submit an application.
    async fn submit_application(
        &mut self,
        listing_url: &str,
        timeout: Duration,
    ) -> DriverResult<SubmitOutcome>;

    /// Tear down the browser instance. Idempotent.
    async fn close(&mut self) -> DriverResult<()>;
}

/// Launches driver instances. One driver per tenant-session; switching
/// modes is always `close()` followed by a fresh `launch`.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(
        &self,
        tenant_id: &str,
        mode: BrowserMode,
        user_agent: Option<&str>,
    ) -> DriverResult<Box<dyn BrowserDriver>>;
}

/// Result of probing the local environment for browser prerequisites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeProbe {
    pub node_available: bool,
    pub node_version: Option<String>,
    pub playwright_package_available: bool,
    pub chromium_cache_detected: bool,
    pub ready: bool,
    pub notes: Vec<String>,
}

/// Check Node.js and Playwright availability.
pub async fn probe_runtime() -> RuntimeProbe {
    let mut probe = RuntimeProbe {
        node_available: false,
        node_version: None,
        playwright_package_available: false,
        chromium_cache_detected: false,
        ready: false,
        notes: Vec::new(),
    };

    if let Ok(output) = run_command_capture("node", &["--version".to_string()], 10).await
        && output.exit_code == 0
    {
        probe.node_available = true;
        probe.node_version = Some(output.stdout.trim().to_string());
    }

    if probe.node_available {
        let playwright = run_command_capture(
            "node",
            &[
                "--input-type=module".to_string(),
                "-e".to_string(),
                "import('playwright').then(() => process.exit(0)).catch(() => process.exit(1));"
                    .to_string(),
            ],
            15,
        )
        .await;
        probe.playwright_package_available =
            playwright.map(|out| out.exit_code == 0).unwrap_or(false);
    }

    probe.chromium_cache_detected = detect_chromium_cache();
    probe.ready = probe.node_available && probe.playwright_package_available;

    if !probe.node_available {
        probe
            .notes
            .push("Node.js not found. Install Node.js 20+ to enable browser automation.".to_string());
    }
    if probe.node_available && !probe.playwright_package_available {
        probe
            .notes
            .push("Playwright npm package not found. Run: npm i -D playwright".to_string());
    }
    if probe.ready && !probe.chromium_cache_detected {
        probe.notes.push(
            "Chromium binary not found in Playwright cache. Run: npx playwright install chromium"
                .to_string(),
        );
    }

    probe
}

/// Factory for [`PlaywrightDriver`] instances.
pub struct PlaywrightFactory {
    root_dir: PathBuf,
    spec: Arc<PlatformSpec>,
}

impl PlaywrightFactory {
    pub fn new(root_dir: PathBuf, spec: Arc<PlatformSpec>) -> Self {
        Self { root_dir, spec }
    }

    /// Root under `AUTOSEEK_BROWSER_DIR` or the working directory.
    pub fn with_default_root(spec: Arc<PlatformSpec>) -> Self {
        let root = std::env::var("AUTOSEEK_BROWSER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::current_dir()
                    .unwrap_or_else(|_| std::env::temp_dir())
                    .join(".autoseek-browser")
            });
        Self::new(root, spec)
    }
}

#[async_trait]
impl DriverFactory for PlaywrightFactory {
    async fn launch(
        &self,
        tenant_id: &str,
        mode: BrowserMode,
        user_agent: Option<&str>,
    ) -> DriverResult<Box<dyn BrowserDriver>> {
        let driver = PlaywrightDriver::launch(
            &self.root_dir,
            self.spec.clone(),
            tenant_id,
            mode,
            user_agent,
            Duration::from_secs(DEFAULT_LAUNCH_TIMEOUT_SECS),
        )
        .await?;
        Ok(Box::new(driver))
    }
}

/// Driver backed by a long-lived Node.js/Playwright runner process.
///
/// The runner holds one persistent browser context per driver instance and
/// reads JSON command lines from stdin; every command produces exactly one
/// `__AUTOSEEK_RESULT__=`-prefixed JSON line on stdout.
pub struct PlaywrightDriver {
    mode: BrowserMode,
    session_dir: PathBuf,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    closed: bool,
}

impl PlaywrightDriver {
    async fn launch(
        root_dir: &Path,
        spec: Arc<PlatformSpec>,
        tenant_id: &str,
        mode: BrowserMode,
        user_agent: Option<&str>,
        launch_timeout: Duration,
    ) -> DriverResult<Self> {
        // A fresh profile dir per launch keeps interactive-mode artifacts
        // out of headless runs.
        let session_dir = root_dir.join(format!("{}-{}", tenant_id, Uuid::new_v4()));
        let profile_dir = session_dir.join("profile");
        std::fs::create_dir_all(&profile_dir)
            .map_err(|e| DriverError::Launch(format!("create profile dir: {e}")))?;

        let script = build_runner_script(&spec, &profile_dir, mode, user_agent);
        let script_path = session_dir.join("runner.mjs");
        std::fs::write(&script_path, script)
            .map_err(|e| DriverError::Launch(format!("write runner script: {e}")))?;

        let mut child = Command::new("node")
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::Launch(format!("spawn node: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::Launch("runner stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Launch("runner stdout unavailable".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        // The runner prints a ready marker once the browser context is up.
        let ready = timeout(launch_timeout, async {
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim() == READY_MARKER {
                    return true;
                }
            }
            false
        })
        .await;

        match ready {
            Ok(true) => {}
            Ok(false) => {
                return Err(DriverError::Launch(
                    "runner exited before signalling ready".to_string(),
                ));
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(DriverError::Launch(format!(
                    "browser did not become ready within {}s",
                    launch_timeout.as_secs()
                )));
            }
        }

        debug!(tenant_id, ?mode, dir = %session_dir.display(), "browser runner ready");

        Ok(Self {
            mode,
            session_dir,
            child,
            stdin,
            stdout: lines,
            closed: false,
        })
    }

    /// Send one command and wait for its marked result line.
    async fn call(&mut self, command: Value, limit: Duration) -> DriverResult<Value> {
        if self.closed {
            return Err(DriverError::Crashed("driver already closed".to_string()));
        }

        let mut line = command.to_string();
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| DriverError::Crashed(format!("runner stdin: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| DriverError::Crashed(format!("runner stdin: {e}")))?;

        let response = timeout(limit, async {
            loop {
                match self.stdout.next_line().await {
                    Ok(Some(raw)) => {
                        if let Some(rest) = raw.strip_prefix(RESULT_MARKER) {
                            return Ok(rest.trim().to_string());
                        }
                        // Anything else is runner/browser chatter.
                        debug!(line = %raw, "runner output");
                    }
                    Ok(None) => {
                        return Err(DriverError::Crashed(
                            "runner closed its stdout".to_string(),
                        ));
                    }
                    Err(e) => return Err(DriverError::Crashed(format!("runner stdout: {e}"))),
                }
            }
        })
        .await
        .map_err(|_| {
            DriverError::Timeout(format!(
                "no response within {}ms",
                limit.as_millis()
            ))
        })??;

        let value: Value = serde_json::from_str(&response)
            .map_err(|e| DriverError::Protocol(format!("malformed result line: {e}")))?;

        if value.get("success").and_then(Value::as_bool) == Some(true) {
            Ok(value.get("result").cloned().unwrap_or(Value::Null))
        } else {
            let message = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown runner error")
                .to_string();
            if message.contains("Timeout") || message.contains("timeout") {
                Err(DriverError::Timeout(message))
            } else if message.contains("net::") || message.contains("NS_ERROR") {
                Err(DriverError::Navigation(message))
            } else {
                Err(DriverError::Protocol(message))
            }
        }
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    fn mode(&self) -> BrowserMode {
        self.mode
    }

    async fn goto(&mut self, url: &str, limit: Duration) -> DriverResult<()> {
        self.call(
            json!({ "op": "goto", "url": url, "timeout_ms": limit.as_millis() as u64 }),
            limit + Duration::from_secs(5),
        )
        .await
        .map(|_| ())
    }

    async fn probe_login(&mut self, limit: Duration) -> DriverResult<LoginProbe> {
        let value = self
            .call(json!({ "op": "probe" }), limit)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| DriverError::Protocol(format!("malformed probe result: {e}")))
    }

    async fn capture_qr(&mut self, limit: Duration) -> DriverResult<Option<String>> {
        let value = self.call(json!({ "op": "qr" }), limit).await?;
        Ok(value
            .get("image_b64")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn export_cookies(&mut self, limit: Duration) -> DriverResult<Vec<Cookie>> {
        let value = self.call(json!({ "op": "export_cookies" }), limit).await?;
        let raw: Vec<RawCookie> = serde_json::from_value(value)
            .map_err(|e| DriverError::Protocol(format!("malformed cookies: {e}")))?;
        Ok(raw.into_iter().map(RawCookie::into_cookie).collect())
    }

    async fn user_agent(&mut self, limit: Duration) -> DriverResult<String> {
        let value = self.call(json!({ "op": "user_agent" }), limit).await?;
        value
            .get("user_agent")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("missing user_agent field".to_string()))
    }

    async fn import_cookies(&mut self, cookies: &[Cookie], limit: Duration) -> DriverResult<()> {
        let raw: Vec<RawCookie> = cookies.iter().map(RawCookie::from_cookie).collect();
        self.call(
            json!({ "op": "import_cookies", "cookies": raw }),
            limit,
        )
        .await
        .map(|_| ())
    }

    async fn submit_application(
        &mut self,
        listing_url: &str,
        limit: Duration,
    ) -> DriverResult<SubmitOutcome> {
        let value = self
            .call(
                json!({
                    "op": "submit",
                    "url": listing_url,
                    "timeout_ms": limit.as_millis() as u64,
                }),
                limit + Duration::from_secs(5),
            )
            .await?;
        parse_submit_outcome(&value)
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Best effort orderly shutdown before killing the process.
        let mut line = json!({ "op": "close" }).to_string();
        line.push('\n');
        let _ = self.stdin.write_all(line.as_bytes()).await;
        let _ = self.stdin.flush().await;
        let _ = timeout(Duration::from_secs(5), self.child.wait()).await;
        let _ = self.child.kill().await;

        if self.session_dir.exists()
            && let Err(e) = std::fs::remove_dir_all(&self.session_dir)
        {
            warn!(dir = %self.session_dir.display(), error = %e, "failed to remove session dir");
        }
        Ok(())
    }
}

fn parse_submit_outcome(value: &Value) -> DriverResult<SubmitOutcome> {
    match value.get("outcome").and_then(Value::as_str) {
        Some("submitted") => Ok(SubmitOutcome::Submitted),
        Some("already_applied") => Ok(SubmitOutcome::AlreadyApplied),
        Some("auth_lost") => Ok(SubmitOutcome::AuthLost),
        Some("rejected") => Ok(SubmitOutcome::Rejected {
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("submission rejected")
                .to_string(),
        }),
        other => Err(DriverError::Protocol(format!(
            "unknown submit outcome: {other:?}"
        ))),
    }
}

/// Cookie in Playwright's own shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    /// Seconds since epoch; -1 marks a session cookie.
    #[serde(default = "session_expiry")]
    expires: f64,
    #[serde(default)]
    secure: bool,
    #[serde(default, rename = "httpOnly")]
    http_only: bool,
    #[serde(default, rename = "sameSite")]
    same_site: Option<String>,
}

fn session_expiry() -> f64 {
    -1.0
}

impl RawCookie {
    fn into_cookie(self) -> Cookie {
        Cookie {
            name: self.name,
            value: self.value,
            domain: self.domain,
            path: self.path,
            expires_ms: if self.expires < 0.0 {
                None
            } else {
                Some((self.expires * 1000.0) as i64)
            },
            secure: self.secure,
            http_only: self.http_only,
            same_site: match self.same_site.as_deref() {
                Some("Strict") => SameSite::Strict,
                Some("None") => SameSite::None,
                _ => SameSite::Lax,
            },
        }
    }

    fn from_cookie(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            expires: cookie
                .expires_ms
                .map(|ms| ms as f64 / 1000.0)
                .unwrap_or(-1.0),
            secure: cookie.secure,
            http_only: cookie.http_only,
            same_site: Some(
                match cookie.same_site {
                    SameSite::Strict => "Strict",
                    SameSite::Lax => "Lax",
                    SameSite::None => "None",
                }
                .to_string(),
            ),
        }
    }
}

/// Generate the Node.js runner executed by [`PlaywrightDriver`].
fn build_runner_script(
    spec: &PlatformSpec,
    profile_dir: &Path,
    mode: BrowserMode,
    user_agent: Option<&str>,
) -> String {
    let config = json!({
        "profileDir": profile_dir.display().to_string(),
        "headless": mode.is_headless(),
        "userAgent": user_agent,
        "spec": spec,
    })
    .to_string();

    let mut script = String::new();
    script.push_str("import readline from 'node:readline';\n");
    script.push_str("import { chromium } from 'playwright';\n\n");
    script.push_str("const RESULT_MARKER = '__AUTOSEEK_RESULT__=';\n");
    script.push_str(&format!("const config = {config};\n"));
    script.push_str("const spec = config.spec;\n\n");

    script.push_str("const contextOptions = { headless: config.headless };\n");
    script.push_str("if (config.userAgent) {\n");
    script.push_str("  contextOptions.userAgent = config.userAgent;\n");
    script.push_str("}\n");
    script.push_str(
        "const context = await chromium.launchPersistentContext(config.profileDir, contextOptions);\n",
    );
    script.push_str("const page = context.pages()[0] ?? await context.newPage();\n");
    script.push_str("process.stdout.write('__AUTOSEEK_READY__\\n');\n\n");

    script.push_str("function reply(payload) {\n");
    script.push_str("  process.stdout.write(`${RESULT_MARKER}${JSON.stringify(payload)}\\n`);\n");
    script.push_str("}\n\n");

    script.push_str("async function present(selector) {\n");
    script.push_str("  return (await page.locator(selector).count()) > 0;\n");
    script.push_str("}\n\n");

    script.push_str("async function execute(command) {\n");
    script.push_str("  switch (command.op) {\n");
    script.push_str("    case 'goto': {\n");
    script.push_str(
        "      await page.goto(command.url, { waitUntil: 'load', timeout: command.timeout_ms ?? 30000 });\n",
    );
    script.push_str("      return { url: page.url() };\n");
    script.push_str("    }\n");
    script.push_str("    case 'probe': {\n");
    script.push_str("      return {\n");
    script.push_str("        current_url: page.url(),\n");
    script.push_str("        error_marker_present: await present(spec.error_selector),\n");
    script.push_str(
        "        authenticated_marker_present: await present(spec.authenticated_selector),\n",
    );
    script.push_str("      };\n");
    script.push_str("    }\n");
    script.push_str("    case 'qr': {\n");
    script.push_str("      const locator = page.locator(spec.qr_selector).first();\n");
    script.push_str("      if ((await locator.count()) === 0) {\n");
    script.push_str("        return { image_b64: null };\n");
    script.push_str("      }\n");
    script.push_str("      const buffer = await locator.screenshot();\n");
    script.push_str("      return { image_b64: buffer.toString('base64') };\n");
    script.push_str("    }\n");
    script.push_str("    case 'export_cookies': {\n");
    script.push_str("      return await context.cookies();\n");
    script.push_str("    }\n");
    script.push_str("    case 'user_agent': {\n");
    script.push_str(
        "      return { user_agent: await page.evaluate(() => navigator.userAgent) };\n",
    );
    script.push_str("    }\n");
    script.push_str("    case 'import_cookies': {\n");
    script.push_str("      await context.addCookies(command.cookies);\n");
    script.push_str("      return {};\n");
    script.push_str("    }\n");
    script.push_str("    case 'submit': {\n");
    script.push_str("      const timeoutMs = command.timeout_ms ?? 45000;\n");
    script.push_str(
        "      await page.goto(command.url, { waitUntil: 'load', timeout: timeoutMs });\n",
    );
    script.push_str("      if (await present(spec.auth_lost_selector)) {\n");
    script.push_str("        return { outcome: 'auth_lost' };\n");
    script.push_str("      }\n");
    script.push_str("      if (await present(spec.already_applied_selector)) {\n");
    script.push_str("        return { outcome: 'already_applied' };\n");
    script.push_str("      }\n");
    script.push_str("      const apply = page.locator(spec.apply_selector).first();\n");
    script.push_str("      await apply.waitFor({ state: 'visible', timeout: timeoutMs });\n");
    script.push_str("      await apply.click({ timeout: timeoutMs });\n");
    script.push_str("      try {\n");
    script.push_str(
        "        await page.locator(spec.submitted_selector).first().waitFor({ state: 'visible', timeout: timeoutMs });\n",
    );
    script.push_str("        return { outcome: 'submitted' };\n");
    script.push_str("      } catch (_) {\n");
    script.push_str("        if (await present(spec.auth_lost_selector)) {\n");
    script.push_str("          return { outcome: 'auth_lost' };\n");
    script.push_str("        }\n");
    script.push_str(
        "        return { outcome: 'rejected', message: 'no submission confirmation' };\n",
    );
    script.push_str("      }\n");
    script.push_str("    }\n");
    script.push_str("    case 'close': {\n");
    script.push_str("      await context.close().catch(() => {});\n");
    script.push_str("      process.exit(0);\n");
    script.push_str("    }\n");
    script.push_str("    default:\n");
    script.push_str("      throw new Error(`Unsupported op: ${command.op}`);\n");
    script.push_str("  }\n");
    script.push_str("}\n\n");

    script.push_str("const rl = readline.createInterface({ input: process.stdin });\n");
    script.push_str("for await (const line of rl) {\n");
    script.push_str("  if (!line.trim()) continue;\n");
    script.push_str("  let command;\n");
    script.push_str("  try {\n");
    script.push_str("    command = JSON.parse(line);\n");
    script.push_str("  } catch (error) {\n");
    script.push_str("    reply({ success: false, error: `bad command: ${error}` });\n");
    script.push_str("    continue;\n");
    script.push_str("  }\n");
    script.push_str("  try {\n");
    script.push_str("    const result = await execute(command);\n");
    script.push_str("    reply({ success: true, result });\n");
    script.push_str("  } catch (error) {\n");
    script.push_str("    const message = error && error.message ? error.message : String(error);\n");
    script.push_str("    reply({ success: false, error: message });\n");
    script.push_str("  }\n");
    script.push_str("}\n");

    script
}

struct CommandCapture {
    exit_code: i32,
    stdout: String,
}

async fn run_command_capture(
    program: &str,
    args: &[String],
    timeout_secs: u64,
) -> anyhow::Result<CommandCapture> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = match timeout(Duration::from_secs(timeout_secs), command.output()).await {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("command timed out after {} seconds", timeout_secs),
    };

    Ok(CommandCapture {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
    })
}

fn detect_chromium_cache() -> bool {
    if let Ok(path) = std::env::var("PLAYWRIGHT_BROWSERS_PATH")
        && PathBuf::from(path).exists()
    {
        return true;
    }

    let mut candidates = Vec::new();
    if let Ok(home) = std::env::var("HOME") {
        candidates.push(PathBuf::from(&home).join(".cache/ms-playwright"));
        candidates.push(PathBuf::from(&home).join("Library/Caches/ms-playwright"));
    }
    if let Ok(user_profile) = std::env::var("USERPROFILE") {
        candidates.push(PathBuf::from(user_profile).join("AppData/Local/ms-playwright"));
    }
    candidates.into_iter().any(|path| path.exists())
}
