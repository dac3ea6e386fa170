//! Automation service - single command ingress and per-tenant scheduling.
//!
//! Holds the per-tenant runtime registry: at most one login and one
//! delivery task per tenant, each an isolated tokio task owning its own
//! browser driver. Cross-machine state flows only through the session
//! store; tasks share nothing else.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use autoseek_browser::DriverFactory;
use autoseek_models::{
    CancelScope, Command, DeliveryConfig, DeliveryJob, LoginSession, SessionArtifact,
    SessionValidity, StatusEvent,
};
use autoseek_storage::Storage;

use crate::config::AutomationConfig;
use crate::cookies::parse_cookie_payload;
use crate::delivery::{DeliveryContext, ListingSource, run_delivery};
use crate::error::{AutomationError, Result};
use crate::login::{LoginContext, run_login};
use crate::status::StatusHub;

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Front door for the automation subsystem, one instance per process,
/// serving many tenants concurrently.
pub struct AutomationService {
    storage: Arc<Storage>,
    factory: Arc<dyn DriverFactory>,
    listings: Arc<dyn ListingSource>,
    hub: Arc<StatusHub>,
    config: Arc<AutomationConfig>,
    logins: DashMap<String, RunHandle>,
    deliveries: DashMap<String, RunHandle>,
}

impl AutomationService {
    pub fn new(
        storage: Arc<Storage>,
        factory: Arc<dyn DriverFactory>,
        listings: Arc<dyn ListingSource>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            storage,
            factory,
            listings,
            hub: Arc::new(StatusHub::new()),
            config: Arc::new(config),
            logins: DashMap::new(),
            deliveries: DashMap::new(),
        }
    }

    pub fn hub(&self) -> Arc<StatusHub> {
        self.hub.clone()
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Dispatch a control command for a tenant.
    ///
    /// Setup errors are returned synchronously; everything after acceptance
    /// surfaces as status events only.
    pub fn handle_command(&self, tenant_id: &str, command: Command) -> Result<()> {
        match command {
            Command::Login => self.start_login(tenant_id),
            Command::Deliver { config } => self.start_delivery(tenant_id, config),
            Command::Cancel { scope } => self.cancel(tenant_id, scope),
        }
    }

    /// Start the interactive login ceremony for a tenant.
    pub fn start_login(&self, tenant_id: &str) -> Result<()> {
        self.spawn_machine(&self.logins, tenant_id, CancelScope::Login, |cancel| {
            let ctx = LoginContext {
                tenant_id: tenant_id.to_string(),
                storage: self.storage.clone(),
                factory: self.factory.clone(),
                hub: self.hub.clone(),
                config: self.config.clone(),
                cancel,
            };
            tokio::spawn(run_login(ctx))
        })
    }

    /// Start a delivery run for a tenant.
    pub fn start_delivery(&self, tenant_id: &str, config: DeliveryConfig) -> Result<()> {
        // Reject before reserving the run slot when no usable jar exists,
        // so the caller learns synchronously that login has to run first.
        if self.storage.sessions.get_usable(tenant_id)?.is_none() {
            return Err(AutomationError::NoSession);
        }

        self.spawn_machine(&self.deliveries, tenant_id, CancelScope::Delivery, |cancel| {
            let ctx = DeliveryContext {
                tenant_id: tenant_id.to_string(),
                storage: self.storage.clone(),
                factory: self.factory.clone(),
                listings: self.listings.clone(),
                hub: self.hub.clone(),
                config: self.config.clone(),
                delivery_config: config,
                cancel,
            };
            tokio::spawn(run_delivery(ctx))
        })
    }

    /// Request cooperative cancellation of a running machine.
    ///
    /// Observed at the machine's next safe checkpoint, never mid-flight.
    /// Idempotent; cancelling when nothing runs is a no-op.
    pub fn cancel(&self, tenant_id: &str, scope: CancelScope) -> Result<()> {
        let registry = match scope {
            CancelScope::Login => &self.logins,
            CancelScope::Delivery => &self.deliveries,
        };
        if let Some(handle) = registry.get(tenant_id) {
            info!(tenant_id, %scope, "cancellation requested");
            handle.cancel.cancel();
        }
        Ok(())
    }

    /// Accept a raw manual cookie payload for a tenant.
    ///
    /// The payload is parsed into the canonical jar shape and runs through
    /// the identical required-key validation as an extracted jar.
    pub fn import_manual_cookies(&self, tenant_id: &str, payload: &str) -> Result<()> {
        let cookies = parse_cookie_payload(payload, &self.config.cookie_domain)?;
        let artifact = SessionArtifact::new(cookies, self.config.fallback_user_agent.clone())
            .with_validity(SessionValidity::Valid);
        self.storage.sessions.put(tenant_id, &artifact)?;
        info!(tenant_id, "manual cookie payload accepted");
        Ok(())
    }

    /// Current login session record, honoring the terminal grace window:
    /// a terminal record older than the grace is destroyed and no longer
    /// reported.
    pub fn login_session(&self, tenant_id: &str) -> Result<Option<LoginSession>> {
        let Some(record) = self.storage.login_sessions.get(tenant_id)? else {
            return Ok(None);
        };
        if record.status.is_terminal()
            && let Some(finished_at) = record.finished_at_ms
        {
            let age_ms = Utc::now().timestamp_millis() - finished_at;
            if age_ms > self.config.terminal_grace.as_millis() as i64 {
                self.storage.login_sessions.delete(tenant_id)?;
                return Ok(None);
            }
        }
        Ok(Some(record))
    }

    /// Current delivery job record.
    pub fn delivery_job(&self, tenant_id: &str) -> Result<Option<DeliveryJob>> {
        Ok(self.storage.delivery_jobs.get(tenant_id)?)
    }

    /// Latest status snapshot for a tenant.
    pub fn snapshot(&self, tenant_id: &str) -> Option<StatusEvent> {
        self.hub.snapshot(tenant_id)
    }

    /// Publish a command rejection as an error status event. Used by
    /// fire-and-forget transports that cannot return the error.
    pub(crate) fn report_rejection(&self, tenant_id: &str, error: &AutomationError) {
        warn!(tenant_id, %error, "command rejected");
        self.hub
            .publish(tenant_id, StatusEvent::error(error.to_string()));
    }

    /// Wait for the tenant's running machines to finish. Test and shutdown
    /// helper; commands keep being accepted meanwhile.
    pub async fn join(&self, tenant_id: &str) {
        if let Some((_, handle)) = self.logins.remove(tenant_id) {
            let _ = handle.task.await;
        }
        if let Some((_, handle)) = self.deliveries.remove(tenant_id) {
            let _ = handle.task.await;
        }
    }

    /// Reserve the tenant's run slot and spawn the machine into it.
    ///
    /// The map entry is held across the check and the insert, so two
    /// concurrent starts can never both be admitted: the loser observes
    /// the winner's unfinished task and is rejected. A finished task still
    /// occupying the slot is replaced in place.
    fn spawn_machine(
        &self,
        registry: &DashMap<String, RunHandle>,
        tenant_id: &str,
        scope: CancelScope,
        spawn: impl FnOnce(CancellationToken) -> JoinHandle<()>,
    ) -> Result<()> {
        match registry.entry(tenant_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().task.is_finished() {
                    return Err(AutomationError::AlreadyRunning { scope });
                }
                let cancel = CancellationToken::new();
                let task = spawn(cancel.clone());
                occupied.insert(RunHandle { cancel, task });
            }
            Entry::Vacant(vacant) => {
                let cancel = CancellationToken::new();
                let task = spawn(cancel.clone());
                vacant.insert(RunHandle { cancel, task });
            }
        }
        Ok(())
    }
}
