//! Per-tenant status hub.
//!
//! One `watch` channel per tenant holds the latest status snapshot. Both
//! control-channel adapters read from here, so the "eventually-consistent
//! latest status" contract is implemented once: a slow consumer skips
//! intermediate snapshots but can never observe the machine going
//! backwards, because only the owning state machine publishes.

use dashmap::DashMap;
use tokio::sync::watch;

use autoseek_models::StatusEvent;

/// Latest-status fan-out, partitioned by tenant.
#[derive(Default)]
pub struct StatusHub {
    channels: DashMap<String, watch::Sender<Option<StatusEvent>>>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, tenant_id: &str) -> watch::Sender<Option<StatusEvent>> {
        self.channels
            .entry(tenant_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .clone()
    }

    /// Publish the latest snapshot for a tenant, superseding any prior one.
    pub fn publish(&self, tenant_id: &str, event: StatusEvent) {
        self.sender(tenant_id).send_replace(Some(event));
    }

    /// The current snapshot, if any state machine has run for this tenant.
    pub fn snapshot(&self, tenant_id: &str) -> Option<StatusEvent> {
        self.channels
            .get(tenant_id)
            .and_then(|sender| sender.borrow().clone())
    }

    /// Subscribe to snapshot updates for a tenant.
    pub fn subscribe(&self, tenant_id: &str) -> watch::Receiver<Option<StatusEvent>> {
        self.sender(tenant_id).subscribe()
    }
}
