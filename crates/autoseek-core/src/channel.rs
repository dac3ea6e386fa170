//! Control channel adapters.
//!
//! One abstract contract, two transport shapes: a push adapter for
//! persistent bidirectional connections (agent on a user-controlled
//! machine) and a poll adapter for request/response transports (agent
//! inside server infrastructure, e.g. QR snapshot delivery). Both share
//! the same service and status hub, so the correctness logic exists once;
//! the poll shape meets the ordering guarantee by always serving the
//! latest snapshot instead of a queued history.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_stream::wrappers::{IntervalStream, WatchStream};

use autoseek_models::{Command, StatusEvent};

use crate::service::AutomationService;

/// Abstract command/status transport between an issuer and the
/// orchestrator, independent of the wire.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// At-most-once, fire-and-forget command dispatch. Effects, including
    /// rejection reasons, are discovered via status snapshots only.
    async fn send(&self, tenant_id: &str, command: Command);

    /// The current status snapshot, if any machine has run for the tenant.
    async fn latest(&self, tenant_id: &str) -> Option<StatusEvent>;

    /// Lazy, potentially infinite sequence of status snapshots. Snapshots
    /// are monotone in the machine's transition order; individual ones may
    /// be skipped but never reordered.
    fn status_events(&self, tenant_id: &str) -> BoxStream<'static, StatusEvent>;
}

/// Persistent-connection adapter: pushes a snapshot whenever the owning
/// state machine publishes one.
pub struct PushControlChannel {
    service: Arc<AutomationService>,
}

impl PushControlChannel {
    pub fn new(service: Arc<AutomationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ControlChannel for PushControlChannel {
    async fn send(&self, tenant_id: &str, command: Command) {
        if let Err(error) = self.service.handle_command(tenant_id, command) {
            self.service.report_rejection(tenant_id, &error);
        }
    }

    async fn latest(&self, tenant_id: &str) -> Option<StatusEvent> {
        self.service.snapshot(tenant_id)
    }

    fn status_events(&self, tenant_id: &str) -> BoxStream<'static, StatusEvent> {
        let receiver = self.service.hub().subscribe(tenant_id);
        WatchStream::new(receiver)
            .filter_map(|snapshot| async move { snapshot })
            .boxed()
    }
}

/// Request/response adapter: computes the current snapshot on every
/// request; its event stream is a fixed-cadence poll of that snapshot.
pub struct PollControlChannel {
    service: Arc<AutomationService>,
    poll_interval: Duration,
}

impl PollControlChannel {
    pub fn new(service: Arc<AutomationService>, poll_interval: Duration) -> Self {
        Self {
            service,
            poll_interval,
        }
    }
}

#[async_trait]
impl ControlChannel for PollControlChannel {
    async fn send(&self, tenant_id: &str, command: Command) {
        if let Err(error) = self.service.handle_command(tenant_id, command) {
            self.service.report_rejection(tenant_id, &error);
        }
    }

    async fn latest(&self, tenant_id: &str) -> Option<StatusEvent> {
        self.service.snapshot(tenant_id)
    }

    fn status_events(&self, tenant_id: &str) -> BoxStream<'static, StatusEvent> {
        let service = self.service.clone();
        let tenant_id = tenant_id.to_string();
        let ticks = IntervalStream::new(tokio::time::interval(self.poll_interval));
        ticks
            .filter_map(move |_| {
                let service = service.clone();
                let tenant_id = tenant_id.clone();
                async move { service.snapshot(&tenant_id) }
            })
            .boxed()
    }
}
