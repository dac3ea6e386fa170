//! Session artifact store with required-key validation.
//!
//! A jar is usable only if it carries every cookie in the platform-defined
//! required-key set; partial jars are rejected at ingestion and never
//! partially trusted. Artifacts are replaced wholesale in a single write
//! transaction, so no reader ever observes a mixed jar.

use anyhow::Result;
use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::sync::Arc;
use tracing::{debug, info};

use autoseek_models::{SessionArtifact, SessionValidity};

const SESSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("session_artifacts");

/// Errors the ingestion boundary must distinguish.
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session artifact is missing required cookies: {}", missing.join(", "))]
    IncompleteSession { missing: Vec<String> },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Per-tenant durable store of session artifacts.
#[derive(Debug, Clone)]
pub struct SessionStore {
    db: Arc<Database>,
    required_keys: Vec<String>,
}

impl SessionStore {
    pub fn new(db: Arc<Database>, required_keys: Vec<String>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(SESSIONS_TABLE)?;
        write_txn.commit()?;

        Ok(Self { db, required_keys })
    }

    /// The platform-defined required-key set.
    pub fn required_keys(&self) -> &[String] {
        &self.required_keys
    }

    /// Validate and store a jar, replacing any prior jar for the tenant.
    ///
    /// Rejects with `IncompleteSession` when required cookies are missing;
    /// on rejection the prior jar (or absence thereof) is left untouched.
    pub fn put(&self, tenant_id: &str, artifact: &SessionArtifact) -> Result<(), SessionStoreError> {
        let missing = artifact.missing_keys(&self.required_keys);
        if !missing.is_empty() {
            debug!(tenant_id, ?missing, "rejecting incomplete session artifact");
            return Err(SessionStoreError::IncompleteSession { missing });
        }

        let data = serde_json::to_vec(artifact).map_err(anyhow::Error::from)?;
        self.write(tenant_id, &data)?;
        info!(
            tenant_id,
            cookies = artifact.cookies.len(),
            "session artifact stored"
        );
        Ok(())
    }

    /// Fetch the tenant's artifact.
    ///
    /// When a required cookie carries an expiry in the past, the returned
    /// artifact reports `Expired` regardless of the stored validity; the
    /// stored bytes are left untouched.
    pub fn get(&self, tenant_id: &str) -> Result<Option<SessionArtifact>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSIONS_TABLE)?;

        let Some(data) = table.get(tenant_id)? else {
            return Ok(None);
        };
        let mut artifact: SessionArtifact = serde_json::from_slice(data.value())?;

        let now_ms = Utc::now().timestamp_millis();
        if artifact.validity == SessionValidity::Valid
            && artifact.required_expired(&self.required_keys, now_ms)
        {
            artifact.validity = SessionValidity::Expired;
        }

        Ok(Some(artifact))
    }

    /// Fetch the artifact only if it is currently usable for delivery.
    pub fn get_usable(&self, tenant_id: &str) -> Result<Option<SessionArtifact>> {
        Ok(self
            .get(tenant_id)?
            .filter(|artifact| artifact.validity == SessionValidity::Valid))
    }

    /// Mark the tenant's artifact invalid. Idempotent; a missing artifact
    /// is a no-op.
    pub fn invalidate(&self, tenant_id: &str, reason: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;
            let existing = table.get(tenant_id)?.map(|data| data.value().to_vec());
            if let Some(data) = existing {
                let mut artifact: SessionArtifact = serde_json::from_slice(&data)?;
                artifact.validity = SessionValidity::Invalid;
                artifact.invalid_reason = Some(reason.to_string());
                let updated = serde_json::to_vec(&artifact)?;
                table.insert(tenant_id, updated.as_slice())?;
                info!(tenant_id, reason, "session artifact invalidated");
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Delete the tenant's artifact. Idempotent.
    pub fn clear(&self, tenant_id: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;
            table.remove(tenant_id)?.is_some()
        };
        write_txn.commit()?;
        if existed {
            info!(tenant_id, "session artifact cleared");
        }
        Ok(())
    }

    /// Tenants that currently have a stored artifact.
    pub fn list_tenants(&self) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSIONS_TABLE)?;

        let mut tenants = Vec::new();
        for item in table.iter()? {
            let (key, _) = item?;
            tenants.push(key.value().to_string());
        }
        Ok(tenants)
    }

    fn write(&self, tenant_id: &str, data: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;
            table.insert(tenant_id, data)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
