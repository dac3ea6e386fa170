//! AutoSeek persistence layer.
//!
//! Uses redb as the embedded database, one table per entity type, with
//! serde_json payloads keyed by tenant id. redb serializes write
//! transactions process-wide, which is what gives `put`/`invalidate`/
//! `clear` on the session store their linearizability contract.
//!
//! # Tables
//!
//! - `session_artifacts` - extracted cookie jars plus validity metadata
//! - `login_sessions` - per-tenant login ceremony records
//! - `delivery_jobs` - per-tenant delivery run records

pub mod delivery_job;
pub mod login_session;
pub mod session;

use anyhow::Result;
use redb::Database;
use std::sync::Arc;

pub use delivery_job::DeliveryJobStorage;
pub use login_session::LoginSessionStorage;
pub use session::{SessionStore, SessionStoreError};

/// Central storage manager that initializes all storage subsystems.
pub struct Storage {
    db: Arc<Database>,
    pub sessions: SessionStore,
    pub login_sessions: LoginSessionStorage,
    pub delivery_jobs: DeliveryJobStorage,
}

impl Storage {
    /// Create a storage instance at the given path.
    ///
    /// Creates the database file if it does not exist and opens all
    /// required tables. `required_keys` is the platform-defined set of
    /// cookie names a session artifact must carry to be accepted.
    pub fn new(path: &str, required_keys: Vec<String>) -> Result<Self> {
        let db = Arc::new(Database::create(path)?);

        let sessions = SessionStore::new(db.clone(), required_keys)?;
        let login_sessions = LoginSessionStorage::new(db.clone())?;
        let delivery_jobs = DeliveryJobStorage::new(db.clone())?;

        Ok(Self {
            db,
            sessions,
            login_sessions,
            delivery_jobs,
        })
    }

    /// Get a reference to the underlying database.
    pub fn get_db(&self) -> Arc<Database> {
        self.db.clone()
    }

    /// Remove everything stored for a tenant. Used on account deletion.
    pub fn purge_tenant(&self, tenant_id: &str) -> Result<()> {
        self.sessions.clear(tenant_id)?;
        self.login_sessions.delete(tenant_id)?;
        self.delivery_jobs.delete(tenant_id)?;
        Ok(())
    }
}
