//! Login session storage - per-tenant login ceremony records.

use anyhow::Result;
use redb::{Database, ReadableDatabase, TableDefinition};
use std::sync::Arc;

use autoseek_models::LoginSession;

const LOGIN_SESSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("login_sessions");

/// Stores the current login session record per tenant. A new ceremony
/// overwrites the prior record, so history never accumulates here.
#[derive(Debug, Clone)]
pub struct LoginSessionStorage {
    db: Arc<Database>,
}

impl LoginSessionStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(LOGIN_SESSIONS_TABLE)?;
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Store the record, keyed by tenant.
    pub fn put(&self, session: &LoginSession) -> Result<()> {
        let data = serde_json::to_vec(session)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(LOGIN_SESSIONS_TABLE)?;
            table.insert(session.tenant_id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get the tenant's current record.
    pub fn get(&self, tenant_id: &str) -> Result<Option<LoginSession>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LOGIN_SESSIONS_TABLE)?;

        if let Some(data) = table.get(tenant_id)? {
            Ok(Some(serde_json::from_slice(data.value())?))
        } else {
            Ok(None)
        }
    }

    /// Delete the tenant's record, returns true if it existed.
    pub fn delete(&self, tenant_id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(LOGIN_SESSIONS_TABLE)?;
            table.remove(tenant_id)?.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }
}
