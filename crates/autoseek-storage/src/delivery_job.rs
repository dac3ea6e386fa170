//! Delivery job storage - per-tenant delivery run records.

use anyhow::Result;
use redb::{Database, ReadableDatabase, TableDefinition};
use std::sync::Arc;

use autoseek_models::DeliveryJob;

const DELIVERY_JOBS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("delivery_jobs");

/// Stores the current delivery job record per tenant.
#[derive(Debug, Clone)]
pub struct DeliveryJobStorage {
    db: Arc<Database>,
}

impl DeliveryJobStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(DELIVERY_JOBS_TABLE)?;
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Store the record, keyed by tenant.
    pub fn put(&self, job: &DeliveryJob) -> Result<()> {
        let data = serde_json::to_vec(job)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DELIVERY_JOBS_TABLE)?;
            table.insert(job.tenant_id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get the tenant's current record.
    pub fn get(&self, tenant_id: &str) -> Result<Option<DeliveryJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DELIVERY_JOBS_TABLE)?;

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
            let mut table = write_txn.open_table(DELIVERY_JOBS_TABLE)?;
            table.remove(tenant_id)?.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }
}
