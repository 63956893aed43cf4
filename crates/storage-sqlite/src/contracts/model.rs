//! Database model for cached contract snapshots.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use fieldkit_core::contracts::{CachedRecord, ContractRecordSnapshot};
use fieldkit_core::Result;

use crate::db::{timestamp_from_db, timestamp_to_db};

#[derive(
    Queryable,
    QueryableByName,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::contract_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ContractRecordDB {
    pub id: String,
    pub snapshot: String,
    pub cached_at: String,
}

impl ContractRecordDB {
    pub fn from_record(id: &str, record: &CachedRecord) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            snapshot: serde_json::to_string(&record.snapshot)?,
            cached_at: timestamp_to_db(&record.cached_at),
        })
    }
}

impl TryFrom<ContractRecordDB> for CachedRecord {
    type Error = fieldkit_core::Error;

    fn try_from(row: ContractRecordDB) -> Result<Self> {
        let snapshot: ContractRecordSnapshot = serde_json::from_str(&row.snapshot)?;
        Ok(CachedRecord {
            snapshot,
            cached_at: timestamp_from_db(&row.cached_at)?,
        })
    }
}
