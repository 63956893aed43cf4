use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sql_types::Text;
use diesel::SqliteConnection;
use log::debug;

use fieldkit_core::contracts::{
    validate_foreign_key_name, CachedRecord, ContractRecordSnapshot, LocalRecordStore,
};
use fieldkit_core::Result;

use super::model::ContractRecordDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::contract_records;

pub struct ContractRecordRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl ContractRecordRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }

    pub fn count(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let total = contract_records::table
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(total)
    }
}

#[async_trait]
impl LocalRecordStore for ContractRecordRepository {
    async fn put(&self, id: &str, snapshot: ContractRecordSnapshot) -> Result<CachedRecord> {
        let row = ContractRecordDB::from_record(id, &CachedRecord::new(snapshot))?;
        // Reported exactly as stored.
        let record = CachedRecord::try_from(row.clone())?;
        self.writer
            .exec(move |conn| {
                diesel::insert_into(contract_records::table)
                    .values(&row)
                    .on_conflict(contract_records::id)
                    .do_update()
                    .set((
                        contract_records::snapshot.eq(&row.snapshot),
                        contract_records::cached_at.eq(&row.cached_at),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await?;
        Ok(record)
    }

    fn get(&self, id: &str) -> Result<Option<CachedRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = contract_records::table
            .find(id)
            .first::<ContractRecordDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(CachedRecord::try_from).transpose()
    }

    fn list_by_foreign_key(&self, key: &str, value: &str) -> Result<Vec<CachedRecord>> {
        validate_foreign_key_name(key)?;
        let mut conn = get_connection(&self.pool)?;
        let rows = diesel::sql_query(
            "SELECT id, snapshot, cached_at FROM contract_records \
             WHERE CAST(json_extract(snapshot, ?) AS TEXT) = ? \
             ORDER BY cached_at DESC, id ASC",
        )
        .bind::<Text, _>(format!("$.{}", key))
        .bind::<Text, _>(value)
        .load::<ContractRecordDB>(&mut conn)
        .map_err(StorageError::from)?;
        debug!(
            "[OfflineSync] {} cached contract(s) with {} = {}",
            rows.len(),
            key,
            value
        );
        rows.into_iter().map(CachedRecord::try_from).collect()
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.writer
            .exec(move |conn| {
                let affected = diesel::delete(contract_records::table.find(id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(affected > 0)
            })
            .await
    }
}
