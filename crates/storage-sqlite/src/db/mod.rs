//! Database setup: file location, pool, pragmas and embedded migrations.

pub mod write_actor;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, info};

use fieldkit_core::errors::{DatabaseError, Error, Result};

use crate::errors::StorageError;

pub use write_actor::{spawn_writer, WriteHandle};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const DB_FILE_NAME: &str = "fieldkit.db";
const POOL_MAX_SIZE: u32 = 8;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// `synchronous = FULL` syncs the WAL on every commit, so an enqueued
/// action survives power loss and not just an app crash.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = FULL;
    PRAGMA busy_timeout = 5000;
    PRAGMA foreign_keys = ON;
";

#[derive(Debug, Clone, Copy)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(CONNECTION_PRAGMAS)
            .map_err(r2d2::Error::QueryError)
    }
}

/// Ensure `app_data_dir` exists and return the database file path inside it.
pub fn init(app_data_dir: &str) -> Result<String> {
    let dir = Path::new(app_data_dir);
    std::fs::create_dir_all(dir).map_err(|e| {
        Error::Database(DatabaseError::ConnectionFailed(format!(
            "Cannot create data directory '{}': {}",
            app_data_dir, e
        )))
    })?;
    let db_path = dir.join(DB_FILE_NAME);
    debug!("Using database at {}", db_path.display());
    Ok(db_path.to_string_lossy().to_string())
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(POOL_MAX_SIZE)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(|e| Error::Database(DatabaseError::PoolCreationFailed(e.to_string())))?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    Ok(pool.get().map_err(StorageError::from)?)
}

pub fn run_migrations(db_path: &str) -> Result<()> {
    let mut conn = SqliteConnection::establish(db_path).map_err(StorageError::from)?;
    conn.batch_execute(CONNECTION_PRAGMAS)
        .map_err(StorageError::from)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
    if !applied.is_empty() {
        info!("Applied {} database migration(s)", applied.len());
    }
    Ok(())
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
pub(crate) fn timestamp_to_db(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn timestamp_from_db(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Decode(format!("Invalid timestamp '{}': {}", value, e)).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::RunQueryDsl;
    use tempfile::tempdir;

    #[derive(diesel::QueryableByName)]
    struct TextRow {
        #[diesel(sql_type = diesel::sql_types::Text)]
        value: String,
    }

    #[test]
    fn migrations_are_idempotent_and_pool_uses_wal() {
        let dir = tempdir().expect("tempdir");
        let db_path = init(&dir.path().join("nested").to_string_lossy()).expect("init");
        run_migrations(&db_path).expect("first run");
        run_migrations(&db_path).expect("second run is a no-op");

        let pool = create_pool(&db_path).expect("pool");
        let mut conn = get_connection(&pool).expect("conn");
        let mode = diesel::sql_query("SELECT journal_mode AS value FROM pragma_journal_mode")
            .get_result::<TextRow>(&mut conn)
            .expect("journal mode");
        assert_eq!(mode.value.to_lowercase(), "wal");

        // 2 = FULL
        let sync = diesel::sql_query(
            "SELECT CAST(synchronous AS TEXT) AS value FROM pragma_synchronous",
        )
        .get_result::<TextRow>(&mut conn)
        .expect("synchronous");
        assert_eq!(sync.value, "2");

        for table in ["contract_records", "pending_actions"] {
            let row = diesel::sql_query(format!(
                "SELECT name AS value FROM sqlite_master WHERE type='table' AND name='{}'",
                table
            ))
            .get_result::<TextRow>(&mut conn)
            .expect("table exists");
            assert_eq!(row.value, table);
        }
    }
}
