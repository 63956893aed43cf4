//! Single-writer actor: every write runs on one dedicated connection, one job
//! at a time, inside an IMMEDIATE transaction.

use diesel::sqlite::SqliteConnection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use fieldkit_core::errors::{DatabaseError, Error, Result};

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

#[derive(Clone, Debug)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl WriteHandle {
    /// Run `job` on the writer connection. The job's writes commit together or
    /// not at all.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();
        let boxed: Job = Box::new(move |conn: &mut SqliteConnection| {
            let result = conn
                .immediate_transaction::<T, StorageError, _>(|tx| job(tx).map_err(StorageError::from))
                .map_err(Error::from);
            // Caller may have gone away; nothing to report to.
            let _ = reply_tx.send(result);
        });

        self.tx.send(boxed).map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Database writer has stopped".to_string(),
            ))
        })?;
        reply_rx.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Database writer dropped the job".to_string(),
            ))
        })?
    }
}

/// Start the writer thread. It owns one pooled connection for its lifetime
/// and exits once every [`WriteHandle`] is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    let spawned = std::thread::Builder::new()
        .name("fieldkit-db-writer".to_string())
        .spawn(move || {
            let mut conn = match pool.get() {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Database writer could not acquire a connection: {}", e);
                    return;
                }
            };
            while let Some(job) = rx.blocking_recv() {
                job(&mut *conn);
            }
            debug!("Database writer stopped");
        });
    if let Err(e) = spawned {
        error!("Failed to spawn database writer thread: {}", e);
    }
    WriteHandle { tx }
}
