//! Runs blocking database calls on a worker pool.

use taskledger_db_types::{DbError, DbResult};
use threadpool::ThreadPool;
use tokio::sync::oneshot;
use tracing::*;

/// Handle for receiving a result from a pooled database operation.
pub(crate) type DbRecv<T> = oneshot::Receiver<DbResult<T>>;

/// Schedules `f` on `pool`, returning a receiver for its result.
pub(crate) fn spawn_on_pool<T, F>(pool: &ThreadPool, f: F) -> DbRecv<T>
where
    T: Send + 'static,
    F: FnOnce() -> DbResult<T> + Send + 'static,
{
    let (resp_tx, resp_rx) = oneshot::channel();
    pool.execute(move || {
        if resp_tx.send(f()).is_err() {
            warn!("failed to send response");
        }
    });
    resp_rx
}

/// Awaits a pooled operation, mapping a vanished worker to an error.
pub(crate) async fn recv_result<T>(rx: DbRecv<T>) -> DbResult<T> {
    match rx.await {
        Ok(v) => v,
        Err(_) => Err(DbError::WorkerFailedStrangely),
    }
}
