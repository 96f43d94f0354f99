use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use taskledger_db_types::{DbResult, ResultDatabase};
use taskledger_primitives::{
    tx_hash_prefix, IndexEntry, ResultRecord, TaskId, TransactionRecord, TxHash,
};
use threadpool::ThreadPool;
use tracing::*;

use crate::exec::{recv_result, spawn_on_pool};

const COMPONENT: &str = "taskledger_store";

/// Per-task write locks, dropped once no writer holds them.
#[derive(Debug, Default)]
struct TaskLocks {
    locks: Mutex<HashMap<TaskId, Arc<Mutex<()>>>>,
}

impl TaskLocks {
    fn with_lock<R>(&self, task_id: TaskId, f: impl FnOnce() -> R) -> R {
        let lock = self.locks.lock().entry(task_id).or_default().clone();
        let res = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.locks.lock();
        // Two references left means ours plus the map's.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&task_id);
        }
        res
    }
}

/// Manager of persisted task results.
#[expect(
    missing_debug_implementations,
    reason = "Some inner types don't have Debug implementation"
)]
#[derive(Clone)]
pub struct ResultStore {
    pool: ThreadPool,
    db: Arc<dyn ResultDatabase>,
    task_locks: Arc<TaskLocks>,
}

impl ResultStore {
    pub fn new(pool: ThreadPool, db: Arc<impl ResultDatabase>) -> Self {
        Self {
            pool,
            db,
            task_locks: Arc::default(),
        }
    }

    /// Persists a result record, serialized with other writers of the same task.
    #[instrument(
        skip(self, record),
        fields(component = COMPONENT, task_id = %record.task_id, key = %record.record_key())
    )]
    pub fn put_result_blocking(&self, record: ResultRecord) -> DbResult<()> {
        let task_id = record.task_id;
        self.task_locks
            .with_lock(task_id, || self.db.put_result(record))
    }

    #[instrument(
        skip(self, record),
        fields(component = COMPONENT, task_id = %record.task_id, key = %record.record_key())
    )]
    pub async fn put_result_async(&self, record: ResultRecord) -> DbResult<()> {
        let db = self.db.clone();
        let locks = self.task_locks.clone();
        let task_id = record.task_id;
        recv_result(spawn_on_pool(&self.pool, move || {
            locks.with_lock(task_id, || db.put_result(record))
        }))
        .await
    }

    pub fn get_result_blocking(&self, task_id: TaskId) -> DbResult<Option<ResultRecord>> {
        self.db.get_result(task_id)
    }

    #[instrument(skip(self), fields(component = COMPONENT))]
    pub async fn get_result_async(&self, task_id: TaskId) -> DbResult<Option<ResultRecord>> {
        let db = self.db.clone();
        recv_result(spawn_on_pool(&self.pool, move || db.get_result(task_id))).await
    }

    /// Looks up the latest record produced by a transaction.
    #[instrument(skip(self), fields(component = COMPONENT))]
    pub async fn get_result_by_tx_hash_async(
        &self,
        hash: TxHash,
    ) -> DbResult<Option<ResultRecord>> {
        self.get_result_by_tx_prefix_async(tx_hash_prefix(&hash))
            .await
    }

    /// Looks up a record by a hash prefix such as `0x1234abcd`.
    pub async fn get_result_by_tx_prefix_async(
        &self,
        prefix: String,
    ) -> DbResult<Option<ResultRecord>> {
        let db = self.db.clone();
        recv_result(spawn_on_pool(&self.pool, move || {
            db.get_result_by_tx_prefix(&prefix)
        }))
        .await
    }

    pub fn get_index_blocking(&self) -> DbResult<Vec<IndexEntry>> {
        self.db.get_index()
    }

    pub async fn get_index_async(&self) -> DbResult<Vec<IndexEntry>> {
        let db = self.db.clone();
        recv_result(spawn_on_pool(&self.pool, move || db.get_index())).await
    }

    pub async fn max_task_id_async(&self) -> DbResult<Option<TaskId>> {
        let db = self.db.clone();
        recv_result(spawn_on_pool(&self.pool, move || db.max_task_id())).await
    }

    #[instrument(
        skip(self, record),
        fields(component = COMPONENT, tx_hash = %record.hash, status = ?record.status)
    )]
    pub async fn put_tx_record_async(&self, record: TransactionRecord) -> DbResult<()> {
        let db = self.db.clone();
        recv_result(spawn_on_pool(&self.pool, move || db.put_tx_record(record))).await
    }

    pub async fn get_tx_record_async(&self, hash: TxHash) -> DbResult<Option<TransactionRecord>> {
        let db = self.db.clone();
        recv_result(spawn_on_pool(&self.pool, move || db.get_tx_record(hash))).await
    }

    pub async fn get_tx_records_async(&self, hash: TxHash) -> DbResult<Vec<TransactionRecord>> {
        let db = self.db.clone();
        recv_result(spawn_on_pool(&self.pool, move || db.get_tx_records(hash))).await
    }
}
