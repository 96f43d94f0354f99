use taskledger_primitives::{IndexEntry, ResultRecord, TaskId, TransactionRecord, TxHash};

use crate::DbResult;

/// Durable store of task results and their index.
///
/// Implementations write the detail record before the index entry, so an
/// index entry never refers to a record that was not written. The reverse can
/// happen after a crash; lookups therefore fall back to scanning detail
/// records.
pub trait ResultDatabase: Send + Sync + 'static {
    /// Stores a record and makes it the active index entry for its task.
    fn put_result(&self, record: ResultRecord) -> DbResult<()>;

    /// Latest record for a task id.
    fn get_result(&self, task_id: TaskId) -> DbResult<Option<ResultRecord>>;

    /// Latest record whose transaction hash starts with `prefix`.
    fn get_result_by_tx_prefix(&self, prefix: &str) -> DbResult<Option<ResultRecord>>;

    /// Index entry for a task id, if indexed.
    fn get_index_entry(&self, task_id: TaskId) -> DbResult<Option<IndexEntry>>;

    /// All index entries ordered by task id.
    fn get_index(&self) -> DbResult<Vec<IndexEntry>>;

    /// Highest task id with a stored record.
    fn max_task_id(&self) -> DbResult<Option<TaskId>>;

    /// Stores one broadcast attempt. A record with the same hash, submission
    /// time and attempt number replaces the previous version.
    fn put_tx_record(&self, record: TransactionRecord) -> DbResult<()>;

    /// Latest attempt recorded under `hash`.
    fn get_tx_record(&self, hash: TxHash) -> DbResult<Option<TransactionRecord>>;

    /// Every attempt recorded under `hash`, oldest first.
    fn get_tx_records(&self, hash: TxHash) -> DbResult<Vec<TransactionRecord>>;
}
