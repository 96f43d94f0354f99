//! Task and transaction resolution across cache, store and ledger.

use std::sync::Arc;

use alloy_primitives::Address;
use serde::Serialize;
use taskledger_ledger::{LedgerClient, LedgerError, TaskLedgerContract};
use taskledger_primitives::{IndexEntry, LedgerTask, ResultRecord, TaskId, TxHash, TxStatus};
use taskledger_storage::{ResultStore, TaskCache};
use tracing::*;

use crate::{EventLogResolver, LogResolveError, ResolveError};

/// Where an answer about a task came from.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Resolution {
    /// Known only locally: never confirmed, or the ledger was unreachable.
    Local { record: ResultRecord },
    /// Read from the ledger, plus the local record if one exists.
    Ledger {
        task: LedgerTask,
        local: Option<ResultRecord>,
    },
}

impl Resolution {
    pub fn task_id(&self) -> TaskId {
        match self {
            Resolution::Local { record } => record.task_id,
            Resolution::Ledger { task, .. } => task.id,
        }
    }

    pub fn is_local_only(&self) -> bool {
        matches!(self, Resolution::Local { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TxResolution {
    pub tx_hash: TxHash,
    pub task_id: TaskId,
    #[serde(flatten)]
    pub resolution: Resolution,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecentTasks {
    /// Ledger task counter, or the highest local id when the ledger could
    /// not be read.
    pub counter: u64,
    pub counter_from_local: bool,
    /// Newest first. Ids the ledger could not return are left out.
    pub tasks: Vec<LedgerTask>,
}

/// The stored result of a task as the ledger holds it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskResultView {
    pub task_id: TaskId,
    pub topic: String,
    pub result: String,
    pub requester: Address,
}

/// Whether a ledger read error means the task does not exist.
fn is_missing_task(err: &LedgerError) -> bool {
    match err {
        LedgerError::Decode { .. } => true,
        LedgerError::Rpc(_) => err.message().contains("revert"),
        _ => false,
    }
}

/// Whether a local record has no transaction the ledger could hold.
fn never_reached_ledger(record: &ResultRecord) -> bool {
    match (record.tx_hash, record.tx_status) {
        (None, _) => true,
        (Some(_), Some(TxStatus::Dropped)) => true,
        (Some(_), _) => false,
    }
}

#[expect(
    missing_debug_implementations,
    reason = "ResultStore has no Debug implementation"
)]
pub struct TaskResolver<C> {
    client: Arc<C>,
    contract: TaskLedgerContract,
    store: ResultStore,
    cache: Arc<TaskCache>,
    logs: EventLogResolver<C>,
}

impl<C: LedgerClient> TaskResolver<C> {
    pub fn new(
        client: Arc<C>,
        contract: TaskLedgerContract,
        store: ResultStore,
        cache: Arc<TaskCache>,
    ) -> Self {
        Self {
            logs: EventLogResolver::new(client.clone(), contract, cache.clone()),
            client,
            contract,
            store,
            cache,
        }
    }

    /// Local record for `id`, from the cache or the store. Store failures
    /// are logged and treated as a miss.
    async fn local_record(&self, id: TaskId) -> Option<ResultRecord> {
        if let Some(record) = self.cache.record(id) {
            return Some(record);
        }
        match self.store.get_result_async(id).await {
            Ok(Some(record)) => {
                self.cache.insert_record(record.clone());
                Some(record)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(%id, err = %e, "local store read failed");
                None
            }
        }
    }

    /// Reads a task from the ledger. Completed tasks are immutable, so only
    /// those are cached.
    async fn ledger_task(&self, id: TaskId) -> Result<LedgerTask, LedgerError> {
        if let Some(task) = self.cache.ledger_task(id) {
            return Ok(task);
        }
        let task = self.contract.get_task(self.client.as_ref(), id).await?;
        if task.completed {
            self.cache.insert_ledger_task(task.clone());
        }
        Ok(task)
    }

    /// Resolves a task by id.
    ///
    /// Records whose transaction never reached the ledger are answered from
    /// local data alone. Otherwise the ledger is read, since a pending or
    /// unknown transaction may have been mined since, and if that fails the
    /// local record is returned instead of an error.
    #[instrument(skip(self))]
    pub async fn resolve_task(&self, id: TaskId) -> Result<Resolution, ResolveError> {
        let local = self.local_record(id).await;

        if let Some(record) = &local {
            if never_reached_ledger(record) && self.cache.ledger_task(id).is_none() {
                debug!(status = ?record.status, tx_status = ?record.tx_status, "answering locally");
                return Ok(Resolution::Local {
                    record: record.clone(),
                });
            }
        }

        match self.ledger_task(id).await {
            Ok(task) => Ok(Resolution::Ledger { task, local }),
            Err(e) => match local {
                Some(record) => {
                    warn!(err = %e, "ledger read failed, using local record");
                    Ok(Resolution::Local { record })
                }
                None if is_missing_task(&e) => Err(ResolveError::NotFound(id)),
                None => Err(ResolveError::LedgerUnavailable(e)),
            },
        }
    }

    /// Resolves the task a transaction belongs to.
    #[instrument(skip(self))]
    pub async fn resolve_tx_hash(&self, hash: TxHash) -> Result<TxResolution, ResolveError> {
        let task_id = match self.local_task_for_tx(hash).await {
            Some(id) => id,
            None => self.logs.resolve(hash).await.map_err(|e| match e {
                LogResolveError::TransactionNotFound(h) => ResolveError::TransactionNotFound(h),
                LogResolveError::NoTaskEvent(h) => ResolveError::NoTaskEvent(h),
                LogResolveError::Ledger(e) => ResolveError::LedgerUnavailable(e),
            })?,
        };

        let resolution = self.resolve_task(task_id).await?;
        Ok(TxResolution {
            tx_hash: hash,
            task_id,
            resolution,
        })
    }

    async fn local_task_for_tx(&self, hash: TxHash) -> Option<TaskId> {
        if let Some(record) = self.cache.find_record_by_tx(&hash) {
            return Some(record.task_id);
        }
        if let Some(id) = self.cache.task_for_tx(&hash) {
            return Some(id);
        }
        match self.store.get_result_by_tx_hash_async(hash).await {
            Ok(Some(record)) => {
                let id = record.task_id;
                self.cache.insert_record(record);
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(err = %e, "local store scan failed");
                None
            }
        }
    }

    /// Lists up to `count` of the newest tasks.
    pub async fn recent_tasks(&self, count: u64) -> Result<RecentTasks, ResolveError> {
        let ledger_counter = self.contract.task_counter(self.client.as_ref()).await;
        let (counter, counter_from_local) = match ledger_counter {
            Ok(counter) => (counter, false),
            Err(e) => {
                warn!(err = %e, "task counter unavailable, using local index");
                let local_max = self.store.max_task_id_async().await.unwrap_or_else(|e| {
                    warn!(err = %e, "local index unavailable, assuming no tasks");
                    None
                });
                (local_max.map(TaskId::get).unwrap_or(0), true)
            }
        };

        let lowest = counter.saturating_sub(count).saturating_add(1).max(1);
        let mut tasks = Vec::new();
        for id in (lowest..=counter).rev().map(TaskId::new) {
            match self.ledger_task(id).await {
                Ok(task) => tasks.push(task),
                Err(e) => debug!(%id, err = %e, "skipping unreadable task"),
            }
        }

        Ok(RecentTasks {
            counter,
            counter_from_local,
            tasks,
        })
    }

    /// The full local index.
    pub async fn local_results(&self) -> Result<Vec<IndexEntry>, ResolveError> {
        Ok(self.store.get_index_async().await?)
    }

    pub async fn local_result(&self, id: TaskId) -> Result<ResultRecord, ResolveError> {
        self.local_record(id)
            .await
            .ok_or(ResolveError::NotFound(id))
    }

    /// Local record produced by a transaction, given its hash or a prefix.
    pub async fn local_result_by_tx_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<ResultRecord>, ResolveError> {
        Ok(self
            .store
            .get_result_by_tx_prefix_async(prefix.to_owned())
            .await?)
    }

    /// The result stored on the ledger for `id`.
    pub async fn task_result(&self, id: TaskId) -> Result<TaskResultView, ResolveError> {
        let task = self.ledger_task(id).await.map_err(|e| {
            if is_missing_task(&e) {
                ResolveError::NotFound(id)
            } else {
                ResolveError::LedgerUnavailable(e)
            }
        })?;
        Ok(TaskResultView {
            task_id: task.id,
            topic: task.topic,
            result: task.result,
            requester: task.requester,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Bytes, Log, LogData, B256, U256};
    use alloy_sol_types::SolCall;
    use chrono::Utc;
    use taskledger_db_store_sled::{ResultDBSled, SledDbConfig};
    use taskledger_db_types::{DbError, DbResult, ResultDatabase};
    use taskledger_ledger::{
        contract::{ITaskLedger, TaskCreated},
        MockLedgerClient, TxReceipt,
    };
    use taskledger_primitives::{
        AnalysisOutput, ProcessingStatus, TaskContext, TransactionRecord,
    };
    use taskledger_storage::create_result_store;

    use super::*;

    const CONTRACT: Address = Address::new([0x42; 20]);

    fn store() -> ResultStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        create_result_store(Arc::new(ResultDBSled::new(&db, SledDbConfig::test()).unwrap()))
    }

    fn resolver(client: MockLedgerClient, store: ResultStore) -> TaskResolver<MockLedgerClient> {
        TaskResolver::new(
            Arc::new(client),
            TaskLedgerContract::new(CONTRACT),
            store,
            Arc::new(TaskCache::with_capacity(32)),
        )
    }

    fn record(id: u64, hash: Option<B256>, tx_status: Option<TxStatus>) -> ResultRecord {
        ResultRecord {
            task_id: TaskId::new(id),
            tx_hash: hash,
            tx_status,
            create_tx_hash: None,
            status: ProcessingStatus::Completed,
            timestamp: Utc::now(),
            context: TaskContext::new("42 Elm St", "investment", ""),
            structured_output: AnalysisOutput::Raw("analysis".into()).normalize().report,
            raw_result: "analysis".into(),
            ledger_result: "analysis".into(),
        }
    }

    fn encoded_task(id: u64) -> Bytes {
        ITaskLedger::getTaskCall::abi_encode_returns(&ITaskLedger::Task {
            id: U256::from(id),
            topic: format!("topic {id}"),
            result: format!("result {id}"),
            requester: Address::repeat_byte(5),
            completed: true,
        })
        .into()
    }

    /// Decodes the task id argument of a `getTask` call.
    fn requested_id(input: &[u8]) -> u64 {
        let call = ITaskLedger::getTaskCall::abi_decode(input).unwrap();
        u64::try_from(call.id).unwrap()
    }

    #[tokio::test]
    async fn test_local_only_task_when_ledger_fails() {
        let store = store();
        let rec = record(42, Some(B256::repeat_byte(1)), Some(TxStatus::Confirmed));
        store.put_result_async(rec.clone()).await.unwrap();

        let mut client = MockLedgerClient::new();
        client
            .expect_call()
            .returning(|_| Err(LedgerError::rpc("connection refused")));
        let resolver = resolver(client, store);

        let res = resolver.resolve_task(TaskId::new(42)).await.unwrap();
        assert_eq!(res, Resolution::Local { record: rec });
    }

    #[tokio::test]
    async fn test_unconfirmed_record_skips_ledger() {
        let store = store();
        store
            .put_result_async(record(7, None, None))
            .await
            .unwrap();

        let mut client = MockLedgerClient::new();
        client.expect_call().times(0);
        let res = resolver(client, store)
            .resolve_task(TaskId::new(7))
            .await
            .unwrap();
        assert!(res.is_local_only());
    }

    #[tokio::test]
    async fn test_ledger_read_is_cached() {
        let mut client = MockLedgerClient::new();
        client
            .expect_call()
            .times(1)
            .returning(|req| Ok(encoded_task(requested_id(&req.input))));
        let resolver = resolver(client, store());

        for _ in 0..2 {
            let res = resolver.resolve_task(TaskId::new(3)).await.unwrap();
            let Resolution::Ledger { task, local } = res else {
                panic!("expected ledger resolution");
            };
            assert_eq!(task.result, "result 3");
            assert!(local.is_none());
        }
    }

    #[tokio::test]
    async fn test_missing_everywhere() {
        let mut client = MockLedgerClient::new();
        client
            .expect_call()
            .returning(|_| Err(LedgerError::rpc("execution reverted: task does not exist")));
        let res = resolver(client, store()).resolve_task(TaskId::new(99)).await;
        assert!(matches!(res, Err(ResolveError::NotFound(_))));

        let mut client = MockLedgerClient::new();
        client
            .expect_call()
            .returning(|_| Err(LedgerError::rpc("connection refused")));
        let res = resolver(client, store()).resolve_task(TaskId::new(99)).await;
        assert!(matches!(res, Err(ResolveError::LedgerUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unknown_hash_resolved_through_logs() {
        let hash = B256::repeat_byte(0xee);
        let mut client = MockLedgerClient::new();
        client
            .expect_transaction_receipt()
            .times(1)
            .returning(move |_| {
                let event = TaskCreated {
                    id: U256::from(11),
                    topic: "t".into(),
                    requester: Address::ZERO,
                };
                Ok(Some(TxReceipt {
                    tx_hash: hash,
                    success: true,
                    block_number: Some(2),
                    logs: vec![Log {
                        address: CONTRACT,
                        data: LogData::from(&event),
                    }],
                }))
            });
        client
            .expect_call()
            .times(1)
            .returning(|req| Ok(encoded_task(requested_id(&req.input))));
        let resolver = resolver(client, store());

        let first = resolver.resolve_tx_hash(hash).await.unwrap();
        let second = resolver.resolve_tx_hash(hash).await.unwrap();
        assert_eq!(first.task_id, TaskId::new(11));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_hash_found_in_local_store() {
        let store = store();
        let hash = B256::repeat_byte(0xab);
        store
            .put_result_async(record(9, Some(hash), Some(TxStatus::Unknown)))
            .await
            .unwrap();

        // Receipt timed out locally, but the completion was mined later.
        let mut client = MockLedgerClient::new();
        client.expect_transaction_receipt().times(0);
        client
            .expect_call()
            .times(1)
            .returning(|req| Ok(encoded_task(requested_id(&req.input))));
        let resolver = resolver(client, store);

        let res = resolver.resolve_tx_hash(hash).await.unwrap();
        assert_eq!(res.task_id, TaskId::new(9));
        let Resolution::Ledger { task, local } = res.resolution else {
            panic!("expected ledger resolution");
        };
        assert!(task.completed);
        assert_eq!(local.map(|r| r.tx_hash), Some(Some(hash)));

        // The completed task is cached, so the id lookup agrees without a call.
        let by_id = resolver.resolve_task(TaskId::new(9)).await.unwrap();
        assert!(!by_id.is_local_only());
    }

    #[tokio::test]
    async fn test_pending_record_falls_back_when_ledger_down() {
        let store = store();
        let rec = record(10, Some(B256::repeat_byte(0x10)), Some(TxStatus::Pending));
        store.put_result_async(rec.clone()).await.unwrap();

        let mut client = MockLedgerClient::new();
        client
            .expect_call()
            .times(1)
            .returning(|_| Err(LedgerError::rpc("connection refused")));

        let res = resolver(client, store)
            .resolve_task(TaskId::new(10))
            .await
            .unwrap();
        assert_eq!(res, Resolution::Local { record: rec });
    }

    #[tokio::test]
    async fn test_dropped_record_skips_ledger() {
        let store = store();
        store
            .put_result_async(record(
                11,
                Some(B256::repeat_byte(0x11)),
                Some(TxStatus::Dropped),
            ))
            .await
            .unwrap();

        let mut client = MockLedgerClient::new();
        client.expect_call().times(0);
        let res = resolver(client, store)
            .resolve_task(TaskId::new(11))
            .await
            .unwrap();
        assert!(res.is_local_only());
    }

    #[tokio::test]
    async fn test_hash_not_found() {
        let mut client = MockLedgerClient::new();
        client.expect_transaction_receipt().returning(|_| Ok(None));
        let res = resolver(client, store())
            .resolve_tx_hash(B256::repeat_byte(1))
            .await;
        assert!(matches!(res, Err(ResolveError::TransactionNotFound(_))));
    }

    #[tokio::test]
    async fn test_recent_tasks_skips_unreadable_ids() {
        let mut client = MockLedgerClient::new();
        client.expect_call().returning(|req| {
            if req.input[..4] == ITaskLedger::taskCounterCall::SELECTOR {
                return Ok(ITaskLedger::taskCounterCall::abi_encode_returns(&U256::from(5)).into());
            }
            match requested_id(&req.input) {
                4 => Err(LedgerError::rpc("execution reverted")),
                id => Ok(encoded_task(id)),
            }
        });

        let recent = resolver(client, store()).recent_tasks(3).await.unwrap();
        assert_eq!(recent.counter, 5);
        assert!(!recent.counter_from_local);
        let ids: Vec<_> = recent.tasks.iter().map(|t| t.id.get()).collect();
        assert_eq!(ids, vec![5, 3]);
    }

    #[tokio::test]
    async fn test_recent_tasks_falls_back_to_local_counter() {
        let store = store();
        for id in [2, 6] {
            store
                .put_result_async(record(id, None, None))
                .await
                .unwrap();
        }
        let mut client = MockLedgerClient::new();
        client
            .expect_call()
            .returning(|_| Err(LedgerError::rpc("connection refused")));

        let recent = resolver(client, store).recent_tasks(10).await.unwrap();
        assert_eq!(recent.counter, 6);
        assert!(recent.counter_from_local);
        assert!(recent.tasks.is_empty());
    }

    /// Store whose every operation fails.
    struct UnreadableDb;

    impl ResultDatabase for UnreadableDb {
        fn put_result(&self, _: ResultRecord) -> DbResult<()> {
            Err(DbError::IoError("disk gone".into()))
        }

        fn get_result(&self, _: TaskId) -> DbResult<Option<ResultRecord>> {
            Err(DbError::IoError("disk gone".into()))
        }

        fn get_result_by_tx_prefix(&self, _: &str) -> DbResult<Option<ResultRecord>> {
            Err(DbError::IoError("disk gone".into()))
        }

        fn get_index_entry(&self, _: TaskId) -> DbResult<Option<IndexEntry>> {
            Err(DbError::IoError("disk gone".into()))
        }

        fn get_index(&self) -> DbResult<Vec<IndexEntry>> {
            Err(DbError::IoError("disk gone".into()))
        }

        fn max_task_id(&self) -> DbResult<Option<TaskId>> {
            Err(DbError::IoError("disk gone".into()))
        }

        fn put_tx_record(&self, _: TransactionRecord) -> DbResult<()> {
            Err(DbError::IoError("disk gone".into()))
        }

        fn get_tx_record(&self, _: TxHash) -> DbResult<Option<TransactionRecord>> {
            Err(DbError::IoError("disk gone".into()))
        }

        fn get_tx_records(&self, _: TxHash) -> DbResult<Vec<TransactionRecord>> {
            Err(DbError::IoError("disk gone".into()))
        }
    }

    #[tokio::test]
    async fn test_recent_tasks_with_no_counter_anywhere() {
        let mut client = MockLedgerClient::new();
        client
            .expect_call()
            .returning(|_| Err(LedgerError::rpc("connection refused")));
        let resolver = resolver(client, create_result_store(Arc::new(UnreadableDb)));

        let recent = resolver.recent_tasks(5).await.unwrap();
        assert_eq!(recent.counter, 0);
        assert!(recent.counter_from_local);
        assert!(recent.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_task_result_view() {
        let mut client = MockLedgerClient::new();
        client
            .expect_call()
            .returning(|req| Ok(encoded_task(requested_id(&req.input))));
        let view = resolver(client, store())
            .task_result(TaskId::new(8))
            .await
            .unwrap();
        assert_eq!(view.result, "result 8");
        assert_eq!(view.requester, Address::repeat_byte(5));
    }
}
