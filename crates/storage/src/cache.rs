//! Bounded in-memory cache of task state.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use taskledger_primitives::{LedgerTask, ResultRecord, TaskId, TxHash};

/// Hit/miss counters, mostly for tests and debug logging.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug)]
struct Tables {
    ledger_tasks: LruCache<TaskId, LedgerTask>,
    records: LruCache<TaskId, ResultRecord>,
    tx_to_task: LruCache<TxHash, TaskId>,
    stats: CacheStats,
}

/// Cache of ledger task projections, local result records and the mapping
/// from transaction hash to task id.
///
/// Every table is an LRU bounded by the same capacity.
#[derive(Debug)]
pub struct TaskCache {
    tables: Mutex<Tables>,
}

impl TaskCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            tables: Mutex::new(Tables {
                ledger_tasks: LruCache::new(capacity),
                records: LruCache::new(capacity),
                tx_to_task: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Builds a cache, treating a zero capacity as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn ledger_task(&self, id: TaskId) -> Option<LedgerTask> {
        let mut t = self.tables.lock();
        let found = t.ledger_tasks.get(&id).cloned();
        t.record_lookup(found.is_some());
        found
    }

    pub fn insert_ledger_task(&self, task: LedgerTask) {
        self.tables.lock().ledger_tasks.put(task.id, task);
    }

    pub fn record(&self, id: TaskId) -> Option<ResultRecord> {
        let mut t = self.tables.lock();
        let found = t.records.get(&id).cloned();
        t.record_lookup(found.is_some());
        found
    }

    /// Caches a result record and maps its transaction hashes to its task.
    pub fn insert_record(&self, record: ResultRecord) {
        let mut t = self.tables.lock();
        for hash in [record.tx_hash, record.create_tx_hash].into_iter().flatten() {
            t.tx_to_task.put(hash, record.task_id);
        }
        t.records.put(record.task_id, record);
    }

    pub fn task_for_tx(&self, hash: &TxHash) -> Option<TaskId> {
        let mut t = self.tables.lock();
        let found = t.tx_to_task.get(hash).copied();
        t.record_lookup(found.is_some());
        found
    }

    pub fn insert_tx_mapping(&self, hash: TxHash, id: TaskId) {
        self.tables.lock().tx_to_task.put(hash, id);
    }

    /// Scans cached records for one produced by `hash`.
    pub fn find_record_by_tx(&self, hash: &TxHash) -> Option<ResultRecord> {
        let full = format!("{hash:#x}");
        let t = self.tables.lock();
        t.records
            .iter()
            .map(|(_, r)| r)
            .find(|r| r.matches_tx_prefix(&full))
            .cloned()
    }

    pub fn stats(&self) -> CacheStats {
        self.tables.lock().stats
    }
}

impl Tables {
    fn record_lookup(&mut self, hit: bool) {
        if hit {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256};
    use chrono::Utc;
    use taskledger_primitives::{AnalysisOutput, ProcessingStatus, TaskContext};

    use super::*;

    fn task(id: u64) -> LedgerTask {
        LedgerTask {
            id: TaskId::new(id),
            topic: format!("topic {id}"),
            result: String::new(),
            requester: Address::ZERO,
            completed: false,
        }
    }

    fn record(id: u64, hash: B256, create: B256) -> ResultRecord {
        ResultRecord {
            task_id: TaskId::new(id),
            tx_hash: Some(hash),
            tx_status: None,
            create_tx_hash: Some(create),
            status: ProcessingStatus::Completed,
            timestamp: Utc::now(),
            context: TaskContext::default(),
            structured_output: AnalysisOutput::Raw("r".into()).normalize().report,
            raw_result: "r".into(),
            ledger_result: String::new(),
        }
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = TaskCache::with_capacity(2);
        cache.insert_ledger_task(task(1));
        cache.insert_ledger_task(task(2));
        assert!(cache.ledger_task(TaskId::new(1)).is_some());
        cache.insert_ledger_task(task(3));

        assert!(cache.ledger_task(TaskId::new(2)).is_none());
        assert!(cache.ledger_task(TaskId::new(1)).is_some());
        assert!(cache.ledger_task(TaskId::new(3)).is_some());
    }

    #[test]
    fn test_record_maps_both_hashes() {
        let cache = TaskCache::with_capacity(8);
        let complete = B256::repeat_byte(1);
        let create = B256::repeat_byte(2);
        cache.insert_record(record(4, complete, create));

        assert_eq!(cache.task_for_tx(&complete), Some(TaskId::new(4)));
        assert_eq!(cache.task_for_tx(&create), Some(TaskId::new(4)));
        assert_eq!(
            cache.find_record_by_tx(&create).map(|r| r.task_id),
            Some(TaskId::new(4))
        );
        assert!(cache.find_record_by_tx(&B256::ZERO).is_none());
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let cache = TaskCache::with_capacity(0);
        assert!(cache.task_for_tx(&B256::ZERO).is_none());
        cache.insert_tx_mapping(B256::ZERO, TaskId::new(1));
        assert!(cache.task_for_tx(&B256::ZERO).is_some());
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }
}
