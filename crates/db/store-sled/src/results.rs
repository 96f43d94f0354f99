use std::str;

use sled::{transaction::ConflictableTransactionError, Tree};
use taskledger_db_types::{DbError, DbResult, ResultDatabase};
use taskledger_primitives::{
    result::record_key, tx_hash_prefix, IndexEntry, ResultRecord, TaskId, TransactionRecord,
    TxHash,
};
use tracing::*;

use crate::{
    utils::{decode, encode, sled_error},
    SledDbConfig,
};

const RESULTS_TREE: &str = "results";
const INDEX_TREE: &str = "result_index";
const PREFIX_TREE: &str = "result_tx_prefix";
const TX_RECORDS_TREE: &str = "tx_records";

/// Result store over four sled trees.
///
/// - `results`: record key -> [`ResultRecord`]
/// - `result_index`: task id (big endian) -> [`IndexEntry`]
/// - `result_tx_prefix`: tx hash prefix -> record key
/// - `tx_records`: tx hash ++ submitted_at ++ attempt -> [`TransactionRecord`]
#[derive(Debug)]
pub struct ResultDBSled {
    results_tree: Tree,
    index_tree: Tree,
    prefix_tree: Tree,
    tx_tree: Tree,
    config: SledDbConfig,
}

fn id_key(task_id: TaskId) -> [u8; 8] {
    task_id.get().to_be_bytes()
}

/// Parses the task id out of a `task_<id>_<prefix>` key.
fn task_id_from_key(key: &[u8]) -> Option<TaskId> {
    let key = str::from_utf8(key).ok()?;
    let rest = key.strip_prefix("task_")?;
    let (id, _) = rest.split_once('_')?;
    id.parse().ok().map(TaskId::new)
}

fn normalize_prefix(prefix: &str) -> String {
    prefix.chars().take(10).collect::<String>().to_ascii_lowercase()
}

impl ResultDBSled {
    pub fn new(db: &sled::Db, config: SledDbConfig) -> DbResult<Self> {
        let open = |name: &str| db.open_tree(name).map_err(sled_error);
        Ok(Self {
            results_tree: open(RESULTS_TREE)?,
            index_tree: open(INDEX_TREE)?,
            prefix_tree: open(PREFIX_TREE)?,
            tx_tree: open(TX_RECORDS_TREE)?,
            config,
        })
    }

    fn get_detail(&self, key: &str) -> DbResult<Option<ResultRecord>> {
        self.results_tree
            .get(key.as_bytes())
            .map_err(sled_error)?
            .map(|v| decode(&v))
            .transpose()
    }

    /// Newest detail record matching `pred`, found by a full scan.
    fn scan_newest(
        &self,
        iter: sled::Iter,
        pred: impl Fn(&ResultRecord) -> bool,
    ) -> DbResult<Option<ResultRecord>> {
        let mut newest: Option<ResultRecord> = None;
        for item in iter {
            let (key, value) = item.map_err(sled_error)?;
            let record: ResultRecord = match decode(&value) {
                Ok(r) => r,
                Err(e) => {
                    warn!(key = %String::from_utf8_lossy(&key), %e, "skipping undecodable result record");
                    continue;
                }
            };
            if !pred(&record) {
                continue;
            }
            if newest
                .as_ref()
                .map_or(true, |cur| record.timestamp >= cur.timestamp)
            {
                newest = Some(record);
            }
        }
        Ok(newest)
    }
}

impl ResultDatabase for ResultDBSled {
    fn put_result(&self, record: ResultRecord) -> DbResult<()> {
        let key = record.record_key();
        let detail = encode(&record)?;
        let entry = encode(&record.index_entry())?;
        let id = id_key(record.task_id);
        let prefixes: Vec<String> = [record.tx_hash, record.create_tx_hash]
            .iter()
            .flatten()
            .map(tx_hash_prefix)
            .collect();

        self.config.with_retry(
            (&self.results_tree, &self.index_tree, &self.prefix_tree),
            |(rt, it, pt)| {
                // Detail first, then the index entries pointing at it.
                rt.insert(key.as_bytes(), detail.as_slice())?;
                it.insert(&id[..], entry.as_slice())?;
                for prefix in &prefixes {
                    pt.insert(prefix.as_bytes(), key.as_bytes())?;
                }
                Ok::<_, ConflictableTransactionError<DbError>>(())
            },
        )?;

        debug!(task_id = %record.task_id, %key, "stored result record");
        Ok(())
    }

    fn get_result(&self, task_id: TaskId) -> DbResult<Option<ResultRecord>> {
        if let Some(entry) = self.get_index_entry(task_id)? {
            if let Some(record) = self.get_detail(&entry.record_key)? {
                return Ok(Some(record));
            }
            warn!(%task_id, key = %entry.record_key, "index entry without detail record, scanning");
        }

        let prefix = record_key(task_id, "");
        self.scan_newest(self.results_tree.scan_prefix(prefix.as_bytes()), |r| {
            r.task_id == task_id
        })
    }

    fn get_result_by_tx_prefix(&self, prefix: &str) -> DbResult<Option<ResultRecord>> {
        let prefix = normalize_prefix(prefix);

        if let Some(key) = self.prefix_tree.get(prefix.as_bytes()).map_err(sled_error)? {
            let key = String::from_utf8_lossy(&key).into_owned();
            if let Some(record) = self.get_detail(&key)? {
                return Ok(Some(record));
            }
            warn!(%prefix, %key, "prefix entry without detail record, scanning");
        }

        self.scan_newest(self.results_tree.iter(), |r| r.matches_tx_prefix(&prefix))
    }

    fn get_index_entry(&self, task_id: TaskId) -> DbResult<Option<IndexEntry>> {
        self.index_tree
            .get(id_key(task_id))
            .map_err(sled_error)?
            .map(|v| decode(&v))
            .transpose()
    }

    fn get_index(&self) -> DbResult<Vec<IndexEntry>> {
        self.index_tree
            .iter()
            .values()
            .map(|v| decode(&v.map_err(sled_error)?))
            .collect()
    }

    fn max_task_id(&self) -> DbResult<Option<TaskId>> {
        let indexed = match self.index_tree.last().map_err(sled_error)? {
            Some((_, v)) => Some(decode::<IndexEntry>(&v)?.task_id),
            None => None,
        };

        // Detail records written without an index entry still count.
        let mut max = indexed;
        for key in self.results_tree.iter().keys() {
            let key = key.map_err(sled_error)?;
            if let Some(id) = task_id_from_key(&key) {
                max = max.max(Some(id));
            }
        }
        Ok(max)
    }

    fn put_tx_record(&self, record: TransactionRecord) -> DbResult<()> {
        let value = encode(&record)?;
        self.tx_tree
            .insert(record.audit_key(), value)
            .map_err(sled_error)?;
        Ok(())
    }

    fn get_tx_record(&self, hash: TxHash) -> DbResult<Option<TransactionRecord>> {
        self.tx_tree
            .scan_prefix(hash.as_slice())
            .next_back()
            .transpose()
            .map_err(sled_error)?
            .map(|(_, v)| decode(&v))
            .transpose()
    }

    fn get_tx_records(&self, hash: TxHash) -> DbResult<Vec<TransactionRecord>> {
        self.tx_tree
            .scan_prefix(hash.as_slice())
            .values()
            .map(|v| decode(&v.map_err(sled_error)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use chrono::{Duration, Utc};
    use taskledger_primitives::{
        AnalysisOutput, FeeParams, ProcessingStatus, TaskContext, TxStatus,
    };

    use super::*;

    fn setup() -> ResultDBSled {
        let db = sled::Config::new().temporary(true).open().unwrap();
        ResultDBSled::new(&db, SledDbConfig::test()).unwrap()
    }

    fn record(id: u64, hash: Option<B256>, summary: &str) -> ResultRecord {
        let raw = format!(r#"{{"summary": "{summary}"}}"#);
        ResultRecord {
            task_id: TaskId::new(id),
            tx_hash: hash,
            tx_status: hash.map(|_| TxStatus::Confirmed),
            create_tx_hash: None,
            status: ProcessingStatus::Completed,
            timestamp: Utc::now(),
            context: TaskContext::new("12 Elm St", "investment", ""),
            structured_output: AnalysisOutput::Raw(raw.clone()).normalize().report,
            raw_result: raw,
            ledger_result: String::new(),
        }
    }

    #[test]
    fn test_second_put_replaces_index_entry() {
        let db = setup();
        db.put_result(record(5, Some(B256::repeat_byte(1)), "first"))
            .unwrap();
        db.put_result(record(5, Some(B256::repeat_byte(2)), "second"))
            .unwrap();

        let index = db.get_index().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].tx_hash, Some(B256::repeat_byte(2)));

        let latest = db.get_result(TaskId::new(5)).unwrap().unwrap();
        assert_eq!(latest.structured_output.summary_text(), "second");
    }

    #[test]
    fn test_lookup_by_tx_prefix() {
        let db = setup();
        let hash = B256::repeat_byte(0xcd);
        db.put_result(record(9, Some(hash), "by hash")).unwrap();

        let found = db
            .get_result_by_tx_prefix(&format!("{hash:#x}"))
            .unwrap()
            .unwrap();
        assert_eq!(found.task_id, TaskId::new(9));
        assert!(db.get_result_by_tx_prefix("0xdeadbeef").unwrap().is_none());
    }

    #[test]
    fn test_dangling_index_falls_back_to_scan() {
        let db = setup();
        let rec = record(3, Some(B256::repeat_byte(3)), "dangling");
        db.put_result(rec.clone()).unwrap();
        db.results_tree.remove(rec.record_key().as_bytes()).unwrap();

        // An older record for the same task under a different key.
        let mut older = record(3, None, "older");
        older.timestamp = Utc::now() - Duration::minutes(5);
        db.results_tree
            .insert(older.record_key().as_bytes(), encode(&older).unwrap())
            .unwrap();

        let found = db.get_result(TaskId::new(3)).unwrap().unwrap();
        assert_eq!(found.structured_output.summary_text(), "older");
    }

    #[test]
    fn test_unindexed_detail_record_is_found() {
        let db = setup();
        let rec = record(12, Some(B256::repeat_byte(0x44)), "stray");
        db.results_tree
            .insert(rec.record_key().as_bytes(), encode(&rec).unwrap())
            .unwrap();

        assert!(db.get_index_entry(TaskId::new(12)).unwrap().is_none());
        assert!(db.get_result(TaskId::new(12)).unwrap().is_some());
        assert!(db.get_result_by_tx_prefix("0x44444444").unwrap().is_some());
        assert_eq!(db.max_task_id().unwrap(), Some(TaskId::new(12)));
    }

    #[test]
    fn test_task_id_prefix_scan_is_exact() {
        let db = setup();
        let rec = record(12, None, "twelve");
        db.results_tree
            .insert(rec.record_key().as_bytes(), encode(&rec).unwrap())
            .unwrap();
        assert!(db.get_result(TaskId::new(1)).unwrap().is_none());
    }

    #[test]
    fn test_max_task_id_and_index_order() {
        let db = setup();
        assert_eq!(db.max_task_id().unwrap(), None);
        for id in [300, 2, 41] {
            db.put_result(record(id, None, "x")).unwrap();
        }
        assert_eq!(db.max_task_id().unwrap(), Some(TaskId::new(300)));
        let ids: Vec<u64> = db
            .get_index()
            .unwrap()
            .iter()
            .map(|e| e.task_id.get())
            .collect();
        assert_eq!(ids, vec![2, 41, 300]);
    }

    #[test]
    fn test_tx_record_roundtrip_and_update() {
        let db = setup();
        let hash = B256::repeat_byte(0x77);
        let mut rec = TransactionRecord::new(
            hash,
            4,
            300_000,
            FeeParams::Legacy { gas_price: 10 },
            1_700_000_000_000,
        );
        db.put_tx_record(rec.clone()).unwrap();
        rec.status = TxStatus::Confirmed;
        db.put_tx_record(rec.clone()).unwrap();

        assert_eq!(db.get_tx_record(hash).unwrap(), Some(rec.clone()));
        assert_eq!(db.get_tx_records(hash).unwrap(), vec![rec]);
        assert!(db.get_tx_record(B256::ZERO).unwrap().is_none());
    }

    #[test]
    fn test_retries_with_same_hash_keep_separate_entries() {
        let db = setup();
        let hash = B256::repeat_byte(0x78);
        let fee = FeeParams::Dynamic {
            max_fee_per_gas: u128::from(u64::MAX) + 1,
            max_priority_fee_per_gas: 2,
        };
        let attempts: Vec<_> = (0..3)
            .map(|i| {
                let mut rec = TransactionRecord::new(hash, 4, 300_000, fee, 1_000).with_attempt(i);
                rec.status = if i == 2 {
                    TxStatus::Pending
                } else {
                    TxStatus::Dropped
                };
                rec
            })
            .collect();
        // Written newest first, read back oldest first.
        for rec in attempts.iter().rev() {
            db.put_tx_record(rec.clone()).unwrap();
        }
        // Neighbouring hash must not leak into the prefix scan.
        db.put_tx_record(TransactionRecord::new(
            B256::repeat_byte(0x79),
            5,
            1,
            fee,
            0,
        ))
        .unwrap();

        assert_eq!(db.get_tx_records(hash).unwrap(), attempts);
        assert_eq!(
            db.get_tx_record(hash).unwrap().map(|r| r.status),
            Some(TxStatus::Pending)
        );
    }

    #[test]
    fn test_task_id_from_key() {
        assert_eq!(task_id_from_key(b"task_42_0xabcdef12"), Some(TaskId::new(42)));
        assert_eq!(task_id_from_key(b"task_7_local"), Some(TaskId::new(7)));
        assert_eq!(task_id_from_key(b"garbage"), None);
    }
}
