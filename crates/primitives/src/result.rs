//! Records kept in the local result store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::AnalysisReport,
    task::{TaskContext, TaskId},
    tx::{tx_hash_prefix, TxHash, TxStatus},
};

/// Key suffix used for records without a transaction hash.
pub const LOCAL_ONLY_SUFFIX: &str = "local";

/// Outcome of one task processing run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Completion mined successfully.
    Completed,
    /// Completion broadcast, confirmation not observed.
    Pending,
    /// Completion mined but reverted.
    Reverted,
    /// Creation could not be broadcast.
    CreateFailed,
    /// Completion could not be broadcast.
    CompleteFailed,
    /// Signing identity is not the contract owner.
    NotOwner,
    /// Ledger rejected the payload size.
    PayloadTooLarge,
}

/// Full result of one processing run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub task_id: TaskId,
    /// Hash of the completion call, or of the creation call if completion
    /// never broadcast.
    pub tx_hash: Option<TxHash>,
    pub tx_status: Option<TxStatus>,
    #[serde(default)]
    pub create_tx_hash: Option<TxHash>,
    pub status: ProcessingStatus,
    pub timestamp: DateTime<Utc>,
    pub context: TaskContext,
    pub structured_output: AnalysisReport,
    pub raw_result: String,
    /// String submitted to the ledger, after size fitting.
    pub ledger_result: String,
}

impl ResultRecord {
    /// Short hash form identifying this record next to its task id.
    pub fn tx_prefix(&self) -> String {
        self.tx_hash
            .as_ref()
            .map(tx_hash_prefix)
            .unwrap_or_else(|| LOCAL_ONLY_SUFFIX.to_owned())
    }

    /// Storage key of the detail record.
    pub fn record_key(&self) -> String {
        record_key(self.task_id, &self.tx_prefix())
    }

    /// Whether either of the record's hashes starts with `prefix`.
    ///
    /// `prefix` must include `0x` and at least one hex digit.
    pub fn matches_tx_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.to_ascii_lowercase();
        if prefix.len() <= 2 {
            return false;
        }
        [self.tx_hash, self.create_tx_hash]
            .iter()
            .flatten()
            .any(|h| format!("{h:#x}").starts_with(&prefix))
    }

    pub fn index_entry(&self) -> IndexEntry {
        IndexEntry {
            task_id: self.task_id,
            tx_hash: self.tx_hash,
            status: self.status,
            timestamp: self.timestamp,
            property_address: self.context.property_address.clone(),
            task_type: self.context.task_type.clone(),
            record_key: self.record_key(),
        }
    }
}

/// Builds the storage key for a task id and hash prefix.
pub fn record_key(task_id: TaskId, tx_prefix: &str) -> String {
    format!("task_{task_id}_{tx_prefix}")
}

/// Compact summary of a [`ResultRecord`], one per task id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub task_id: TaskId,
    pub tx_hash: Option<TxHash>,
    pub status: ProcessingStatus,
    pub timestamp: DateTime<Utc>,
    pub property_address: String,
    pub task_type: String,
    pub record_key: String,
}

impl IndexEntry {
    pub fn tx_prefix(&self) -> Option<String> {
        self.tx_hash.as_ref().map(tx_hash_prefix)
    }
}
