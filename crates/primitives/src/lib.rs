//! Data types shared by the taskledger crates.
//!
//! These are plain data: ledger task projections, transaction bookkeeping,
//! analysis normalization and the records kept in the local result store.

pub mod analysis;
pub mod payload;
pub mod result;
pub mod task;
pub mod tx;

pub use analysis::{AnalysisOutput, AnalysisReport, NormalizedAnalysis};
pub use payload::{fit_result_payload, fit_topic_payload, MAX_LEDGER_PAYLOAD_LEN};
pub use result::{IndexEntry, ProcessingStatus, ResultRecord};
pub use task::{LedgerTask, TaskContext, TaskId};
pub use tx::{tx_hash_prefix, FeeParams, TransactionRecord, TxHash, TxStatus};
