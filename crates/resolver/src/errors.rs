use taskledger_db_types::DbError;
use taskledger_ledger::LedgerError;
use taskledger_primitives::{TaskId, TxHash};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogResolveError {
    #[error("transaction {0} not found")]
    TransactionNotFound(TxHash),

    #[error("transaction {0} found, but no task event detected")]
    NoTaskEvent(TxHash),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("transaction {0} not found")]
    TransactionNotFound(TxHash),

    #[error("transaction {0} found, but no task event detected")]
    NoTaskEvent(TxHash),

    /// The ledger could not be reached and nothing is stored locally.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(LedgerError),

    #[error("local store: {0}")]
    Store(#[from] DbError),
}
