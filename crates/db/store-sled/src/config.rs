use sled::transaction::{ConflictableTransactionResult, Transactional};
use taskledger_common::retry::{policies::ConstantBackoff, retry_with_backoff_if};
use taskledger_db_types::{DbError, DbResult};

use crate::utils::to_db_error;

const DEFAULT_RETRY_COUNT: u16 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 150;
const TEST_RETRY_DELAY_MS: u64 = 5;

/// Retry settings for multi-tree transactions.
#[derive(Debug, Clone)]
pub struct SledDbConfig {
    pub retry_count: u16,
    pub backoff: ConstantBackoff,
}

impl SledDbConfig {
    pub fn new_with_constant_backoff(retry_count: u16, delay_ms: u64) -> Self {
        Self {
            retry_count,
            backoff: ConstantBackoff::new(delay_ms),
        }
    }

    pub fn production() -> Self {
        Self::new_with_constant_backoff(DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_MS)
    }

    pub fn test() -> Self {
        Self::new_with_constant_backoff(DEFAULT_RETRY_COUNT, TEST_RETRY_DELAY_MS)
    }

    /// Runs a transaction over `trees`, retrying IO failures.
    ///
    /// Write conflicts are retried by sled itself.
    pub fn with_retry<T, F, R>(&self, trees: T, f: F) -> DbResult<R>
    where
        T: Transactional<DbError>,
        F: Fn(&T::View) -> ConflictableTransactionResult<R, DbError>,
    {
        retry_with_backoff_if(
            "sled_transaction",
            self.retry_count,
            &self.backoff,
            DbError::is_transient,
            || trees.transaction(&f).map_err(to_db_error),
        )
    }
}
