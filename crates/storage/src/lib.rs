//! Storage managers for task results.
//!
//! [`ResultStore`] wraps a [`ResultDatabase`] with a thread pool so async
//! callers never block on disk IO, and serializes writers per task id.
//! [`TaskCache`] is the bounded in-memory cache shared by the resolver and
//! the processor.

mod cache;
mod exec;
mod managers;

use std::sync::Arc;

pub use cache::{CacheStats, TaskCache};
pub use managers::result::ResultStore;
use taskledger_db_types::ResultDatabase;
use threadpool::ThreadPool;

/// Number of worker threads used for store operations.
pub const DEFAULT_STORE_THREADS: usize = 4;

/// Builds a [`ResultStore`] backed by `db` with its own worker pool.
pub fn create_result_store(db: Arc<impl ResultDatabase>) -> ResultStore {
    let pool = ThreadPool::with_name("taskledger-store".to_owned(), DEFAULT_STORE_THREADS);
    ResultStore::new(pool, db)
}
