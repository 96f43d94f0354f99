//! Answers "what is task X" and "what produced transaction Y" from the local
//! store, the ledger and ledger event logs, in that order.

mod errors;
pub mod logs;
pub mod resolver;

pub use errors::{LogResolveError, ResolveError};
pub use logs::EventLogResolver;
pub use resolver::{RecentTasks, Resolution, TaskResolver, TaskResultView, TxResolution};
