//! Database abstractions for the local result store.

pub mod errors;
pub mod traits;

pub use errors::DbError;
pub use traits::ResultDatabase;

pub type DbResult<T> = Result<T, DbError>;
