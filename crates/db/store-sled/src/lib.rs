//! Sled-backed implementation of the local result store.

mod config;
mod init;
mod results;
mod utils;

pub use config::SledDbConfig;
pub use init::{init_result_db, open_sled_database};
pub use results::ResultDBSled;
