//! Configuration file types.

mod config;

pub use config::*;
