//! End-to-end processing of one analysis task: ledger creation, ownership
//! check, completion and local persistence.

mod processor;

pub use processor::{TaskOutcome, TaskProcessor, TaskRequest};
