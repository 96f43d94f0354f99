//! Ledger access: the `LedgerClient` seam, contract bindings and the alloy
//! adapter used in production.

mod alloy_client;
mod client;
pub mod contract;
mod errors;

pub use alloy_client::AlloyLedgerClient;
#[cfg(any(test, feature = "test-utils"))]
pub use client::MockLedgerClient;
pub use client::{CallRequest, ContractCall, LedgerClient, SignedTx, TxReceipt, UnsignedTx};
pub use contract::TaskLedgerContract;
pub use errors::LedgerError;
