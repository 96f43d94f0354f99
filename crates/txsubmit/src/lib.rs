//! Transaction submission: gas and fee planning, per-identity nonce
//! sequencing, broadcast with retries and receipt confirmation.

mod errors;
pub mod fees;
pub mod nonce;
pub mod receipt;
pub mod submitter;

pub use errors::{PermanentFailure, SubmitError};
pub use fees::FeeEstimator;
pub use nonce::NonceSequencer;
pub use receipt::ReceiptWaiter;
pub use submitter::{Submission, TxSubmitter};
