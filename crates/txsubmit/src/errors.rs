use taskledger_ledger::LedgerError;
use taskledger_primitives::TransactionRecord;
use thiserror::Error;

/// Failures that no amount of retrying will fix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum PermanentFailure {
    #[error("signer is not the contract owner")]
    NotOwner,

    #[error("payload exceeds the contract size limit")]
    PayloadTooLarge,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    /// Estimation showed the call can never succeed. Nothing was broadcast.
    #[error("permanent failure: {0}")]
    Permanent(#[from] PermanentFailure),

    /// Every attempt failed to broadcast. `dropped` holds the rejected
    /// attempts for the audit trail.
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u16,
        last_error: LedgerError,
        dropped: Vec<TransactionRecord>,
    },

    /// Local failure, e.g. the signer refused the transaction.
    #[error("ledger client: {0}")]
    Ledger(#[from] LedgerError),
}

impl SubmitError {
    /// Attempts rejected before the submission was abandoned.
    pub fn dropped_attempts(&self) -> &[TransactionRecord] {
        match self {
            SubmitError::RetriesExhausted { dropped, .. } => dropped,
            _ => &[],
        }
    }
}
