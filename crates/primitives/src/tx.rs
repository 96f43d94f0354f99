//! Transaction bookkeeping types.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// Hash of a signed transaction envelope.
pub type TxHash = B256;

/// Number of characters of the `0x`-prefixed hex hash used as a record key.
pub const TX_HASH_PREFIX_LEN: usize = 10;

/// Hash, then `submitted_at` and `attempt`.
const AUDIT_KEY_LEN: usize = 32 + 8 + 2;

/// Lifecycle state of a broadcast transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Broadcast accepted, no receipt seen yet.
    Pending,
    /// Mined with a successful status code.
    Confirmed,
    /// Mined but execution failed.
    Reverted,
    /// Superseded by a later attempt or rejected by the node.
    Dropped,
    /// No receipt within the confirmation window.
    Unknown,
}

impl TxStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Reverted | TxStatus::Dropped)
    }
}

/// Fee parameters attached to a transaction.
///
/// Externally tagged: serde_json cannot read `u128` fields back out of an
/// internally tagged enum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeParams {
    Dynamic {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    Legacy {
        gas_price: u128,
    },
}

/// Record of one broadcast attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: TxHash,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fee: FeeParams,
    /// Unix millis.
    pub submitted_at: u64,
    /// Zero-based attempt number within one submission.
    #[serde(default)]
    pub attempt: u16,
    pub status: TxStatus,
}

impl TransactionRecord {
    pub fn new(hash: TxHash, nonce: u64, gas_limit: u64, fee: FeeParams, submitted_at: u64) -> Self {
        Self {
            hash,
            nonce,
            gas_limit,
            fee,
            submitted_at,
            attempt: 0,
            status: TxStatus::Pending,
        }
    }

    pub fn with_attempt(mut self, attempt: u16) -> Self {
        self.attempt = attempt;
        self
    }

    /// Storage key of this attempt: the hash, then `submitted_at` and
    /// `attempt` big endian. Retries that re-sign the same transaction share
    /// a hash but keep separate keys, and keys of one hash sort oldest first.
    pub fn audit_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(AUDIT_KEY_LEN);
        key.extend_from_slice(self.hash.as_slice());
        key.extend_from_slice(&self.submitted_at.to_be_bytes());
        key.extend_from_slice(&self.attempt.to_be_bytes());
        key
    }

    pub fn prefix(&self) -> String {
        tx_hash_prefix(&self.hash)
    }
}

/// Returns the short key form of a transaction hash, `0x` plus 8 hex digits.
pub fn tx_hash_prefix(hash: &TxHash) -> String {
    let mut s = format!("{hash:#x}");
    s.truncate(TX_HASH_PREFIX_LEN);
    s
}
