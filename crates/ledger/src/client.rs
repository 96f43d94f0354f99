use alloy_primitives::{Address, Bytes, Log};
use async_trait::async_trait;
use taskledger_primitives::{FeeParams, TxHash};

use crate::LedgerError;

/// A call to a ledger contract, ready for estimation and signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub input: Bytes,
    /// Name used in logs, e.g. `createTask`.
    pub label: &'static str,
}

/// Read-only call or estimation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub input: Bytes,
}

impl CallRequest {
    pub fn new(to: Address, input: Bytes) -> Self {
        Self {
            from: None,
            to,
            input,
        }
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }
}

/// Fully specified transaction awaiting a signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedTx {
    pub to: Address,
    pub input: Bytes,
    pub nonce: u64,
    pub gas_limit: u64,
    pub fee: FeeParams,
}

/// Signed EIP-2718 envelope and its hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTx {
    pub hash: TxHash,
    pub raw: Bytes,
}

/// The parts of a transaction receipt the pipeline looks at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: Option<u64>,
    pub logs: Vec<Log>,
}

/// Access to a ledger node and the signing identity used with it.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Address transactions are signed as.
    fn signer_address(&self) -> Address;

    /// Transaction count of `address` including pending transactions.
    async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError>;

    /// Executes a read-only call against the latest state.
    async fn call(&self, request: CallRequest) -> Result<Bytes, LedgerError>;

    /// Simulates `request` and returns the gas it would use.
    async fn estimate_gas(&self, request: CallRequest) -> Result<u64, LedgerError>;

    async fn gas_price(&self) -> Result<u128, LedgerError>;

    /// Base fee of the latest block, `None` on chains without one.
    async fn latest_base_fee(&self) -> Result<Option<u64>, LedgerError>;

    async fn sign_transaction(&self, tx: UnsignedTx) -> Result<SignedTx, LedgerError>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, LedgerError>;

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>, LedgerError>;

    /// Whether the node knows `hash`, either pending or mined.
    async fn is_transaction_known(&self, hash: TxHash) -> Result<bool, LedgerError>;
}
