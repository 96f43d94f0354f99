//! [`LedgerClient`] over an alloy HTTP provider and a local signing key.

use std::{future::Future, str::FromStr};

use alloy::{
    network::{Ethereum, EthereumWallet, TransactionBuilder},
    providers::{Provider, RootProvider},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use alloy_eips::{eip2718::Encodable2718, BlockNumberOrTag};
use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use taskledger_common::retry::{policies::ConstantBackoff, retry_with_backoff_async};
use taskledger_primitives::{FeeParams, TxHash};
use tokio::sync::OnceCell;
use tracing::*;

use crate::{CallRequest, LedgerClient, LedgerError, SignedTx, TxReceipt, UnsignedTx};

/// Production ledger client.
///
/// Read-only calls are retried a configurable number of times. Broadcasts are
/// never retried here since the submitter owns that policy. Without a signing
/// key the client only reads; its signer address is zero and signing fails.
#[expect(
    missing_debug_implementations,
    reason = "provider and wallet are opaque"
)]
pub struct AlloyLedgerClient {
    provider: RootProvider<Ethereum>,
    wallet: Option<EthereumWallet>,
    signer_address: Address,
    chain_id: OnceCell<u64>,
    read_retries: u16,
    read_backoff: ConstantBackoff,
}

impl AlloyLedgerClient {
    /// Creates a client for `rpc_url`. The chain id is fetched lazily when
    /// not given.
    pub fn new(
        rpc_url: &str,
        signer: Option<PrivateKeySigner>,
        chain_id: Option<u64>,
    ) -> Result<Self, LedgerError> {
        let url = Url::parse(rpc_url)
            .map_err(|e| LedgerError::Config(format!("invalid rpc url {rpc_url}: {e}")))?;
        let signer_address = signer.as_ref().map(|s| s.address()).unwrap_or_default();
        info!(
            %signer_address,
            read_only = signer.is_none(),
            %url,
            ?chain_id,
            "ledger client configured"
        );

        Ok(Self {
            provider: RootProvider::new_http(url),
            wallet: signer.map(EthereumWallet::from),
            signer_address,
            chain_id: OnceCell::new_with(chain_id),
            read_retries: 0,
            read_backoff: ConstantBackoff::new(0),
        })
    }

    pub fn can_sign(&self) -> bool {
        self.wallet.is_some()
    }

    pub fn with_read_retries(mut self, retries: u16, delay_ms: u64) -> Self {
        self.read_retries = retries;
        self.read_backoff = ConstantBackoff::new(delay_ms);
        self
    }

    /// Parses a hex private key, with or without `0x`.
    pub fn parse_signer(key: &str) -> Result<PrivateKeySigner, LedgerError> {
        PrivateKeySigner::from_str(key.trim())
            .map_err(|e| LedgerError::Config(format!("invalid signing key: {e}")))
    }

    async fn read<R, F, Fut>(&self, name: &str, op: F) -> Result<R, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, LedgerError>>,
    {
        retry_with_backoff_async(name, self.read_retries, &self.read_backoff, op).await
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        self.chain_id
            .get_or_try_init(|| async move {
                self.read("chain_id", || async move {
                    self.provider.get_chain_id().await.map_err(LedgerError::rpc)
                })
                .await
            })
            .await
            .copied()
    }
}

fn to_request(req: CallRequest) -> TransactionRequest {
    let tx = TransactionRequest::default()
        .with_to(req.to)
        .with_input(req.input);
    match req.from {
        Some(from) => tx.with_from(from),
        None => tx,
    }
}

#[async_trait]
impl LedgerClient for AlloyLedgerClient {
    fn signer_address(&self) -> Address {
        self.signer_address
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, LedgerError> {
        self.read("transaction_count", || async move {
            self.provider
                .get_transaction_count(address)
                .pending()
                .await
                .map_err(LedgerError::rpc)
        })
        .await
    }

    async fn call(&self, request: CallRequest) -> Result<Bytes, LedgerError> {
        self.read("call", || {
            let tx = to_request(request.clone());
            async move { self.provider.call(tx).await.map_err(LedgerError::rpc) }
        })
        .await
    }

    async fn estimate_gas(&self, request: CallRequest) -> Result<u64, LedgerError> {
        // Reverts surface here and are classified by the caller, so no retry.
        self.provider
            .estimate_gas(to_request(request))
            .await
            .map_err(LedgerError::rpc)
    }

    async fn gas_price(&self) -> Result<u128, LedgerError> {
        self.read("gas_price", || async move {
            self.provider.get_gas_price().await.map_err(LedgerError::rpc)
        })
        .await
    }

    async fn latest_base_fee(&self) -> Result<Option<u64>, LedgerError> {
        let block = self
            .read("latest_block", || async move {
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Latest)
                    .await
                    .map_err(LedgerError::rpc)
            })
            .await?;
        Ok(block.and_then(|b| b.header.base_fee_per_gas))
    }

    async fn sign_transaction(&self, tx: UnsignedTx) -> Result<SignedTx, LedgerError> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| LedgerError::Signing("no signing key configured".to_owned()))?;
        let chain_id = self.chain_id().await?;
        let request = TransactionRequest::default()
            .with_from(self.signer_address)
            .with_to(tx.to)
            .with_input(tx.input)
            .with_nonce(tx.nonce)
            .with_gas_limit(tx.gas_limit)
            .with_chain_id(chain_id);
        let request = match tx.fee {
            FeeParams::Dynamic {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => request
                .with_max_fee_per_gas(max_fee_per_gas)
                .with_max_priority_fee_per_gas(max_priority_fee_per_gas),
            FeeParams::Legacy { gas_price } => request.with_gas_price(gas_price),
        };

        let envelope = request
            .build(wallet)
            .await
            .map_err(|e| LedgerError::Signing(e.to_string()))?;

        Ok(SignedTx {
            hash: *envelope.tx_hash(),
            raw: envelope.encoded_2718().into(),
        })
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, LedgerError> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(LedgerError::rpc)?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>, LedgerError> {
        let receipt = self
            .read("transaction_receipt", || async move {
                self.provider
                    .get_transaction_receipt(hash)
                    .await
                    .map_err(LedgerError::rpc)
            })
            .await?;

        Ok(receipt.map(|r| TxReceipt {
            tx_hash: r.transaction_hash,
            success: r.status(),
            block_number: r.block_number,
            logs: r.inner.logs().iter().map(|l| l.inner.clone()).collect(),
        }))
    }

    async fn is_transaction_known(&self, hash: TxHash) -> Result<bool, LedgerError> {
        let tx = self
            .read("transaction_by_hash", || async move {
                self.provider
                    .get_transaction_by_hash(hash)
                    .await
                    .map_err(LedgerError::rpc)
            })
            .await?;
        Ok(tx.is_some())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, keccak256};

    use super::*;

    // Well-known development key.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn offline_client() -> AlloyLedgerClient {
        let signer = AlloyLedgerClient::parse_signer(DEV_KEY).unwrap();
        AlloyLedgerClient::new("http://127.0.0.1:1", Some(signer), Some(31337)).unwrap()
    }

    #[test]
    fn test_parse_signer() {
        let signer = AlloyLedgerClient::parse_signer(DEV_KEY).unwrap();
        assert_eq!(
            signer.address(),
            address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
        assert!(matches!(
            AlloyLedgerClient::parse_signer("not a key"),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_bad_url() {
        let signer = AlloyLedgerClient::parse_signer(DEV_KEY).unwrap();
        let res = AlloyLedgerClient::new("not a url", Some(signer), None);
        assert!(matches!(res, Err(LedgerError::Config(_))));
    }

    #[tokio::test]
    async fn test_signs_offline_when_chain_id_configured() {
        let client = offline_client();
        for fee in [
            FeeParams::Dynamic {
                max_fee_per_gas: 2_000_000_000,
                max_priority_fee_per_gas: 1_000_000_000,
            },
            FeeParams::Legacy {
                gas_price: 1_000_000_000,
            },
        ] {
            let signed = client
                .sign_transaction(UnsignedTx {
                    to: Address::repeat_byte(0x11),
                    input: Bytes::from_static(&[1, 2, 3]),
                    nonce: 7,
                    gas_limit: 300_000,
                    fee,
                })
                .await
                .unwrap();
            assert_eq!(signed.hash, keccak256(&signed.raw));
        }
    }

    #[tokio::test]
    async fn test_read_only_client_refuses_to_sign() {
        let client = AlloyLedgerClient::new("http://127.0.0.1:1", None, Some(31337)).unwrap();
        assert!(!client.can_sign());
        assert_eq!(client.signer_address(), Address::ZERO);

        let res = client
            .sign_transaction(UnsignedTx {
                to: Address::repeat_byte(0x11),
                input: Bytes::new(),
                nonce: 0,
                gas_limit: 21_000,
                fee: FeeParams::Legacy { gas_price: 1 },
            })
            .await;
        assert!(matches!(res, Err(LedgerError::Signing(_))));
    }
}
