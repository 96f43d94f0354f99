//! Receipt polling.

use std::{sync::Arc, time::Duration};

use taskledger_config::SubmitterConfig;
use taskledger_ledger::{LedgerClient, TxReceipt};
use taskledger_primitives::{TransactionRecord, TxStatus};
use tokio::time;
use tracing::*;

/// Polls for a receipt and settles the status of a [`TransactionRecord`].
#[derive(Debug)]
pub struct ReceiptWaiter<C> {
    client: Arc<C>,
    timeout: Duration,
    poll_interval: Duration,
}

impl<C: LedgerClient> ReceiptWaiter<C> {
    pub fn new(client: Arc<C>, config: &SubmitterConfig) -> Self {
        Self {
            client,
            timeout: config.receipt_timeout(),
            poll_interval: config.receipt_poll_interval(),
        }
    }

    /// Waits up to the configured timeout.
    ///
    /// Sets the record to `Confirmed` or `Reverted` when a receipt shows up,
    /// and to `Unknown` when none does. Timing out is not an error; the
    /// transaction may still be mined later.
    #[instrument(skip(self, record), fields(tx_hash = %record.hash, nonce = record.nonce))]
    pub async fn wait(&self, record: &mut TransactionRecord) -> Option<TxReceipt> {
        let hash = record.hash;
        let poll = async {
            loop {
                match self.client.transaction_receipt(hash).await {
                    Ok(Some(receipt)) => break receipt,
                    Ok(None) => {}
                    Err(e) => warn!(err = %e, "receipt poll failed"),
                }
                time::sleep(self.poll_interval).await;
            }
        };

        match time::timeout(self.timeout, poll).await {
            Ok(receipt) => {
                record.status = if receipt.success {
                    TxStatus::Confirmed
                } else {
                    TxStatus::Reverted
                };
                info!(status = ?record.status, block = ?receipt.block_number, "transaction mined");
                Some(receipt)
            }
            Err(_) => {
                record.status = TxStatus::Unknown;
                warn!(timeout = ?self.timeout, "no receipt in time, status unknown");
                None
            }
        }
    }
}
