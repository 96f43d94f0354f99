//! Signing, broadcasting and retrying contract calls.

use std::sync::Arc;

use chrono::Utc;
use taskledger_common::retry::{delay_schedule, policies::ExponentialBackoff};
use taskledger_config::SubmitterConfig;
use taskledger_ledger::{ContractCall, LedgerClient, LedgerError, UnsignedTx};
use taskledger_primitives::{TransactionRecord, TxHash, TxStatus};
use tokio::time;
use tracing::*;

use crate::{
    nonce::{NonceGuard, NonceSequencer},
    FeeEstimator, ReceiptWaiter, SubmitError,
};

/// Node error text meaning it already holds the exact transaction.
const ALREADY_KNOWN_MARKERS: &[&str] = &["already known", "known transaction"];

fn is_already_known(err: &LedgerError) -> bool {
    let msg = err.message();
    ALREADY_KNOWN_MARKERS.iter().any(|m| msg.contains(m))
}

fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// A broadcast call and the attempts it superseded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    /// The accepted attempt.
    pub record: TransactionRecord,
    /// Earlier attempts of the same call, all `Dropped`.
    pub superseded: Vec<TransactionRecord>,
}

impl Submission {
    pub fn hash(&self) -> TxHash {
        self.record.hash
    }

    pub fn status(&self) -> TxStatus {
        self.record.status
    }

    /// Every attempt, accepted one last.
    pub fn all_records(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.superseded.iter().chain(Some(&self.record))
    }
}

enum AttemptError {
    /// Nothing reached the node.
    Prepare(LedgerError),
    /// The node rejected the signed transaction.
    Broadcast {
        record: TransactionRecord,
        error: LedgerError,
    },
    /// Retrying would not help.
    Fatal(LedgerError),
}

/// Submits contract calls for the client's signing identity.
#[derive(Debug)]
pub struct TxSubmitter<C> {
    client: Arc<C>,
    sequencer: Arc<NonceSequencer>,
    fees: FeeEstimator<C>,
    waiter: ReceiptWaiter<C>,
    max_attempts: u16,
    backoff: ExponentialBackoff,
}

impl<C: LedgerClient> TxSubmitter<C> {
    pub fn new(client: Arc<C>, sequencer: Arc<NonceSequencer>, config: &SubmitterConfig) -> Self {
        Self {
            fees: FeeEstimator::new(client.clone(), config),
            waiter: ReceiptWaiter::new(client.clone(), config),
            client,
            sequencer,
            max_attempts: config.max_attempts.max(1),
            backoff: ExponentialBackoff::new(config.initial_retry_delay_ms, 2),
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Broadcasts `call`, retrying with backoff.
    ///
    /// The identity's nonce lock is held across all attempts. Before each
    /// retry the previous attempt is looked up on the node and adopted if it
    /// landed after all, so a slow broadcast is never duplicated.
    #[instrument(skip(self, call), fields(call = call.label))]
    pub async fn submit(&self, call: &ContractCall) -> Result<Submission, SubmitError> {
        let gas_limit = self.fees.plan_gas(call).await?;

        let address = self.client.signer_address();
        let mut guard = self.sequencer.lock(address).await;

        let mut superseded = Vec::new();
        let mut previous: Option<TransactionRecord> = None;
        let mut last_error = None;

        let delays = delay_schedule(&self.backoff, self.max_attempts);
        for (attempt, delay) in (0u16..).zip(delays) {
            if !delay.is_zero() {
                debug!(attempt, ?delay, "waiting before retry");
                time::sleep(delay).await;
            }

            if let Some(mut prev) = previous.take() {
                match self.client.is_transaction_known(prev.hash).await {
                    Ok(true) => {
                        info!(tx_hash = %prev.hash, nonce = prev.nonce, "earlier attempt landed, adopting it");
                        guard.mark_broadcast(prev.nonce);
                        return Ok(Submission {
                            record: prev,
                            superseded,
                        });
                    }
                    Ok(false) => {}
                    Err(e) => debug!(err = %e, "could not look up earlier attempt"),
                }
                prev.status = TxStatus::Dropped;
                superseded.push(prev);
            }

            match self.attempt(call, gas_limit, &guard, attempt).await {
                Ok(record) => {
                    guard.mark_broadcast(record.nonce);
                    info!(attempt, tx_hash = %record.hash, nonce = record.nonce, "transaction broadcast");
                    return Ok(Submission { record, superseded });
                }
                Err(AttemptError::Fatal(e)) => {
                    error!(attempt, err = %e, "cannot submit transaction");
                    return Err(SubmitError::Ledger(e));
                }
                Err(AttemptError::Broadcast { record, error }) => {
                    warn!(attempt, nonce = record.nonce, err = %error, "broadcast failed");
                    previous = Some(record);
                    last_error = Some(error);
                }
                Err(AttemptError::Prepare(error)) => {
                    warn!(attempt, err = %error, "could not prepare transaction");
                    last_error = Some(error);
                }
            }
        }

        if let Some(mut prev) = previous {
            prev.status = TxStatus::Dropped;
            superseded.push(prev);
        }

        let last_error = last_error.unwrap_or_else(|| LedgerError::rpc("no attempt made"));
        error!(attempts = self.max_attempts, err = %last_error, "giving up on transaction");
        Err(SubmitError::RetriesExhausted {
            attempts: self.max_attempts,
            last_error,
            dropped: superseded,
        })
    }

    /// Submits `call` and waits for its receipt. A timeout leaves the
    /// record `Unknown` rather than failing.
    pub async fn submit_and_confirm(&self, call: &ContractCall) -> Result<Submission, SubmitError> {
        let mut submission = self.submit(call).await?;
        self.waiter.wait(&mut submission.record).await;
        Ok(submission)
    }

    async fn attempt(
        &self,
        call: &ContractCall,
        gas_limit: u64,
        guard: &NonceGuard,
        attempt: u16,
    ) -> Result<TransactionRecord, AttemptError> {
        let pending = self
            .client
            .transaction_count(self.client.signer_address())
            .await
            .map_err(AttemptError::Prepare)?;
        let nonce = guard.next_nonce(pending);
        let fee = self
            .fees
            .fee_params()
            .await
            .map_err(AttemptError::Prepare)?;

        let signed = self
            .client
            .sign_transaction(UnsignedTx {
                to: call.to,
                input: call.input.clone(),
                nonce,
                gas_limit,
                fee,
            })
            .await
            .map_err(|e| match e {
                LedgerError::Signing(_) | LedgerError::Config(_) => AttemptError::Fatal(e),
                e => AttemptError::Prepare(e),
            })?;

        let mut record = TransactionRecord::new(signed.hash, nonce, gas_limit, fee, now_millis())
            .with_attempt(attempt);
        match self.client.send_raw_transaction(signed.raw).await {
            Ok(hash) => {
                if hash != record.hash {
                    warn!(local = %record.hash, node = %hash, "node reported a different hash");
                    record.hash = hash;
                }
                Ok(record)
            }
            Err(e) if is_already_known(&e) => {
                debug!(tx_hash = %record.hash, "node already has transaction");
                Ok(record)
            }
            Err(error) => Err(AttemptError::Broadcast { record, error }),
        }
    }
}
