use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use taskledger_ledger::{LedgerClient, TaskLedgerContract};
use taskledger_primitives::{
    fit_result_payload, fit_topic_payload, AnalysisOutput, LedgerTask, ProcessingStatus,
    ResultRecord, TaskContext, TaskId, TransactionRecord, TxStatus,
};
use taskledger_storage::{ResultStore, TaskCache};
use taskledger_txsubmit::{PermanentFailure, SubmitError, Submission, TxSubmitter};
use tracing::*;

/// A task to record on the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskRequest {
    pub task_id: TaskId,
    pub context: TaskContext,
}

/// What happened to a task, ledger-wise and locally.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub status: ProcessingStatus,
    pub create_tx: Option<TransactionRecord>,
    pub complete_tx: Option<TransactionRecord>,
    pub record: ResultRecord,
    /// Ledger view of the task after a successful completion.
    pub on_chain: Option<LedgerTask>,
    /// Whether the result record reached the local store.
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn failure_status(err: &SubmitError, broadcast_failed: ProcessingStatus) -> ProcessingStatus {
    match err {
        SubmitError::Permanent(PermanentFailure::NotOwner) => ProcessingStatus::NotOwner,
        SubmitError::Permanent(PermanentFailure::PayloadTooLarge) => {
            ProcessingStatus::PayloadTooLarge
        }
        _ => broadcast_failed,
    }
}

/// Tracks every attempt of the pipeline for the audit trail.
#[derive(Debug, Default)]
struct Attempts {
    records: Vec<TransactionRecord>,
}

impl Attempts {
    fn track(&mut self, res: &Result<Submission, SubmitError>) {
        match res {
            Ok(sub) => self.records.extend(sub.all_records().cloned()),
            Err(e) => self.records.extend(e.dropped_attempts().iter().cloned()),
        }
    }
}

/// Runs the create/complete pipeline and persists the result regardless of
/// what the ledger did.
#[expect(
    missing_debug_implementations,
    reason = "ResultStore has no Debug implementation"
)]
pub struct TaskProcessor<C> {
    submitter: Arc<TxSubmitter<C>>,
    contract: TaskLedgerContract,
    store: ResultStore,
    cache: Arc<TaskCache>,
}

impl<C: LedgerClient> TaskProcessor<C> {
    pub fn new(
        submitter: Arc<TxSubmitter<C>>,
        contract: TaskLedgerContract,
        store: ResultStore,
        cache: Arc<TaskCache>,
    ) -> Self {
        Self {
            submitter,
            contract,
            store,
            cache,
        }
    }

    #[instrument(skip_all, fields(task_id = %request.task_id))]
    pub async fn process(&self, request: TaskRequest, analysis: AnalysisOutput) -> TaskOutcome {
        let TaskRequest { task_id, context } = request;

        let normalized = analysis.normalize();
        if normalized.synthesized {
            info!("analysis was unstructured, using synthesized report");
        }
        let topic = fit_topic_payload(context.to_topic());
        let ledger_result = fit_result_payload(normalized.raw_text.clone(), &normalized.report);

        let mut attempts = Attempts::default();
        let mut error = None;
        let mut complete_tx = None;

        let created = self
            .submitter
            .submit_and_confirm(&self.contract.create_task(&topic))
            .await;
        attempts.track(&created);

        let (create_tx, mut status) = match created {
            Ok(sub) => {
                if sub.status() == TxStatus::Reverted {
                    warn!(tx_hash = %sub.hash(), "createTask reverted, completing anyway");
                }
                (Some(sub.record), ProcessingStatus::Pending)
            }
            Err(e) => {
                error!(err = %e, "could not create task on ledger");
                let status = failure_status(&e, ProcessingStatus::CreateFailed);
                error = Some(e.to_string());
                (None, status)
            }
        };

        if create_tx.is_some() && self.signer_is_owner().await {
            let completed = self
                .submitter
                .submit_and_confirm(&self.contract.complete_task(task_id, &ledger_result))
                .await;
            attempts.track(&completed);

            match completed {
                Ok(sub) => {
                    status = match sub.status() {
                        TxStatus::Confirmed => ProcessingStatus::Completed,
                        TxStatus::Reverted => ProcessingStatus::Reverted,
                        _ => ProcessingStatus::Pending,
                    };
                    complete_tx = Some(sub.record);
                }
                Err(e) => {
                    error!(err = %e, "could not complete task on ledger");
                    status = failure_status(&e, ProcessingStatus::CompleteFailed);
                    error = Some(e.to_string());
                }
            }
        } else if create_tx.is_some() {
            status = ProcessingStatus::NotOwner;
        }

        let final_tx = complete_tx.as_ref().or(create_tx.as_ref());
        let record = ResultRecord {
            task_id,
            tx_hash: final_tx.map(|tx| tx.hash),
            tx_status: final_tx.map(|tx| tx.status),
            create_tx_hash: create_tx.as_ref().map(|tx| tx.hash),
            status,
            timestamp: Utc::now(),
            context,
            structured_output: normalized.report,
            raw_result: normalized.raw_text,
            ledger_result,
        };

        let persisted = self.persist(&record, attempts.records).await;
        if !persisted && error.is_none() {
            error = Some("result could not be stored locally".to_owned());
        }

        let on_chain = if status == ProcessingStatus::Completed {
            Some(self.read_back(task_id).await)
        } else {
            None
        };

        info!(?status, tx_hash = ?record.tx_hash, persisted, "task processed");
        TaskOutcome {
            task_id,
            status,
            create_tx,
            complete_tx,
            record,
            on_chain,
            persisted,
            error,
        }
    }

    /// Whether the signer owns the contract. Read errors count as yes; the
    /// completion call reports the real answer.
    async fn signer_is_owner(&self) -> bool {
        let client = self.submitter.client();
        match self.contract.owner(client.as_ref()).await {
            Ok(owner) if owner == client.signer_address() => true,
            Ok(owner) => {
                error!(%owner, signer = %client.signer_address(), "signer is not the contract owner");
                false
            }
            Err(e) => {
                warn!(err = %e, "could not verify ownership, attempting completion");
                true
            }
        }
    }

    /// Writes the result record and every transaction attempt, and caches
    /// the hash mappings.
    async fn persist(&self, record: &ResultRecord, txs: Vec<TransactionRecord>) -> bool {
        for tx in &txs {
            self.cache.insert_tx_mapping(tx.hash, record.task_id);
        }
        self.cache.insert_record(record.clone());

        for tx in txs {
            if let Err(e) = self.store.put_tx_record_async(tx).await {
                warn!(err = %e, "failed to store transaction record");
            }
        }

        match self.store.put_result_async(record.clone()).await {
            Ok(()) => true,
            Err(e) => {
                error!(err = %e, key = %record.record_key(), "failed to store result");
                false
            }
        }
    }

    async fn read_back(&self, task_id: TaskId) -> LedgerTask {
        let client = self.submitter.client();
        match self.contract.get_task(client.as_ref(), task_id).await {
            Ok(task) => {
                self.cache.insert_ledger_task(task.clone());
                task
            }
            Err(e) => {
                warn!(err = %e, "could not read back completed task");
                LedgerTask::completed_stub(task_id)
            }
        }
    }
}
