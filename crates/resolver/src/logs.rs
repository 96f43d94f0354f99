//! Recovers task ids from transaction receipts.

use std::sync::Arc;

use alloy_primitives::Log;
use alloy_sol_types::SolEvent;
use taskledger_ledger::{
    contract::{task_id_from_u256, TaskCompleted, TaskCreated},
    LedgerClient, TaskLedgerContract,
};
use taskledger_primitives::{TaskId, TxHash};
use taskledger_storage::TaskCache;
use tracing::*;

use crate::LogResolveError;

/// Decodes a task id from a ledger event, trying `TaskCreated` first.
pub fn decode_task_id(log: &Log) -> Option<TaskId> {
    let id = match TaskCreated::decode_log(log) {
        Ok(event) => event.id,
        Err(_) => TaskCompleted::decode_log(log).ok()?.id,
    };
    task_id_from_u256(id).ok()
}

/// Resolves transaction hashes to task ids via receipt logs.
#[derive(Debug)]
pub struct EventLogResolver<C> {
    client: Arc<C>,
    contract: TaskLedgerContract,
    cache: Arc<TaskCache>,
}

impl<C: LedgerClient> EventLogResolver<C> {
    pub fn new(client: Arc<C>, contract: TaskLedgerContract, cache: Arc<TaskCache>) -> Self {
        Self {
            client,
            contract,
            cache,
        }
    }

    /// Returns the task a transaction created or completed.
    ///
    /// Successful lookups are cached, so resolving the same hash again does
    /// not touch the ledger.
    #[instrument(skip(self))]
    pub async fn resolve(&self, hash: TxHash) -> Result<TaskId, LogResolveError> {
        if let Some(id) = self.cache.task_for_tx(&hash) {
            return Ok(id);
        }

        let receipt = self
            .client
            .transaction_receipt(hash)
            .await?
            .ok_or(LogResolveError::TransactionNotFound(hash))?;

        let contract = self.contract.address();
        let id = receipt
            .logs
            .iter()
            .filter(|log| log.address == contract)
            .find_map(decode_task_id)
            .ok_or_else(|| {
                debug!(logs = receipt.logs.len(), "no decodable task event");
                LogResolveError::NoTaskEvent(hash)
            })?;

        info!(%id, "resolved transaction from event log");
        self.cache.insert_tx_mapping(hash, id);
        Ok(id)
    }
}
