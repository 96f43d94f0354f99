//! Bindings for the task ledger contract.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall};
use taskledger_primitives::{LedgerTask, TaskId};
use tracing::*;

use crate::{CallRequest, ContractCall, LedgerClient, LedgerError};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface ITaskLedger {
        struct Task {
            uint256 id;
            string topic;
            string result;
            address requester;
            bool completed;
        }

        event TaskCreated(uint256 id, string topic, address requester);
        event TaskCompleted(uint256 id, string result);

        function createTask(string topic) external;
        function completeTask(uint256 id, string result) external;
        function getTask(uint256 id) external view returns (Task memory);
        function taskCounter() external view returns (uint256);
        function owner() external view returns (address);
    }
}

pub use ITaskLedger::{TaskCompleted, TaskCreated};

/// Converts an on-chain task id, rejecting values beyond `u64`.
pub fn task_id_from_u256(id: U256) -> Result<TaskId, LedgerError> {
    u64::try_from(id)
        .map(TaskId::new)
        .map_err(|e| LedgerError::decode("task id", e))
}

/// A deployed task ledger contract.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TaskLedgerContract {
    address: Address,
}

impl TaskLedgerContract {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn create_task(&self, topic: &str) -> ContractCall {
        let call = ITaskLedger::createTaskCall {
            topic: topic.to_owned(),
        };
        ContractCall {
            to: self.address,
            input: call.abi_encode().into(),
            label: "createTask",
        }
    }

    pub fn complete_task(&self, id: TaskId, result: &str) -> ContractCall {
        let call = ITaskLedger::completeTaskCall {
            id: U256::from(id.get()),
            result: result.to_owned(),
        };
        ContractCall {
            to: self.address,
            input: call.abi_encode().into(),
            label: "completeTask",
        }
    }

    async fn view<C: SolCall>(
        &self,
        client: &impl LedgerClient,
        call: C,
    ) -> Result<C::Return, LedgerError> {
        let request = CallRequest::new(self.address, call.abi_encode().into());
        let data = client.call(request).await?;
        C::abi_decode_returns(&data).map_err(|e| LedgerError::decode(C::SIGNATURE, e))
    }

    /// Reads a task. Unknown ids come back as a zeroed task or a revert,
    /// depending on the contract; both are reported as errors.
    pub async fn get_task(
        &self,
        client: &impl LedgerClient,
        id: TaskId,
    ) -> Result<LedgerTask, LedgerError> {
        let task = self
            .view(
                client,
                ITaskLedger::getTaskCall {
                    id: U256::from(id.get()),
                },
            )
            .await?;

        let found = task_id_from_u256(task.id)?;
        if found != id {
            debug!(%id, %found, "ledger returned a different task id");
            return Err(LedgerError::decode(
                "getTask",
                format!("task {id} not populated"),
            ));
        }

        Ok(LedgerTask {
            id: found,
            topic: task.topic,
            result: task.result,
            requester: task.requester,
            completed: task.completed,
        })
    }

    pub async fn task_counter(&self, client: &impl LedgerClient) -> Result<u64, LedgerError> {
        let counter = self.view(client, ITaskLedger::taskCounterCall {}).await?;
        u64::try_from(counter).map_err(|e| LedgerError::decode("taskCounter", e))
    }

    pub async fn owner(&self, client: &impl LedgerClient) -> Result<Address, LedgerError> {
        self.view(client, ITaskLedger::ownerCall {}).await
    }
}
