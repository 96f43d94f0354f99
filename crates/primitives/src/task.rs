use std::fmt;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Identifier of a task on the ledger contract.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<TaskId> for u64 {
    fn from(value: TaskId) -> Self {
        value.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only projection of a task as stored by the ledger contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTask {
    pub id: TaskId,
    pub topic: String,
    /// Empty until the task is completed.
    pub result: String,
    pub requester: Address,
    pub completed: bool,
}

impl LedgerTask {
    /// Minimal projection used when a task is known to be completed but the
    /// ledger cannot be read back.
    pub fn completed_stub(id: TaskId) -> Self {
        Self {
            id,
            topic: String::new(),
            result: String::new(),
            requester: Address::ZERO,
            completed: true,
        }
    }
}

/// Caller-supplied context describing what a task analyzes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    pub property_address: String,
    pub task_type: String,
    #[serde(default)]
    pub additional_details: String,
}

impl TaskContext {
    pub fn new(
        property_address: impl Into<String>,
        task_type: impl Into<String>,
        additional_details: impl Into<String>,
    ) -> Self {
        Self {
            property_address: property_address.into(),
            task_type: task_type.into(),
            additional_details: additional_details.into(),
        }
    }

    /// Renders the topic string written to the ledger by `createTask`.
    pub fn to_topic(&self) -> String {
        // Three string fields always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_has_context_fields_in_order() {
        let ctx = TaskContext::new("1 Main St", "investment", "");
        assert_eq!(
            ctx.to_topic(),
            r#"{"property_address":"1 Main St","task_type":"investment","additional_details":""}"#
        );
    }

    #[test]
    fn test_task_id_serializes_as_number() {
        let json = serde_json::to_string(&TaskId::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
