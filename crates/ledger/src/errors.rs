use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Transport failure or an error response from the node.
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LedgerError {
    pub fn rpc(msg: impl ToString) -> Self {
        Self::Rpc(msg.to_string())
    }

    pub fn decode(what: &'static str, reason: impl ToString) -> Self {
        Self::Decode {
            what,
            reason: reason.to_string(),
        }
    }

    /// Lowercased error text, used for matching node error messages.
    pub fn message(&self) -> String {
        self.to_string().to_lowercase()
    }
}
