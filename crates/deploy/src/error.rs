//! Errors raised while bringing up the contract set.

use std::time::Duration;

/// Result alias used throughout the crate.
pub type Result<T, E = DeployError> = std::result::Result<T, E>;

/// Every failure aborts the current run. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The execution environment rejected or reverted a transaction.
    #[error("transaction failed: {0}")]
    TransactionFailure(String),

    /// A post-deploy condition was not observed before the deadline.
    #[error("timed out after {timeout:?} waiting for {condition}{}", last_error_suffix(.last_error))]
    VerificationTimeout {
        condition: String,
        timeout: Duration,
        last_error: Option<String>,
    },

    /// A prerequisite contract is missing from the address registry.
    #[error("{name} is not registered in the address manager")]
    RegistryLookupFailure { name: String },

    /// A required network parameter is absent or malformed.
    #[error("invalid configuration: {0}")]
    ConfigurationError(String),

    /// A compiled artifact is missing or unreadable.
    #[error("artifact error: {0}")]
    Artifact(String),

    /// A read against the execution environment failed at the transport level.
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(" (last error: {e})"))
        .unwrap_or_default()
}

impl DeployError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    pub fn tx(msg: impl Into<String>) -> Self {
        Self::TransactionFailure(msg.into())
    }

    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::Rpc(msg.into())
    }

    pub fn not_registered(name: impl Into<String>) -> Self {
        Self::RegistryLookupFailure { name: name.into() }
    }

    /// Whether the failure happened before anything was sent to the chain.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ConfigurationError(_) | Self::Artifact(_))
    }
}
