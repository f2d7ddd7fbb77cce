//! Errors surfaced by job queue implementations

use std::collections::BTreeMap;
use thiserror::Error;

/// Job queue errors with structured variants.
///
/// `NoEligibleHost` and `Validation` are structured answers from the service;
/// `Transport` covers everything that never got a structured answer.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("no eligible host: {message}")]
    NoEligibleHost { message: String },

    #[error("validation error: {message}")]
    Validation {
        message: String,
        problem_keys: BTreeMap<String, String>,
    },

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("remote error {name}: {message}")]
    Remote { name: String, message: String },

    #[error("failed to decode {method} response: {message}")]
    Decode { method: String, message: String },
}

impl RpcError {
    /// A validation error caused by a board label that does not exist.
    ///
    /// Matches when `meta_hosts` is the only problem key; the message text
    /// itself is not inspected.
    pub fn is_nonexistent_board(&self) -> bool {
        match self {
            RpcError::Validation { problem_keys, .. } => {
                problem_keys.len() == 1 && problem_keys.contains_key("meta_hosts")
            }
            _ => false,
        }
    }

    /// Errors that mean "this test cannot run on this board/pool"
    pub fn is_not_applicable(&self) -> bool {
        matches!(self, RpcError::NoEligibleHost { .. }) || self.is_nonexistent_board()
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Transport { .. })
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        RpcError::Transport {
            message: message.into(),
            source: None,
        }
    }
}
