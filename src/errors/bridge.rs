// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::backends::wasm::WasmError;

/// A contract rejected by the engine.
///
/// This is the recoverable failure class: the engine worked, the input was
/// invalid. The message is human-readable and may embed a `line N, column M`
/// fragment (see [`crate::diagnostics::locate`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainError {
    message: String,
}

impl DomainError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DomainError {}

/// Failures of a host bridge call.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The engine failed to load. Shared by every waiter and never retried.
    #[error("engine unavailable: {0}")]
    Initialization(Arc<WasmError>),

    /// An operation was called before `init()` completed.
    #[error("engine not initialized; call init() first")]
    NotInitialized,

    /// The allocation/ownership protocol was violated. Always a host or engine bug.
    #[error("marshalling violation: {0}")]
    Marshalling(String),

    /// The engine could not allocate memory for this call.
    #[error("allocation exhausted: {0}")]
    AllocationExhaustion(String),

    /// The engine trapped or ran out of fuel while running an operation.
    #[error("engine trapped: {0}")]
    Trap(String),

    /// The engine rejected the contract.
    #[error("{0}")]
    Domain(DomainError),
}

impl BridgeError {
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain(DomainError::new(message))
    }

    /// True for the recoverable "this contract is invalid" class.
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain(_))
    }
}
