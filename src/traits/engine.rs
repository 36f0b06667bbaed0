// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::backends::wasm::WasmResult;
use crate::errors::BridgeError;

/// The five operations a contract engine exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Parse,
    Normalize,
    Verify,
    Hash,
    Execute,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Parse,
        Operation::Normalize,
        Operation::Verify,
        Operation::Hash,
        Operation::Execute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Parse => "parse",
            Operation::Normalize => "normalize",
            Operation::Verify => "verify",
            Operation::Hash => "hash",
            Operation::Execute => "execute",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown operation '{}' (expected one of: parse, normalize, verify, hash, execute)",
                    s
                )
            })
    }
}

/// A loaded contract engine.
///
/// Every operation is synchronous and atomic from the caller's point of view:
/// an implementation must finish its whole marshalling sequence before
/// returning, so calls from independent consumers never interleave inside one
/// call.
pub trait ContractEngine: Send + Sync {
    /// Parse contract text into its AST, serialized as JSON.
    fn parse(&self, source: &str) -> Result<String, BridgeError>;

    /// Canonical serialization of the contract. Must be idempotent.
    fn normalize(&self, source: &str) -> Result<String, BridgeError>;

    /// Verification report as JSON `{ valid, errors, warnings }`.
    fn verify(&self, source: &str) -> Result<String, BridgeError>;

    /// Semantic hash of the normalized form. Must be deterministic.
    fn hash(&self, source: &str) -> Result<String, BridgeError>;

    /// Execute the contract against JSON inputs; returns the execution report.
    fn execute(&self, source: &str, inputs: &str) -> Result<String, BridgeError>;

    /// Short label used in logs.
    fn engine_kind(&self) -> &'static str;

    /// Dispatch by [`Operation`]. `inputs` is only read by `Execute` and
    /// defaults to `{}`.
    fn invoke(
        &self,
        operation: Operation,
        source: &str,
        inputs: Option<&str>,
    ) -> Result<String, BridgeError> {
        match operation {
            Operation::Parse => self.parse(source),
            Operation::Normalize => self.normalize(source),
            Operation::Verify => self.verify(source),
            Operation::Hash => self.hash(source),
            Operation::Execute => self.execute(source, inputs.unwrap_or("{}")),
        }
    }
}

/// Produces a [`ContractEngine`]. Called at most once per bridge.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> WasmResult<Arc<dyn ContractEngine>>;

    /// Where the engine comes from, for logs.
    fn describe(&self) -> String;
}
