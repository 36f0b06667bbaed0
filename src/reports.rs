// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Typed views of the JSON payloads `verify` and `execute` return.
//!
//! Engines have used more than one field name for the same execution section,
//! so the older names are accepted as aliases when reading.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 1-based position in the contract source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.location = Some(Location { line, column });
        self
    }
}

/// Success payload of `verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<Diagnostic>,
    #[serde(default)]
    pub warnings: Vec<Diagnostic>,
}

impl VerificationReport {
    pub fn from_diagnostics(errors: Vec<Diagnostic>, warnings: Vec<Diagnostic>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// One effect recorded by `execute`, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub operation: String,
    pub timestamp: String,
    pub input_hash: String,
    pub output_hash: String,
    pub state_before: String,
    pub state_after: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostconditionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Success payload of `execute`.
///
/// Engines are not required to send `success`; see [`ExecutionReport::succeeded`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, alias = "output")]
    pub result: Option<Value>,
    #[serde(default)]
    pub state: Option<Value>,
    #[serde(default, alias = "postcondition_results")]
    pub postconditions: Vec<PostconditionResult>,
    #[serde(default, alias = "provenance_log")]
    pub provenance: Vec<ProvenanceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionReport {
    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// True when every postcondition that reported a verdict passed.
    pub fn postconditions_hold(&self) -> bool {
        self.postconditions.iter().all(|pc| pc.passed != Some(false))
    }

    /// The engine's own verdict, or, when it sent none, no error and no
    /// failed postcondition.
    pub fn succeeded(&self) -> bool {
        self.success
            .unwrap_or_else(|| self.error.is_none() && self.postconditions_hold())
    }
}
