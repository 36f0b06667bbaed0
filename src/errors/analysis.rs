// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

use super::BridgeError;

/// Errors from the stage-sequencing pipeline.
///
/// Domain errors never show up here; they are captured into the stage's
/// result. Everything else is propagated after the stage is marked failed.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("pipeline state lock poisoned")]
    Poisoned,
}

/// Errors from the normalized diff.
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("both contracts must have content")]
    EmptyInput,

    /// The LCS table would exceed the configured cell budget.
    #[error("diff input too large: {left_lines}x{right_lines} lines needs {cells} table cells (max {max_cells})")]
    InputTooLarge {
        left_lines: usize,
        right_lines: usize,
        cells: usize,
        max_cells: usize,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Errors from the determinism verifier.
#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("contract source is empty")]
    EmptySource,

    #[error("iteration count {requested} outside 1..={max}")]
    IterationsOutOfRange { requested: usize, max: usize },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Errors from the typed execute call.
#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("Invalid JSON input: {0}")]
    InvalidInput(serde_json::Error),

    #[error("engine returned a malformed execution report: {0}")]
    MalformedReport(serde_json::Error),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Errors from execution template generation.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("No operations found in BehavioralSemantics")]
    NoOperations,

    #[error("engine returned a malformed contract AST: {0}")]
    MalformedAst(serde_json::Error),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
