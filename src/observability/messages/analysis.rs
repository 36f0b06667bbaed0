// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the diff and determinism checks.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Normalized diff computed.
///
/// # Log Level
/// `info!`
pub struct DiffComputed {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl Display for DiffComputed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Diff computed: +{} added, -{} removed, {} unchanged",
            self.added, self.removed, self.unchanged
        )
    }
}

impl StructuredLog for DiffComputed {
    fn log(&self) {
        tracing::info!(
            added = self.added,
            removed = self.removed,
            unchanged = self.unchanged,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("diff", span_name = name, added = self.added, removed = self.removed)
    }
}

/// Determinism check finished.
///
/// # Log Level
/// `info!` when all digests match, `error!` otherwise
///
/// # Example
/// ```
/// use contract_lab::observability::messages::analysis::DeterminismChecked;
///
/// let msg = DeterminismChecked {
///     iterations: 10,
///     distinct: 1,
///     total_ms: 3.5,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct DeterminismChecked {
    pub iterations: usize,
    pub distinct: usize,
    pub total_ms: f64,
}

impl Display for DeterminismChecked {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Determinism check: {} iterations, {} distinct digest(s) in {:.3}ms",
            self.iterations, self.distinct, self.total_ms
        )
    }
}

impl StructuredLog for DeterminismChecked {
    fn log(&self) {
        if self.distinct == 1 {
            tracing::info!(
                iterations = self.iterations,
                distinct = self.distinct,
                total_ms = self.total_ms,
                "{}", self
            );
        } else {
            tracing::error!(
                iterations = self.iterations,
                distinct = self.distinct,
                total_ms = self.total_ms,
                "{}", self
            );
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("determinism", span_name = name, iterations = self.iterations)
    }
}
