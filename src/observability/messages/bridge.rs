// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for host bridge initialization and calls.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Engine load started (first `init()` call).
///
/// # Log Level
/// `info!` - Important operational event
pub struct EngineLoadStarted<'a> {
    pub source: &'a str,
}

impl Display for EngineLoadStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Loading contract engine from {}", self.source)
    }
}

/// Engine loaded and instantiated.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use contract_lab::observability::messages::bridge::EngineReady;
/// use contract_lab::observability::messages::StructuredLog;
/// use std::time::Duration;
///
/// EngineReady {
///     source: "icl_runtime_bg.wasm",
///     engine: "wasm",
///     duration: Duration::from_millis(40),
/// }
/// .log();
/// ```
pub struct EngineReady<'a> {
    pub source: &'a str,
    pub engine: &'a str,
    pub duration: Duration,
}

impl Display for EngineReady<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Contract engine ready ({} from {}) in {:?}",
            self.engine, self.source, self.duration
        )
    }
}

impl StructuredLog for EngineReady<'_> {
    fn log(&self) {
        tracing::info!(
            source = self.source,
            engine = self.engine,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "engine_ready",
            span_name = name,
            source = self.source,
            engine = self.engine,
        )
    }
}

/// Engine failed to load. Fatal for the process.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct EngineUnavailable<'a> {
    pub source: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for EngineUnavailable<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Contract engine unavailable (from {}): {}",
            self.source, self.error
        )
    }
}

impl StructuredLog for EngineUnavailable<'_> {
    fn log(&self) {
        tracing::error!(source = self.source, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "engine_unavailable",
            span_name = name,
            source = self.source,
            error = %self.error,
        )
    }
}

/// One bridge operation about to cross the boundary.
///
/// # Log Level
/// `debug!` - Per-call detail
pub struct OperationInvoked<'a> {
    pub operation: &'a str,
    pub engine: &'a str,
    pub input_size: usize,
}

impl Display for OperationInvoked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Invoking {} on {} engine: input_size={} bytes",
            self.operation, self.engine, self.input_size
        )
    }
}

impl StructuredLog for OperationInvoked<'_> {
    fn log(&self) {
        tracing::debug!(
            operation = self.operation,
            engine = self.engine,
            input_size = self.input_size,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "operation",
            span_name = name,
            operation = self.operation,
            engine = self.engine,
        )
    }
}

/// The engine rejected a contract.
///
/// # Log Level
/// `warn!` - Expected, user-facing failure
pub struct DomainErrorReturned<'a> {
    pub operation: &'a str,
    pub message: &'a str,
}

impl Display for DomainErrorReturned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{} rejected contract: {}", self.operation, self.message)
    }
}

impl StructuredLog for DomainErrorReturned<'_> {
    fn log(&self) {
        tracing::warn!(operation = self.operation, detail = self.message, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("domain_error", span_name = name, operation = self.operation)
    }
}

/// A non-domain failure crossing the boundary.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct OperationFailed<'a> {
    pub operation: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for OperationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.error)
    }
}
