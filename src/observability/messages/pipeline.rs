// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the stage pipeline.
//!
//! This module contains message types for logging events related to:
//! * Pipeline resets and epoch changes
//! * Stage dispatch and completion
//! * Refused steps and discarded stale completions

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Pipeline reset with a new source.
///
/// # Log Level
/// `debug!` - State change
pub struct PipelineReset {
    pub epoch: u64,
    pub source_size: usize,
}

impl Display for PipelineReset {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline reset: epoch={} source_size={} bytes",
            self.epoch, self.source_size
        )
    }
}

/// Stage marked running and handed to the bridge.
///
/// # Log Level
/// `debug!` - Per-stage detail
pub struct StageDispatched<'a> {
    pub stage: &'a str,
    pub epoch: u64,
    pub source_size: usize,
}

impl Display for StageDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatching stage '{}' (epoch {}, {} bytes)",
            self.stage, self.epoch, self.source_size
        )
    }
}

impl StructuredLog for StageDispatched<'_> {
    fn log(&self) {
        tracing::debug!(
            stage = self.stage,
            epoch = self.epoch,
            source_size = self.source_size,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "stage",
            span_name = name,
            stage = self.stage,
            epoch = self.epoch,
        )
    }
}

/// Stage settled.
///
/// # Log Level
/// `info!` on success, `warn!` on error
pub struct StageSettled<'a> {
    pub stage: &'a str,
    pub status: &'a str,
    pub duration: Duration,
}

impl Display for StageSettled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' finished with {} in {:?}",
            self.stage, self.status, self.duration
        )
    }
}

impl StructuredLog for StageSettled<'_> {
    fn log(&self) {
        if self.status == "error" {
            tracing::warn!(
                stage = self.stage,
                status = self.status,
                duration_ms = self.duration.as_secs_f64() * 1000.0,
                "{}", self
            );
        } else {
            tracing::info!(
                stage = self.stage,
                status = self.status,
                duration_ms = self.duration.as_secs_f64() * 1000.0,
                "{}", self
            );
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "stage_settled",
            span_name = name,
            stage = self.stage,
            status = self.status,
        )
    }
}

/// A completion arrived for an epoch that has since been reset.
///
/// # Log Level
/// `debug!` - Expected after a mid-call reset
pub struct StaleCompletionDiscarded<'a> {
    pub stage: &'a str,
    pub dispatched_epoch: u64,
    pub current_epoch: u64,
}

impl Display for StaleCompletionDiscarded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Discarding stale completion of '{}': dispatched in epoch {}, pipeline now at epoch {}",
            self.stage, self.dispatched_epoch, self.current_epoch
        )
    }
}

/// `step_next` declined to dispatch.
///
/// # Log Level
/// `debug!`
pub struct StepRefused<'a> {
    pub reason: &'a dyn Display,
}

impl Display for StepRefused<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Step refused: {}", self.reason)
    }
}
