// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Determinism verifier: hash one contract many times and check every
//! digest is the same.
//!
//! Each iteration is a real `hash` call through the bridge; nothing on this
//! path caches results. Timing is reported alongside but is not the point.

use std::collections::HashSet;
use std::time::Instant;

use serde::Serialize;

use crate::bridge::HostBridge;
use crate::config::consts::MAX_DETERMINISM_ITERATIONS;
use crate::config::DeterminismConfig;
use crate::errors::VerifierError;
use crate::observability::messages::analysis::DeterminismChecked;
use crate::observability::messages::StructuredLog;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeterminismSample {
    pub iteration_count: usize,
    pub hashes: Vec<String>,
    pub all_identical: bool,
    pub total_ms: f64,
    pub avg_ms: f64,
}

impl DeterminismSample {
    pub fn distinct(&self) -> usize {
        self.hashes.iter().collect::<HashSet<_>>().len()
    }
}

pub struct DeterminismVerifier {
    bridge: HostBridge,
    max_iterations: usize,
}

impl DeterminismVerifier {
    pub fn new(bridge: HostBridge) -> Self {
        Self {
            bridge,
            max_iterations: MAX_DETERMINISM_ITERATIONS,
        }
    }

    pub fn from_config(bridge: HostBridge, config: &DeterminismConfig) -> Self {
        Self {
            bridge,
            max_iterations: config.max_iterations(),
        }
    }

    /// Hash `source` `iterations` times.
    ///
    /// `iterations` must be in `1..=max_iterations`; out-of-range counts are
    /// rejected, not clamped. Any failing hash call aborts the run.
    pub async fn run(&self, source: &str, iterations: usize) -> Result<DeterminismSample, VerifierError> {
        if source.trim().is_empty() {
            return Err(VerifierError::EmptySource);
        }
        if iterations == 0 || iterations > self.max_iterations {
            return Err(VerifierError::IterationsOutOfRange {
                requested: iterations,
                max: self.max_iterations,
            });
        }

        self.bridge.init().await?;

        let started = Instant::now();
        let hashes = (0..iterations)
            .map(|_| self.bridge.hash(source))
            .collect::<Result<Vec<_>, _>>()?;
        let total_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut sample = DeterminismSample {
            iteration_count: iterations,
            hashes,
            all_identical: false,
            total_ms,
            avg_ms: total_ms / iterations as f64,
        };
        let distinct = sample.distinct();
        sample.all_identical = distinct == 1;

        DeterminismChecked {
            iterations,
            distinct,
            total_ms,
        }
        .log();

        Ok(sample)
    }
}

/// Hash `source` `iterations` times with the default iteration ceiling.
pub async fn run_determinism_check(
    bridge: &HostBridge,
    source: &str,
    iterations: usize,
) -> Result<DeterminismSample, VerifierError> {
    DeterminismVerifier::new(bridge.clone()).run(source, iterations).await
}
