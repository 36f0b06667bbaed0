// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod actions;      // single operations outside the pipeline
pub mod backends;     // engine backends
pub mod bridge;       // host bridge handle
pub mod config;       // YAML config + defaults
pub mod diagnostics;
pub mod diff;         // LCS line diff
pub mod engine;       // stage pipeline
pub mod errors;       // error handling
pub mod observability;
pub mod reports;      // typed verify/execute payloads
pub mod templates;    // execute input drafts
pub mod traits;       // engine abstractions
pub mod verifier;     // determinism check
