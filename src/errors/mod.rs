// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod analysis;
mod bridge;
mod config;

pub use analysis::{DiffError, ExecuteError, PipelineError, TemplateError, VerifierError};
pub use bridge::{BridgeError, DomainError};
pub use config::ConfigError;
