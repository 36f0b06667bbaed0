// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stage pipeline: `source → parse → normalize → verify → hash`.

pub mod pipeline;
pub mod state;

pub use pipeline::{Pipeline, PipelineSnapshot, RunStop, RunSummary, StepOutcome};
pub use state::{transition, PipelineEvent, PipelineState, Refusal, Stage, StageResult, StageStatus};
