// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pipeline state and its pure transition function.
//!
//! All mutation of [`PipelineState`] goes through [`transition`]. The driver in
//! `pipeline.rs` only decides which event to apply and when.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::traits::Operation;

/// The fixed stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Source,
    Parse,
    Normalize,
    Verify,
    Hash,
}

impl Stage {
    pub const ORDER: [Stage; 5] = [
        Stage::Source,
        Stage::Parse,
        Stage::Normalize,
        Stage::Verify,
        Stage::Hash,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The bridge operation a stage runs. `Source` runs nothing.
    pub fn operation(self) -> Option<Operation> {
        match self {
            Stage::Source => None,
            Stage::Parse => Some(Operation::Parse),
            Stage::Normalize => Some(Operation::Normalize),
            Stage::Verify => Some(Operation::Verify),
            Stage::Hash => Some(Operation::Hash),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Source => "source",
            Stage::Parse => "parse",
            Stage::Normalize => "normalize",
            Stage::Verify => "verify",
            Stage::Hash => "hash",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StageStatus::Success | StageStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Success => "success",
            StageStatus::Error => "error",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

impl StageResult {
    fn pending(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            output: None,
            error: None,
            duration_ms: None,
        }
    }
}

/// Why the next stage cannot be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// A stage is already in flight.
    Busy,
    /// No source has been loaded.
    NoSource,
    /// An earlier stage ended in error; only a reset clears it.
    Halted(Stage),
    /// Every stage has run.
    Complete,
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::Busy => f.write_str("a stage is already running"),
            Refusal::NoSource => f.write_str("no source loaded"),
            Refusal::Halted(stage) => write!(f, "stage '{}' failed; reset to continue", stage),
            Refusal::Complete => f.write_str("all stages have run"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageCompletion {
    Succeeded(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Load `source` and start over.
    Reset { source: String },
    /// `stage` was handed to the bridge.
    Dispatched { stage: Stage },
    /// A call dispatched during `epoch` returned.
    Completed {
        epoch: u64,
        stage: Stage,
        completion: StageCompletion,
        duration: Duration,
    },
}

/// Invariants: stages before `current_index` are terminal, stages after it
/// are pending, and at most one stage is running (exactly when `running`).
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    stages: [StageResult; 5],
    current_index: usize,
    running: bool,
    epoch: u64,
    source: Option<String>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            stages: Stage::ORDER.map(StageResult::pending),
            current_index: 0,
            running: false,
            epoch: 0,
            source: None,
        }
    }
}

impl PipelineState {
    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    pub fn stage(&self, stage: Stage) -> &StageResult {
        &self.stages[stage.index()]
    }

    /// Index of the next stage to run; `Stage::ORDER.len()` once all have run.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.current_index >= self.stages.len()
    }

    pub fn has_error(&self) -> bool {
        self.stages.iter().any(|s| s.status == StageStatus::Error)
    }

    /// The stage `step_next` would dispatch, or why it would not.
    pub fn next_dispatch(&self) -> Result<Stage, Refusal> {
        if self.running {
            return Err(Refusal::Busy);
        }
        if self.source.is_none() {
            return Err(Refusal::NoSource);
        }
        if let Some(failed) = self.stages[..self.current_index.min(self.stages.len())]
            .iter()
            .find(|s| s.status == StageStatus::Error)
        {
            return Err(Refusal::Halted(failed.stage));
        }
        Stage::ORDER
            .get(self.current_index)
            .copied()
            .ok_or(Refusal::Complete)
    }
}

/// Apply `event` to `state`.
///
/// Events that do not apply to the current state (a dispatch that would be
/// refused, a completion from an older epoch or for a stage that is not
/// running) leave the state unchanged.
pub fn transition(mut state: PipelineState, event: &PipelineEvent) -> PipelineState {
    match event {
        PipelineEvent::Reset { source } => {
            let mut stages = Stage::ORDER.map(StageResult::pending);
            stages[Stage::Source.index()] = StageResult {
                stage: Stage::Source,
                status: StageStatus::Success,
                output: Some(source.clone()),
                error: None,
                duration_ms: None,
            };
            PipelineState {
                stages,
                current_index: Stage::Parse.index(),
                running: false,
                epoch: state.epoch + 1,
                source: Some(source.clone()),
            }
        }
        PipelineEvent::Dispatched { stage } => {
            if state.next_dispatch() != Ok(*stage) {
                return state;
            }
            state.stages[stage.index()].status = StageStatus::Running;
            state.running = true;
            state
        }
        PipelineEvent::Completed {
            epoch,
            stage,
            completion,
            duration,
        } => {
            if *epoch != state.epoch || state.stages[stage.index()].status != StageStatus::Running {
                return state;
            }
            let slot = &mut state.stages[stage.index()];
            slot.duration_ms = Some(duration.as_secs_f64() * 1000.0);
            match completion {
                StageCompletion::Succeeded(output) => {
                    slot.status = StageStatus::Success;
                    slot.output = Some(output.clone());
                }
                StageCompletion::Failed(message) => {
                    slot.status = StageStatus::Error;
                    slot.error = Some(message.clone());
                }
            }
            state.running = false;
            state.current_index = stage.index() + 1;
            state
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> PipelineState {
        transition(
            PipelineState::default(),
            &PipelineEvent::Reset {
                source: "Contract \"x\" {}".to_string(),
            },
        )
    }

    fn complete(state: PipelineState, stage: Stage, completion: StageCompletion) -> PipelineState {
        let epoch = state.epoch();
        let state = transition(state, &PipelineEvent::Dispatched { stage });
        transition(
            state,
            &PipelineEvent::Completed {
                epoch,
                stage,
                completion,
                duration: Duration::from_millis(2),
            },
        )
    }

    #[test]
    fn fresh_state_refuses_without_source() {
        let state = PipelineState::default();
        assert_eq!(state.next_dispatch(), Err(Refusal::NoSource));
        assert!(state.stages().iter().all(|s| s.status == StageStatus::Pending));
    }

    #[test]
    fn reset_marks_source_success_and_bumps_epoch() {
        let state = loaded();
        assert_eq!(state.epoch(), 1);
        assert_eq!(state.stage(Stage::Source).status, StageStatus::Success);
        assert_eq!(state.current_index(), 1);
        assert_eq!(state.next_dispatch(), Ok(Stage::Parse));

        let again = transition(state, &PipelineEvent::Reset { source: "y".to_string() });
        assert_eq!(again.epoch(), 2);
        assert_eq!(again.source(), Some("y"));
    }

    #[test]
    fn reset_clears_running_flag() {
        let state = transition(loaded(), &PipelineEvent::Dispatched { stage: Stage::Parse });
        assert!(state.is_running());

        let state = transition(state, &PipelineEvent::Reset { source: "y".to_string() });
        assert!(!state.is_running());
        assert_eq!(state.stage(Stage::Parse).status, StageStatus::Pending);
    }

    #[test]
    fn dispatch_only_applies_to_next_stage() {
        let state = transition(loaded(), &PipelineEvent::Dispatched { stage: Stage::Verify });
        assert!(!state.is_running());

        let state = transition(state, &PipelineEvent::Dispatched { stage: Stage::Parse });
        assert_eq!(state.next_dispatch(), Err(Refusal::Busy));

        let twice = transition(state.clone(), &PipelineEvent::Dispatched { stage: Stage::Parse });
        assert_eq!(twice, state);
    }

    #[test]
    fn success_advances_index() {
        let state = complete(loaded(), Stage::Parse, StageCompletion::Succeeded("{}".to_string()));
        assert_eq!(state.stage(Stage::Parse).status, StageStatus::Success);
        assert_eq!(state.stage(Stage::Parse).output.as_deref(), Some("{}"));
        assert!(state.stage(Stage::Parse).duration_ms.is_some());
        assert_eq!(state.next_dispatch(), Ok(Stage::Normalize));
    }

    #[test]
    fn error_halts_until_reset() {
        let state = complete(
            loaded(),
            Stage::Parse,
            StageCompletion::Failed("missing section at line 1".to_string()),
        );
        assert!(state.has_error());
        assert_eq!(state.next_dispatch(), Err(Refusal::Halted(Stage::Parse)));
        assert_eq!(state.stage(Stage::Normalize).status, StageStatus::Pending);

        let state = transition(state, &PipelineEvent::Reset { source: "z".to_string() });
        assert_eq!(state.next_dispatch(), Ok(Stage::Parse));
    }

    #[test]
    fn stale_completion_ignored() {
        let state = transition(loaded(), &PipelineEvent::Dispatched { stage: Stage::Parse });
        let old_epoch = state.epoch();
        let state = transition(state, &PipelineEvent::Reset { source: "new".to_string() });
        let state = transition(state, &PipelineEvent::Dispatched { stage: Stage::Parse });

        let after = transition(
            state.clone(),
            &PipelineEvent::Completed {
                epoch: old_epoch,
                stage: Stage::Parse,
                completion: StageCompletion::Succeeded("old".to_string()),
                duration: Duration::ZERO,
            },
        );
        assert_eq!(after, state);
    }

    #[test]
    fn all_stages_complete() {
        let mut state = loaded();
        for stage in &Stage::ORDER[1..] {
            state = complete(state, *stage, StageCompletion::Succeeded(stage.to_string()));
        }
        assert!(state.is_complete());
        assert_eq!(state.next_dispatch(), Err(Refusal::Complete));
        assert!(!state.has_error());
    }
}
