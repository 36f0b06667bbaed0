// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stage pipeline driver.
//!
//! [`Pipeline`] runs the fixed stage sequence over one source through a
//! [`HostBridge`]. It holds the [`PipelineState`] behind a lock and only ever
//! changes it through [`transition`]. The lock is never held across an
//! `.await`; the `running` flag is what keeps a second step out while a call
//! is in flight, and the epoch is what keeps a reset pipeline from taking a
//! stale result.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;
use tracing::Instrument;

use crate::bridge::HostBridge;
use crate::engine::state::{
    transition, PipelineEvent, PipelineState, Refusal, Stage, StageCompletion, StageResult,
    StageStatus,
};
use crate::errors::{BridgeError, PipelineError};
use crate::observability::messages::pipeline::{
    PipelineReset, StaleCompletionDiscarded, StageDispatched, StageSettled, StepRefused,
};
use crate::observability::messages::StructuredLog;

/// Result of one `step_next` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The stage ran and its result was recorded.
    Completed { stage: Stage, status: StageStatus },
    /// Nothing was dispatched.
    Refused(Refusal),
    /// The stage ran, but the pipeline was reset meanwhile; the result was dropped.
    Stale { stage: Stage },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    /// Every stage ran.
    Finished,
    /// A stage ended in error; later stages were not attempted.
    Halted(Stage),
    /// The first step was refused.
    Refused(Refusal),
    /// A reset landed while a stage was in flight.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Stages that ran during this call, in order.
    pub executed: Vec<Stage>,
    pub stop: RunStop,
}

/// Serializable copy of the pipeline for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSnapshot {
    pub stages: Vec<StageResult>,
    pub current_index: usize,
    pub running: bool,
    pub epoch: u64,
    pub is_complete: bool,
    pub has_error: bool,
}

impl From<&PipelineState> for PipelineSnapshot {
    fn from(state: &PipelineState) -> Self {
        Self {
            stages: state.stages().to_vec(),
            current_index: state.current_index(),
            running: state.is_running(),
            epoch: state.epoch(),
            is_complete: state.is_complete(),
            has_error: state.has_error(),
        }
    }
}

pub struct Pipeline {
    bridge: HostBridge,
    state: Mutex<PipelineState>,
}

impl Pipeline {
    pub fn new(bridge: HostBridge) -> Self {
        Self {
            bridge,
            state: Mutex::new(PipelineState::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, PipelineState>, PipelineError> {
        self.state.lock().map_err(|_| PipelineError::Poisoned)
    }

    fn apply(state: &mut PipelineState, event: &PipelineEvent) {
        let current = std::mem::take(state);
        *state = transition(current, event);
    }

    /// Load `source` and mark every later stage pending. Any call still in
    /// flight will have its result discarded.
    pub fn reset(&self, source: impl Into<String>) -> Result<(), PipelineError> {
        let source = source.into();
        let source_size = source.len();
        let mut state = self.lock()?;
        Self::apply(&mut state, &PipelineEvent::Reset { source });
        tracing::debug!(
            "{}",
            PipelineReset {
                epoch: state.epoch(),
                source_size,
            }
        );
        Ok(())
    }

    pub fn snapshot(&self) -> Result<PipelineSnapshot, PipelineError> {
        Ok(PipelineSnapshot::from(&*self.lock()?))
    }

    pub fn is_complete(&self) -> Result<bool, PipelineError> {
        Ok(self.lock()?.is_complete())
    }

    pub fn has_error(&self) -> Result<bool, PipelineError> {
        Ok(self.lock()?.has_error())
    }

    pub fn current_index(&self) -> Result<usize, PipelineError> {
        Ok(self.lock()?.current_index())
    }

    /// Run the next pending stage.
    ///
    /// Refuses when a stage is running, no source is loaded, an earlier stage
    /// failed, or every stage has run. A rejected contract is recorded as the
    /// stage's error and is not an `Err`. Any other bridge failure is recorded
    /// the same way and then returned.
    pub async fn step_next(&self) -> Result<StepOutcome, PipelineError> {
        let (stage, epoch, source) = {
            let mut state = self.lock()?;
            let stage = match state.next_dispatch() {
                Ok(stage) => stage,
                Err(refusal) => {
                    tracing::debug!("{}", StepRefused { reason: &refusal });
                    return Ok(StepOutcome::Refused(refusal));
                }
            };
            Self::apply(&mut state, &PipelineEvent::Dispatched { stage });
            let source = state.source().unwrap_or_default().to_string();
            (stage, state.epoch(), source)
        };

        let dispatched = StageDispatched {
            stage: stage.as_str(),
            epoch,
            source_size: source.len(),
        };
        dispatched.log();

        let started = Instant::now();
        let result = self
            .run_stage(stage, &source)
            .instrument(dispatched.span("step_next"))
            .await;
        let duration = started.elapsed();

        let (completion, failure) = match result {
            Ok(output) => (StageCompletion::Succeeded(output), None),
            Err(BridgeError::Domain(rejection)) => {
                (StageCompletion::Failed(rejection.message().to_string()), None)
            }
            Err(other) => (StageCompletion::Failed(other.to_string()), Some(other)),
        };
        let status = match completion {
            StageCompletion::Succeeded(_) => StageStatus::Success,
            StageCompletion::Failed(_) => StageStatus::Error,
        };

        {
            let mut state = self.lock()?;
            if state.epoch() != epoch {
                tracing::debug!(
                    "{}",
                    StaleCompletionDiscarded {
                        stage: stage.as_str(),
                        dispatched_epoch: epoch,
                        current_epoch: state.epoch(),
                    }
                );
                return Ok(StepOutcome::Stale { stage });
            }
            Self::apply(
                &mut state,
                &PipelineEvent::Completed {
                    epoch,
                    stage,
                    completion,
                    duration,
                },
            );
        }

        StageSettled {
            stage: stage.as_str(),
            status: status.as_str(),
            duration,
        }
        .log();

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(StepOutcome::Completed { stage, status }),
        }
    }

    async fn run_stage(&self, stage: Stage, source: &str) -> Result<String, BridgeError> {
        self.bridge.init().await?;
        match stage.operation() {
            Some(operation) => self.bridge.invoke(operation, source, None),
            None => Ok(source.to_string()),
        }
    }

    /// Step until every stage has run or one fails. A failed stage is never
    /// followed by another.
    pub async fn run_all(&self) -> Result<RunSummary, PipelineError> {
        let mut executed = Vec::new();
        loop {
            let stop = match self.step_next().await? {
                StepOutcome::Completed { stage, status } => {
                    executed.push(stage);
                    if status == StageStatus::Error {
                        RunStop::Halted(stage)
                    } else {
                        continue;
                    }
                }
                StepOutcome::Refused(Refusal::Complete) if !executed.is_empty() => RunStop::Finished,
                StepOutcome::Refused(refusal) => RunStop::Refused(refusal),
                StepOutcome::Stale { .. } => RunStop::Stale,
            };
            return Ok(RunSummary { executed, stop });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::tests::HELLO;
    use crate::backends::stub::{StubEngine, StubEngineLoader};
    use crate::backends::wasm::WasmResult;
    use crate::observability::messages::recording::SpanRecorder;
    use crate::traits::{ContractEngine, EngineLoader, Operation};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    /// Records every call; rejects or traps on marker text in the source.
    #[derive(Default)]
    struct ScriptedEngine {
        calls: Mutex<Vec<Operation>>,
    }

    impl ScriptedEngine {
        fn record(&self, operation: Operation, source: &str) -> Result<String, BridgeError> {
            self.calls.lock().unwrap().push(operation);
            match operation {
                Operation::Normalize if source.contains("reject-normalize") => {
                    Err(BridgeError::domain("cannot normalize at line 2, column 1"))
                }
                Operation::Verify if source.contains("trap-verify") => {
                    Err(BridgeError::Trap("unreachable executed".to_string()))
                }
                _ => Ok(format!("{}:{}", operation, source.len())),
            }
        }

        fn calls(&self) -> Vec<Operation> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ContractEngine for ScriptedEngine {
        fn parse(&self, source: &str) -> Result<String, BridgeError> {
            self.record(Operation::Parse, source)
        }
        fn normalize(&self, source: &str) -> Result<String, BridgeError> {
            self.record(Operation::Normalize, source)
        }
        fn verify(&self, source: &str) -> Result<String, BridgeError> {
            self.record(Operation::Verify, source)
        }
        fn hash(&self, source: &str) -> Result<String, BridgeError> {
            self.record(Operation::Hash, source)
        }
        fn execute(&self, source: &str, _inputs: &str) -> Result<String, BridgeError> {
            self.record(Operation::Execute, source)
        }
        fn engine_kind(&self) -> &'static str {
            "scripted"
        }
    }

    /// Holds `load()` open until the gate is released, so a stage stays in flight.
    struct GatedLoader {
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl EngineLoader for GatedLoader {
        async fn load(&self) -> WasmResult<Arc<dyn ContractEngine>> {
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(Arc::new(StubEngine::new()))
        }

        fn describe(&self) -> String {
            "gated".to_string()
        }
    }

    fn gated_pipeline() -> (Arc<Pipeline>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let loader = GatedLoader {
            gate: Mutex::new(Some(rx)),
        };
        let pipeline = Arc::new(Pipeline::new(HostBridge::new(Arc::new(loader))));
        (pipeline, tx)
    }

    async fn wait_until_running(pipeline: &Pipeline) {
        while !pipeline.snapshot().unwrap().running {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_step_without_source_is_refused() {
        let pipeline = Pipeline::new(HostBridge::new(Arc::new(StubEngineLoader)));
        assert_eq!(
            pipeline.step_next().await.unwrap(),
            StepOutcome::Refused(Refusal::NoSource)
        );
    }

    #[tokio::test]
    async fn test_run_all_valid_contract() {
        let pipeline = Pipeline::new(HostBridge::new(Arc::new(StubEngineLoader)));
        pipeline.reset(HELLO).unwrap();

        let summary = pipeline.run_all().await.unwrap();
        assert_eq!(summary.stop, RunStop::Finished);
        assert_eq!(
            summary.executed,
            vec![Stage::Parse, Stage::Normalize, Stage::Verify, Stage::Hash]
        );

        let snapshot = pipeline.snapshot().unwrap();
        assert!(snapshot.is_complete);
        assert!(!snapshot.has_error);
        assert!(snapshot.stages[Stage::Hash.index()]
            .output
            .as_deref()
            .unwrap()
            .starts_with("sha256:"));
    }

    #[tokio::test]
    async fn test_each_stage_runs_inside_its_span() {
        let recorder = SpanRecorder::default();
        let _guard = recorder.install();

        let pipeline = Pipeline::new(HostBridge::new(Arc::new(StubEngineLoader)));
        pipeline.reset(HELLO).unwrap();
        pipeline.step_next().await.unwrap();

        let spans = recorder.spans();
        assert!(spans[0].starts_with("stage "), "{:?}", spans);
        assert!(spans[0].contains("span_name=\"step_next\""));
        assert!(spans[0].contains("stage=\"parse\""));
        assert!(spans[0].contains("epoch=1"));
        assert!(spans[1].starts_with("operation "), "{:?}", spans);
    }

    #[tokio::test]
    async fn test_missing_sections_halt_at_parse() {
        let pipeline = Pipeline::new(HostBridge::new(Arc::new(StubEngineLoader)));
        pipeline.reset("Contract \"x\" {}").unwrap();

        assert_eq!(
            pipeline.step_next().await.unwrap(),
            StepOutcome::Completed {
                stage: Stage::Parse,
                status: StageStatus::Error
            }
        );
        let snapshot = pipeline.snapshot().unwrap();
        let parse = &snapshot.stages[Stage::Parse.index()];
        assert!(parse.error.as_deref().unwrap().contains("line"));

        assert_eq!(
            pipeline.step_next().await.unwrap(),
            StepOutcome::Refused(Refusal::Halted(Stage::Parse))
        );
        assert_eq!(
            pipeline.snapshot().unwrap().stages[Stage::Normalize.index()].status,
            StageStatus::Pending
        );

        pipeline.reset(HELLO).unwrap();
        assert_eq!(
            pipeline.step_next().await.unwrap(),
            StepOutcome::Completed {
                stage: Stage::Parse,
                status: StageStatus::Success
            }
        );
    }

    #[tokio::test]
    async fn test_failed_normalize_never_reaches_verify_or_hash() {
        let engine = Arc::new(ScriptedEngine::default());
        let pipeline = Pipeline::new(HostBridge::from_engine(engine.clone()));
        pipeline.reset("reject-normalize").unwrap();

        let summary = pipeline.run_all().await.unwrap();
        assert_eq!(summary.stop, RunStop::Halted(Stage::Normalize));
        assert_eq!(summary.executed, vec![Stage::Parse, Stage::Normalize]);
        assert_eq!(engine.calls(), vec![Operation::Parse, Operation::Normalize]);

        let snapshot = pipeline.snapshot().unwrap();
        assert_eq!(snapshot.stages[Stage::Verify.index()].status, StageStatus::Pending);
        assert_eq!(snapshot.stages[Stage::Hash.index()].status, StageStatus::Pending);

        let again = pipeline.run_all().await.unwrap();
        assert_eq!(again.stop, RunStop::Refused(Refusal::Halted(Stage::Normalize)));
        assert_eq!(engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_non_domain_failure_marks_stage_and_propagates() {
        let engine = Arc::new(ScriptedEngine::default());
        let pipeline = Pipeline::new(HostBridge::from_engine(engine.clone()));
        pipeline.reset("trap-verify").unwrap();

        let err = pipeline.run_all().await.unwrap_err();
        assert!(matches!(err, PipelineError::Bridge(BridgeError::Trap(_))));

        let snapshot = pipeline.snapshot().unwrap();
        assert_eq!(snapshot.stages[Stage::Verify.index()].status, StageStatus::Error);
        assert_eq!(snapshot.stages[Stage::Hash.index()].status, StageStatus::Pending);
        assert!(!snapshot.running);
        assert!(!engine.calls().contains(&Operation::Hash));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_steps_dispatch_once() {
        let (pipeline, gate) = gated_pipeline();
        pipeline.reset(HELLO).unwrap();

        let first = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.step_next().await }
        });
        wait_until_running(&pipeline).await;

        assert_eq!(
            pipeline.step_next().await.unwrap(),
            StepOutcome::Refused(Refusal::Busy)
        );

        gate.send(()).unwrap();
        assert_eq!(
            first.await.unwrap().unwrap(),
            StepOutcome::Completed {
                stage: Stage::Parse,
                status: StageStatus::Success
            }
        );
        assert_eq!(pipeline.current_index().unwrap(), Stage::Normalize.index());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reset_mid_call_discards_result() {
        let (pipeline, gate) = gated_pipeline();
        pipeline.reset(HELLO).unwrap();

        let first = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.step_next().await }
        });
        wait_until_running(&pipeline).await;

        pipeline.reset("Contract \"other\" {}").unwrap();
        gate.send(()).unwrap();

        assert_eq!(
            first.await.unwrap().unwrap(),
            StepOutcome::Stale { stage: Stage::Parse }
        );
        let snapshot = pipeline.snapshot().unwrap();
        assert_eq!(snapshot.epoch, 2);
        assert!(!snapshot.running);
        assert_eq!(snapshot.stages[Stage::Parse.index()].status, StageStatus::Pending);
        assert_eq!(
            snapshot.stages[Stage::Source.index()].output.as_deref(),
            Some("Contract \"other\" {}")
        );
    }
}
