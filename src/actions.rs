// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! One-off operations outside the pipeline.
//!
//! [`run_action`] runs a single operation and records its outcome and timing.
//! [`execute_contract`] is the typed form of `execute`, and
//! [`execution_templates`] drafts its inputs from the contract's declared
//! operations.

use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::bridge::HostBridge;
use crate::errors::{BridgeError, ExecuteError, TemplateError};
use crate::reports::ExecutionReport;
use crate::templates::{extract_operations, OperationTemplate};
use crate::traits::Operation;

/// Outcome of one operation. A rejected contract is `success = false` with
/// the engine's message in `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action: Operation,
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: f64,
}

/// Run `action` against `source`, loading the engine first if needed.
///
/// `inputs` is only used by `Execute`, defaults to `{}`, and must be JSON;
/// malformed inputs fail the action without reaching the engine. Rejections
/// are captured in the result. Load failures and other bridge errors are
/// returned.
pub async fn run_action(
    bridge: &HostBridge,
    action: Operation,
    source: &str,
    inputs: Option<&str>,
) -> Result<ActionResult, BridgeError> {
    let started = Instant::now();
    let finish = |outcome: Result<String, String>| {
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            Ok(output) => ActionResult {
                action,
                success: true,
                output,
                error: None,
                duration_ms,
            },
            Err(error) => ActionResult {
                action,
                success: false,
                output: String::new(),
                error: Some(error),
                duration_ms,
            },
        }
    };

    if action == Operation::Execute {
        if let Err(e) = serde_json::from_str::<Value>(inputs.unwrap_or("{}")) {
            return Ok(finish(Err(ExecuteError::InvalidInput(e).to_string())));
        }
    }

    bridge.init().await?;
    match bridge.invoke(action, source, inputs) {
        Ok(output) => Ok(finish(Ok(output))),
        Err(BridgeError::Domain(rejection)) => Ok(finish(Err(rejection.message().to_string()))),
        Err(other) => Err(other),
    }
}

/// Execute `source` against JSON `inputs` and decode the report.
pub async fn execute_contract(
    bridge: &HostBridge,
    source: &str,
    inputs: &str,
) -> Result<ExecutionReport, ExecuteError> {
    serde_json::from_str::<Value>(inputs).map_err(ExecuteError::InvalidInput)?;

    bridge.init().await?;
    let payload = bridge.execute(source, inputs)?;
    ExecutionReport::from_json(&payload).map_err(ExecuteError::MalformedReport)
}

/// One execute input template per operation the contract declares.
pub async fn execution_templates(
    bridge: &HostBridge,
    source: &str,
) -> Result<Vec<OperationTemplate>, TemplateError> {
    bridge.init().await?;
    let ast = bridge.parse(source)?;
    Ok(extract_operations(&ast)?
        .iter()
        .map(OperationTemplate::from_operation)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::tests::HELLO;
    use crate::backends::stub::StubEngineLoader;
    use crate::diagnostics::extract_diagnostics;
    use std::sync::Arc;

    fn bridge() -> HostBridge {
        HostBridge::new(Arc::new(StubEngineLoader))
    }

    #[tokio::test]
    async fn test_successful_action() {
        let result = run_action(&bridge(), Operation::Hash, HELLO, None).await.unwrap();
        assert!(result.success);
        assert!(result.output.starts_with("sha256:"));
        assert!(result.error.is_none());
        assert!(result.duration_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_rejection_is_captured() {
        let result = run_action(&bridge(), Operation::Parse, "Contract \"x\" {}", None)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.is_empty());

        let diagnostics = extract_diagnostics(&result);
        assert_eq!(diagnostics[0].line, Some(1));
    }

    #[tokio::test]
    async fn test_execute_defaults_inputs() {
        let result = run_action(&bridge(), Operation::Execute, HELLO, None).await.unwrap();
        // `{}` names no operation, which the engine rejects.
        assert!(!result.success);
        assert!(result.error.unwrap().contains("operation"));
    }

    #[tokio::test]
    async fn test_invalid_json_never_reaches_engine() {
        let bridge = bridge();
        let result = run_action(&bridge, Operation::Execute, HELLO, Some("{not json"))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Invalid JSON input"));
        assert!(!bridge.is_initialized());
    }

    #[tokio::test]
    async fn test_execute_contract_typed_report() {
        let report = execute_contract(
            &bridge(),
            HELLO,
            r#"{"operation":"echo","inputs":{"message":"Hello"}}"#,
        )
        .await
        .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.provenance.len(), 1);
        assert_eq!(report.provenance[0].operation, "echo");
    }

    #[tokio::test]
    async fn test_execute_contract_rejects_bad_json() {
        let err = execute_contract(&bridge(), HELLO, "[1,").await.unwrap_err();
        assert!(matches!(err, ExecuteError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_templates_from_declared_operations() {
        let templates = execution_templates(&bridge(), HELLO).await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].operation, "echo");
        assert_eq!(templates[0].inputs["message"], "<String>");

        // The drafted input is accepted by execute as-is.
        let inputs = templates[0].render().unwrap();
        let report = execute_contract(&bridge(), HELLO, &inputs).await.unwrap();
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn test_templates_need_declared_operations() {
        let empty = HELLO.replace("    echo: message\n", "");
        let err = execution_templates(&bridge(), &empty).await.unwrap_err();
        assert!(matches!(err, TemplateError::NoOperations));
        assert_eq!(err.to_string(), "No operations found in BehavioralSemantics");

        let err = execution_templates(&bridge(), "Contract \"x\" {}").await.unwrap_err();
        assert!(matches!(err, TemplateError::Bridge(ref e) if e.is_domain()));
    }

    #[tokio::test]
    async fn test_execute_contract_unknown_operation() {
        let err = execute_contract(&bridge(), HELLO, r#"{"operation":"shout"}"#)
            .await
            .unwrap_err();
        match err {
            ExecuteError::Bridge(e) => assert!(e.is_domain()),
            other => panic!("Expected domain error, got {}", other),
        }
    }
}
