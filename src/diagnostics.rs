// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error locations for display.
//!
//! `verify` reports locations as structured fields. The other operations only
//! put them in the message text, as `line N` optionally followed by
//! `, column M` or `col M`. [`locate`] recovers that when it can; a message
//! without the fragment simply has no location.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::actions::ActionResult;
use crate::reports::{Location, VerificationReport};
use crate::traits::Operation;

static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)line\s+(\d+)(?:,?\s*col(?:umn)?\s+(\d+))?").expect("location regex")
});

/// A message with whatever position could be recovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDiagnostic {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

/// First `line N[, column M]` fragment in `message`.
///
/// # Example
/// ```
/// use contract_lab::diagnostics::locate;
///
/// assert_eq!(locate("unexpected `}` at line 4, column 9"), (Some(4), Some(9)));
/// assert_eq!(locate("Line 7 col 2: bad token"), (Some(7), Some(2)));
/// assert_eq!(locate("missing Identity"), (None, None));
/// ```
pub fn locate(message: &str) -> (Option<u32>, Option<u32>) {
    match LOCATION_RE.captures(message) {
        Some(caps) => {
            let line = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let column = caps.get(2).and_then(|m| m.as_str().parse().ok());
            (line, column)
        }
        None => (None, None),
    }
}

fn from_location(message: String, location: Option<Location>) -> SourceDiagnostic {
    SourceDiagnostic {
        message,
        line: location.map(|l| l.line),
        column: location.map(|l| l.column),
    }
}

/// Everything in `result` worth pointing at in the source.
///
/// Structured errors from a `verify` report come first, then the call's own
/// error message with a best-effort location.
pub fn extract_diagnostics(result: &ActionResult) -> Vec<SourceDiagnostic> {
    let mut diagnostics = Vec::new();

    if result.action == Operation::Verify && result.success {
        if let Ok(report) = VerificationReport::from_json(&result.output) {
            diagnostics.extend(
                report
                    .errors
                    .into_iter()
                    .map(|d| from_location(d.message, d.location)),
            );
        }
    }

    if let Some(error) = &result.error {
        let (line, column) = locate(error);
        diagnostics.push(SourceDiagnostic {
            message: error.clone(),
            line,
            column,
        });
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(action: Operation, success: bool, output: &str, error: Option<&str>) -> ActionResult {
        ActionResult {
            action,
            success,
            output: output.to_string(),
            error: error.map(str::to_string),
            duration_ms: 0.5,
        }
    }

    #[test]
    fn locate_variants() {
        assert_eq!(locate("at line 3"), (Some(3), None));
        assert_eq!(locate("LINE 12,COLUMN 4"), (Some(12), Some(4)));
        assert_eq!(locate("at line 3 col 8"), (Some(3), Some(8)));
        assert_eq!(locate("inline text"), (None, None));
    }

    #[test]
    fn verify_report_errors_keep_structured_locations() {
        let output = r#"{"valid":false,"errors":[{"message":"Identity is missing `stable_id`","location":{"line":2,"column":3}},{"message":"no operations"}],"warnings":[]}"#;
        let diagnostics = extract_diagnostics(&result(Operation::Verify, true, output, None));

        assert_eq!(diagnostics.len(), 2);
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (Some(2), Some(3)));
        assert_eq!(diagnostics[1].line, None);
    }

    #[test]
    fn error_message_location_sniffed() {
        let diagnostics = extract_diagnostics(&result(
            Operation::Parse,
            false,
            "",
            Some("missing required section `Identity` at line 1, column 14"),
        ));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (Some(1), Some(14)));
    }

    #[test]
    fn successful_non_verify_has_nothing() {
        assert!(extract_diagnostics(&result(Operation::Hash, true, "sha256:ab", None)).is_empty());
    }
}
