// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Line diff of two contracts by longest common subsequence.
//!
//! The table has `(m+1) × (n+1)` cells, so time and space are O(m·n).
//! [`diff_lines`] and [`diff_contracts`] refuse inputs whose table would
//! exceed the configured cell budget rather than slow to a crawl.

use serde::Serialize;

use crate::bridge::HostBridge;
use crate::config::DiffConfig;
use crate::errors::DiffError;
use crate::observability::messages::analysis::DiffComputed;
use crate::observability::messages::StructuredLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Same,
    Added,
    Removed,
}

/// One line of the edit script. `sequence_number` counts lines of the
/// script itself, starting at 1; it is not a line number in either input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLine {
    pub kind: DiffKind,
    pub text: String,
    pub sequence_number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub lines: Vec<DiffLine>,
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl DiffReport {
    pub fn is_identical(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Cells in the LCS table for inputs of `m` and `n` lines, if it fits in `usize`.
pub fn table_cells(m: usize, n: usize) -> Option<usize> {
    (m + 1).checked_mul(n + 1)
}

/// Minimal line edit script turning `left` into `right`.
///
/// When both neighbours of a cell have the same LCS length the backtrack
/// consumes the right-hand line, so the reversed script lists removals
/// before additions at each change.
///
/// # Example
/// ```
/// use contract_lab::diff::{compute_line_diff, DiffKind};
///
/// let report = compute_line_diff(&["a", "b", "c"], &["a", "x", "c"]);
/// let kinds: Vec<DiffKind> = report.lines.iter().map(|l| l.kind).collect();
/// assert_eq!(
///     kinds,
///     vec![DiffKind::Same, DiffKind::Removed, DiffKind::Added, DiffKind::Same]
/// );
/// ```
pub fn compute_line_diff<S: AsRef<str>>(left: &[S], right: &[S]) -> DiffReport {
    let (m, n) = (left.len(), right.len());
    let width = n + 1;
    let at = |i: usize, j: usize| i * width + j;

    let mut table = vec![0usize; (m + 1) * width];
    for i in 1..=m {
        for j in 1..=n {
            table[at(i, j)] = if left[i - 1].as_ref() == right[j - 1].as_ref() {
                table[at(i - 1, j - 1)] + 1
            } else {
                table[at(i - 1, j)].max(table[at(i, j - 1)])
            };
        }
    }

    let mut script: Vec<(DiffKind, &str)> = Vec::with_capacity(m + n);
    let (mut i, mut j) = (m, n);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && left[i - 1].as_ref() == right[j - 1].as_ref() {
            script.push((DiffKind::Same, left[i - 1].as_ref()));
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table[at(i, j - 1)] >= table[at(i - 1, j)]) {
            script.push((DiffKind::Added, right[j - 1].as_ref()));
            j -= 1;
        } else {
            script.push((DiffKind::Removed, left[i - 1].as_ref()));
            i -= 1;
        }
    }
    script.reverse();

    let mut report = DiffReport {
        lines: Vec::with_capacity(script.len()),
        added: 0,
        removed: 0,
        unchanged: 0,
    };
    for (index, (kind, text)) in script.into_iter().enumerate() {
        match kind {
            DiffKind::Same => report.unchanged += 1,
            DiffKind::Added => report.added += 1,
            DiffKind::Removed => report.removed += 1,
        }
        report.lines.push(DiffLine {
            kind,
            text: text.to_string(),
            sequence_number: index + 1,
        });
    }
    report
}

/// [`compute_line_diff`] with the table size checked against `max_cells` first.
pub fn diff_lines<S: AsRef<str>>(left: &[S], right: &[S], max_cells: usize) -> Result<DiffReport, DiffError> {
    let too_large = || DiffError::InputTooLarge {
        left_lines: left.len(),
        right_lines: right.len(),
        cells: table_cells(left.len(), right.len()).unwrap_or(usize::MAX),
        max_cells,
    };
    match table_cells(left.len(), right.len()) {
        Some(cells) if cells <= max_cells => Ok(compute_line_diff(left, right)),
        _ => Err(too_large()),
    }
}

/// Normalize both contracts through the bridge, then diff the results line by line.
///
/// Normalizing first means differences in whitespace or key order do not
/// show up as changes.
pub async fn diff_contracts(
    bridge: &HostBridge,
    left: &str,
    right: &str,
    config: &DiffConfig,
) -> Result<DiffReport, DiffError> {
    if left.trim().is_empty() || right.trim().is_empty() {
        return Err(DiffError::EmptyInput);
    }

    bridge.init().await?;
    let left_normalized = bridge.normalize(left)?;
    let right_normalized = bridge.normalize(right)?;

    let left_lines: Vec<&str> = left_normalized.split('\n').collect();
    let right_lines: Vec<&str> = right_normalized.split('\n').collect();
    let report = diff_lines(&left_lines, &right_lines, config.max_cells())?;

    DiffComputed {
        added: report.added,
        removed: report.removed,
        unchanged: report.unchanged,
    }
    .log();

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::tests::HELLO;
    use crate::backends::stub::StubEngineLoader;
    use std::sync::Arc;

    fn kinds(report: &DiffReport) -> Vec<DiffKind> {
        report.lines.iter().map(|l| l.kind).collect()
    }

    #[test]
    fn identical_inputs_are_all_same() {
        let lines = ["a", "b", "c"];
        let report = compute_line_diff(&lines, &lines);
        assert!(report.is_identical());
        assert_eq!(report.unchanged, 3);
    }

    #[test]
    fn ties_prefer_added_so_removals_come_first() {
        let report = compute_line_diff(&["x"], &["y"]);
        assert_eq!(kinds(&report), vec![DiffKind::Removed, DiffKind::Added]);
    }

    #[test]
    fn empty_sides() {
        let none: [&str; 0] = [];
        let report = compute_line_diff(&none, &["a", "b"]);
        assert_eq!(report.added, 2);
        assert_eq!(report.removed, 0);

        let report = compute_line_diff(&["a", "b"], &none);
        assert_eq!(report.removed, 2);
        assert!(compute_line_diff(&none, &none).lines.is_empty());
    }

    #[test]
    fn sequence_numbers_count_the_script() {
        let report = compute_line_diff(&["a", "b"], &["b", "c"]);
        let numbers: Vec<usize> = report.lines.iter().map(|l| l.sequence_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(kinds(&report), vec![DiffKind::Removed, DiffKind::Same, DiffKind::Added]);
    }

    #[test]
    fn minimal_script_keeps_common_lines() {
        let left = ["Contract", "  a: 1", "  b: 2", "  c: 3", "}"];
        let right = ["Contract", "  a: 1", "  c: 3", "  d: 4", "}"];
        let report = compute_line_diff(&left, &right);
        assert_eq!(report.unchanged, 4);
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 1);
    }

    #[test]
    fn table_budget_enforced() {
        let left = vec!["l"; 99];
        let right = vec!["r"; 99];
        assert!(diff_lines(&left, &right, 10_000).is_ok());
        match diff_lines(&left, &right, 9_999) {
            Err(DiffError::InputTooLarge { cells, .. }) => assert_eq!(cells, 10_000),
            other => panic!("Expected InputTooLarge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn key_order_differences_vanish_after_normalize() {
        let bridge = HostBridge::new(Arc::new(StubEngineLoader));
        let reordered = HELLO.replace(
            "    stable_id: ic-hello-001\n    version: 1.0.0",
            "    version: 1.0.0\n    stable_id: ic-hello-001",
        );

        let report = diff_contracts(&bridge, HELLO, &reordered, &DiffConfig::default())
            .await
            .unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.removed, 0);
        assert!(report.lines.iter().all(|l| l.kind == DiffKind::Same));
    }

    #[tokio::test]
    async fn changed_field_shows_up() {
        let bridge = HostBridge::new(Arc::new(StubEngineLoader));
        let bumped = HELLO.replace("version: 1.0.0", "version: 1.1.0");

        let report = diff_contracts(&bridge, HELLO, &bumped, &DiffConfig::default())
            .await
            .unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 1);
    }

    #[tokio::test]
    async fn blank_input_rejected_before_engine() {
        let bridge = HostBridge::new(Arc::new(StubEngineLoader));
        let err = diff_contracts(&bridge, HELLO, "  \n", &DiffConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DiffError::EmptyInput));
        assert!(!bridge.is_initialized());
    }

    #[tokio::test]
    async fn invalid_contract_surfaces_domain_error() {
        let bridge = HostBridge::new(Arc::new(StubEngineLoader));
        let err = diff_contracts(&bridge, HELLO, "Contract \"x\" {}", &DiffConfig::default())
            .await
            .unwrap_err();
        match err {
            DiffError::Bridge(e) => assert!(e.is_domain()),
            other => panic!("Expected bridge error, got {}", other),
        }
    }
}
