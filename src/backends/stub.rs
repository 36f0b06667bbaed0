// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-process contract engine.
//!
//! Understands a small line-oriented contract format so the rest of the
//! system can run without a compiled engine binary:
//!
//! ```text
//! Contract "hello" {
//!   Identity {
//!     stable_id: ic-hello-001
//!     version: 1.0.0
//!   }
//!   PurposeStatement {
//!     narrative: Echo a message back
//!   }
//!   BehavioralSemantics {
//!     echo: message
//!   }
//! }
//! ```
//!
//! Each `BehavioralSemantics` entry declares an operation and its
//! comma-separated parameters, written `name` or `name: Type` (untyped
//! parameters are `String`). Rejections carry a `line N, column M`
//! fragment the same way the compiled engine reports them.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::backends::wasm::WasmResult;
use crate::errors::BridgeError;
use crate::reports::{Diagnostic, ExecutionReport, PostconditionResult, ProvenanceEntry, VerificationReport};
use crate::traits::{ContractEngine, EngineLoader};

pub const IDENTITY: &str = "Identity";
pub const PURPOSE: &str = "PurposeStatement";
pub const BEHAVIOR: &str = "BehavioralSemantics";

const REQUIRED_SECTIONS: [&str; 3] = [IDENTITY, PURPOSE, BEHAVIOR];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractAst {
    pub name: String,
    pub sections: BTreeMap<String, Section>,
    pub behavioral_semantics: BehavioralSemantics,
}

/// Operations projected out of the `BehavioralSemantics` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BehavioralSemantics {
    pub operations: Vec<OperationDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationDecl {
    pub name: String,
    /// Parameter name to type name.
    pub parameters: BTreeMap<String, String>,
}

impl BehavioralSemantics {
    fn from_section(section: Option<&Section>) -> Self {
        let operations = section
            .map(|section| {
                section
                    .fields
                    .iter()
                    .map(|(name, list)| OperationDecl {
                        name: name.clone(),
                        parameters: declared_parameters(list)
                            .into_iter()
                            .map(|(param, ty)| (param.to_string(), ty.to_string()))
                            .collect(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { operations }
    }
}

/// Split `message, count: Integer` into name/type pairs.
fn declared_parameters(list: &str) -> Vec<(&str, &str)> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once(':') {
            Some((name, ty)) if !ty.trim().is_empty() => (name.trim(), ty.trim()),
            Some((name, _)) => (name.trim(), "String"),
            None => (p, "String"),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    #[serde(skip)]
    line: usize,
    #[serde(skip)]
    column: usize,
    pub fields: BTreeMap<String, String>,
}

fn rejection(line: usize, column: usize, message: impl std::fmt::Display) -> BridgeError {
    BridgeError::domain(format!("{} at line {}, column {}", message, line, column))
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn indent_of(raw: &str) -> usize {
    raw.len() - raw.trim_start().len()
}

/// `Contract "name" {` or `Contract "name" {}`; returns the name and whether
/// the body is empty.
fn parse_header(line: usize, raw: &str) -> Result<(String, bool), BridgeError> {
    let indent = indent_of(raw);
    let text = raw.trim();

    let rest = text.strip_prefix("Contract").ok_or_else(|| {
        let found = text.split_whitespace().next().unwrap_or(text);
        rejection(line, indent + 1, format!("expected `Contract`, found `{}`", found))
    })?;

    let name_col = indent + (text.len() - rest.trim_start().len()) + 1;
    let quoted = rest
        .trim_start()
        .strip_prefix('"')
        .ok_or_else(|| rejection(line, name_col, "expected a quoted contract name"))?;
    let (name, tail) = quoted
        .split_once('"')
        .ok_or_else(|| rejection(line, name_col, "unterminated contract name"))?;
    if name.is_empty() {
        return Err(rejection(line, name_col, "contract name must not be empty"));
    }

    let brace_col = indent + (text.len() - tail.trim_start().len()) + 1;
    match tail.trim() {
        "{" => Ok((name.to_string(), false)),
        "{}" => Ok((name.to_string(), true)),
        other => Err(rejection(line, brace_col, format!("expected `{{`, found `{}`", other))),
    }
}

pub fn parse_contract(source: &str) -> Result<ContractAst, BridgeError> {
    let mut lines = source
        .lines()
        .enumerate()
        .map(|(i, raw)| (i + 1, raw))
        .filter(|(_, raw)| {
            let t = raw.trim();
            !t.is_empty() && !t.starts_with("//")
        });

    let (header_line, header) = lines
        .next()
        .ok_or_else(|| rejection(1, 1, "expected `Contract \"name\" {`, found end of input"))?;
    let (name, empty_body) = parse_header(header_line, header)?;
    if empty_body {
        let column = indent_of(header) + header.trim().len() - 1;
        return Err(rejection(
            header_line,
            column,
            format!("missing required section `{}`", REQUIRED_SECTIONS[0]),
        ));
    }

    let mut sections = BTreeMap::new();
    let mut open: Option<(String, Section)> = None;
    let mut closed_at = None;
    let mut last_line = header_line;

    for (line, raw) in lines {
        last_line = line;
        let text = raw.trim();
        let column = indent_of(raw) + 1;

        if closed_at.is_some() {
            return Err(rejection(line, column, format!("unexpected `{}` after end of contract", text)));
        }

        match open.take() {
            None if text == "}" => closed_at = Some((line, column)),
            None => {
                let section_name = text
                    .strip_suffix('{')
                    .map(str::trim)
                    .filter(|n| is_identifier(n))
                    .ok_or_else(|| {
                        rejection(line, column, format!("expected a section or `}}`, found `{}`", text))
                    })?;
                if sections.contains_key(section_name) {
                    return Err(rejection(line, column, format!("duplicate section `{}`", section_name)));
                }
                open = Some((
                    section_name.to_string(),
                    Section {
                        line,
                        column,
                        fields: BTreeMap::new(),
                    },
                ));
            }
            Some((section_name, section)) if text == "}" => {
                sections.insert(section_name, section);
            }
            Some((section_name, mut section)) => {
                let (key, value) = text
                    .split_once(':')
                    .map(|(k, v)| (k.trim(), v.trim()))
                    .filter(|(k, _)| is_identifier(k))
                    .ok_or_else(|| {
                        rejection(
                            line,
                            column,
                            format!("expected `key: value` or `}}` in `{}`, found `{}`", section_name, text),
                        )
                    })?;
                if section.fields.insert(key.to_string(), value.to_string()).is_some() {
                    return Err(rejection(
                        line,
                        column,
                        format!("duplicate key `{}` in `{}`", key, section_name),
                    ));
                }
                open = Some((section_name, section));
            }
        }
    }

    if let Some((section_name, section)) = open {
        return Err(rejection(
            section.line,
            section.column,
            format!("section `{}` is never closed", section_name),
        ));
    }
    let (end_line, end_column) = closed_at.ok_or_else(|| {
        rejection(last_line + 1, 1, "expected `}` to close the contract, found end of input")
    })?;

    if let Some(missing) = REQUIRED_SECTIONS.iter().find(|s| !sections.contains_key(**s)) {
        return Err(rejection(
            end_line,
            end_column,
            format!("missing required section `{}`", missing),
        ));
    }

    let behavioral_semantics = BehavioralSemantics::from_section(sections.get(BEHAVIOR));
    Ok(ContractAst {
        name,
        sections,
        behavioral_semantics,
    })
}

/// Canonical text: sections and keys sorted, two-space indentation.
pub fn render_canonical(ast: &ContractAst) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Contract \"{}\" {{", ast.name);
    for (name, section) in &ast.sections {
        let _ = writeln!(out, "  {} {{", name);
        for (key, value) in &section.fields {
            let _ = writeln!(out, "    {}: {}", key, value);
        }
        out.push_str("  }\n");
    }
    out.push_str("}\n");
    out
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn check(ast: &ContractAst) -> VerificationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let at = |section: &Section, diagnostic: Diagnostic| diagnostic.at(section.line as u32, section.column as u32);

    if let Some(identity) = ast.sections.get(IDENTITY) {
        if !identity.fields.contains_key("stable_id") {
            errors.push(at(identity, Diagnostic::new("Identity is missing `stable_id`")));
        }
        if !identity.fields.contains_key("version") {
            warnings.push(at(identity, Diagnostic::new("Identity has no `version`")));
        }
    }
    if let Some(purpose) = ast.sections.get(PURPOSE) {
        if !purpose.fields.contains_key("narrative") {
            warnings.push(at(purpose, Diagnostic::new("PurposeStatement has no `narrative`")));
        }
    }
    if let Some(behavior) = ast.sections.get(BEHAVIOR) {
        if behavior.fields.is_empty() {
            errors.push(at(behavior, Diagnostic::new("BehavioralSemantics declares no operations")));
        }
    }

    VerificationReport::from_diagnostics(errors, warnings)
}

#[derive(Debug, Deserialize)]
struct ExecutionRequest {
    operation: Option<String>,
    #[serde(default)]
    inputs: Map<String, Value>,
}

/// Engine implemented in Rust, no binary required.
#[derive(Debug, Default)]
pub struct StubEngine {
    invocations: AtomicU64,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn canonical(&self, source: &str) -> Result<String, BridgeError> {
        parse_contract(source).map(|ast| render_canonical(&ast))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, BridgeError> {
    serde_json::to_string(value).map_err(|e| BridgeError::Marshalling(format!("failed to encode payload: {}", e)))
}

impl ContractEngine for StubEngine {
    fn parse(&self, source: &str) -> Result<String, BridgeError> {
        to_json(&parse_contract(source)?)
    }

    fn normalize(&self, source: &str) -> Result<String, BridgeError> {
        self.canonical(source)
    }

    fn verify(&self, source: &str) -> Result<String, BridgeError> {
        to_json(&check(&parse_contract(source)?))
    }

    fn hash(&self, source: &str) -> Result<String, BridgeError> {
        let canonical = self.canonical(source)?;
        Ok(format!("sha256:{}", sha256_hex(canonical.as_bytes())))
    }

    fn execute(&self, source: &str, inputs: &str) -> Result<String, BridgeError> {
        let ast = parse_contract(source)?;
        let request: ExecutionRequest = serde_json::from_str(inputs)
            .map_err(|e| BridgeError::domain(format!("invalid execution input: {}", e)))?;
        let operation = request
            .operation
            .ok_or_else(|| BridgeError::domain("execution input must name an `operation`"))?;

        let declared = &ast
            .sections
            .get(BEHAVIOR)
            .ok_or_else(|| BridgeError::domain(format!("missing required section `{}`", BEHAVIOR)))?
            .fields;
        let parameters = declared.get(&operation).ok_or_else(|| {
            let names: Vec<&str> = declared.keys().map(String::as_str).collect();
            BridgeError::domain(format!(
                "operation `{}` is not declared in {} (declared: {})",
                operation,
                BEHAVIOR,
                names.join(", ")
            ))
        })?;

        let postconditions: Vec<PostconditionResult> = declared_parameters(parameters)
            .into_iter()
            .map(|(param, _)| {
                let supplied = request.inputs.contains_key(param);
                PostconditionResult {
                    name: Some(format!("{}.{}", operation, param)),
                    passed: Some(supplied),
                    message: (!supplied).then(|| format!("parameter `{}` was not supplied", param)),
                }
            })
            .collect();

        let before = self.invocations.fetch_add(1, Ordering::SeqCst);
        let after = before + 1;
        let result = json!({ "operation": operation, "echo": Value::Object(request.inputs.clone()) });

        let mut report = ExecutionReport {
            success: Some(true),
            result: Some(result.clone()),
            state: Some(json!({ "invocations": after })),
            postconditions,
            provenance: vec![ProvenanceEntry {
                operation: operation.clone(),
                timestamp: format!("logical:{}", after),
                input_hash: sha256_hex(Value::Object(request.inputs).to_string().as_bytes()),
                output_hash: sha256_hex(result.to_string().as_bytes()),
                state_before: format!("invocations={}", before),
                state_after: format!("invocations={}", after),
            }],
            error: None,
        };
        if !report.postconditions_hold() {
            report.success = Some(false);
            report.error = Some(format!("postconditions of `{}` failed", operation));
        }

        to_json(&report)
    }

    fn engine_kind(&self) -> &'static str {
        "stub"
    }
}

/// Loader handing out a fresh [`StubEngine`].
#[derive(Debug, Default)]
pub struct StubEngineLoader;

#[async_trait]
impl EngineLoader for StubEngineLoader {
    async fn load(&self) -> WasmResult<Arc<dyn ContractEngine>> {
        Ok(Arc::new(StubEngine::new()))
    }

    fn describe(&self) -> String {
        "in-process stub".to_string()
    }
}
