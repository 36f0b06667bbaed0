// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Execution input templates derived from a parsed contract.
//!
//! The engine's parse output lists declared operations under
//! `behavioral_semantics.operations`. Each becomes a ready-to-edit
//! `{"operation": ..., "inputs": {...}}` document whose inputs hold a
//! placeholder value for the parameter's declared type.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::errors::TemplateError;

const ZERO_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// An operation and its parameter types, as declared by the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInfo {
    pub name: String,
    pub parameters: BTreeMap<String, String>,
}

/// Execution input for one operation, filled with placeholders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationTemplate {
    pub operation: String,
    pub inputs: Map<String, Value>,
}

impl OperationTemplate {
    pub fn from_operation(info: &OperationInfo) -> Self {
        let inputs = info
            .parameters
            .iter()
            .map(|(param, ty)| (param.clone(), placeholder_for_type(ty)))
            .collect();
        Self {
            operation: info.name.clone(),
            inputs,
        }
    }

    /// Two-space indented JSON, ready to pass to `execute`.
    pub fn render(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn known_placeholder(ty: &str) -> Option<Value> {
    let value = match ty {
        "String" => json!("<String>"),
        "Integer" => json!(0),
        "Float" => json!(0.0),
        "Boolean" => json!(false),
        "ISO8601" => json!("2026-01-01T00:00:00Z"),
        "Uuid" | "UUID" => json!(ZERO_UUID),
        "Array" => json!([]),
        "Map" | "Object" => json!({}),
        _ => return None,
    };
    Some(value)
}

/// Sample value for a declared type. Surrounding quotes are ignored;
/// unknown types become `"<Type>"`.
pub fn placeholder_for_type(ty: &str) -> Value {
    let unquoted = ty.strip_prefix('"').unwrap_or(ty);
    let unquoted = unquoted.strip_suffix('"').unwrap_or(unquoted);
    known_placeholder(ty)
        .or_else(|| known_placeholder(unquoted))
        .unwrap_or_else(|| Value::String(format!("<{}>", ty)))
}

/// Pull declared operations out of a parse payload.
///
/// Missing names read as `unknown`, and parameters that are not an object
/// read as none. Non-string type values are kept in their JSON form.
pub fn extract_operations(ast_json: &str) -> Result<Vec<OperationInfo>, TemplateError> {
    let ast: Value = serde_json::from_str(ast_json).map_err(TemplateError::MalformedAst)?;
    let operations = match ast.pointer("/behavioral_semantics/operations") {
        Some(Value::Array(ops)) if !ops.is_empty() => ops,
        _ => return Err(TemplateError::NoOperations),
    };

    Ok(operations
        .iter()
        .map(|op| OperationInfo {
            name: op
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            parameters: op
                .get("parameters")
                .and_then(Value::as_object)
                .map(|params| {
                    params
                        .iter()
                        .map(|(param, ty)| {
                            let ty = ty.as_str().map_or_else(|| ty.to_string(), str::to_string);
                            (param.clone(), ty)
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_get_typed_placeholders() {
        assert_eq!(placeholder_for_type("String"), json!("<String>"));
        assert_eq!(placeholder_for_type("Integer"), json!(0));
        assert_eq!(placeholder_for_type("Boolean"), json!(false));
        assert_eq!(placeholder_for_type("UUID"), json!(ZERO_UUID));
        assert_eq!(placeholder_for_type("Map"), json!({}));
    }

    #[test]
    fn quoted_and_unknown_types() {
        assert_eq!(placeholder_for_type("\"Integer\""), json!(0));
        assert_eq!(placeholder_for_type("Money"), json!("<Money>"));
        assert_eq!(placeholder_for_type("\"Money\""), json!("<\"Money\">"));
    }

    #[test]
    fn lenient_extraction() {
        let ast = r#"{"behavioral_semantics":{"operations":[
            {"parameters":{"n":"Integer","tags":["a"]}},
            {"name":"ping","parameters":"none"}
        ]}}"#;
        let ops = extract_operations(ast).unwrap();

        assert_eq!(ops[0].name, "unknown");
        assert_eq!(ops[0].parameters["n"], "Integer");
        assert_eq!(ops[0].parameters["tags"], r#"["a"]"#);
        assert_eq!(ops[1].name, "ping");
        assert!(ops[1].parameters.is_empty());
    }

    #[test]
    fn empty_or_missing_operations() {
        for ast in [r#"{}"#, r#"{"behavioral_semantics":{"operations":[]}}"#] {
            assert!(matches!(extract_operations(ast), Err(TemplateError::NoOperations)));
        }
        assert!(matches!(extract_operations("nope"), Err(TemplateError::MalformedAst(_))));
    }

    #[test]
    fn template_renders_pretty_json() {
        let info = OperationInfo {
            name: "transfer".to_string(),
            parameters: BTreeMap::from([
                ("amount".to_string(), "Float".to_string()),
                ("to".to_string(), "Uuid".to_string()),
            ]),
        };
        let rendered = OperationTemplate::from_operation(&info).render().unwrap();

        assert_eq!(
            rendered,
            "{\n  \"operation\": \"transfer\",\n  \"inputs\": {\n    \"amount\": 0.0,\n    \"to\": \"00000000-0000-0000-0000-000000000000\"\n  }\n}"
        );
    }
}
