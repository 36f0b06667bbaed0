// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! WASM binary encoding detection
//!
//! Uses wasmparser to tell core modules apart from Component Model binaries
//! before handing bytes to wasmtime. Only core modules can be driven through
//! the pointer/length bridge.

use crate::backends::wasm::error::{WasmError, WASM_UNSUPPORTED_ENCODING};

use wasmparser::{Encoding, Parser, Payload};

/// Kind of WebAssembly binary, from its version header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinaryKind {
    /// Core WASM module (binary version 1)
    CoreModule,
    /// Component Model binary
    Component,
}

/// Detects the kind of a WebAssembly binary by walking its payloads.
///
/// The whole binary is parsed so truncated or malformed input is reported
/// here rather than surfacing later as a compile error.
///
/// # Errors
/// Returns an error if the input is empty, truncated, or otherwise invalid per
/// the WASM spec.
pub fn detect_binary_kind(bytes: &[u8]) -> Result<BinaryKind, WasmError> {
    let parser = Parser::new(0);
    let mut encoding = None;

    for payload in parser.parse_all(bytes) {
        if let Payload::Version { encoding: enc, .. } = payload? {
            encoding.get_or_insert(enc);
        }
    }

    let encoding =
        encoding.ok_or_else(|| WasmError::InvalidWasmBinary("Invalid WASM binary".to_string()))?;

    Ok(match encoding {
        Encoding::Component => BinaryKind::Component,
        Encoding::Module => BinaryKind::CoreModule,
    })
}

/// Rejects anything the bridge cannot drive.
pub fn ensure_core_module(bytes: &[u8]) -> Result<(), WasmError> {
    match detect_binary_kind(bytes)? {
        BinaryKind::CoreModule => Ok(()),
        BinaryKind::Component => Err(WasmError::UnsupportedEncoding(
            WASM_UNSUPPORTED_ENCODING.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(detect_binary_kind(&[]).is_err());
    }

    #[test]
    fn test_invalid_input() {
        let bad = b"\x00\x00\x00\x00\x00\x00\x00\x00";
        assert!(detect_binary_kind(bad).is_err());
    }

    #[test]
    fn test_core_module_detected() {
        let bytes = wat::parse_str("(module)").unwrap();
        assert_eq!(detect_binary_kind(&bytes).unwrap(), BinaryKind::CoreModule);
        assert!(ensure_core_module(&bytes).is_ok());
    }

    #[test]
    fn test_component_rejected() {
        let bytes = wat::parse_str("(component)").unwrap();
        assert_eq!(detect_binary_kind(&bytes).unwrap(), BinaryKind::Component);
        assert!(matches!(
            ensure_core_module(&bytes),
            Err(WasmError::UnsupportedEncoding(_))
        ));
    }
}
