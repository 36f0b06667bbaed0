// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error types for loading the contract engine.
//!
//! These errors only occur while the engine binary is read, validated,
//! compiled, linked and instantiated. Once the engine is running, failures are
//! reported through [`crate::errors::BridgeError`] instead.

use thiserror::Error;

/// Error message for engine binaries built as Component Model components.
///
/// The contract engine speaks the core-module pointer/length ABI with an
/// externref table for thrown values; component binaries use the canonical ABI
/// and cannot be driven by this host.
pub const WASM_UNSUPPORTED_ENCODING: &str = "Unsupported WASM binary: Component Model binaries are not supported. \
The contract engine must be a core WASM module exporting the pointer/length ABI.";

/// Load-time failures for the WASM-backed contract engine.
#[derive(Error, Debug)]
pub enum WasmError {
    /// Invalid or malformed WASM binary format.
    #[error("Invalid WASM binary: {0}")]
    InvalidWasmBinary(String),

    /// Module compilation or instantiation error.
    #[error("WASM module error: {0}")]
    ModuleError(String),

    /// A required export is missing or has the wrong signature.
    #[error("Missing export: {0}")]
    MissingExport(String),

    /// The module imports a host function this bridge does not provide.
    #[error("Unsupported import '{module}::{name}'")]
    UnsupportedImport { module: String, name: String },

    /// File I/O error during module loading.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Input validation error (size limits, format, etc.).
    #[error("Invalid input: {0}")]
    ValidationError(String),

    /// Wasmtime engine creation or configuration error.
    #[error("Engine creation error: {0}")]
    EngineError(String),

    /// The engine's start routine trapped.
    #[error("Engine start failed: {0}")]
    StartFailed(String),

    /// Unsupported WASM encoding (Component Model binaries).
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// WASM binary parsing error from wasmparser.
    #[error("WASM parser error: {0}")]
    ParserError(#[from] wasmparser::BinaryReaderError),
}

/// Result type alias for WASM load operations.
pub type WasmResult<T> = Result<T, WasmError>;
