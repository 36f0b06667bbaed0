// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Reading the engine binary from disk.
//!
//! The file length is checked against the configured limit before any bytes
//! are read, so an oversized binary never lands in memory. Format checks
//! happen afterwards in the detector module.

use std::fs;
use std::path::Path;

use crate::backends::wasm::error::{WasmError, WasmResult};
use crate::observability::messages::wasm::{ModuleLoadFailed, ModuleLoaded};

fn oversized(size: u64, max_bytes: usize) -> WasmError {
    WasmError::ValidationError(format!(
        "engine binary is {} bytes, limit is {} bytes",
        size, max_bytes
    ))
}

/// Read the engine binary at `path`, refusing anything over `max_bytes`.
pub fn read_engine_binary(path: &Path, max_bytes: usize) -> WasmResult<Vec<u8>> {
    let module_path = path.display().to_string();
    let fail = |error: WasmError| {
        tracing::error!(
            "{}",
            ModuleLoadFailed {
                module_path: &module_path,
                error: &error,
            }
        );
        error
    };

    let declared = fs::metadata(path).map_err(|e| fail(e.into()))?.len();
    if declared > max_bytes as u64 {
        return Err(fail(oversized(declared, max_bytes)));
    }

    let bytes = fs::read(path).map_err(|e| fail(e.into()))?;
    // The file can grow between the two calls.
    if bytes.len() > max_bytes {
        return Err(fail(oversized(bytes.len() as u64, max_bytes)));
    }

    tracing::info!(
        "{}",
        ModuleLoaded {
            module_path: &module_path,
            size_bytes: bytes.len(),
        }
    );
    Ok(bytes)
}
