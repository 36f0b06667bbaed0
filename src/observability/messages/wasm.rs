// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for engine binary loading and linear-memory events.
//!
//! This module contains message types for logging events related to:
//! * Engine binary loading and validation
//! * Host import linking
//! * Owned-buffer discipline violations

use std::fmt::{Display, Formatter};

/// Engine binary read from disk.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use contract_lab::observability::messages::wasm::ModuleLoaded;
///
/// let msg = ModuleLoaded {
///     module_path: "icl_runtime_bg.wasm",
///     size_bytes: 4096,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ModuleLoaded<'a> {
    pub module_path: &'a str,
    pub size_bytes: usize,
}

impl Display for ModuleLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loaded engine module: {} ({} bytes)",
            self.module_path, self.size_bytes
        )
    }
}

/// Engine binary could not be read or failed validation.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use contract_lab::observability::messages::wasm::ModuleLoadFailed;
///
/// let error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
/// let msg = ModuleLoadFailed {
///     module_path: "missing.wasm",
///     error: &error,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct ModuleLoadFailed<'a> {
    pub module_path: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ModuleLoadFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to load engine module '{}': {}",
            self.module_path, self.error
        )
    }
}

/// A host import was bound for the engine.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct HostImportLinked<'a> {
    pub module: &'a str,
    pub name: &'a str,
}

impl Display for HostImportLinked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Linked host import {}::{}", self.module, self.name)
    }
}

/// A host-owned output buffer was dropped without being released.
///
/// # Log Level
/// `error!` - Leak in engine linear memory
pub struct BufferLeaked {
    pub ptr: usize,
    pub len: i32,
}

impl Display for BufferLeaked {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Host-owned buffer at {:#x} ({} bytes) dropped without release; engine memory leaked",
            self.ptr, self.len
        )
    }
}
