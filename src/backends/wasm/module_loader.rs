// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Engine compilation and host import linking
//!
//! ## Responsibilities
//! - Create a wasmtime `Engine` with the feature set the contract engine needs
//! - Compile the validated binary into a `Module`
//! - Check every import against the host functions this bridge provides and
//!   bind them in a `Linker`

use crate::backends::wasm::error::{WasmError, WasmResult};
use crate::backends::wasm::externref::{self, HostValue};
use crate::observability::messages::wasm::HostImportLinked;
use wasmtime::{Caller, Config, Engine, ExternRef, ExternType, Linker, Module, Rooted};

/// Host functions the engine may import, matched by name.
///
/// Generated glue appends a content hash to some import names
/// (`__wbg_Error_8c4e43fe74559d73`), so those are matched by prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostImport {
    /// Fills the sentinel slots of the reference table.
    InitExternrefTable,
    /// `(ptr, len) -> externref` building a thrown error.
    NewError,
    /// `(ptr, len) -> externref` building a string value.
    NewString,
    /// `(ptr, len)` aborting the current call with a message.
    Throw,
}

impl HostImport {
    pub fn classify(name: &str) -> Option<Self> {
        if name == "__wbindgen_init_externref_table" {
            Some(Self::InitExternrefTable)
        } else if name.starts_with("__wbg_Error_") {
            Some(Self::NewError)
        } else if name.starts_with("__wbindgen_string_new") {
            Some(Self::NewString)
        } else if name == "__wbindgen_throw" {
            Some(Self::Throw)
        } else {
            None
        }
    }
}

/// Compiles and links contract engine binaries.
pub struct WasmModuleLoader;

impl WasmModuleLoader {
    /// Create wasmtime engine with the features the contract engine relies on
    pub fn create_engine() -> WasmResult<Engine> {
        let mut config = Config::new();

        config.wasm_threads(false);
        config.wasm_multi_memory(false);
        config.wasm_memory64(false);
        // Thrown values travel through an externref table and operations
        // return (ptr, len, slot, is_err) tuples.
        config.wasm_reference_types(true);
        config.wasm_multi_value(true);

        // Each call is refuelled before it starts; running dry traps the call.
        config.consume_fuel(true);
        config.epoch_interruption(false);

        Engine::new(&config).map_err(|e| WasmError::EngineError(e.to_string()))
    }

    pub fn compile(engine: &Engine, bytes: &[u8]) -> WasmResult<Module> {
        Module::new(engine, bytes).map_err(|e| WasmError::ModuleError(e.to_string()))
    }

    /// Build a linker providing every import `module` declares.
    ///
    /// Any import outside [`HostImport`] is rejected up front rather than
    /// failing later at instantiation.
    pub fn link(engine: &Engine, module: &Module) -> WasmResult<Linker<()>> {
        let mut linker = Linker::new(engine);

        for import in module.imports() {
            let module_name = import.module();
            let name = import.name();

            let kind = match (import.ty(), HostImport::classify(name)) {
                (ExternType::Func(_), Some(kind)) => kind,
                _ => {
                    return Err(WasmError::UnsupportedImport {
                        module: module_name.to_string(),
                        name: name.to_string(),
                    })
                }
            };

            Self::bind(&mut linker, module_name, name, kind)
                .map_err(|e| WasmError::ModuleError(format!("failed to link {}::{}: {}", module_name, name, e)))?;

            tracing::debug!(
                "{}",
                HostImportLinked {
                    module: module_name,
                    name,
                }
            );
        }

        Ok(linker)
    }

    fn bind(linker: &mut Linker<()>, module: &str, name: &str, kind: HostImport) -> wasmtime::Result<()> {
        match kind {
            HostImport::InitExternrefTable => {
                linker.func_wrap(module, name, |caller: Caller<'_, ()>| {
                    externref::init_externref_table(caller)
                })?;
            }
            HostImport::NewError => {
                linker.func_wrap(
                    module,
                    name,
                    |mut caller: Caller<'_, ()>, ptr: i32, len: i32| -> wasmtime::Result<Option<Rooted<ExternRef>>> {
                        let message = externref::read_guest_str(&mut caller, ptr, len)?;
                        externref::new_host_ref(&mut caller, HostValue::Error(message))
                    },
                )?;
            }
            HostImport::NewString => {
                linker.func_wrap(
                    module,
                    name,
                    |mut caller: Caller<'_, ()>, ptr: i32, len: i32| -> wasmtime::Result<Option<Rooted<ExternRef>>> {
                        let value = externref::read_guest_str(&mut caller, ptr, len)?;
                        externref::new_host_ref(&mut caller, HostValue::String(value))
                    },
                )?;
            }
            HostImport::Throw => {
                linker.func_wrap(
                    module,
                    name,
                    |mut caller: Caller<'_, ()>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                        let message = externref::read_guest_str(&mut caller, ptr, len)?;
                        Err(wasmtime::Error::msg(format!("engine aborted: {}", message)))
                    },
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation() {
        assert!(WasmModuleLoader::create_engine().is_ok());
    }

    #[test]
    fn test_import_classification() {
        assert_eq!(
            HostImport::classify("__wbg_Error_8c4e43fe74559d73"),
            Some(HostImport::NewError)
        );
        assert_eq!(
            HostImport::classify("__wbindgen_init_externref_table"),
            Some(HostImport::InitExternrefTable)
        );
        assert_eq!(HostImport::classify("__wbindgen_throw"), Some(HostImport::Throw));
        assert_eq!(HostImport::classify("fd_write"), None);
    }

    #[test]
    fn test_unknown_import_rejected() {
        let engine = WasmModuleLoader::create_engine().unwrap();
        let bytes = wat::parse_str(
            r#"(module (import "wasi_snapshot_preview1" "fd_write" (func (param i32 i32 i32 i32) (result i32))))"#,
        )
        .unwrap();
        let module = WasmModuleLoader::compile(&engine, &bytes).unwrap();

        match WasmModuleLoader::link(&engine, &module) {
            Err(WasmError::UnsupportedImport { module, name }) => {
                assert_eq!(module, "wasi_snapshot_preview1");
                assert_eq!(name, "fd_write");
            }
            Err(other) => panic!("Expected UnsupportedImport, got {}", other),
            Ok(_) => panic!("Expected UnsupportedImport, got a linker"),
        }
    }

    #[test]
    fn test_imported_memory_rejected() {
        let engine = WasmModuleLoader::create_engine().unwrap();
        let bytes = wat::parse_str(r#"(module (import "env" "__wbg_Error_1" (memory 1)))"#).unwrap();
        let module = WasmModuleLoader::compile(&engine, &bytes).unwrap();

        assert!(matches!(
            WasmModuleLoader::link(&engine, &module),
            Err(WasmError::UnsupportedImport { .. })
        ));
    }
}
