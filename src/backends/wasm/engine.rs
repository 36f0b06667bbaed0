// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! WASM-backed contract engine
//!
//! Drives a core module that exports the contract operations through the
//! pointer/length ABI. Every call follows the same sequence:
//!
//! 1. Refuel the store so each call gets the full configured budget
//! 2. Copy each input into a [`GuestBuffer`] allocated by the engine
//! 3. Call the operation, transferring the input buffers to the callee
//! 4. On a thrown value, take it out of the reference table (deallocating
//!    the slot) and fail the call
//! 5. Otherwise decode the returned region as UTF-8
//! 6. Release the returned region exactly once, whether decoding worked or not
//!
//! The instance sits behind a mutex so a whole sequence runs without
//! interleaving with another caller.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use wasmtime::{Instance, Memory, Store, Trap, TypedFunc};

use crate::backends::wasm::buffer::{GuestAllocator, GuestBuffer, HostBuffer};
use crate::backends::wasm::detector::ensure_core_module;
use crate::backends::wasm::error::{WasmError, WasmResult};
use crate::backends::wasm::externref::{ErrorSlot, ExternRefTable};
#[cfg(test)]
use crate::backends::wasm::externref::HostValue;
use crate::backends::wasm::loader::read_engine_binary;
use crate::backends::wasm::module_loader::WasmModuleLoader;
use crate::config::EngineConfig;
use crate::errors::BridgeError;
use crate::traits::{ContractEngine, EngineLoader, Operation};

pub const MEMORY_EXPORT: &str = "memory";
pub const START_EXPORT: &str = "__wbindgen_start";
pub const PARSE_EXPORT: &str = "parseContract";
pub const NORMALIZE_EXPORT: &str = "normalize";
pub const VERIFY_EXPORT: &str = "verify";
pub const HASH_EXPORT: &str = "semanticHash";
pub const EXECUTE_EXPORT: &str = "execute";

/// `(ptr, len) -> (ptr, len, slot, is_err)`
type UnaryOp = TypedFunc<(i32, i32), (i32, i32, i32, i32)>;
/// `(ptr, len, ptr, len) -> (ptr, len, slot, is_err)`
type BinaryOp = TypedFunc<(i32, i32, i32, i32), (i32, i32, i32, i32)>;

/// Bookkeeping exports of the test fixture engine.
#[cfg(test)]
struct FixtureCounters {
    host_frees: TypedFunc<(), i32>,
    input_frees: TypedFunc<(), i32>,
    slot_deallocs: TypedFunc<(), i32>,
}

#[cfg(test)]
impl FixtureCounters {
    fn resolve(store: &mut Store<()>, instance: &Instance) -> Option<Self> {
        Some(Self {
            host_frees: instance.get_typed_func(&mut *store, "host_frees").ok()?,
            input_frees: instance.get_typed_func(&mut *store, "input_frees").ok()?,
            slot_deallocs: instance.get_typed_func(&mut *store, "slot_deallocs").ok()?,
        })
    }
}

struct EngineInstance {
    store: Store<()>,
    memory: Memory,
    externrefs: ExternRefTable,
    allocator: GuestAllocator,
    fuel: u64,
    parse: UnaryOp,
    normalize: UnaryOp,
    verify: UnaryOp,
    hash: UnaryOp,
    execute: BinaryOp,
    #[cfg(test)]
    counters: Option<FixtureCounters>,
}

impl EngineInstance {
    fn instantiate(bytes: &[u8], fuel: u64) -> WasmResult<Self> {
        ensure_core_module(bytes)?;

        let engine = WasmModuleLoader::create_engine()?;
        let module = WasmModuleLoader::compile(&engine, bytes)?;
        let linker = WasmModuleLoader::link(&engine, &module)?;

        let mut store = Store::new(&engine, ());
        store
            .set_fuel(fuel)
            .map_err(|e| WasmError::EngineError(format!("Failed to set fuel: {}", e)))?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| WasmError::ModuleError(format!("Failed to instantiate engine: {}", e)))?;

        let memory = instance
            .get_memory(&mut store, MEMORY_EXPORT)
            .ok_or_else(|| WasmError::MissingExport(format!("memory '{}'", MEMORY_EXPORT)))?;
        let allocator = GuestAllocator::resolve(&mut store, &instance)?;
        let externrefs = ExternRefTable::resolve(&mut store, &instance)?;

        let parse = unary_export(&mut store, &instance, PARSE_EXPORT)?;
        let normalize = unary_export(&mut store, &instance, NORMALIZE_EXPORT)?;
        let verify = unary_export(&mut store, &instance, VERIFY_EXPORT)?;
        let hash = unary_export(&mut store, &instance, HASH_EXPORT)?;
        let execute = instance
            .get_typed_func::<(i32, i32, i32, i32), (i32, i32, i32, i32)>(&mut store, EXECUTE_EXPORT)
            .map_err(|_| {
                WasmError::MissingExport(format!(
                    "'{}' with signature (i32, i32, i32, i32) -> (i32, i32, i32, i32)",
                    EXECUTE_EXPORT
                ))
            })?;

        // The start routine is optional; when present it populates the
        // reference table sentinels.
        if let Ok(start) = instance.get_typed_func::<(), ()>(&mut store, START_EXPORT) {
            start
                .call(&mut store, ())
                .map_err(|e| WasmError::StartFailed(describe_trap(&e)))?;
        }

        #[cfg(test)]
        let counters = FixtureCounters::resolve(&mut store, &instance);

        Ok(Self {
            store,
            memory,
            externrefs,
            allocator,
            fuel,
            parse,
            normalize,
            verify,
            hash,
            execute,
            #[cfg(test)]
            counters,
        })
    }

    fn refuel(&mut self) -> Result<(), BridgeError> {
        self.store
            .set_fuel(self.fuel)
            .map_err(|e| BridgeError::Trap(format!("failed to refuel engine: {}", e)))
    }

    fn call_unary(&mut self, operation: Operation, source: &str) -> Result<String, BridgeError> {
        let func = match operation {
            Operation::Parse => self.parse.clone(),
            Operation::Normalize => self.normalize.clone(),
            Operation::Verify => self.verify.clone(),
            Operation::Hash => self.hash.clone(),
            Operation::Execute => return self.call_execute(source, "{}"),
        };

        self.refuel()?;
        let input = GuestBuffer::allocate(&mut self.store, &self.allocator, self.memory, source.as_bytes())?;
        let (ptr, len) = input.into_call_args();
        let result = func
            .call(&mut self.store, (ptr, len))
            .map_err(|e| BridgeError::Trap(format!("{} trapped: {}", operation, describe_trap(&e))))?;
        self.settle(result)
    }

    fn call_execute(&mut self, source: &str, inputs: &str) -> Result<String, BridgeError> {
        let func = self.execute.clone();

        self.refuel()?;
        let source_buf = GuestBuffer::allocate(&mut self.store, &self.allocator, self.memory, source.as_bytes())?;
        let inputs_buf = match GuestBuffer::allocate(&mut self.store, &self.allocator, self.memory, inputs.as_bytes()) {
            Ok(buffer) => buffer,
            Err(e) => {
                if let Err(discard_err) = source_buf.discard(&mut self.store, &self.allocator) {
                    tracing::warn!(error = %discard_err, "Failed to discard source buffer after allocation failure");
                }
                return Err(e);
            }
        };

        let (p0, l0) = source_buf.into_call_args();
        let (p1, l1) = inputs_buf.into_call_args();
        let result = func
            .call(&mut self.store, (p0, l0, p1, l1))
            .map_err(|e| BridgeError::Trap(format!("execute trapped: {}", describe_trap(&e))))?;
        self.settle(result)
    }

    /// Steps 4 to 6 of the call sequence.
    fn settle(&mut self, (ptr, len, slot, is_err): (i32, i32, i32, i32)) -> Result<String, BridgeError> {
        if is_err != 0 {
            let thrown = self
                .externrefs
                .take(&mut self.store, ErrorSlot::from_call_result(slot))?;
            return Err(thrown.into_bridge_error());
        }

        let output = HostBuffer::from_call_result(ptr, len);
        let decoded = output.read_utf8(&self.store, self.memory);
        output.release(&mut self.store, &self.allocator)?;
        decoded
    }
}

fn unary_export(store: &mut Store<()>, instance: &Instance, name: &str) -> WasmResult<UnaryOp> {
    instance
        .get_typed_func::<(i32, i32), (i32, i32, i32, i32)>(&mut *store, name)
        .map_err(|_| {
            WasmError::MissingExport(format!(
                "'{}' with signature (i32, i32) -> (i32, i32, i32, i32)",
                name
            ))
        })
}

fn describe_trap(error: &wasmtime::Error) -> String {
    match error.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => "fuel exhausted".to_string(),
        Some(trap) => trap.to_string(),
        None => format!("{:#}", error),
    }
}

/// A contract engine backed by a single wasmtime instance.
pub struct WasmContractEngine {
    label: String,
    instance: Mutex<EngineInstance>,
}

impl WasmContractEngine {
    /// Validate, compile, link and instantiate an engine binary.
    ///
    /// `fuel` is the budget each call starts with. `label` names the engine
    /// in logs, usually the path it was loaded from.
    pub fn from_bytes(bytes: &[u8], fuel: u64, label: impl Into<String>) -> WasmResult<Self> {
        let instance = EngineInstance::instantiate(bytes, fuel)?;
        Ok(Self {
            label: label.into(),
            instance: Mutex::new(instance),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn with_instance<F>(&self, f: F) -> Result<String, BridgeError>
    where
        F: FnOnce(&mut EngineInstance) -> Result<String, BridgeError>,
    {
        let mut instance = self
            .instance
            .lock()
            .map_err(|_| BridgeError::Marshalling("engine instance lock poisoned".to_string()))?;
        f(&mut instance)
    }

    /// Reads one of the fixture's bookkeeping counters.
    #[cfg(test)]
    fn counter(&self, name: &str) -> i32 {
        let mut guard = self.instance.lock().unwrap();
        let inst = &mut *guard;
        let counters = inst.counters.as_ref().expect("engine has no fixture counters");
        let func = match name {
            "host_frees" => counters.host_frees.clone(),
            "input_frees" => counters.input_frees.clone(),
            "slot_deallocs" => counters.slot_deallocs.clone(),
            other => panic!("unknown counter {}", other),
        };
        inst.store.set_fuel(1_000_000).unwrap();
        func.call(&mut inst.store, ()).unwrap()
    }

    /// Reads a reference table slot without deallocating it.
    #[cfg(test)]
    fn peek_slot(&self, index: u32) -> Result<HostValue, BridgeError> {
        let mut guard = self.instance.lock().unwrap();
        let inst = &mut *guard;
        inst.externrefs.read(&mut inst.store, ErrorSlot::from_call_result(index as i32))
    }
}

impl ContractEngine for WasmContractEngine {
    fn parse(&self, source: &str) -> Result<String, BridgeError> {
        self.with_instance(|i| i.call_unary(Operation::Parse, source))
    }

    fn normalize(&self, source: &str) -> Result<String, BridgeError> {
        self.with_instance(|i| i.call_unary(Operation::Normalize, source))
    }

    fn verify(&self, source: &str) -> Result<String, BridgeError> {
        self.with_instance(|i| i.call_unary(Operation::Verify, source))
    }

    fn hash(&self, source: &str) -> Result<String, BridgeError> {
        self.with_instance(|i| i.call_unary(Operation::Hash, source))
    }

    fn execute(&self, source: &str, inputs: &str) -> Result<String, BridgeError> {
        self.with_instance(|i| i.call_execute(source, inputs))
    }

    fn engine_kind(&self) -> &'static str {
        "wasm"
    }
}

/// Loads a [`WasmContractEngine`] from disk.
pub struct WasmEngineLoader {
    module_path: PathBuf,
    fuel: u64,
    max_module_bytes: usize,
}

impl WasmEngineLoader {
    pub fn new(module_path: impl Into<PathBuf>, fuel: u64, max_module_bytes: usize) -> Self {
        Self {
            module_path: module_path.into(),
            fuel,
            max_module_bytes,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.module_path(), config.fuel(), config.max_module_bytes())
    }
}

#[async_trait]
impl EngineLoader for WasmEngineLoader {
    async fn load(&self) -> WasmResult<Arc<dyn ContractEngine>> {
        let path = self.module_path.clone();
        let fuel = self.fuel;
        let max_bytes = self.max_module_bytes;

        // Compilation is CPU-bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || {
            let bytes = read_engine_binary(&path, max_bytes)?;
            let engine = WasmContractEngine::from_bytes(&bytes, fuel, path.display().to_string())?;
            Ok(Arc::new(engine) as Arc<dyn ContractEngine>)
        })
        .await
        .map_err(|e| WasmError::EngineError(format!("engine load task failed: {}", e)))?
    }

    fn describe(&self) -> String {
        self.module_path.display().to_string()
    }
}
