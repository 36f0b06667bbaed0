// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The engine's indirect reference table.
//!
//! Values that are not plain numbers (thrown errors, strings, booleans) cross
//! the boundary as indices into an `externref` table the engine exports. The
//! table starts with four sentinel slots (undefined, null, true, false) and
//! grows as the engine stores new values. Slots are recycled once the engine
//! deallocates them, so a slot is read at most once per occurrence and never
//! after it has been deallocated.
//!
//! Only this module and the call protocol in `engine.rs` ever see slot indices.

use std::fmt;

use wasmtime::{Caller, Extern, ExternRef, Instance, Ref, RootScope, Rooted, Store, Table, TypedFunc};

use crate::backends::wasm::buffer::{guest_len, guest_offset};
use crate::backends::wasm::error::{WasmError, WasmResult};
use crate::errors::BridgeError;

pub const EXTERNREF_TABLE_EXPORT: &str = "__wbindgen_externrefs";
pub const TABLE_DEALLOC_EXPORT: &str = "__externref_table_dealloc";

/// Sentinels appended by the table initializer, in order.
const SENTINELS: [HostValue; 4] = [
    HostValue::Undefined,
    HostValue::Null,
    HostValue::Bool(true),
    HostValue::Bool(false),
];

/// A value the host created on the engine's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    String(String),
    Error(String),
}

impl HostValue {
    /// Convert a thrown value into the call's failure.
    pub fn into_bridge_error(self) -> BridgeError {
        match self {
            HostValue::Error(message) | HostValue::String(message) => BridgeError::domain(message),
            other => BridgeError::domain(format!("engine threw a non-error value: {}", other)),
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => f.write_str("undefined"),
            HostValue::Null => f.write_str("null"),
            HostValue::Bool(b) => write!(f, "{}", b),
            HostValue::String(s) => write!(f, "{:?}", s),
            HostValue::Error(m) => write!(f, "Error({})", m),
        }
    }
}

/// Index of a thrown value in the reference table, valid for one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorSlot(u32);

impl ErrorSlot {
    pub fn from_call_result(index: i32) -> Self {
        Self(u32::from_ne_bytes(index.to_ne_bytes()))
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

/// The exported table plus the engine's slot deallocator.
#[derive(Clone)]
pub struct ExternRefTable {
    table: Table,
    dealloc: TypedFunc<i32, ()>,
}

impl ExternRefTable {
    pub fn resolve(store: &mut Store<()>, instance: &Instance) -> WasmResult<Self> {
        let table = instance
            .get_table(&mut *store, EXTERNREF_TABLE_EXPORT)
            .ok_or_else(|| WasmError::MissingExport(format!("table '{}'", EXTERNREF_TABLE_EXPORT)))?;
        let dealloc = instance
            .get_typed_func::<i32, ()>(&mut *store, TABLE_DEALLOC_EXPORT)
            .map_err(|_| {
                WasmError::MissingExport(format!(
                    "'{}' with signature (i32) -> ()",
                    TABLE_DEALLOC_EXPORT
                ))
            })?;
        Ok(Self { table, dealloc })
    }

    /// Read the value at `slot`, then deallocate the slot.
    ///
    /// The slot is deallocated even when the read fails, so a bad slot is
    /// never revisited.
    pub fn take(&self, store: &mut Store<()>, slot: ErrorSlot) -> Result<HostValue, BridgeError> {
        let value = self.read(store, slot);
        self.dealloc
            .call(&mut *store, i32::from_ne_bytes(slot.index().to_ne_bytes()))
            .map_err(|e| {
                BridgeError::Marshalling(format!(
                    "failed to deallocate reference slot {}: {}",
                    slot.index(),
                    e
                ))
            })?;
        value
    }

    /// Read the value at `slot` without deallocating it.
    pub(crate) fn read(&self, store: &mut Store<()>, slot: ErrorSlot) -> Result<HostValue, BridgeError> {
        let mut scope = RootScope::new(store);
        match self.table.get(&mut scope, u64::from(slot.index())) {
            Some(Ref::Extern(Some(extern_ref))) => {
                let data = extern_ref.data(&scope).map_err(|e| {
                    BridgeError::Marshalling(format!(
                        "reference slot {} is unreadable: {}",
                        slot.index(),
                        e
                    ))
                })?;
                data.and_then(|any| any.downcast_ref::<HostValue>())
                    .cloned()
                    .ok_or_else(|| {
                        BridgeError::Marshalling(format!(
                            "reference slot {} holds a value the host did not create",
                            slot.index()
                        ))
                    })
            }
            Some(Ref::Extern(None)) => Err(BridgeError::Marshalling(format!(
                "reference slot {} is empty (already deallocated?)",
                slot.index()
            ))),
            Some(_) => Err(BridgeError::Marshalling(format!(
                "reference slot {} does not hold an externref",
                slot.index()
            ))),
            None => Err(BridgeError::Marshalling(format!(
                "reference slot {} is out of bounds",
                slot.index()
            ))),
        }
    }
}

/// Wrap `value` as an externref the engine can store.
pub(crate) fn new_host_ref(
    caller: &mut Caller<'_, ()>,
    value: HostValue,
) -> wasmtime::Result<Option<Rooted<ExternRef>>> {
    Ok(Some(ExternRef::new(caller, value)?))
}

/// Host side of the engine's table initializer: slot 0 becomes undefined and
/// four sentinel slots are appended.
pub(crate) fn init_externref_table(mut caller: Caller<'_, ()>) -> wasmtime::Result<()> {
    let table = caller
        .get_export(EXTERNREF_TABLE_EXPORT)
        .and_then(Extern::into_table)
        .ok_or_else(|| {
            wasmtime::Error::msg(format!("engine does not export table '{}'", EXTERNREF_TABLE_EXPORT))
        })?;

    let offset = table.grow(&mut caller, SENTINELS.len() as u64, Ref::Extern(None))?;

    let undefined = ExternRef::new(&mut caller, HostValue::Undefined)?;
    table.set(&mut caller, 0, Ref::Extern(Some(undefined)))?;

    for (i, sentinel) in SENTINELS.into_iter().enumerate() {
        let value = ExternRef::new(&mut caller, sentinel)?;
        table.set(&mut caller, offset + i as u64, Ref::Extern(Some(value)))?;
    }
    Ok(())
}

/// Read a UTF-8 string the engine passed to a host import.
pub(crate) fn read_guest_str(caller: &mut Caller<'_, ()>, ptr: i32, len: i32) -> wasmtime::Result<String> {
    let memory = caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or_else(|| wasmtime::Error::msg("engine does not export 'memory'"))?;
    let start = guest_offset(ptr);
    let end = start
        .checked_add(guest_len(len)?)
        .ok_or_else(|| wasmtime::Error::msg("string region overflows the address space"))?;
    let bytes = memory
        .data(&*caller)
        .get(start..end)
        .ok_or_else(|| wasmtime::Error::msg(format!("string region {:#x}..{:#x} out of bounds", start, end)))?;
    Ok(String::from_utf8(bytes.to_vec())?)
}
