// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Owned regions of engine linear memory.
//!
//! Two ownership states exist at the boundary:
//!
//! * [`GuestBuffer`] - allocated by the host through the engine's allocator to
//!   carry an input. Passing it to an operation transfers it to the callee,
//!   which frees it. Until then the host may only discard it.
//! * [`HostBuffer`] - returned by an operation. The host reads it and must
//!   release it through the engine's deallocator exactly once.
//!
//! Both are move-only. Release and transfer consume the value, so a second
//! release does not type-check, and a `HostBuffer` dropped without release is
//! reported as a leak.

use wasmtime::{Instance, Memory, Store, TypedFunc};

use crate::backends::wasm::error::{WasmError, WasmResult};
use crate::errors::BridgeError;
use crate::observability::messages::wasm::BufferLeaked;

pub const MALLOC_EXPORT: &str = "__wbindgen_malloc";
pub const FREE_EXPORT: &str = "__wbindgen_free";

/// Byte alignment requested for UTF-8 buffers.
const UTF8_ALIGN: i32 = 1;

/// Linear-memory offset of a wasm `i32` address. Addresses are unsigned, so
/// the bits are reinterpreted rather than sign-extended.
pub(crate) fn guest_offset(ptr: i32) -> usize {
    u32::from_ne_bytes(ptr.to_ne_bytes()) as usize
}

/// Byte count of a wasm `i32` length. Lengths of 2 GiB or more do not fit
/// the ABI and are refused.
pub(crate) fn guest_len(len: i32) -> Result<usize, BridgeError> {
    usize::try_from(len).map_err(|_| {
        BridgeError::AllocationExhaustion(format!(
            "region length {:#x} does not fit a non-negative i32",
            u32::from_ne_bytes(len.to_ne_bytes())
        ))
    })
}

/// The engine's exported allocator pair.
#[derive(Clone)]
pub struct GuestAllocator {
    malloc: TypedFunc<(i32, i32), i32>,
    free: TypedFunc<(i32, i32, i32), ()>,
}

impl GuestAllocator {
    pub fn resolve(store: &mut Store<()>, instance: &Instance) -> WasmResult<Self> {
        let malloc = instance
            .get_typed_func::<(i32, i32), i32>(&mut *store, MALLOC_EXPORT)
            .map_err(|_| {
                WasmError::MissingExport(format!(
                    "'{}' with signature (i32, i32) -> i32",
                    MALLOC_EXPORT
                ))
            })?;
        let free = instance
            .get_typed_func::<(i32, i32, i32), ()>(&mut *store, FREE_EXPORT)
            .map_err(|_| {
                WasmError::MissingExport(format!(
                    "'{}' with signature (i32, i32, i32) -> ()",
                    FREE_EXPORT
                ))
            })?;
        Ok(Self { malloc, free })
    }

    fn free(&self, store: &mut Store<()>, ptr: i32, len: i32) -> Result<(), BridgeError> {
        self.free
            .call(&mut *store, (ptr, len, UTF8_ALIGN))
            .map_err(|e| {
                BridgeError::Marshalling(format!(
                    "deallocator trapped releasing {} bytes at {:#x}: {}",
                    len,
                    guest_offset(ptr),
                    e
                ))
            })
    }
}

/// Input bytes copied into engine memory, owned by the host until passed to a call.
#[must_use = "guest buffers must be passed to a call or discarded"]
#[derive(Debug)]
pub struct GuestBuffer {
    ptr: i32,
    len: i32,
}

impl GuestBuffer {
    /// Allocate exactly `bytes.len()` bytes in the engine and copy `bytes` in.
    pub fn allocate(
        store: &mut Store<()>,
        allocator: &GuestAllocator,
        memory: Memory,
        bytes: &[u8],
    ) -> Result<Self, BridgeError> {
        let len = i32::try_from(bytes.len()).map_err(|_| {
            BridgeError::AllocationExhaustion(format!(
                "input of {} bytes exceeds the 2 GiB an i32 length can describe",
                bytes.len()
            ))
        })?;

        let ptr = allocator
            .malloc
            .call(&mut *store, (len, UTF8_ALIGN))
            .map_err(|e| {
                BridgeError::AllocationExhaustion(format!(
                    "engine allocator failed for {} bytes: {}",
                    len, e
                ))
            })?;

        let buffer = Self { ptr, len };
        if let Err(e) = memory.write(&mut *store, guest_offset(ptr), bytes) {
            buffer.discard(store, allocator)?;
            return Err(BridgeError::Marshalling(format!(
                "allocator returned {:#x} for {} bytes but the region is not writable: {}",
                guest_offset(ptr),
                len,
                e
            )));
        }
        Ok(buffer)
    }

    /// Hand the buffer to a call. The callee frees it.
    pub fn into_call_args(self) -> (i32, i32) {
        (self.ptr, self.len)
    }

    /// Free a buffer that never reached a call.
    pub fn discard(self, store: &mut Store<()>, allocator: &GuestAllocator) -> Result<(), BridgeError> {
        allocator.free(store, self.ptr, self.len)
    }
}

/// Output bytes returned by a call, owned by the host until released.
///
/// The raw `(ptr, len)` pair is kept as returned so release hands back exactly
/// what the engine gave out.
#[must_use = "host-owned buffers must be released exactly once"]
#[derive(Debug)]
pub struct HostBuffer {
    ptr: i32,
    len: i32,
    released: bool,
}

impl HostBuffer {
    /// Take ownership of the `(ptr, len)` pair an operation returned.
    pub fn from_call_result(ptr: i32, len: i32) -> Self {
        Self {
            ptr,
            len,
            released: false,
        }
    }

    /// Decode the region as UTF-8. Does not release it.
    pub fn read_utf8(&self, store: &Store<()>, memory: Memory) -> Result<String, BridgeError> {
        let start = guest_offset(self.ptr);
        let end = start.checked_add(guest_len(self.len)?).ok_or_else(|| {
            BridgeError::Marshalling(format!(
                "output region {:#x}+{} overflows the address space",
                start, self.len
            ))
        })?;
        let bytes = memory.data(store).get(start..end).ok_or_else(|| {
            BridgeError::Marshalling(format!(
                "output region {:#x}..{:#x} is outside linear memory",
                start, end
            ))
        })?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            BridgeError::Marshalling(format!("engine returned invalid UTF-8: {}", e))
        })
    }

    /// Give the region back to the engine. Consumes the buffer.
    ///
    /// A null pointer marks "no allocation" and is not passed to the deallocator.
    pub fn release(mut self, store: &mut Store<()>, allocator: &GuestAllocator) -> Result<(), BridgeError> {
        self.released = true;
        if self.ptr == 0 {
            return Ok(());
        }
        allocator.free(store, self.ptr, self.len)
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        if !self.released {
            tracing::error!(
                "{}",
                BufferLeaked {
                    ptr: guest_offset(self.ptr),
                    len: self.len,
                }
            );
        }
    }
}
