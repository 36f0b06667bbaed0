// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! WASM backend for the contract engine
//!
//! ## Module layout
//! - `loader` reads the binary and enforces the size limit
//! - `detector` rejects anything that is not a core module
//! - `module_loader` compiles and links host imports
//! - `buffer` and `externref` own the two halves of the boundary protocol
//! - `engine` runs the call sequence and implements [`crate::traits::ContractEngine`]

pub mod buffer;
pub mod detector;
pub mod engine;
pub mod error;
pub mod externref;
pub mod loader;
pub mod module_loader;

pub use engine::{WasmContractEngine, WasmEngineLoader};
pub use error::{WasmError, WasmResult};
