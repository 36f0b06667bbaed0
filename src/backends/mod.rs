// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Contract engine backends.
//!
//! Both backends implement [`crate::traits::ContractEngine`] and are produced
//! by an [`crate::traits::EngineLoader`], so the bridge never knows which one
//! it is driving.
//!
//! ## WASM Backend
//! The compiled engine running in wasmtime. Inputs and outputs cross the
//! boundary as UTF-8 buffers in the engine's linear memory; thrown values come
//! back through an externref table.
//!
//! ## Stub Backend
//! An in-process engine for a small line-oriented contract format, used in
//! tests and by `contract-lab --stub`.
//!
//! # Examples
//!
//! ```rust
//! use contract_lab::backends::stub::StubEngine;
//! use contract_lab::traits::ContractEngine;
//!
//! let engine = StubEngine::new();
//! let err = engine.parse("Contract \"x\" {}").unwrap_err();
//! assert!(err.is_domain());
//! ```
//!
//! ```rust,no_run
//! use contract_lab::backends::wasm::WasmEngineLoader;
//! use contract_lab::config::EngineConfig;
//!
//! let loader = WasmEngineLoader::from_config(&EngineConfig::default());
//! ```

pub mod stub;
pub mod wasm;
