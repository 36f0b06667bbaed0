// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging in contract-lab. Message types follow a struct-based pattern with a
//! `Display` implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Keep log wording in one place per subsystem
//! * Provide consistent, structured logging output
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::wasm` - engine binary loading and host import linking
//! * `messages::bridge` - bridge initialization and per-call events
//! * `messages::pipeline` - stage dispatch, completion and reset events
//! * `messages::analysis` - diff and determinism check results
//!
//! # Usage
//!
//! ```rust
//! use contract_lab::observability::messages::bridge::OperationInvoked;
//!
//! let msg = OperationInvoked {
//!     operation: "normalize",
//!     engine: "wasm",
//!     input_size: 128,
//! };
//!
//! tracing::debug!("{}", msg);
//! ```
//!
//! The library never installs a subscriber; the `contract-lab` binary does.

pub mod messages;
