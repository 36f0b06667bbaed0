// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for human-readable output. Messages
//! that carry fields worth filtering on also implement [`StructuredLog`], which
//! emits the event at its documented level with key/value fields attached.
//!
//! # Usage Pattern
//!
//! ```rust
//! use contract_lab::observability::messages::StructuredLog;
//! use contract_lab::observability::messages::pipeline::StageDispatched;
//!
//! let msg = StageDispatched {
//!     stage: "parse",
//!     epoch: 1,
//!     source_size: 42,
//! };
//!
//! msg.log();
//! ```

use tracing::Span;

pub mod analysis;
pub mod bridge;
pub mod pipeline;
pub mod wasm;

/// Emit a message as a structured event, or open a span carrying its fields.
pub trait StructuredLog {
    /// Log at the level documented on the message type.
    fn log(&self);

    /// A span named `name` carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}

/// Test subscriber that records each new span as `name field=value ...`.
#[cfg(test)]
pub(crate) mod recording {
    use std::fmt::Write;
    use std::sync::{Arc, Mutex};

    use tracing::field::{Field, Visit};
    use tracing::span::{Attributes, Id};
    use tracing::subscriber::DefaultGuard;
    use tracing::Subscriber;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    #[derive(Clone, Default)]
    pub(crate) struct SpanRecorder {
        spans: Arc<Mutex<Vec<String>>>,
    }

    impl SpanRecorder {
        /// Install as the thread's default subscriber until the guard drops.
        pub(crate) fn install(&self) -> DefaultGuard {
            tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
        }

        pub(crate) fn spans(&self) -> Vec<String> {
            self.spans.lock().unwrap().clone()
        }
    }

    struct FieldText(String);

    impl Visit for FieldText {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            let _ = write!(self.0, " {}={:?}", field.name(), value);
        }
    }

    impl<S: Subscriber> Layer<S> for SpanRecorder {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            let mut text = FieldText(attrs.metadata().name().to_string());
            attrs.record(&mut text);
            self.spans.lock().unwrap().push(text.0);
        }
    }
}
