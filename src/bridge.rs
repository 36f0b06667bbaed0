// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Host bridge: the single handle every consumer uses to reach the engine.
//!
//! A [`HostBridge`] is cheap to clone; clones share one engine. The engine is
//! loaded by the first `init()` call. Concurrent callers wait on that same
//! load, and a failed load is remembered and reported to every later caller
//! without being retried.
//!
//! Once loaded, operations are plain synchronous calls. The only suspension
//! point in the bridge is `init()`.
//!
//! # Example
//! ```
//! use contract_lab::backends::stub::StubEngineLoader;
//! use contract_lab::bridge::HostBridge;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bridge = HostBridge::new(Arc::new(StubEngineLoader));
//! bridge.init().await.unwrap();
//! assert!(bridge.hash("Contract \"x\" {}").unwrap_err().is_domain());
//! # }
//! ```

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::backends::wasm::{WasmError, WasmResult};
use crate::errors::BridgeError;
use crate::observability::messages::bridge::{
    DomainErrorReturned, EngineLoadStarted, EngineReady, EngineUnavailable, OperationFailed,
    OperationInvoked,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{ContractEngine, EngineLoader, Operation};

type LoadOutcome = Result<Arc<dyn ContractEngine>, Arc<WasmError>>;

struct BridgeInner {
    loader: Arc<dyn EngineLoader>,
    engine: OnceCell<LoadOutcome>,
}

#[derive(Clone)]
pub struct HostBridge {
    inner: Arc<BridgeInner>,
}

/// Hands back an engine that was built before the bridge.
struct Preloaded(Arc<dyn ContractEngine>);

#[async_trait]
impl EngineLoader for Preloaded {
    async fn load(&self) -> WasmResult<Arc<dyn ContractEngine>> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        format!("preloaded {} engine", self.0.engine_kind())
    }
}

impl HostBridge {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                loader,
                engine: OnceCell::new(),
            }),
        }
    }

    /// A bridge that is already initialized with `engine`.
    pub fn from_engine(engine: Arc<dyn ContractEngine>) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                loader: Arc::new(Preloaded(engine.clone())),
                engine: OnceCell::new_with(Some(Ok(engine))),
            }),
        }
    }

    /// Load the engine if no load has happened yet. Idempotent.
    pub async fn init(&self) -> Result<(), BridgeError> {
        let outcome = self
            .inner
            .engine
            .get_or_init(|| async {
                let source = self.inner.loader.describe();
                tracing::info!("{}", EngineLoadStarted { source: &source });
                let started = Instant::now();

                match self.inner.loader.load().await {
                    Ok(engine) => {
                        EngineReady {
                            source: &source,
                            engine: engine.engine_kind(),
                            duration: started.elapsed(),
                        }
                        .log();
                        Ok(engine)
                    }
                    Err(e) => {
                        EngineUnavailable {
                            source: &source,
                            error: &e,
                        }
                        .log();
                        Err(Arc::new(e))
                    }
                }
            })
            .await;

        match outcome {
            Ok(_) => Ok(()),
            Err(e) => Err(BridgeError::Initialization(e.clone())),
        }
    }

    /// True once a load has succeeded.
    pub fn is_initialized(&self) -> bool {
        matches!(self.inner.engine.get(), Some(Ok(_)))
    }

    pub fn describe(&self) -> String {
        self.inner.loader.describe()
    }

    fn engine(&self) -> Result<&Arc<dyn ContractEngine>, BridgeError> {
        match self.inner.engine.get() {
            Some(Ok(engine)) => Ok(engine),
            Some(Err(e)) => Err(BridgeError::Initialization(e.clone())),
            None => Err(BridgeError::NotInitialized),
        }
    }

    pub fn parse(&self, source: &str) -> Result<String, BridgeError> {
        self.invoke(Operation::Parse, source, None)
    }

    pub fn normalize(&self, source: &str) -> Result<String, BridgeError> {
        self.invoke(Operation::Normalize, source, None)
    }

    pub fn verify(&self, source: &str) -> Result<String, BridgeError> {
        self.invoke(Operation::Verify, source, None)
    }

    pub fn hash(&self, source: &str) -> Result<String, BridgeError> {
        self.invoke(Operation::Hash, source, None)
    }

    pub fn execute(&self, source: &str, inputs: &str) -> Result<String, BridgeError> {
        self.invoke(Operation::Execute, source, Some(inputs))
    }

    /// Run any operation. Fails with [`BridgeError::NotInitialized`] before
    /// `init()` has completed.
    pub fn invoke(
        &self,
        operation: Operation,
        source: &str,
        inputs: Option<&str>,
    ) -> Result<String, BridgeError> {
        let engine = self.engine()?;
        let invoked = OperationInvoked {
            operation: operation.as_str(),
            engine: engine.engine_kind(),
            input_size: source.len() + inputs.map_or(0, str::len),
        };
        invoked.log();
        let _entered = invoked.span("invoke").entered();

        let result = engine.invoke(operation, source, inputs);
        match &result {
            Err(BridgeError::Domain(rejection)) => DomainErrorReturned {
                operation: operation.as_str(),
                message: rejection.message(),
            }
            .log(),
            Err(other) => tracing::error!(
                "{}",
                OperationFailed {
                    operation: operation.as_str(),
                    error: other,
                }
            ),
            Ok(_) => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::tests::HELLO;
    use crate::backends::stub::{StubEngine, StubEngineLoader};
    use crate::observability::messages::recording::SpanRecorder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingLoader {
        loads: AtomicUsize,
        fail: bool,
    }

    impl CountingLoader {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl EngineLoader for CountingLoader {
        async fn load(&self) -> WasmResult<Arc<dyn ContractEngine>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                Err(WasmError::ValidationError("corrupt engine".to_string()))
            } else {
                Ok(Arc::new(StubEngine::new()))
            }
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    #[tokio::test]
    async fn test_operations_before_init_fail() {
        let bridge = HostBridge::new(Arc::new(StubEngineLoader));
        assert!(!bridge.is_initialized());
        assert!(matches!(bridge.parse(HELLO), Err(BridgeError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_concurrent_init_loads_once() {
        let loader = CountingLoader::new(false);
        let bridge = HostBridge::new(loader.clone());

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let bridge = bridge.clone();
                tokio::spawn(async move { bridge.init().await })
            })
            .collect();
        for waiter in waiters {
            waiter.await.unwrap().unwrap();
        }

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        bridge.init().await.unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(bridge.is_initialized());
    }

    #[tokio::test]
    async fn test_failed_init_is_shared_and_not_retried() {
        let loader = CountingLoader::new(true);
        let bridge = HostBridge::new(loader.clone());

        let (a, b) = tokio::join!(bridge.init(), bridge.init());
        for result in [a, b] {
            match result {
                Err(BridgeError::Initialization(e)) => assert!(e.to_string().contains("corrupt engine")),
                other => panic!("Expected Initialization error, got {:?}", other),
            }
        }

        assert!(bridge.init().await.is_err());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(bridge.hash(HELLO).unwrap_err().to_string().starts_with("engine unavailable"));
    }

    #[tokio::test]
    async fn test_operations_after_init() {
        let bridge = HostBridge::new(Arc::new(StubEngineLoader));
        bridge.init().await.unwrap();

        let normalized = bridge.normalize(HELLO).unwrap();
        assert_eq!(bridge.normalize(&normalized).unwrap(), normalized);
        assert!(bridge.verify(HELLO).unwrap().contains("\"valid\":true"));
        assert!(bridge.parse("Contract \"x\" {}").unwrap_err().is_domain());
    }

    #[test]
    fn test_invocations_open_an_operation_span() {
        let recorder = SpanRecorder::default();
        let _guard = recorder.install();

        let bridge = HostBridge::from_engine(Arc::new(StubEngine::new()));
        bridge.normalize(HELLO).unwrap();

        assert_eq!(
            recorder.spans(),
            vec!["operation span_name=\"invoke\" operation=\"normalize\" engine=\"stub\"".to_string()]
        );
    }

    #[tokio::test]
    async fn test_preloaded_engine() {
        let bridge = HostBridge::from_engine(Arc::new(StubEngine::new()));
        assert!(bridge.is_initialized());
        assert!(bridge.hash(HELLO).is_ok());
        bridge.init().await.unwrap();
        assert_eq!(bridge.describe(), "preloaded stub engine");
    }
}
