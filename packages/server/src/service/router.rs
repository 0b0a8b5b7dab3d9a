//! Operation routing: dispatches decoded requests to registered handlers by name.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::FutureExt;
use opwire_core::{OperationRequest, OperationResult};
use tracing::debug;

use super::operation::{panic_message, BoxedHandler, HandlerError};

/// Routes requests to registered operation handlers by name.
///
/// Names are opaque, case-sensitive byte strings; they are never
/// normalized. The registry is safe for concurrent reads during dispatch
/// and concurrent writes during registration, though registration is
/// expected to finish before the listener starts accepting.
///
/// Dispatch isolates every failure mode: an unregistered name, a handler
/// error, and a handler panic all surface as a `Ko` result, never as an
/// error or panic of the dispatching task.
pub struct OperationRouter {
    handlers: DashMap<String, BoxedHandler>,
}

impl OperationRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Registers `handler` for `name`.
    ///
    /// Re-registering a name overwrites the prior handler
    /// (last-writer-wins, no error). Entries are never implicitly removed.
    pub fn register<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Option<OperationRequest>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<OperationResult, HandlerError>> + Send + 'static,
    {
        let boxed: BoxedHandler = Arc::new(move |request| Box::pin(handler(request)));
        self.handlers.insert(name.into(), boxed);
    }

    /// Whether a handler is registered for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatches `request` to the handler registered for `name`.
    ///
    /// - No handler registered: `Ko("Operation '<name>' not found.")`,
    ///   nothing is invoked.
    /// - Handler returns an error: `Ko` carrying the error text.
    /// - Handler panics: the panic is caught here and converted to a `Ko`.
    /// - Otherwise the handler's result is returned unchanged, including
    ///   a handler-produced `Ko`.
    pub async fn dispatch(&self, name: &str, request: Option<OperationRequest>) -> OperationResult {
        // Clone the handler out so no map guard is held across the await.
        let Some(handler) = self.handlers.get(name).map(|entry| Arc::clone(entry.value()))
        else {
            debug!(operation = name, "no handler registered");
            return OperationResult::ko(format!("Operation '{name}' not found."));
        };

        match AssertUnwindSafe(handler(request)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => OperationResult::ko(err.to_string()),
            Err(panic) => OperationResult::ko(panic_message(panic.as_ref())),
        }
    }
}

impl Default for OperationRouter {
    fn default() -> Self {
        Self::new()
    }
}
