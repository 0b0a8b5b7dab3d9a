//! Handler representation and failure types for registered operations.

use std::any::Any;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use opwire_core::{OperationRequest, OperationResult};

/// Future returned by an operation handler invocation.
pub type HandlerFuture = BoxFuture<'static, Result<OperationResult, HandlerError>>;

/// Type-erased handler stored in the router.
///
/// Handlers receive an optional request: absent when no payload or
/// registration context exists for the invocation.
pub(crate) type BoxedHandler = Arc<dyn Fn(Option<OperationRequest>) -> HandlerFuture + Send + Sync>;

/// Errors returned by operation handlers.
///
/// The `Display` text of a handler error becomes the `Ko` content the
/// caller receives, verbatim.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    /// A handler error carrying a plain message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "operation handler panicked".to_string()
    }
}
