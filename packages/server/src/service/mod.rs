//! Operation registration and dispatch.
//!
//! The pipeline is deliberately small:
//!
//! 1. **Handlers** (`operation`): boxed async closures over an optional
//!    [`opwire_core::OperationRequest`], returning a result or a
//!    [`HandlerError`]
//! 2. **Routing** (`router`): name-keyed dispatch with per-call failure
//!    isolation

pub mod operation;
pub mod router;

pub use operation::{HandlerError, HandlerFuture};
pub use router::OperationRouter;
