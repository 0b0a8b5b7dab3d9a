//! OpWire Server — TLS-terminated socket service routing pipe-delimited
//! operations to registered async handlers.
//!
//! Each connection carries exactly one request/response exchange: the
//! listener accepts a socket, the connection handler authenticates TLS,
//! reads one bounded frame, the router dispatches it to the registered
//! operation, and the encoded result is written back before the
//! connection closes. Shutdown is a cooperative drain: no new accepts,
//! in-flight exchanges run to completion.

pub mod network;
pub mod service;

pub use network::{ServeError, Server, ServerConfig, TlsConfig};
pub use service::{HandlerError, OperationRouter};

// Wire types come from the core crate; re-exported for handler authors.
pub use opwire_core::{OperationRequest, OperationResult};
