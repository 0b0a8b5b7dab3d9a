//! The request value handed to operation handlers.

/// A single decoded client request.
///
/// Only the raw request string travels the wire; this value is assembled
/// server-side after the decode and split. Created once per connection
/// and moved into the handler invocation; it is never shared between
/// tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    /// Operation name, as decoded from the wire. Compared as an opaque
    /// byte string, never normalized; may be empty.
    pub name: String,
    /// Peer address of the caller. Advisory only.
    pub origin: String,
    /// Request payload. `Some("")` when the request carried a delimiter
    /// with nothing after it, or no delimiter at all.
    pub content: Option<String>,
}

impl OperationRequest {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        origin: impl Into<String>,
        content: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            content,
        }
    }
}
