//! The result value produced by operation handlers.

use rmpv::Value;
use serde::{Deserialize, Serialize};

/// Outcome of a dispatched operation.
///
/// Serialized positionally (index 0 = `success`, index 1 = `content`) so
/// the wire layout stays stable even if trailing fields are added later.
/// `content` is optional, not coerced: `None` encodes as `MsgPack` nil.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Arbitrary result value: a string, a structured value, or nothing.
    pub content: Option<Value>,
}

impl OperationResult {
    /// A successful result carrying `content`.
    #[must_use]
    pub fn ok(content: impl Into<Value>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
        }
    }

    /// A failed result carrying `content` (typically an error message).
    #[must_use]
    pub fn ko(content: impl Into<Value>) -> Self {
        Self {
            success: false,
            content: Some(content.into()),
        }
    }

    /// A successful result with no content.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            content: None,
        }
    }

    /// A failed result with no content.
    #[must_use]
    pub fn ko_empty() -> Self {
        Self {
            success: false,
            content: None,
        }
    }

    /// The content as a string slice, if it is a `MsgPack` string.
    #[must_use]
    pub fn content_str(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }
}
