//! Server configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// OS-level accept queue depth used when none is configured explicitly.
pub const DEFAULT_BACKLOG: u32 = 100;

/// Default cap for encoded request and response frames (1 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1_048_576;

/// Top-level configuration for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for the listener.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// OS-level accept queue depth. This is the only admission control;
    /// there is no application-level rate limiting.
    pub backlog: u32,
    /// Maximum encoded request frame size in bytes.
    pub max_request_bytes: usize,
    /// Maximum encoded response frame size in bytes.
    pub max_response_bytes: usize,
    /// TLS certificate configuration.
    pub tls: TlsConfig,
    /// Upper bound on the shutdown drain. `None` waits indefinitely for
    /// in-flight connections, which means shutdown can hang on a handler
    /// that never completes.
    pub drain_timeout: Option<Duration>,
}

impl ServerConfig {
    /// A configuration with default backlog, frame caps, and unbounded
    /// drain, listening on all interfaces at `port`.
    #[must_use]
    pub fn new(port: u16, tls: TlsConfig) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
            backlog: DEFAULT_BACKLOG,
            max_request_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_response_bytes: DEFAULT_MAX_FRAME_BYTES,
            tls,
            drain_timeout: None,
        }
    }
}

/// TLS certificate configuration.
///
/// No `Default` impl because certificate paths have no sensible defaults.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the PEM-encoded certificate chain.
    pub cert_path: PathBuf,
    /// Path to the PEM-encoded private key.
    pub key_path: PathBuf,
}
