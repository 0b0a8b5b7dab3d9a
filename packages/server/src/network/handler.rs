//! Per-connection state machine.
//!
//! Each accepted socket runs exactly one exchange:
//! handshake -> bounded read -> decode -> route -> capped encode -> respond
//! -> close. A handshake failure closes the connection without a response
//! (no trusted channel exists yet); every failure after the handshake is
//! converted to a `Ko` result and a response is still attempted. The
//! transport is dropped unconditionally on every path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use opwire_core::{codec, CodecError, OperationRequest, OperationResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::service::OperationRouter;

/// Frame size caps, measured in encoded-byte length for both directions.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameLimits {
    pub max_request_bytes: usize,
    pub max_response_bytes: usize,
}

/// Failures on the read/decode path. The `Display` text becomes the `Ko`
/// content the caller receives.
#[derive(Debug, thiserror::Error)]
enum ExchangeError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Codec(#[from] CodecError),
}

/// Runs one connection to completion. Never panics, never returns an
/// error: all outcomes end in the transport being dropped.
pub(crate) async fn run(
    stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: TlsAcceptor,
    router: Arc<OperationRouter>,
    limits: FrameLimits,
) {
    let mut tls = match acceptor.accept(stream).await {
        Ok(tls) => tls,
        Err(err) => {
            // Fatal for this connection only: the transport is not yet
            // trusted, so no response is possible.
            warn!(%peer_addr, error = %err, "TLS handshake failed");
            return;
        }
    };

    let result = match exchange(&mut tls, peer_addr, &router, limits).await {
        Ok(result) => result,
        Err(err) => OperationResult::ko(err.to_string()),
    };

    respond(&mut tls, peer_addr, &result, limits.max_response_bytes).await;

    // Best-effort close_notify; the transport is dropped regardless.
    let _ = tls.shutdown().await;
}

/// Reading through routing: produces the result to encode, or the error
/// that the caller turns into a `Ko`.
async fn exchange(
    tls: &mut TlsStream<TcpStream>,
    peer_addr: SocketAddr,
    router: &OperationRouter,
    limits: FrameLimits,
) -> Result<OperationResult, ExchangeError> {
    // Single bounded read into a buffer sized exactly to the cap. This is
    // not a reassembly loop: a request split across delayed segments
    // surfaces downstream as a decode failure.
    let mut buf = vec![0u8; limits.max_request_bytes];
    let read = tls.read(&mut buf).await?;

    if more_data_pending(tls).await {
        return Ok(OperationResult::ko(format!(
            "Max request length ({}) exceeded.",
            limits.max_request_bytes
        )));
    }

    let raw = codec::decode_request(&buf[..read])?;
    let (name, payload) = codec::split_request(&raw);
    debug!(%peer_addr, operation = name, "dispatching request");

    let request = OperationRequest::new(name, peer_addr.to_string(), Some(payload.to_string()));
    Ok(router.dispatch(name, Some(request)).await)
}

/// Best-effort overflow check bound to one probe: is more data available
/// right now? A zero timeout polls the stream once without waiting, so a
/// slow oversized sender can slip past this (known limitation of the
/// single-read protocol).
async fn more_data_pending(tls: &mut TlsStream<TcpStream>) -> bool {
    let mut probe = [0u8; 1];
    match tokio::time::timeout(Duration::ZERO, tls.read(&mut probe)).await {
        Ok(Ok(n)) => n > 0,
        // Read error or nothing immediately available: treat as no overflow.
        Ok(Err(_)) | Err(_) => false,
    }
}

/// Encodes `result` under the response cap and writes it out. Write
/// failures are logged and swallowed: the connection closes either way.
async fn respond(
    tls: &mut TlsStream<TcpStream>,
    peer_addr: SocketAddr,
    result: &OperationResult,
    max_response_bytes: usize,
) {
    let encoded = match encode_capped(result, max_response_bytes) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!(%peer_addr, error = %err, "failed to encode response");
            return;
        }
    };

    if let Err(err) = tls.write_all(&encoded).await {
        warn!(%peer_addr, error = %err, "failed to write response");
        return;
    }
    if let Err(err) = tls.flush().await {
        warn!(%peer_addr, error = %err, "failed to flush response");
    }
}

/// Encodes a result, replacing it with the canonical size-limit `Ko` when
/// the encoding exceeds the cap. The replacement message itself is assumed
/// to always fit.
fn encode_capped(result: &OperationResult, max_response_bytes: usize) -> Result<Vec<u8>, CodecError> {
    let encoded = codec::encode_result(result)?;
    if encoded.len() > max_response_bytes {
        let fallback =
            OperationResult::ko(format!("Max response length ({max_response_bytes}) exceeded."));
        return codec::encode_result(&fallback);
    }
    Ok(encoded)
}
