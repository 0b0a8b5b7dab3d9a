//! `MsgPack` wire codec for requests and results.
//!
//! A request is a single `MsgPack` `str` of the form `<operation>|<payload>`;
//! a response is a positional two-field record ([`OperationResult`]). Both
//! directions use the same encoding family, so request and response share one
//! size-accounting mechanism: encoded-byte length against the configured caps.

use crate::result::OperationResult;

/// Errors from encoding or decoding a wire frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode frame: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encodes a raw request string as a `MsgPack` `str` frame.
///
/// # Errors
///
/// Returns an error if `MsgPack` encoding fails.
pub fn encode_request(raw: &str) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec(raw)?)
}

/// Decodes a `MsgPack` `str` frame into the raw request string.
///
/// Decodes from the front of `bytes` and ignores anything after the value:
/// the server reads into a fixed-size buffer, so the slice routinely extends
/// past the frame.
///
/// # Errors
///
/// Returns an error if the bytes do not start with a well-formed `MsgPack`
/// string (truncated frame, wrong type, invalid UTF-8).
pub fn decode_request(bytes: &[u8]) -> Result<String, CodecError> {
    Ok(rmp_serde::from_read(bytes)?)
}

/// Splits a raw request string into `(operation, payload)`.
///
/// Only the first `|` is significant; the payload may contain further `|`
/// characters. Absence of `|` means payload = empty string, not omitted.
#[must_use]
pub fn split_request(raw: &str) -> (&str, &str) {
    raw.split_once('|').unwrap_or((raw, ""))
}

/// Encodes an [`OperationResult`] as a positional `MsgPack` record.
///
/// # Errors
///
/// Returns an error if `MsgPack` encoding fails.
pub fn encode_result(result: &OperationResult) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec(result)?)
}

/// Decodes a positional `MsgPack` record into an [`OperationResult`].
///
/// # Errors
///
/// Returns an error if the bytes are not a well-formed result record.
pub fn decode_result(bytes: &[u8]) -> Result<OperationResult, CodecError> {
    Ok(rmp_serde::from_read(bytes)?)
}
