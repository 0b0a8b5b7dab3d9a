//! OpWire Core — wire codec and the operation request/result model.
//!
//! Everything in this crate is pure and I/O-free: the server crate owns
//! sockets and TLS, this crate owns the bytes that travel over them.

pub mod codec;
pub mod request;
pub mod result;

pub use codec::{
    decode_request, decode_result, encode_request, encode_result, split_request, CodecError,
};
pub use request::OperationRequest;
pub use result::OperationResult;
