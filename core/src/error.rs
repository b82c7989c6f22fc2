//! Error types for the AJAX layer.
//!
//! # Design
//! Two families. `Error` covers programmer mistakes and submission
//! problems that are raised synchronously before any request leaves the
//! process (bad format specifier, unknown transport, missing handler).
//! `FormatError` is produced inside format read/write functions; when it
//! happens while decoding a response it is folded into a `Failure` by the
//! response interpreter instead of being returned to the caller.

use thiserror::Error;

/// Errors raised synchronously while preparing or submitting a request.
#[derive(Debug, Error)]
pub enum Error {
    /// Non-GET params need encoding but no request format can write them.
    #[error("unrecognized request format: {0}")]
    UnrecognizedRequestFormat(String),

    /// The response format specifier did not resolve to a descriptor.
    #[error("unrecognized response format: {0}")]
    UnrecognizedResponseFormat(String),

    /// No transport backend is registered under the requested name.
    #[error("missing transport capability: {0}")]
    MissingCapability(String),

    /// The low-level entry point was called without a result handler.
    #[error("No ajax handler provided.")]
    NoHandler,

    /// The managed backend already has an exchange in flight with this id.
    #[error("request id in use: {0}")]
    IdInUse(String),

    /// A transport object was used in a state that does not allow the call.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The request could not be expressed on the wire (bad method, uri, header).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request format's writer rejected the params.
    #[error("failed to encode request: {0}")]
    Encode(#[from] FormatError),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A transport could not start its worker thread.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors produced by format read/write functions and codecs.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("EDN syntax error at offset {offset}: {message}")]
    Edn { offset: usize, message: String },

    #[error("transit error: {0}")]
    Transit(String),

    /// Content sniffing found no candidate for the response's Content-Type.
    #[error("no acceptable response format for content type '{0}'")]
    NoAcceptableFormat(String),

    /// The value cannot be represented in the target format.
    #[error("cannot encode {0}")]
    Unsupported(String),

    /// The response body is binary but the format needs text.
    #[error("response body is not valid UTF-8")]
    NotText,
}
