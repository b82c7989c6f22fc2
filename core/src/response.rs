//! Turns a completed exchange into an `Outcome`.
//!
//! # Design
//! Interpretation never fails: decode errors, transport errors and HTTP
//! errors all become a `Failure` value handed to the caller's handler. Only
//! statuses in `SUCCESS_STATUSES` with a body that decodes cleanly produce
//! `Ok`.

use thiserror::Error;

use crate::error::FormatError;
use crate::format::ResponseFormat;
use crate::transport::AjaxResponse;
use crate::value::Value;

/// Statuses treated as success.
pub const SUCCESS_STATUSES: [i32; 6] = [200, 201, 202, 204, 205, 206];

pub fn is_success(status: i32) -> bool {
    SUCCESS_STATUSES.contains(&status)
}

/// Why a request did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Non-success HTTP status; the body decoded fine.
    Error,
    Timeout,
    Aborted,
    /// Something failed before or outside decoding.
    Exception,
    /// The body of a success response could not be decoded.
    Parse,
    /// The body of a non-success response could not be decoded.
    ParseError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Error => "error",
            FailureKind::Timeout => "timeout",
            FailureKind::Aborted => "aborted",
            FailureKind::Exception => "exception",
            FailureKind::Parse => "parse",
            FailureKind::ParseError => "parse-error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed request, as delivered to the error handler.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{failure} ({status}): {status_text}")]
pub struct Failure {
    /// HTTP status, 0 when there was none, -1 when aborted or timed out.
    pub status: i32,
    pub status_text: String,
    pub failure: FailureKind,
    /// Decoded body of a non-success response.
    pub response: Option<Value>,
    /// Raw body text of a response that failed to decode.
    pub original_text: Option<String>,
    /// For `ParseError`: the decode failure itself.
    pub parse_error: Option<Box<Failure>>,
    /// For `Exception`: the error message.
    pub exception: Option<String>,
}

impl Failure {
    pub fn new(status: i32, status_text: impl Into<String>, failure: FailureKind) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            failure,
            response: None,
            original_text: None,
            parse_error: None,
            exception: None,
        }
    }

    /// A failure raised outside the HTTP exchange.
    pub fn exception(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            exception: Some(message.clone()),
            ..Self::new(0, message, FailureKind::Exception)
        }
    }
}

/// What a handler receives: the decoded value or the reason there is none.
pub type Outcome = Result<Value, Failure>;

/// Interpret a completed exchange with `format`.
pub fn interpret_response(format: &ResponseFormat, response: &dyn AjaxResponse) -> Outcome {
    let status = match response.status() {
        Ok(status) => status,
        Err(e) => return Err(Failure::exception(e.to_string())),
    };

    if status == -1 {
        return Err(if response.was_aborted() {
            Failure::new(-1, "Request aborted by client.", FailureKind::Aborted)
        } else {
            Failure::new(-1, "Request timed out.", FailureKind::Timeout)
        });
    }

    match (format.read)(response) {
        Ok(value) if is_success(status) => Ok(value),
        Ok(value) => Err(Failure {
            response: Some(value),
            ..Failure::new(status, response.status_text(), FailureKind::Error)
        }),
        Err(e) => Err(exception_response(&e, status, format, response)),
    }
}

/// Failure for a body `format` could not decode.
///
/// On a success status this is the `Parse` failure itself. Otherwise the
/// transport's own status text is kept and the decode failure is nested
/// under `parse_error`.
pub fn exception_response(
    error: &FormatError,
    status: i32,
    format: &ResponseFormat,
    response: &dyn AjaxResponse,
) -> Failure {
    let parse = Failure {
        original_text: Some(response.body().to_text_lossy().into_owned()),
        ..Failure::new(
            status,
            format!("{error}  Format should have been {}", format.description),
            FailureKind::Parse,
        )
    };
    if is_success(status) {
        parse
    } else {
        Failure {
            parse_error: Some(Box::new(parse)),
            ..Failure::new(status, response.status_text(), FailureKind::ParseError)
        }
    }
}
