//! Content-type negotiation: the `Accept` header sent with a request and
//! the choice of decoder once the response's `Content-Type` is known.

use std::sync::Arc;

use log::trace;

use crate::error::FormatError;
use crate::format::{ResponseFormat, ResponseFormatSpec};

/// A detection candidate: a decoder plus the content type it is matched on.
#[derive(Debug, Clone)]
pub struct FormatEntry {
    content_type: String,
    pub format: ResponseFormat,
}

impl FormatEntry {
    /// Match on the format's own content type.
    pub fn new(format: ResponseFormat) -> Self {
        Self {
            content_type: format.accept().to_string(),
            format,
        }
    }

    /// Match on an explicit content type instead of the format's own.
    pub fn sniff(content_type: &str, format: ResponseFormat) -> Self {
        Self {
            content_type: content_type.to_string(),
            format,
        }
    }

    /// The value this entry contributes to `Accept`.
    pub fn accept(&self) -> &str {
        if self.content_type.is_empty() {
            "*/*"
        } else {
            &self.content_type
        }
    }

    /// `*/*` matches anything; otherwise the response content type must
    /// contain this entry's content type.
    pub fn matches(&self, actual: &str) -> bool {
        let accept = self.accept();
        accept == "*/*" || actual.contains(accept)
    }
}

/// Candidates in priority order, used when no response format is given:
/// json, edn, transit, plain text and html as raw, then raw for anything.
pub fn default_formats() -> Vec<ResponseFormatSpec> {
    vec![
        ResponseFormatSpec::tag("json"),
        ResponseFormatSpec::tag("edn"),
        ResponseFormatSpec::tag("transit"),
        ResponseFormatSpec::sniff("text/plain", ResponseFormatSpec::tag("raw")),
        ResponseFormatSpec::sniff("text/html", ResponseFormatSpec::tag("raw")),
        ResponseFormatSpec::tag("raw"),
    ]
}

/// Comma-joined content types of the candidates, in order.
pub fn accept_header(candidates: &[FormatEntry]) -> String {
    candidates
        .iter()
        .map(FormatEntry::accept)
        .collect::<Vec<_>>()
        .join(", ")
}

/// First candidate whose content type matches `actual`.
pub fn pick_by_content_type<'a>(actual: &str, candidates: &'a [FormatEntry]) -> Result<&'a ResponseFormat, FormatError> {
    candidates
        .iter()
        .find(|entry| entry.matches(actual))
        .map(|entry| &entry.format)
        .ok_or_else(|| FormatError::NoAcceptableFormat(actual.to_string()))
}

/// Build a descriptor that advertises every candidate in `Accept` and,
/// at read time, decodes with the first candidate matching the response's
/// `Content-Type` (an absent header is treated as empty).
pub fn detect_response_format(candidates: Vec<FormatEntry>) -> ResponseFormat {
    let accept = accept_header(&candidates);
    let description = format!("(from {accept})");
    let candidates = Arc::new(candidates);
    ResponseFormat {
        read: Arc::new(move |response| {
            let actual = response.response_header("Content-Type").unwrap_or_default();
            let format = pick_by_content_type(&actual, &candidates)?;
            trace!("content type '{actual}' decoded as {}", format.description);
            (format.read)(response)
        }),
        content_type: accept,
        description,
    }
}
