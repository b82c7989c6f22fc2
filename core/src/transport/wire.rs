//! Blocking HTTP round-trip shared by the backends, run on a worker thread.

use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::error::Error;
use crate::http::{find_header, Headers, HttpRequest, ResponseBody};

/// What came back from the wire.
pub(crate) enum WireOutcome {
    Response(WireResponse),
    TimedOut,
    /// No HTTP response: connection refused, DNS failure, bad request line.
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct WireResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: ResponseBody,
}

impl WireResponse {
    pub fn header(&self, name: &str) -> Option<String> {
        find_header(&self.headers, name).map(str::to_string)
    }
}

/// Perform `request`, giving up after `timeout_ms` (0 waits forever).
///
/// Non-2xx statuses are data, not errors.
pub(crate) fn perform(request: &HttpRequest, timeout_ms: u64) -> WireOutcome {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .allow_non_standard_methods(true)
        .timeout_global((timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)))
        .build()
        .new_agent();

    let mut headers = request.headers.clone();
    let payload = match &request.body {
        Some(body) => {
            let (bytes, implied_type) = body.encode();
            if let Some(ct) = implied_type {
                if find_header(&headers, "Content-Type").is_none() {
                    headers.push(("Content-Type".to_string(), ct));
                }
            }
            bytes
        }
        None => Vec::new(),
    };

    let mut builder = ureq::http::Request::builder()
        .method(request.method.as_str())
        .uri(request.uri.as_str());
    for (name, value) in &headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    debug!("{} {} ({} byte body)", request.method, request.uri, payload.len());
    let result = if payload.is_empty() {
        match builder.body(()) {
            Ok(req) => agent.run(req),
            Err(e) => return WireOutcome::Failed(e.to_string()),
        }
    } else {
        match builder.body(payload) {
            Ok(req) => agent.run(req),
            Err(e) => return WireOutcome::Failed(e.to_string()),
        }
    };

    let mut response = match result {
        Ok(response) => response,
        Err(ureq::Error::Timeout(_)) => return WireOutcome::TimedOut,
        Err(e) => {
            warn!("{} {} failed: {e}", request.method, request.uri);
            return WireOutcome::Failed(e.to_string());
        }
    };

    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();
    let body = match response.body_mut().read_to_vec() {
        Ok(bytes) => bytes,
        Err(ureq::Error::Timeout(_)) => return WireOutcome::TimedOut,
        Err(e) => return WireOutcome::Failed(e.to_string()),
    };
    debug!("{} {} -> {}", request.method, request.uri, status.as_u16());

    WireOutcome::Response(WireResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body: ResponseBody::from_bytes(body),
    })
}

/// Run `work` on a named worker thread.
pub(crate) fn spawn<F>(name: &str, work: F) -> Result<(), Error>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(work)?;
    Ok(())
}
