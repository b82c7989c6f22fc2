//! The low-level request description and the pipeline that turns it into
//! an `HttpRequest`.
//!
//! # Design
//! `build_request` is pure: it computes the final uri, headers and body
//! from a `Request` and the already-negotiated response format, without
//! touching the network. GET requests carry their params in the query
//! string; other methods encode them with the request format or send them
//! as-is when they are already submittable.

use std::fmt;

use crate::codec::query;
use crate::error::Error;
use crate::format::{resolve_request_format, FormatOptions, RequestFormatSpec, ResponseFormat, ResponseFormatSpec};
use crate::http::{merge_headers, Headers, HttpMethod, HttpRequest, Params};
use crate::response::Outcome;
use crate::transport::{Api, RequestOptions};
use crate::value::Value;

/// Receives the outcome of a request, exactly once.
pub type OutcomeHandler = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Everything the low-level entry point needs to issue one request.
pub struct Request {
    pub uri: String,
    pub method: HttpMethod,
    pub params: Option<Params>,
    /// Caller headers, overriding the computed `Accept`.
    pub headers: Headers,
    pub format: Option<RequestFormatSpec>,
    /// `None` auto-detects from the client's default candidates.
    pub response_format: Option<ResponseFormatSpec>,
    pub format_options: FormatOptions,
    pub handler: Option<OutcomeHandler>,
    pub options: RequestOptions,
    pub api: Api,
}

impl Request {
    pub fn new(method: HttpMethod, uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            method,
            params: None,
            headers: Vec::new(),
            format: None,
            response_format: None,
            format_options: FormatOptions::default(),
            handler: None,
            options: RequestOptions::default(),
            api: Api::Default,
        }
    }

    pub fn params(mut self, params: impl Into<Params>) -> Self {
        self.params = Some(params.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn format(mut self, format: RequestFormatSpec) -> Self {
        self.format = Some(format);
        self
    }

    pub fn response_format(mut self, format: ResponseFormatSpec) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn api(mut self, api: Api) -> Self {
        self.api = api;
        self
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("format", &self.format.as_ref().map(ToString::to_string))
            .field("response_format", &self.response_format.as_ref().map(ToString::to_string))
            .field("handler", &self.handler.is_some())
            .field("options", &self.options)
            .field("api", &self.api)
            .finish()
    }
}

/// Append `params` to `uri` as a query string.
///
/// Absent or empty params leave the uri untouched. A string is appended
/// verbatim. The separator is `&` when the uri already has a query.
pub fn uri_with_params(uri: &str, params: Option<&Params>) -> Result<String, Error> {
    let query = match params {
        None => return Ok(uri.to_string()),
        Some(Params::Value(Value::Str(s))) => s.clone(),
        Some(Params::Value(value)) => query::params_to_str(value)?,
        Some(Params::Body(_)) => {
            return Err(Error::InvalidRequest("a GET request cannot carry a body".to_string()));
        }
    };
    if query.is_empty() {
        return Ok(uri.to_string());
    }
    let separator = if uri.contains('?') { '&' } else { '?' };
    Ok(format!("{uri}{separator}{query}"))
}

/// Compute the wire request for `request`.
///
/// `Accept` comes from `response_format`, then the caller's headers are
/// merged over it. A request format's `Content-Type` is merged last.
pub fn build_request(request: &Request, response_format: &ResponseFormat) -> Result<HttpRequest, Error> {
    let accept = vec![("Accept".to_string(), response_format.accept().to_string())];
    let headers = merge_headers(accept, &request.headers);
    let method = request.method.normalize().to_string();

    if request.method.is_get() {
        return Ok(HttpRequest {
            method,
            uri: uri_with_params(&request.uri, request.params.as_ref())?,
            headers,
            body: None,
        });
    }

    let format = resolve_request_format(request.format.as_ref(), &request.format_options);
    let writer = format.as_ref().and_then(|f| f.write.as_ref());
    let body = match (&request.params, writer) {
        (None, _) => None,
        (Some(Params::Body(body)), _) => Some(body.clone()),
        (Some(Params::Value(value)), Some(write)) => Some(write(value)?),
        (Some(params), None) => Some(params.as_submittable().ok_or_else(|| {
            let described = request
                .format
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "nil".to_string());
            Error::UnrecognizedRequestFormat(described)
        })?),
    };

    let headers = match format.and_then(|f| f.content_type) {
        Some(ct) => merge_headers(headers, &[("Content-Type".to_string(), ct)]),
        None => headers,
    };

    Ok(HttpRequest {
        method,
        uri: request.uri.clone(),
        headers,
        body,
    })
}
