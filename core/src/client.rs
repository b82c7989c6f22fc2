//! Client entry points.
//!
//! # Design
//! `AjaxClient` holds configuration, the transport registry and the default
//! response format candidates; it keeps no per-request state. Each call
//! resolves formats, builds the wire request with `build_request`, and
//! hands it to a transport together with a completion that interprets the
//! response and calls the handler. Submission problems are returned as
//! `Err` before anything is sent; everything after that reaches the
//! handler as an `Outcome`.

use std::sync::Arc;

use log::debug;

use crate::config::Config;
use crate::error::Error;
use crate::format::{resolve_response_format, FormatOptions, RequestFormatSpec, ResponseFormatSpec};
use crate::http::{Headers, HttpMethod, Params};
use crate::negotiate::default_formats;
use crate::request::{build_request, OutcomeHandler, Request};
use crate::response::{interpret_response, Failure};
use crate::transport::{AjaxImpl, Api, Completion, Exchange, RequestOptions, TransportRegistry};
use crate::value::Value;

pub type SuccessHandler = Box<dyn FnOnce(Value) + Send + 'static>;
pub type ErrorHandler = Box<dyn FnOnce(Failure) + Send + 'static>;
pub type FinallyHandler = Box<dyn FnOnce() + Send + 'static>;

/// Options accepted by the per-method convenience calls.
#[derive(Default)]
pub struct AjaxOptions {
    pub handler: Option<SuccessHandler>,
    pub error_handler: Option<ErrorHandler>,
    pub finally: Option<FinallyHandler>,
    pub format: Option<RequestFormatSpec>,
    pub response_format: Option<ResponseFormatSpec>,
    pub params: Option<Params>,
    pub headers: Headers,
    pub format_options: FormatOptions,
    /// Overrides `Config::timeout_ms`.
    pub timeout_ms: Option<u64>,
    /// Overrides `Config::with_credentials`.
    pub with_credentials: Option<bool>,
    pub id: Option<String>,
    pub priority: Option<u32>,
    pub max_retries: Option<u32>,
    pub api: Api,
}

impl AjaxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler<F: FnOnce(Value) + Send + 'static>(mut self, f: F) -> Self {
        self.handler = Some(Box::new(f));
        self
    }

    pub fn error_handler<F: FnOnce(Failure) + Send + 'static>(mut self, f: F) -> Self {
        self.error_handler = Some(Box::new(f));
        self
    }

    pub fn finally<F: FnOnce() + Send + 'static>(mut self, f: F) -> Self {
        self.finally = Some(Box::new(f));
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

    pub fn params(mut self, params: impl Into<Params>) -> Self {
        self.params = Some(params.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn format_options(mut self, options: FormatOptions) -> Self {
        self.format_options = options;
        self
    }

    pub fn keywords(mut self, keywords: bool) -> Self {
        self.format_options.keywords = keywords;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = Some(with_credentials);
        self
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn api(mut self, api: Api) -> Self {
        self.api = api;
        self
    }
}

/// Route an outcome to the success or error handler, then run `finally`.
pub fn transform_handler(
    handler: Option<SuccessHandler>,
    error_handler: Option<ErrorHandler>,
    finally: Option<FinallyHandler>,
) -> OutcomeHandler {
    Box::new(move |outcome| {
        match outcome {
            Ok(value) => {
                if let Some(handler) = handler {
                    handler(value);
                }
            }
            Err(failure) => {
                if let Some(error_handler) = error_handler {
                    error_handler(failure);
                }
            }
        }
        if let Some(finally) = finally {
            finally();
        }
    })
}

/// Issues requests through a configurable transport.
#[derive(Debug, Clone)]
pub struct AjaxClient {
    config: Config,
    registry: TransportRegistry,
    default_formats: Vec<ResponseFormatSpec>,
}

impl Default for AjaxClient {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl AjaxClient {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: TransportRegistry::default(),
            default_formats: default_formats(),
        }
    }

    pub fn from_env() -> Result<Self, Error> {
        Ok(Self::new(Config::from_env()?))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the candidates used when a request names no response format.
    pub fn with_default_formats(mut self, formats: Vec<ResponseFormatSpec>) -> Self {
        self.default_formats = formats;
        self
    }

    pub fn default_formats(&self) -> &[ResponseFormatSpec] {
        &self.default_formats
    }

    pub fn registry_mut(&mut self) -> &mut TransportRegistry {
        &mut self.registry
    }

    /// Register a shared backend under `name`.
    pub fn register_transport(&mut self, name: &str, transport: Arc<dyn AjaxImpl>) {
        self.registry.register_instance(name, transport);
    }

    fn transport(&self, api: &Api) -> Result<Arc<dyn AjaxImpl>, Error> {
        match api {
            Api::Default => self.registry.resolve(&self.config.transport),
            Api::Named(name) => self.registry.resolve(name),
            Api::Instance(transport) => Ok(transport.clone()),
        }
    }

    /// Low-level entry point. The request must carry a handler.
    pub fn ajax_request(&self, request: Request) -> Result<Arc<dyn Exchange>, Error> {
        let response_format = resolve_response_format(
            request.response_format.as_ref(),
            &request.format_options,
            &self.default_formats,
        )?;
        let http = build_request(&request, &response_format)?;
        let Request {
            handler, options, api, ..
        } = request;
        let handler = handler.ok_or(Error::NoHandler)?;
        let transport = self.transport(&api)?;

        debug!(
            "{} {} expecting {}",
            http.method, http.uri, response_format.description
        );
        let completion: Completion = Box::new(move |response| {
            let outcome = interpret_response(&response_format, response);
            if let Err(failure) = &outcome {
                debug!("request failed: {failure}");
            }
            handler(outcome);
        });
        transport.issue_request(http, completion, &options)
    }

    /// Issue a request with the convenience options.
    pub fn request(&self, method: HttpMethod, uri: &str, opts: AjaxOptions) -> Result<Arc<dyn Exchange>, Error> {
        self.ajax_request(self.transform_opts(method, uri, opts))
    }

    /// Map convenience options onto a low-level request. A request format
    /// is chosen when one is given or when non-GET params need encoding.
    pub fn transform_opts(&self, method: HttpMethod, uri: &str, opts: AjaxOptions) -> Request {
        let needs_format = !method.is_get() && opts.params.as_ref().is_some_and(|p| !p.is_submittable());
        let format = match opts.format {
            Some(format) => Some(format),
            None if needs_format => Some(RequestFormatSpec::Tag(self.config.default_request_format.clone())),
            None => None,
        };
        Request {
            uri: uri.to_string(),
            method,
            params: opts.params,
            headers: opts.headers,
            format,
            response_format: opts.response_format,
            format_options: opts.format_options,
            handler: Some(transform_handler(opts.handler, opts.error_handler, opts.finally)),
            options: RequestOptions {
                timeout_ms: opts.timeout_ms.unwrap_or(self.config.timeout_ms),
                with_credentials: opts.with_credentials.unwrap_or(self.config.with_credentials),
                id: opts.id,
                priority: opts.priority,
                max_retries: opts.max_retries,
            },
            api: opts.api,
        }
    }

    pub fn get(&self, uri: &str, opts: AjaxOptions) -> Result<Arc<dyn Exchange>, Error> {
        self.request(HttpMethod::Get, uri, opts)
    }

    pub fn head(&self, uri: &str, opts: AjaxOptions) -> Result<Arc<dyn Exchange>, Error> {
        self.request(HttpMethod::Head, uri, opts)
    }

    pub fn post(&self, uri: &str, opts: AjaxOptions) -> Result<Arc<dyn Exchange>, Error> {
        self.request(HttpMethod::Post, uri, opts)
    }

    pub fn put(&self, uri: &str, opts: AjaxOptions) -> Result<Arc<dyn Exchange>, Error> {
        self.request(HttpMethod::Put, uri, opts)
    }

    pub fn delete(&self, uri: &str, opts: AjaxOptions) -> Result<Arc<dyn Exchange>, Error> {
        self.request(HttpMethod::Delete, uri, opts)
    }

    pub fn options(&self, uri: &str, opts: AjaxOptions) -> Result<Arc<dyn Exchange>, Error> {
        self.request(HttpMethod::Options, uri, opts)
    }

    pub fn trace(&self, uri: &str, opts: AjaxOptions) -> Result<Arc<dyn Exchange>, Error> {
        self.request(HttpMethod::Trace, uri, opts)
    }
}
