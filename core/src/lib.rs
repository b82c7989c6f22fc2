//! Asynchronous HTTP request layer with pluggable transports and
//! content-type driven request/response formats.
//!
//! # Overview
//! A caller describes a request (uri, method, params, formats, handlers).
//! The client builds the wire request, negotiates the response format,
//! hands the exchange to a transport backend, and on completion interprets
//! the response into an `Outcome` delivered to the caller's handler.
//!
//! # Design
//! - Building the request (`request::build_request`) and interpreting the
//!   response (`response::interpret_response`) are pure; only the
//!   transports touch the network.
//! - Transports implement `AjaxImpl` and are looked up by name in a
//!   `TransportRegistry`, or supplied directly as an instance.
//! - Formats are descriptors (`RequestFormat`, `ResponseFormat`) resolved
//!   from closed specifier enums; JSON, EDN, transit, url and raw ship
//!   built in.
//! - Errors that prevent submission are returned as `Result`; anything
//!   that happens after submission reaches the handler as a `Failure`.
//!
//! ```no_run
//! use ajax_core::{AjaxClient, AjaxOptions, Value};
//!
//! let client = AjaxClient::default();
//! client
//!     .get(
//!         "http://localhost:3000/items",
//!         AjaxOptions::new()
//!             .params(Value::map([("q", "a")]))
//!             .handler(|items| println!("{items}"))
//!             .error_handler(|failure| eprintln!("{failure}")),
//!     )
//!     .unwrap();
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod http;
pub mod negotiate;
pub mod request;
pub mod response;
pub mod transport;
pub mod value;

#[cfg(test)]
mod test_support;

pub use client::{AjaxClient, AjaxOptions};
pub use config::Config;
pub use error::{Error, FormatError};
pub use format::{FormatOptions, RequestFormat, RequestFormatSpec, ResponseFormat, ResponseFormatSpec};
pub use http::{Body, FormData, HttpMethod, HttpRequest, Params, ResponseBody};
pub use request::{build_request, uri_with_params, Request};
pub use response::{interpret_response, Failure, FailureKind, Outcome};
pub use transport::{
    abort, AjaxImpl, AjaxRequest, AjaxResponse, Api, Exchange, ManagerConfig, RawRequest, RequestOptions,
    TransportRegistry, XhrIo, XhrManager,
};
pub use value::Value;
