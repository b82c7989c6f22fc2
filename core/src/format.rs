//! Request and response format descriptors, and resolution of the format
//! specifiers callers hand to the client.
//!
//! # Design
//! A descriptor pairs a read or write function with the content type it
//! speaks. Specifiers are closed enums (`RequestFormatSpec`,
//! `ResponseFormatSpec`) resolved by a single match; the default candidate
//! list used for auto-detection is passed in explicitly rather than read
//! from a global.

use std::fmt;
use std::sync::Arc;

use crate::codec::transit::{self, TransitCodec, TransitJson, TransitType};
use crate::codec::{edn, query};
use crate::error::{Error, FormatError};
use crate::http::{Body, ResponseBody};
use crate::negotiate::{self, FormatEntry};
use crate::transport::AjaxResponse;
use crate::value::Value;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const EDN_CONTENT_TYPE: &str = "application/edn";
pub const TRANSIT_CONTENT_TYPE: &str = "application/transit+json; charset=utf-8";
pub const TRANSIT_RESPONSE_CONTENT_TYPE: &str = "application/transit+json";
pub const URL_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const ANY_CONTENT_TYPE: &str = "*/*";

/// Encodes request params into a submittable body.
pub type WriteFn = Arc<dyn Fn(&Value) -> Result<Body, FormatError> + Send + Sync>;

/// Decodes a completed response.
pub type ReadFn = Arc<dyn Fn(&dyn AjaxResponse) -> Result<Value, FormatError> + Send + Sync>;

/// How request params are written to the wire.
#[derive(Clone)]
pub struct RequestFormat {
    pub write: Option<WriteFn>,
    pub content_type: Option<String>,
    pub description: String,
}

impl fmt::Debug for RequestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestFormat")
            .field("content_type", &self.content_type)
            .field("description", &self.description)
            .field("write", &self.write.is_some())
            .finish()
    }
}

/// How a response body is decoded.
#[derive(Clone)]
pub struct ResponseFormat {
    pub read: ReadFn,
    pub content_type: String,
    pub description: String,
}

impl ResponseFormat {
    pub fn new<F>(content_type: &str, description: &str, read: F) -> Self
    where
        F: Fn(&dyn AjaxResponse) -> Result<Value, FormatError> + Send + Sync + 'static,
    {
        Self {
            read: Arc::new(read),
            content_type: content_type.to_string(),
            description: description.to_string(),
        }
    }

    /// Content type used for `Accept` and sniffing; `*/*` when unset.
    pub fn accept(&self) -> &str {
        if self.content_type.is_empty() {
            ANY_CONTENT_TYPE
        } else {
            &self.content_type
        }
    }
}

impl fmt::Debug for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFormat")
            .field("content_type", &self.content_type)
            .field("description", &self.description)
            .finish()
    }
}

/// Options consumed by the built-in formats.
#[derive(Clone, Default)]
pub struct FormatOptions {
    /// JSON anti-hijacking prefix stripped from response bodies.
    pub prefix: Option<String>,
    /// Turn JSON object keys into keywords.
    pub keywords: bool,
    /// Skip native conversion: JSON keys stay strings, transit is read as
    /// plain JSON.
    pub raw: bool,
    pub transit_type: TransitType,
    pub writer: Option<Arc<dyn TransitCodec>>,
    pub reader: Option<Arc<dyn TransitCodec>>,
}

fn body_text(response: &dyn AjaxResponse) -> Result<String, FormatError> {
    match response.body() {
        ResponseBody::Text(text) => Ok(text),
        ResponseBody::Binary(_) => Err(FormatError::NotText),
    }
}

pub fn json_request_format() -> RequestFormat {
    RequestFormat {
        write: Some(Arc::new(|params: &Value| Ok(Body::Text(serde_json::to_string(&params.to_json())?)))),
        content_type: Some(JSON_CONTENT_TYPE.to_string()),
        description: "JSON".to_string(),
    }
}

/// JSON response format. A non-empty `prefix` found at the very start of
/// the body is stripped once before parsing.
pub fn json_response_format(opts: &FormatOptions) -> ResponseFormat {
    let prefix = opts.prefix.clone().filter(|p| !p.is_empty());
    let keywords = opts.keywords && !opts.raw;

    let mut description = "JSON".to_string();
    if let Some(p) = &prefix {
        description.push_str(&format!(" prefix '{p}'"));
    }
    if keywords {
        description.push_str(" keywordize");
    }

    ResponseFormat::new(JSON_CONTENT_TYPE, &description, move |response| {
        let text = body_text(response)?;
        let text = match &prefix {
            Some(p) => text.strip_prefix(p.as_str()).unwrap_or(text.as_str()),
            None => text.as_str(),
        };
        let json: serde_json::Value = serde_json::from_str(text)?;
        Ok(Value::from_json(&json, keywords))
    })
}

pub fn edn_request_format() -> RequestFormat {
    RequestFormat {
        write: Some(Arc::new(|params: &Value| Ok(Body::Text(edn::write(params))))),
        content_type: Some(EDN_CONTENT_TYPE.to_string()),
        description: "EDN".to_string(),
    }
}

pub fn edn_response_format() -> ResponseFormat {
    ResponseFormat::new(EDN_CONTENT_TYPE, "EDN", |response| edn::read(&body_text(response)?))
}

pub fn transit_request_format(opts: &FormatOptions) -> RequestFormat {
    let codec: Arc<dyn TransitCodec> = match &opts.writer {
        Some(writer) => writer.clone(),
        None => Arc::new(TransitJson::new(opts.transit_type)),
    };
    RequestFormat {
        write: Some(Arc::new(move |params: &Value| Ok(Body::Text(codec.encode(params)?)))),
        content_type: Some(TRANSIT_CONTENT_TYPE.to_string()),
        description: "Transit".to_string(),
    }
}

pub fn transit_response_format(opts: &FormatOptions) -> ResponseFormat {
    let codec: Arc<dyn TransitCodec> = match &opts.reader {
        Some(reader) => reader.clone(),
        None => Arc::new(TransitJson::new(opts.transit_type)),
    };
    let raw = opts.raw;
    ResponseFormat::new(TRANSIT_RESPONSE_CONTENT_TYPE, "Transit", move |response| {
        let text = body_text(response)?;
        if raw {
            transit::read_raw(&text)
        } else {
            codec.decode(&text)
        }
    })
}

/// Form URL encoding of a flat map.
pub fn url_request_format() -> RequestFormat {
    RequestFormat {
        write: Some(Arc::new(|params: &Value| Ok(Body::Text(query::params_to_str(params)?)))),
        content_type: Some(URL_CONTENT_TYPE.to_string()),
        description: "URL".to_string(),
    }
}

/// Hands back the body unchanged (text as a string, binary as bytes).
pub fn raw_response_format() -> ResponseFormat {
    ResponseFormat::new(ANY_CONTENT_TYPE, "raw text", |response| Ok(response.body().into_value()))
}

/// A caller-supplied request format specifier.
#[derive(Clone)]
pub enum RequestFormatSpec {
    Descriptor(RequestFormat),
    Custom(WriteFn),
    /// `json`, `edn`, `transit`, `url` or `raw`.
    Tag(String),
}

impl RequestFormatSpec {
    pub fn tag(name: &str) -> Self {
        RequestFormatSpec::Tag(name.to_string())
    }

    pub fn custom<F>(write: F) -> Self
    where
        F: Fn(&Value) -> Result<Body, FormatError> + Send + Sync + 'static,
    {
        RequestFormatSpec::Custom(Arc::new(write))
    }
}

impl fmt::Display for RequestFormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestFormatSpec::Descriptor(d) => write!(f, "{}", d.description),
            RequestFormatSpec::Custom(_) => write!(f, "custom"),
            RequestFormatSpec::Tag(name) => write!(f, "{name}"),
        }
    }
}

/// A caller-supplied response format specifier.
#[derive(Clone)]
pub enum ResponseFormatSpec {
    Descriptor(ResponseFormat),
    Custom(ReadFn),
    /// `json`, `edn`, `transit`, `raw` or `detect`.
    Tag(String),
    /// Candidates for content-type auto-detection, in priority order.
    List(Vec<ResponseFormatSpec>),
    /// Use `inner` when the response content type contains the given string.
    Sniff(String, Box<ResponseFormatSpec>),
}

impl ResponseFormatSpec {
    pub fn tag(name: &str) -> Self {
        ResponseFormatSpec::Tag(name.to_string())
    }

    pub fn sniff(content_type: &str, inner: ResponseFormatSpec) -> Self {
        ResponseFormatSpec::Sniff(content_type.to_string(), Box::new(inner))
    }

    pub fn custom<F>(read: F) -> Self
    where
        F: Fn(&dyn AjaxResponse) -> Result<Value, FormatError> + Send + Sync + 'static,
    {
        ResponseFormatSpec::Custom(Arc::new(read))
    }
}

impl fmt::Display for ResponseFormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseFormatSpec::Descriptor(d) => write!(f, "{}", d.description),
            ResponseFormatSpec::Custom(_) => write!(f, "custom"),
            ResponseFormatSpec::Tag(name) => write!(f, "{name}"),
            ResponseFormatSpec::List(items) => {
                let names: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", names.join(" "))
            }
            ResponseFormatSpec::Sniff(ct, inner) => write!(f, "[{ct} {inner}]"),
        }
    }
}

impl fmt::Debug for RequestFormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestFormatSpec({self})")
    }
}

impl fmt::Debug for ResponseFormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResponseFormatSpec({self})")
    }
}

/// Resolve a request format specifier. `None` means params are sent as-is.
pub fn resolve_request_format(spec: Option<&RequestFormatSpec>, opts: &FormatOptions) -> Option<RequestFormat> {
    match spec? {
        RequestFormatSpec::Descriptor(d) => Some(d.clone()),
        RequestFormatSpec::Custom(write) => Some(RequestFormat {
            write: Some(write.clone()),
            content_type: Some("text/plain".to_string()),
            description: "custom".to_string(),
        }),
        RequestFormatSpec::Tag(name) => match name.as_str() {
            "json" => Some(json_request_format()),
            "edn" => Some(edn_request_format()),
            "transit" => Some(transit_request_format(opts)),
            "url" | "raw" => Some(url_request_format()),
            _ => None,
        },
    }
}

/// Resolve a response format specifier into the descriptor used to decode
/// the response. `None` and `List` produce an auto-detecting descriptor;
/// `defaults` supplies the candidates for `None` and the `detect` tag.
pub fn resolve_response_format(
    spec: Option<&ResponseFormatSpec>,
    opts: &FormatOptions,
    defaults: &[ResponseFormatSpec],
) -> Result<ResponseFormat, Error> {
    match spec {
        None => detect_from(defaults, opts, defaults),
        Some(spec) => resolve_single(spec, opts, defaults, false),
    }
}

fn resolve_single(
    spec: &ResponseFormatSpec,
    opts: &FormatOptions,
    defaults: &[ResponseFormatSpec],
    in_candidates: bool,
) -> Result<ResponseFormat, Error> {
    match spec {
        ResponseFormatSpec::Descriptor(d) => Ok(d.clone()),
        ResponseFormatSpec::Custom(read) => Ok(ResponseFormat {
            read: read.clone(),
            content_type: ANY_CONTENT_TYPE.to_string(),
            description: "custom".to_string(),
        }),
        ResponseFormatSpec::Tag(name) => match name.as_str() {
            "json" => Ok(json_response_format(opts)),
            "edn" => Ok(edn_response_format()),
            "transit" => Ok(transit_response_format(opts)),
            "raw" => Ok(raw_response_format()),
            "detect" if !in_candidates => detect_from(defaults, opts, defaults),
            other => Err(Error::UnrecognizedResponseFormat(other.to_string())),
        },
        ResponseFormatSpec::List(_) if in_candidates => Err(Error::UnrecognizedResponseFormat(spec.to_string())),
        ResponseFormatSpec::List(items) => detect_from(items, opts, defaults),
        ResponseFormatSpec::Sniff(content_type, inner) => {
            let mut format = resolve_single(inner, opts, defaults, in_candidates)?;
            format.content_type = content_type.clone();
            Ok(format)
        }
    }
}

fn detect_from(
    candidates: &[ResponseFormatSpec],
    opts: &FormatOptions,
    defaults: &[ResponseFormatSpec],
) -> Result<ResponseFormat, Error> {
    let entries = candidates
        .iter()
        .map(|spec| match spec {
            ResponseFormatSpec::Sniff(ct, inner) => {
                Ok(FormatEntry::sniff(ct, resolve_single(inner, opts, defaults, true)?))
            }
            other => Ok(FormatEntry::new(resolve_single(other, opts, defaults, true)?)),
        })
        .collect::<Result<Vec<_>, Error>>()?;
    Ok(negotiate::detect_response_format(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubResponse;

    fn opts() -> FormatOptions {
        FormatOptions::default()
    }

    fn write_text(format: &RequestFormat, v: &Value) -> String {
        match (format.write.as_ref().unwrap())(v).unwrap() {
            Body::Text(s) => s,
            other => panic!("expected text body, got {other:?}"),
        }
    }

    #[test]
    fn tags_resolve_to_builtin_request_formats() {
        let json = resolve_request_format(Some(&RequestFormatSpec::tag("json")), &opts()).unwrap();
        assert_eq!(json.content_type.as_deref(), Some(JSON_CONTENT_TYPE));
        let url = resolve_request_format(Some(&RequestFormatSpec::tag("raw")), &opts()).unwrap();
        assert_eq!(url.content_type.as_deref(), Some(URL_CONTENT_TYPE));
        let transit = resolve_request_format(Some(&RequestFormatSpec::tag("transit")), &opts()).unwrap();
        assert_eq!(transit.content_type.as_deref(), Some(TRANSIT_CONTENT_TYPE));
        assert!(resolve_request_format(Some(&RequestFormatSpec::tag("yaml")), &opts()).is_none());
        assert!(resolve_request_format(None, &opts()).is_none());
    }

    #[test]
    fn custom_writer_is_plain_text() {
        let spec = RequestFormatSpec::custom(|v| Ok(Body::Text(format!("<{v}>"))));
        let format = resolve_request_format(Some(&spec), &opts()).unwrap();
        assert_eq!(format.content_type.as_deref(), Some("text/plain"));
        assert_eq!(write_text(&format, &Value::Int(1)), "<1>");
    }

    #[test]
    fn writers_encode_params() {
        let params = Value::map([(Value::keyword("a"), Value::Int(1))]);
        assert_eq!(write_text(&json_request_format(), &params), r#"{"a":1}"#);
        assert_eq!(write_text(&edn_request_format(), &params), "{:a 1}");
        assert_eq!(write_text(&transit_request_format(&opts()), &params), r#"["^ ","~:a",1]"#);
        assert_eq!(write_text(&url_request_format(), &params), "a=1");
    }

    #[test]
    fn json_reader_strips_prefix_only_at_start() {
        let format = json_response_format(&FormatOptions {
            prefix: Some("while(1);".into()),
            ..FormatOptions::default()
        });
        assert_eq!(format.description, "JSON prefix 'while(1);'");
        let stripped = (format.read)(&StubResponse::ok("while(1);{\"n\":1}")).unwrap();
        assert_eq!(stripped.get("n"), Some(&Value::Int(1)));
        let verbatim = (format.read)(&StubResponse::ok("{\"n\":2}")).unwrap();
        assert_eq!(verbatim.get("n"), Some(&Value::Int(2)));
        assert!((format.read)(&StubResponse::ok(" while(1);{}")).is_err());
    }

    #[test]
    fn json_reader_keywordizes_unless_raw() {
        let keyed = json_response_format(&FormatOptions { keywords: true, ..FormatOptions::default() });
        assert_eq!(keyed.description, "JSON keywordize");
        let v = (keyed.read)(&StubResponse::ok(r#"{"n":1}"#)).unwrap();
        assert_eq!(v, Value::map([(Value::keyword("n"), Value::Int(1))]));

        let raw = json_response_format(&FormatOptions { keywords: true, raw: true, ..FormatOptions::default() });
        let v = (raw.read)(&StubResponse::ok(r#"{"n":1}"#)).unwrap();
        assert_eq!(v, Value::map([(Value::from("n"), Value::Int(1))]));
    }

    #[test]
    fn transit_reader_honours_raw_mode() {
        let body = r#"["^ ","~:n",1]"#;
        let decoded = (transit_response_format(&opts()).read)(&StubResponse::ok(body)).unwrap();
        assert_eq!(decoded, Value::map([(Value::keyword("n"), Value::Int(1))]));
        let raw = transit_response_format(&FormatOptions { raw: true, ..FormatOptions::default() });
        let undecoded = (raw.read)(&StubResponse::ok(body)).unwrap();
        assert!(matches!(undecoded, Value::List(_)));
    }

    #[test]
    fn raw_reader_returns_body_unchanged() {
        let v = (raw_response_format().read)(&StubResponse::ok("<p>hi</p>")).unwrap();
        assert_eq!(v, Value::from("<p>hi</p>"));
    }

    #[test]
    fn text_formats_reject_binary_bodies() {
        let response = StubResponse::ok("").with_body(ResponseBody::Binary(bytes::Bytes::from_static(&[0xff])));
        assert!(matches!((edn_response_format().read)(&response), Err(FormatError::NotText)));
    }

    #[test]
    fn response_specs_resolve() {
        let defaults = negotiate::default_formats();
        let custom = resolve_response_format(Some(&ResponseFormatSpec::custom(|_| Ok(Value::Nil))), &opts(), &defaults).unwrap();
        assert_eq!(custom.description, "custom");
        assert_eq!(custom.content_type, "*/*");

        let sniffed = resolve_response_format(
            Some(&ResponseFormatSpec::sniff("text/csv", ResponseFormatSpec::tag("raw"))),
            &opts(),
            &defaults,
        )
        .unwrap();
        assert_eq!(sniffed.content_type, "text/csv");

        let err = resolve_response_format(Some(&ResponseFormatSpec::tag("yaml")), &opts(), &defaults).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedResponseFormat(name) if name == "yaml"));
    }

    #[test]
    fn omitted_response_format_detects_over_defaults() {
        let defaults = negotiate::default_formats();
        let detected = resolve_response_format(None, &opts(), &defaults).unwrap();
        assert_eq!(
            detected.content_type,
            "application/json, application/edn, application/transit+json, text/plain, text/html, */*"
        );
        let tagged = resolve_response_format(Some(&ResponseFormatSpec::tag("detect")), &opts(), &defaults).unwrap();
        assert_eq!(tagged.content_type, detected.content_type);
    }

    #[test]
    fn substituted_defaults_drive_detection() {
        let defaults = vec![ResponseFormatSpec::tag("edn")];
        let detected = resolve_response_format(None, &opts(), &defaults).unwrap();
        assert_eq!(detected.content_type, "application/edn");
    }

    #[test]
    fn list_of_formats_detects_over_the_list() {
        let spec = ResponseFormatSpec::List(vec![ResponseFormatSpec::tag("json"), ResponseFormatSpec::tag("raw")]);
        let format = resolve_response_format(Some(&spec), &opts(), &[]).unwrap();
        assert_eq!(format.content_type, "application/json, */*");
        assert_eq!(format.description, "(from application/json, */*)");
    }

    #[test]
    fn detect_inside_a_candidate_list_is_rejected() {
        let spec = ResponseFormatSpec::List(vec![ResponseFormatSpec::tag("detect")]);
        assert!(resolve_response_format(Some(&spec), &opts(), &negotiate::default_formats()).is_err());
    }

    fn written_then_read(request: &RequestFormat, response: &ResponseFormat, v: &Value) -> Value {
        let body = write_text(request, v);
        (response.read)(&StubResponse::ok(&body)).unwrap()
    }

    #[test]
    fn request_writers_round_trip_through_response_readers() {
        let keywords = FormatOptions {
            keywords: true,
            ..FormatOptions::default()
        };
        // JSON carries no keywords or sets, so only keys come back as keywords.
        let json_value = Value::map([
            (Value::keyword("id"), Value::Int(7)),
            (Value::keyword("name"), Value::from("widget")),
            (Value::keyword("ok"), Value::Bool(true)),
            (Value::keyword("none"), Value::Nil),
            (Value::keyword("ratio"), Value::Float(0.25)),
            (
                Value::keyword("items"),
                Value::list([
                    Value::map([(Value::keyword("n"), Value::Int(1))]),
                    Value::list([Value::from("a"), Value::from("b")]),
                ]),
            ),
            (Value::keyword("nested"), Value::map([(Value::keyword("deep"), Value::list([1, 2]))])),
        ]);
        let rich_value = Value::map([
            (Value::keyword("id"), Value::Int(7)),
            (Value::keyword("kind"), Value::keyword("user/admin")),
            (Value::keyword("tags"), Value::Set(vec![Value::keyword("a"), Value::keyword("b")])),
            (
                Value::keyword("items"),
                Value::list([
                    Value::map([(Value::keyword("n"), Value::Int(1)), (Value::from("s"), Value::Nil)]),
                    Value::list([Value::Bool(false), Value::from("text")]),
                ]),
            ),
            (Value::keyword("nested"), Value::map([(Value::keyword("deep"), Value::list([1, 2]))])),
        ]);

        let cases = [
            ("JSON", json_request_format(), json_response_format(&keywords), &json_value),
            ("EDN", edn_request_format(), edn_response_format(), &rich_value),
            ("Transit", transit_request_format(&opts()), transit_response_format(&opts()), &rich_value),
        ];
        for (name, request, response, value) in cases {
            assert_eq!(&written_then_read(&request, &response, value), value, "{name}");
        }
    }

    #[test]
    fn deeply_nested_edn_body_is_a_decode_error() {
        let body = "[".repeat(100_000);
        let err = (edn_response_format().read)(&StubResponse::ok(&body)).unwrap_err();
        assert!(matches!(err, FormatError::Edn { .. }), "{err}");
    }
}
