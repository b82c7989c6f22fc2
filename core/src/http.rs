//! Plain-data HTTP types shared by the request pipeline and the transports.
//!
//! # Design
//! The request pipeline produces an `HttpRequest` value (final uri, headers,
//! optional body) without touching the network; a transport backend then
//! turns it into wire bytes. Bodies that need no further encoding are
//! modelled by `Body`, the union of directly submittable payloads.

use std::borrow::Cow;

use bytes::Bytes;
use uuid::Uuid;

use crate::value::Value;

/// HTTP method for a request.
///
/// `Custom` carries a caller-supplied string that is sent exactly as given;
/// the named variants normalize to their uppercase wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Trace,
    Custom(String),
}

impl HttpMethod {
    /// Wire form of the method.
    pub fn normalize(&self) -> &str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Custom(s) => s,
        }
    }

    pub fn is_get(&self) -> bool {
        self.normalize() == "GET"
    }
}

impl From<&str> for HttpMethod {
    fn from(s: &str) -> Self {
        HttpMethod::Custom(s.to_string())
    }
}

/// Header list in insertion order.
pub type Headers = Vec<(String, String)>;

/// Merge `overlay` on top of `base`. A header already present in `base`
/// (names compared case-insensitively) is replaced in place, new headers
/// are appended.
pub fn merge_headers(mut base: Headers, overlay: &[(String, String)]) -> Headers {
    for (name, value) in overlay {
        match base.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(slot) => *slot = (name.clone(), value.clone()),
            None => base.push((name.clone(), value.clone())),
        }
    }
    base
}

/// First header value matching `name` (case-insensitive).
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// A request body that a transport can send without further encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text(String),
    Blob { data: Bytes, content_type: Option<String> },
    Form(FormData),
    /// A view over raw bytes, sent as `application/octet-stream` by default.
    Buffer(Bytes),
}

impl Body {
    /// Produce the wire bytes and, when the payload implies one, the
    /// content type to use if the caller did not set `Content-Type`.
    pub fn encode(&self) -> (Vec<u8>, Option<String>) {
        match self {
            Body::Text(s) => (s.as_bytes().to_vec(), None),
            Body::Blob { data, content_type } => (data.to_vec(), content_type.clone()),
            Body::Buffer(data) => (data.to_vec(), None),
            Body::Form(form) => {
                let boundary = format!("ajax-{}", Uuid::new_v4().simple());
                let bytes = form.encode_multipart(&boundary);
                (bytes, Some(format!("multipart/form-data; boundary={boundary}")))
            }
        }
    }
}

/// A structured form payload, sent as `multipart/form-data`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    parts: Vec<FormPart>,
}

#[derive(Debug, Clone, PartialEq)]
struct FormPart {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text field.
    pub fn append(mut self, name: &str, value: &str) -> Self {
        self.parts.push(FormPart {
            name: name.to_string(),
            filename: None,
            content_type: None,
            data: Bytes::copy_from_slice(value.as_bytes()),
        });
        self
    }

    /// Append a file field.
    pub fn append_file(mut self, name: &str, filename: &str, content_type: &str, data: Bytes) -> Self {
        self.parts.push(FormPart {
            name: name.to_string(),
            filename: Some(filename.to_string()),
            content_type: Some(content_type.to_string()),
            data,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub(crate) fn encode_multipart(&self, boundary: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
            if let Some(filename) = &part.filename {
                disposition.push_str(&format!("; filename=\"{filename}\""));
            }
            out.extend_from_slice(disposition.as_bytes());
            out.extend_from_slice(b"\r\n");
            if let Some(ct) = &part.content_type {
                out.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&part.data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        out
    }
}

/// Request parameters: either a value that a request format encodes, or a
/// payload that is already submittable.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Value(Value),
    Body(Body),
}

impl Params {
    /// Whether the params can be sent as-is, with no request format.
    pub fn is_submittable(&self) -> bool {
        self.as_submittable().is_some()
    }

    pub(crate) fn as_submittable(&self) -> Option<Body> {
        match self {
            Params::Body(body) => Some(body.clone()),
            Params::Value(Value::Str(s)) => Some(Body::Text(s.clone())),
            Params::Value(_) => None,
        }
    }
}

impl From<Value> for Params {
    fn from(v: Value) -> Self {
        Params::Value(v)
    }
}

impl From<Body> for Params {
    fn from(b: Body) -> Self {
        Params::Body(b)
    }
}

/// A response body as received from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Text(String),
    Binary(Bytes),
}

impl ResponseBody {
    /// Text bodies stay text; other bytes are kept as binary.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => ResponseBody::Text(text),
            Err(e) => ResponseBody::Binary(Bytes::from(e.into_bytes())),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(s) => Some(s),
            ResponseBody::Binary(_) => None,
        }
    }

    /// Body text, replacing invalid UTF-8.
    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        match self {
            ResponseBody::Text(s) => Cow::Borrowed(s),
            ResponseBody::Binary(b) => String::from_utf8_lossy(b),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            ResponseBody::Text(s) => Value::Str(s),
            ResponseBody::Binary(b) => Value::Bytes(b),
        }
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::Text(String::new())
    }
}

/// A request ready for a transport: the three values the pipeline computes
/// plus the normalized method.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    pub headers: Headers,
    pub body: Option<Body>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn symbolic_methods_normalize_to_uppercase() {
        assert_eq!(HttpMethod::Get.normalize(), "GET");
        assert_eq!(HttpMethod::Trace.normalize(), "TRACE");
    }

    #[test]
    fn string_methods_pass_through_unchanged() {
        let m = HttpMethod::from("get");
        assert_eq!(m.normalize(), "get");
        assert!(!m.is_get());
        assert!(HttpMethod::from("GET").is_get());
    }

    #[test]
    fn merge_replaces_case_insensitively_and_appends() {
        let merged = merge_headers(
            vec![h("Accept", "*/*"), h("X-A", "1")],
            &[h("accept", "application/json"), h("X-B", "2")],
        );
        assert_eq!(
            merged,
            vec![h("accept", "application/json"), h("X-A", "1"), h("X-B", "2")]
        );
    }

    #[test]
    fn submittable_covers_bodies_and_strings_only() {
        assert!(Params::Body(Body::Text("a".into())).is_submittable());
        assert!(Params::Body(Body::Buffer(Bytes::from_static(b"\x00"))).is_submittable());
        assert!(Params::Body(Body::Form(FormData::new())).is_submittable());
        assert!(Params::Body(Body::Blob { data: Bytes::new(), content_type: None }).is_submittable());
        assert!(Params::Value(Value::from("raw text")).is_submittable());
        assert!(!Params::Value(Value::map([("a", 1)])).is_submittable());
        assert!(!Params::Value(Value::list([1, 2])).is_submittable());
        assert!(!Params::Value(Value::Int(3)).is_submittable());
    }

    #[test]
    fn multipart_encoding_lists_every_part() {
        let form = FormData::new()
            .append("title", "hello")
            .append_file("doc", "a.txt", "text/plain", Bytes::from_static(b"abc"));
        let (bytes, ct) = Body::Form(form).encode();
        let ct = ct.unwrap();
        let boundary = ct.strip_prefix("multipart/form-data; boundary=").unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(&format!("--{boundary}\r\n")));
        assert!(text.contains("Content-Disposition: form-data; name=\"title\"\r\n\r\nhello\r\n"));
        assert!(text.contains("name=\"doc\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nabc\r\n"));
        assert!(text.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn response_body_keeps_binary_when_not_utf8() {
        assert_eq!(ResponseBody::from_bytes(b"ok".to_vec()), ResponseBody::Text("ok".into()));
        let bin = ResponseBody::from_bytes(vec![0xff, 0xfe]);
        assert!(bin.as_text().is_none());
        assert_eq!(bin.to_text_lossy(), "\u{fffd}\u{fffd}");
    }
}
