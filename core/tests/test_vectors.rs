//! Verify request building, negotiation and response interpretation against
//! JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs and expected outputs. Params and
//! decoded values are written as JSON and converted with
//! `Value::from_json`, so map keys stay strings throughout.

use ajax_core::format::resolve_response_format;
use ajax_core::negotiate::{accept_header, default_formats, pick_by_content_type, FormatEntry};
use ajax_core::{
    build_request, interpret_response, AjaxResponse, Body, Error, FormatOptions, HttpMethod, Params, Request,
    RequestFormatSpec, ResponseBody, ResponseFormat, ResponseFormatSpec, Value,
};

fn resolve(spec: Option<&str>) -> ResponseFormat {
    let spec = spec.map(ResponseFormatSpec::tag);
    resolve_response_format(spec.as_ref(), &FormatOptions::default(), &default_formats()).unwrap()
}

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        other => HttpMethod::from(other),
    }
}

fn headers(json: &serde_json::Value) -> Vec<(String, String)> {
    json.as_array()
        .map(|headers| {
            headers
                .iter()
                .map(|h| {
                    let arr = h.as_array().unwrap();
                    (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
                })
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Request building
// ---------------------------------------------------------------------------

#[test]
fn request_building_vectors() {
    let raw = include_str!("../../test-vectors/request_building.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();

        let mut request = Request::new(parse_method(case["method"].as_str().unwrap()), case["uri"].as_str().unwrap());
        request.headers = headers(&case["headers"]);
        if let Some(params) = case.get("params") {
            request.params = Some(Params::Value(Value::from_json(params, false)));
        }
        if let Some(format) = case["format"].as_str() {
            request.format = Some(RequestFormatSpec::tag(format));
        }
        let response_format = resolve(case["response_format"].as_str());

        let result = build_request(&request, &response_format);

        if let Some(expected_error) = case.get("expected_error") {
            let err = result.unwrap_err();
            assert!(matches!(err, Error::UnrecognizedRequestFormat(_)), "{name}: error kind");
            assert_eq!(err.to_string(), expected_error.as_str().unwrap(), "{name}: error");
            continue;
        }

        let built = result.unwrap();
        let expected = &case["expected_request"];
        assert_eq!(built.method, expected["method"].as_str().unwrap(), "{name}: method");
        assert_eq!(built.uri, expected["uri"].as_str().unwrap(), "{name}: uri");
        assert_eq!(built.headers, headers(&expected["headers"]), "{name}: headers");
        let expected_body = expected["body"].as_str().map(|s| Body::Text(s.to_string()));
        assert_eq!(built.body, expected_body, "{name}: body");
    }
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

fn candidate(json: &serde_json::Value) -> FormatEntry {
    match json {
        serde_json::Value::String(tag) => FormatEntry::new(resolve(Some(tag))),
        serde_json::Value::Array(pair) => {
            let content_type = pair[0].as_str().unwrap();
            FormatEntry::sniff(content_type, resolve(pair[1].as_str()))
        }
        other => panic!("bad candidate: {other}"),
    }
}

#[test]
fn negotiation_vectors() {
    let raw = include_str!("../../test-vectors/negotiation.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for set in vectors["candidate_sets"].as_array().unwrap() {
        let name = set["name"].as_str().unwrap();
        let candidates: Vec<FormatEntry> = set["candidates"].as_array().unwrap().iter().map(candidate).collect();

        assert_eq!(accept_header(&candidates), set["accept"].as_str().unwrap(), "{name}: accept");

        for pick in set["picks"].as_array().unwrap() {
            let content_type = pick["content_type"].as_str().unwrap();
            let picked = pick_by_content_type(content_type, &candidates)
                .ok()
                .map(|format| format.description.as_str());
            assert_eq!(picked, pick["description"].as_str(), "{name}: '{content_type}'");
        }
    }
}

// ---------------------------------------------------------------------------
// Interpretation
// ---------------------------------------------------------------------------

struct Completed {
    status: i32,
    status_text: String,
    body: String,
    aborted: bool,
}

impl AjaxResponse for Completed {
    fn status(&self) -> Result<i32, Error> {
        Ok(self.status)
    }

    fn status_text(&self) -> String {
        self.status_text.clone()
    }

    fn body(&self) -> ResponseBody {
        ResponseBody::Text(self.body.clone())
    }

    fn response_header(&self, _name: &str) -> Option<String> {
        None
    }

    fn was_aborted(&self) -> bool {
        self.aborted
    }
}

#[test]
fn interpretation_vectors() {
    let raw = include_str!("../../test-vectors/interpretation.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let response = Completed {
            status: case["status"].as_i64().unwrap() as i32,
            status_text: case["status_text"].as_str().unwrap().to_string(),
            body: case["body"].as_str().unwrap().to_string(),
            aborted: case["aborted"].as_bool().unwrap_or(false),
        };
        let format = resolve(case["response_format"].as_str());
        let outcome = interpret_response(&format, &response);
        let expected = &case["expected"];

        if let Some(value) = expected.get("ok") {
            assert_eq!(outcome, Ok(Value::from_json(value, false)), "{name}");
            continue;
        }

        let failure = outcome.unwrap_err();
        assert_eq!(failure.failure.as_str(), expected["failure"].as_str().unwrap(), "{name}: failure");
        assert_eq!(i64::from(failure.status), expected["status"].as_i64().unwrap(), "{name}: status");
        if let Some(text) = expected["status_text"].as_str() {
            assert_eq!(failure.status_text, text, "{name}: status_text");
        }
        if let Some(original) = expected["original_text"].as_str() {
            assert_eq!(failure.original_text.as_deref(), Some(original), "{name}: original_text");
        }
        if let Some(body) = expected.get("response") {
            assert_eq!(failure.response, Some(Value::from_json(body, false)), "{name}: response");
        }
    }
}
