//! Query-string and form URL encoding of flat key/value maps.

use crate::error::FormatError;
use crate::value::Value;

/// Percent-encode `input` the way `encodeURIComponent` does: ASCII
/// alphanumerics and `-_.!~*'()` pass through, every other byte of the
/// UTF-8 encoding is escaped.
pub fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Nil => String::new(),
        Value::Str(s) | Value::Keyword(s) | Value::Symbol(s) => s.clone(),
        Value::Map(_) => value.to_json().to_string(),
        other => match other.to_json() {
            serde_json::Value::String(s) => s,
            json => json.to_string(),
        },
    }
}

/// Encode a map as `k1=v1&k2=v2`. A list value repeats its key once per
/// element; nested maps are sent as JSON text.
pub fn params_to_str(params: &Value) -> Result<String, FormatError> {
    let pairs = match params {
        Value::Map(pairs) => pairs,
        Value::Nil => return Ok(String::new()),
        other => return Err(FormatError::Unsupported(format!("{other} as a query string"))),
    };
    let mut parts = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        let key = encode_component(&key.key_name());
        match value {
            Value::List(items) | Value::Set(items) => {
                for item in items {
                    parts.push(format!("{key}={}", encode_component(&scalar_text(item))));
                }
            }
            other => parts.push(format!("{key}={}", encode_component(&scalar_text(other)))),
        }
    }
    Ok(parts.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reserved_characters() {
        assert_eq!(encode_component("a b&c=d/é"), "a%20b%26c%3Dd%2F%C3%A9");
        assert_eq!(encode_component("keep-_.!~*'()"), "keep-_.!~*'()");
    }

    #[test]
    fn map_keys_and_values_are_flattened_in_order() {
        let params = Value::map([
            (Value::keyword("q"), Value::from("a b")),
            (Value::from("page"), Value::Int(2)),
            (Value::from("kind"), Value::keyword("user")),
        ]);
        assert_eq!(params_to_str(&params).unwrap(), "q=a%20b&page=2&kind=user");
    }

    #[test]
    fn lists_repeat_the_key() {
        let params = Value::map([("id", Value::list([1, 2, 3]))]);
        assert_eq!(params_to_str(&params).unwrap(), "id=1&id=2&id=3");
    }

    #[test]
    fn non_map_params_are_rejected() {
        assert!(params_to_str(&Value::list([1])).is_err());
        assert_eq!(params_to_str(&Value::Nil).unwrap(), "");
    }
}
