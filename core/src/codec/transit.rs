//! Transit-over-JSON encoding.
//!
//! # Design
//! The AJAX layer treats transit as an opaque service: the transit formats
//! only see the `TransitCodec` trait, and callers may plug in their own
//! writer or reader. `TransitJson` is the built-in implementation. Its
//! writer never emits cache references (valid transit); its reader honours
//! them so payloads from caching writers decode correctly.

use serde::Deserialize;
use serde_json::Value as Json;

use crate::error::FormatError;
use crate::value::Value;

/// An opaque transit encoder/decoder.
pub trait TransitCodec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<String, FormatError>;
    fn decode(&self, text: &str) -> Result<Value, FormatError>;
}

/// Transit JSON flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitType {
    /// Maps as `["^ ", k, v, ...]` arrays.
    #[default]
    Json,
    /// Maps as JSON objects, tags as single-key objects.
    JsonVerbose,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransitJson {
    kind: TransitType,
}

impl TransitJson {
    pub fn new(kind: TransitType) -> Self {
        Self { kind }
    }
}

impl TransitCodec for TransitJson {
    fn encode(&self, value: &Value) -> Result<String, FormatError> {
        let rep = self.emit(value, false)?;
        let rep = match rep {
            Json::Array(_) | Json::Object(_) => rep,
            scalar => self.tagged("'", scalar),
        };
        Ok(rep.to_string())
    }

    fn decode(&self, text: &str) -> Result<Value, FormatError> {
        let json: Json = serde_json::from_str(text)?;
        let mut cache = ReadCache::default();
        cache.decode(&json, false)
    }
}

/// Parse transit text as plain JSON, skipping every transit rule
/// (tags, escapes, cache references stay as literal strings and arrays).
pub fn read_raw(text: &str) -> Result<Value, FormatError> {
    let json: Json = serde_json::from_str(text)?;
    Ok(Value::from_json(&json, false))
}

const MAX_SAFE_INT: u64 = 1 << 53;

impl TransitJson {
    fn tagged(&self, tag: &str, rep: Json) -> Json {
        match self.kind {
            TransitType::Json => Json::Array(vec![Json::String(format!("~#{tag}")), rep]),
            TransitType::JsonVerbose => {
                let mut obj = serde_json::Map::new();
                obj.insert(format!("~#{tag}"), rep);
                Json::Object(obj)
            }
        }
    }

    fn emit(&self, value: &Value, as_key: bool) -> Result<Json, FormatError> {
        Ok(match value {
            Value::Nil if as_key => Json::String("~_".into()),
            Value::Nil => Json::Null,
            Value::Bool(b) if as_key => Json::String(if *b { "~?t" } else { "~?f" }.into()),
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) if as_key || n.unsigned_abs() >= MAX_SAFE_INT => Json::String(format!("~i{n}")),
            Value::Int(n) => Json::from(*n),
            Value::Float(f) if f.is_nan() => Json::String("~zNaN".into()),
            Value::Float(f) if f.is_infinite() => {
                Json::String(if *f > 0.0 { "~zINF" } else { "~z-INF" }.into())
            }
            Value::Float(f) if as_key => Json::String(format!("~d{f:?}")),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .ok_or_else(|| FormatError::Unsupported(format!("float {f}")))?,
            Value::Str(s) => {
                if s.starts_with(['~', '^', '`']) {
                    Json::String(format!("~{s}"))
                } else {
                    Json::String(s.clone())
                }
            }
            Value::Keyword(k) => Json::String(format!("~:{k}")),
            Value::Symbol(s) => Json::String(format!("~${s}")),
            Value::Bytes(_) => return Err(FormatError::Unsupported("bytes in transit".into())),
            Value::List(items) => Json::Array(self.emit_all(items)?),
            Value::Set(items) => self.tagged("set", Json::Array(self.emit_all(items)?)),
            Value::Map(pairs) => self.emit_map(pairs)?,
            Value::Tagged(tag, inner) => match (tag.as_str(), inner.as_ref()) {
                ("inst", Value::Str(s)) => Json::String(format!("~t{s}")),
                ("inst", Value::Int(ms)) => Json::String(format!("~m{ms}")),
                ("uuid", Value::Str(s)) => Json::String(format!("~u{s}")),
                ("uri", Value::Str(s)) => Json::String(format!("~r{s}")),
                (tag, inner) => {
                    let rep = self.emit(inner, false)?;
                    self.tagged(tag, rep)
                }
            },
        })
    }

    fn emit_all(&self, items: &[Value]) -> Result<Vec<Json>, FormatError> {
        items.iter().map(|v| self.emit(v, false)).collect()
    }

    fn emit_map(&self, pairs: &[(Value, Value)]) -> Result<Json, FormatError> {
        let stringable = pairs.iter().all(|(k, _)| is_stringable(k));
        if !stringable {
            let mut flat = Vec::with_capacity(pairs.len() * 2);
            for (k, v) in pairs {
                flat.push(self.emit(k, false)?);
                flat.push(self.emit(v, false)?);
            }
            return Ok(self.tagged("cmap", Json::Array(flat)));
        }
        match self.kind {
            TransitType::Json => {
                let mut flat = Vec::with_capacity(pairs.len() * 2 + 1);
                flat.push(Json::String("^ ".into()));
                for (k, v) in pairs {
                    flat.push(self.emit(k, true)?);
                    flat.push(self.emit(v, false)?);
                }
                Ok(Json::Array(flat))
            }
            TransitType::JsonVerbose => {
                let mut obj = serde_json::Map::new();
                for (k, v) in pairs {
                    let key = match self.emit(k, true)? {
                        Json::String(s) => s,
                        other => other.to_string(),
                    };
                    obj.insert(key, self.emit(v, false)?);
                }
                Ok(Json::Object(obj))
            }
        }
    }
}

fn is_stringable(key: &Value) -> bool {
    match key {
        Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => true,
        Value::Keyword(_) | Value::Symbol(_) => true,
        Value::Tagged(tag, inner) => {
            matches!((tag.as_str(), inner.as_ref()), ("inst" | "uuid" | "uri", Value::Str(_)) | ("inst", Value::Int(_)))
        }
        _ => false,
    }
}

const CACHE_DIGITS: u32 = 44;
const CACHE_BASE: u32 = 48;
const CACHE_SIZE: usize = (CACHE_DIGITS * CACHE_DIGITS) as usize;

/// Read-side cache of strings, keyed by position of first occurrence.
#[derive(Default)]
struct ReadCache {
    entries: Vec<String>,
}

impl ReadCache {
    fn is_cacheable(s: &str, as_key: bool) -> bool {
        s.len() > 3 && (as_key || s.starts_with("~:") || s.starts_with("~$") || s.starts_with("~#"))
    }

    fn index(code: &str) -> Option<usize> {
        let digits: Vec<u32> = code.chars().map(|c| c as u32).collect();
        match digits.as_slice() {
            [a] if *a >= CACHE_BASE => Some((a - CACHE_BASE) as usize),
            [a, b] if *a >= CACHE_BASE && *b >= CACHE_BASE => {
                Some(((a - CACHE_BASE) * CACHE_DIGITS + (b - CACHE_BASE)) as usize)
            }
            _ => None,
        }
    }

    /// Resolve cache references and record cacheable strings.
    fn resolve(&mut self, s: &str, as_key: bool) -> Result<String, FormatError> {
        if s != "^ " {
            if let Some(code) = s.strip_prefix('^') {
                let idx = Self::index(code).ok_or_else(|| FormatError::Transit(format!("bad cache code '{s}'")))?;
                return self
                    .entries
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| FormatError::Transit(format!("cache miss for '{s}'")));
            }
        }
        if Self::is_cacheable(s, as_key) {
            if self.entries.len() == CACHE_SIZE {
                self.entries.clear();
            }
            self.entries.push(s.to_string());
        }
        Ok(s.to_string())
    }

    fn decode(&mut self, json: &Json, as_key: bool) -> Result<Value, FormatError> {
        match json {
            Json::Null => Ok(Value::Nil),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => Ok(match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Json::String(s) => {
                let s = self.resolve(s, as_key)?;
                parse_string(&s)
            }
            Json::Array(items) => self.decode_array(items),
            Json::Object(obj) => self.decode_object(obj),
        }
    }

    fn decode_array(&mut self, items: &[Json]) -> Result<Value, FormatError> {
        let Some(Json::String(first)) = items.first() else {
            return Ok(Value::List(self.decode_all(items)?));
        };
        let head = self.resolve(first, false)?;
        if head == "^ " {
            let rest = &items[1..];
            if rest.len() % 2 != 0 {
                return Err(FormatError::Transit("map array with odd number of entries".into()));
            }
            let mut pairs = Vec::with_capacity(rest.len() / 2);
            for pair in rest.chunks(2) {
                let k = self.decode(&pair[0], true)?;
                let v = self.decode(&pair[1], false)?;
                pairs.push((k, v));
            }
            return Ok(Value::Map(pairs));
        }
        if let Some(tag) = head.strip_prefix("~#") {
            if items.len() == 2 {
                let rep = self.decode(&items[1], false)?;
                return apply_tag(tag, rep);
            }
        }
        let mut out = Vec::with_capacity(items.len());
        out.push(parse_string(&head)?);
        for item in &items[1..] {
            out.push(self.decode(item, false)?);
        }
        Ok(Value::List(out))
    }

    fn decode_object(&mut self, obj: &serde_json::Map<String, Json>) -> Result<Value, FormatError> {
        if obj.len() == 1 {
            if let Some((key, rep)) = obj.iter().next() {
                let key = self.resolve(key, true)?;
                if let Some(tag) = key.strip_prefix("~#") {
                    let rep = self.decode(rep, false)?;
                    return apply_tag(tag, rep);
                }
                let k = parse_string(&key)?;
                let v = self.decode(rep, false)?;
                return Ok(Value::Map(vec![(k, v)]));
            }
        }
        let mut pairs = Vec::with_capacity(obj.len());
        for (key, rep) in obj {
            let key = self.resolve(key, true)?;
            pairs.push((parse_string(&key)?, self.decode(rep, false)?));
        }
        Ok(Value::Map(pairs))
    }

    fn decode_all(&mut self, items: &[Json]) -> Result<Vec<Value>, FormatError> {
        items.iter().map(|item| self.decode(item, false)).collect()
    }
}

fn apply_tag(tag: &str, rep: Value) -> Result<Value, FormatError> {
    Ok(match (tag, rep) {
        ("'", rep) => rep,
        ("set", Value::List(items)) => Value::Set(items),
        ("list", Value::List(items)) => Value::List(items),
        ("cmap", Value::List(items)) => {
            if items.len() % 2 != 0 {
                return Err(FormatError::Transit("cmap with odd number of entries".into()));
            }
            let mut pairs = Vec::with_capacity(items.len() / 2);
            let mut iter = items.into_iter();
            while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                pairs.push((k, v));
            }
            Value::Map(pairs)
        }
        (tag, rep) => Value::Tagged(tag.to_string(), Box::new(rep)),
    })
}

fn parse_string(s: &str) -> Result<Value, FormatError> {
    let Some(rest) = s.strip_prefix('~') else {
        return Ok(Value::Str(s.to_string()));
    };
    let mut chars = rest.chars();
    let Some(marker) = chars.next() else {
        return Ok(Value::Str(s.to_string()));
    };
    let body = chars.as_str();
    let bad = |what: &str| FormatError::Transit(format!("invalid {what} '{s}'"));
    Ok(match marker {
        '~' | '^' | '`' => Value::Str(rest.to_string()),
        // A tag outside an array head carries no value of its own.
        '#' => Value::Str(s.to_string()),
        ':' => Value::Keyword(body.to_string()),
        '$' => Value::Symbol(body.to_string()),
        '_' => Value::Nil,
        '?' => Value::Bool(body == "t"),
        'i' | 'n' => body
            .parse()
            .map(Value::Int)
            .or_else(|_| body.parse().map(Value::Float))
            .map_err(|_| bad("integer"))?,
        'd' | 'f' => body.parse().map(Value::Float).map_err(|_| bad("float"))?,
        'z' => match body {
            "NaN" => Value::Float(f64::NAN),
            "INF" => Value::Float(f64::INFINITY),
            "-INF" => Value::Float(f64::NEG_INFINITY),
            _ => return Err(bad("special number")),
        },
        't' => Value::Tagged("inst".into(), Box::new(Value::Str(body.to_string()))),
        'm' => Value::Tagged("inst".into(), Box::new(Value::Int(body.parse().map_err(|_| bad("instant"))?))),
        'u' => Value::Tagged("uuid".into(), Box::new(Value::Str(body.to_string()))),
        'r' => Value::Tagged("uri".into(), Box::new(Value::Str(body.to_string()))),
        'b' => Value::Tagged("bytes".into(), Box::new(Value::Str(body.to_string()))),
        other => Value::Tagged(other.to_string(), Box::new(Value::Str(body.to_string()))),
    })
}
