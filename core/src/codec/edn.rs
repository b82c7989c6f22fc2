//! EDN text reader and writer.
//!
//! Supports nil, booleans, integers (with optional `N` suffix), floats
//! (with optional `M` suffix, `##NaN`, `##Inf`, `##-Inf`), strings,
//! characters, keywords, symbols, lists, vectors, sets, maps, tagged
//! elements and the `#_` discard marker. Lists and vectors both read as
//! `Value::List`; lists are written back as vectors.

use crate::error::FormatError;
use crate::value::Value;

/// Render `value` as EDN text.
pub fn write(value: &Value) -> String {
    let mut out = String::new();
    write_into(&mut out, value);
    out
}

fn write_into(out: &mut String, value: &Value) {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(f) => write_float(out, *f),
        Value::Str(s) => write_string(out, s),
        Value::Keyword(k) => {
            out.push(':');
            out.push_str(k);
        }
        Value::Symbol(s) => out.push_str(s),
        Value::Bytes(b) => {
            out.push('[');
            for (i, byte) in b.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                out.push_str(&byte.to_string());
            }
            out.push(']');
        }
        Value::List(items) => write_seq(out, "[", "]", items),
        Value::Set(items) => write_seq(out, "#{", "}", items),
        Value::Map(pairs) => {
            out.push('{');
            for (i, (k, v)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_into(out, k);
                out.push(' ');
                write_into(out, v);
            }
            out.push('}');
        }
        Value::Tagged(tag, inner) => {
            out.push('#');
            out.push_str(tag);
            out.push(' ');
            write_into(out, inner);
        }
    }
}

fn write_seq(out: &mut String, open: &str, close: &str, items: &[Value]) {
    out.push_str(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write_into(out, item);
    }
    out.push_str(close);
}

fn write_float(out: &mut String, f: f64) {
    if f.is_nan() {
        out.push_str("##NaN");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "##Inf" } else { "##-Inf" });
    } else {
        // Debug keeps a fractional part ("1.0") so the value reads back as a float.
        out.push_str(&format!("{f:?}"));
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Deepest nesting of collections, tags and discards the reader accepts.
const MAX_DEPTH: usize = 128;

/// Parse a single EDN form from `text`. Trailing non-whitespace is an error.
pub fn read(text: &str) -> Result<Value, FormatError> {
    let mut reader = Reader {
        src: text,
        pos: 0,
        depth: 0,
    };
    let value = reader.read_form()?.ok_or_else(|| reader.error("unexpected end of input"))?;
    reader.skip_ws();
    if reader.pos < text.len() {
        return Err(reader.error("unexpected trailing input"));
    }
    Ok(value)
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';')
}

impl<'a> Reader<'a> {
    fn error(&self, message: &str) -> FormatError {
        FormatError::Edn {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn token(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            self.bump();
        }
        &self.src[start..self.pos]
    }

    /// Read the next form; `None` at end of input or when only a discarded
    /// form precedes a closing delimiter.
    fn read_form(&mut self) -> Result<Option<Value>, FormatError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let form = self.read_nested_form();
        self.depth -= 1;
        form
    }

    fn read_nested_form(&mut self) -> Result<Option<Value>, FormatError> {
        loop {
            self.skip_ws();
            let Some(c) = self.peek() else {
                return Ok(None);
            };
            let value = match c {
                '(' => {
                    self.bump();
                    Value::List(self.read_seq(')')?)
                }
                '[' => {
                    self.bump();
                    Value::List(self.read_seq(']')?)
                }
                '{' => {
                    self.bump();
                    self.read_map()?
                }
                ')' | ']' | '}' => return Err(self.error("unmatched delimiter")),
                '"' => {
                    self.bump();
                    Value::Str(self.read_string()?)
                }
                '\\' => {
                    self.bump();
                    self.read_char()?
                }
                ':' => {
                    self.bump();
                    let name = self.token();
                    if name.is_empty() {
                        return Err(self.error("empty keyword"));
                    }
                    Value::Keyword(name.to_string())
                }
                '#' => {
                    self.bump();
                    match self.read_dispatch()? {
                        Some(v) => v,
                        None => {
                            self.skip_ws();
                            if matches!(self.peek(), None | Some(')' | ']' | '}')) {
                                return Ok(None);
                            }
                            continue;
                        }
                    }
                }
                _ => self.read_atom()?,
            };
            return Ok(Some(value));
        }
    }

    /// Handle the form after `#`. Returns `None` for a discarded form.
    fn read_dispatch(&mut self) -> Result<Option<Value>, FormatError> {
        match self.peek() {
            Some('{') => {
                self.bump();
                Ok(Some(Value::Set(self.read_seq('}')?)))
            }
            Some('_') => {
                self.bump();
                self.read_form()?.ok_or_else(|| self.error("nothing to discard"))?;
                Ok(None)
            }
            Some('#') => {
                self.bump();
                match self.token() {
                    "NaN" => Ok(Some(Value::Float(f64::NAN))),
                    "Inf" => Ok(Some(Value::Float(f64::INFINITY))),
                    "-Inf" => Ok(Some(Value::Float(f64::NEG_INFINITY))),
                    _ => Err(self.error("unknown symbolic value")),
                }
            }
            Some(c) if c.is_alphabetic() => {
                let tag = self.token().to_string();
                let inner = self.read_form()?.ok_or_else(|| self.error("tag without value"))?;
                Ok(Some(Value::Tagged(tag, Box::new(inner))))
            }
            _ => Err(self.error("invalid dispatch character")),
        }
    }

    fn read_seq(&mut self, close: char) -> Result<Vec<Value>, FormatError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.error("unterminated collection")),
                Some(c) if c == close => {
                    self.bump();
                    return Ok(items);
                }
                Some(_) => {
                    if let Some(v) = self.read_form()? {
                        items.push(v);
                    }
                }
            }
        }
    }

    fn read_map(&mut self) -> Result<Value, FormatError> {
        let items = self.read_seq('}')?;
        if items.len() % 2 != 0 {
            return Err(self.error("map literal needs an even number of forms"));
        }
        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            pairs.push((k, v));
        }
        Ok(Value::Map(pairs))
    }

    fn read_string(&mut self) -> Result<String, FormatError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('u') => out.push(self.read_unicode()?),
                    _ => return Err(self.error("invalid string escape")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn read_unicode(&mut self) -> Result<char, FormatError> {
        let end = self.pos + 4;
        let hex = self.src.get(self.pos..end).ok_or_else(|| self.error("truncated unicode escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid unicode escape"))?;
        self.pos = end;
        char::from_u32(code).ok_or_else(|| self.error("invalid unicode scalar"))
    }

    fn read_char(&mut self) -> Result<Value, FormatError> {
        let first = self.bump().ok_or_else(|| self.error("incomplete character literal"))?;
        let rest = self.token();
        let c = if rest.is_empty() {
            first
        } else {
            match (first, rest) {
                ('n', "ewline") => '\n',
                ('s', "pace") => ' ',
                ('t', "ab") => '\t',
                ('r', "eturn") => '\r',
                ('u', hex) if hex.len() == 4 => u32::from_str_radix(hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error("invalid unicode character"))?,
                _ => return Err(self.error("unknown character literal")),
            }
        };
        Ok(Value::Str(c.to_string()))
    }

    fn read_atom(&mut self) -> Result<Value, FormatError> {
        let start = self.pos;
        let token = self.token();
        if token.is_empty() {
            self.pos = start;
            return Err(self.error("unexpected character"));
        }
        let bytes = token.as_bytes();
        let numeric = bytes[0].is_ascii_digit()
            || (bytes.len() > 1 && matches!(bytes[0], b'+' | b'-') && bytes[1].is_ascii_digit());
        if numeric {
            return self.parse_number(token);
        }
        Ok(match token {
            "nil" => Value::Nil,
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            sym => Value::Symbol(sym.to_string()),
        })
    }

    fn parse_number(&self, token: &str) -> Result<Value, FormatError> {
        if let Some(int) = token.strip_suffix('N') {
            return int.parse().map(Value::Int).map_err(|_| self.error("integer out of range"));
        }
        if let Some(dec) = token.strip_suffix('M') {
            return dec.parse().map(Value::Float).map_err(|_| self.error("invalid decimal"));
        }
        if let Ok(n) = token.parse::<i64>() {
            return Ok(Value::Int(n));
        }
        token
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| self.error("invalid number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_nested_structures() {
        let v = Value::map([
            (Value::keyword("id"), Value::Int(7)),
            (Value::keyword("tags"), Value::list([Value::keyword("a"), Value::from("b\"c")])),
        ]);
        assert_eq!(write(&v), r#"{:id 7, :tags [:a "b\"c"]}"#);
    }

    #[test]
    fn reads_scalars() {
        assert_eq!(read("nil").unwrap(), Value::Nil);
        assert_eq!(read(" true ").unwrap(), Value::Bool(true));
        assert_eq!(read("-42").unwrap(), Value::Int(-42));
        assert_eq!(read("42N").unwrap(), Value::Int(42));
        assert_eq!(read("1.5M").unwrap(), Value::Float(1.5));
        assert_eq!(read("2.5e3").unwrap(), Value::Float(2500.0));
        assert_eq!(read(":user/name").unwrap(), Value::keyword("user/name"));
        assert_eq!(read("foo.bar/baz").unwrap(), Value::symbol("foo.bar/baz"));
        assert_eq!(read(r#""a\nbA""#).unwrap(), Value::from("a\nbA"));
        assert_eq!(read(r"\newline").unwrap(), Value::from("\n"));
        assert_eq!(read(r"\x").unwrap(), Value::from("x"));
    }

    #[test]
    fn reads_collections_comments_and_discards() {
        let text = "{:a [1 2 #_3], ; trailing comment\n :b #{:x} :c (nil)}";
        assert_eq!(
            read(text).unwrap(),
            Value::map([
                (Value::keyword("a"), Value::list([1, 2])),
                (Value::keyword("b"), Value::Set(vec![Value::keyword("x")])),
                (Value::keyword("c"), Value::List(vec![Value::Nil])),
            ])
        );
    }

    #[test]
    fn reads_tagged_elements() {
        assert_eq!(
            read(r#"#inst "2020-01-01T00:00:00Z""#).unwrap(),
            Value::Tagged("inst".into(), Box::new(Value::from("2020-01-01T00:00:00Z")))
        );
    }

    #[test]
    fn symbolic_floats_round_trip() {
        assert!(matches!(read("##NaN").unwrap(), Value::Float(f) if f.is_nan()));
        assert_eq!(write(&Value::Float(f64::NEG_INFINITY)), "##-Inf");
        assert_eq!(read(&write(&Value::Float(3.0))).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(read(""), Err(FormatError::Edn { .. })));
        assert!(read("[1 2").is_err());
        assert!(read("{:a}").is_err());
        assert!(read("1 2").is_err());
        assert!(read("]").is_err());
        assert!(read("\"open").is_err());
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        for text in ["[".repeat(100_000), "#{".repeat(100_000), "#t ".repeat(100_000), "#_".repeat(100_000)] {
            let err = read(&text).unwrap_err();
            assert!(
                matches!(&err, FormatError::Edn { message, .. } if message == "nesting too deep"),
                "{err}"
            );
        }

        let nested = format!("{}1{}", "[".repeat(MAX_DEPTH - 1), "]".repeat(MAX_DEPTH - 1));
        assert!(read(&nested).is_ok());
        let too_deep = format!("{}1{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(read(&too_deep).is_err());
    }

    #[test]
    fn round_trips_representative_values() {
        let v = Value::map([
            (Value::keyword("n"), Value::Int(1)),
            (Value::keyword("pi"), Value::Float(3.25)),
            (Value::from("s"), Value::from("text")),
            (Value::keyword("xs"), Value::list([Value::keyword("k"), Value::Nil, Value::Bool(false)])),
            (Value::keyword("m"), Value::map([(Value::keyword("deep"), Value::list([1, 2]))])),
        ]);
        assert_eq!(read(&write(&v)).unwrap(), v);
    }
}
