//! Lenient pin syntax.
//!
//! A pin is the fixed set of fields a route stamps onto every message it
//! dispatches, usually written the way action patterns are written:
//!
//! ```text
//! role:user,cmd:load
//! {role: user, cmd: load, limit: 10}
//! { role: 'user', tags: [a, b], opts: { deep: true } }
//! ```
//!
//! The outer braces are optional. Keys and string values may be left
//! unquoted; an unquoted value runs to the next `,`, `}`, `]` or newline and
//! is trimmed, then read as `true`/`false`/`null`, a number, or text.

use serde_json::{Map, Number, Value};

/// How deep objects and arrays may nest.
const MAX_DEPTH: usize = 128;

/// A malformed pin.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    offset: usize,
    message: &'static str,
}

impl ParseError {
    /// Byte offset into the source where parsing stopped.
    pub fn offset(&self) -> usize { self.offset }
}

/// Parses `input` into a field mapping.
pub fn parse(input: &str) -> Result<Map<String, Value>, ParseError> {
    let mut parser = Parser { src: input, bytes: input.as_bytes(), pos: 0, depth: 0 };

    parser.skip_space();
    let map = if parser.peek() == Some(b'{') {
        parser.pos += 1;
        parser.members(Some(b'}'))?
    } else {
        parser.members(None)?
    };

    parser.skip_space();
    if parser.pos < parser.bytes.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(map)
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, message: &'static str) -> ParseError {
        ParseError { offset: self.pos, message }
    }

    fn skip_space(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n' | b',')) {
            self.pos += 1;
        }
    }

    /// Key/value pairs up to `close`, or to end of input for the implicit
    /// top-level object.
    fn members(&mut self, close: Option<u8>) -> Result<Map<String, Value>, ParseError> {
        let mut map = Map::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None if close.is_none() => return Ok(map),
                None => return Err(self.error("unterminated object")),
                Some(c) if Some(c) == close => {
                    self.pos += 1;
                    return Ok(map);
                }
                Some(_) => {}
            }

            let key = self.key()?;
            self.skip_space();
            if self.peek() != Some(b':') {
                return Err(self.error("expected `:` after key"));
            }
            self.pos += 1;

            let value = self.value()?;
            map.insert(key, value);
        }
    }

    fn elements(&mut self) -> Result<Vec<Value>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None => return Err(self.error("unterminated array")),
                Some(b']') => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(_) => items.push(self.value()?),
            }
        }
    }

    fn key(&mut self) -> Result<String, ParseError> {
        if let Some(quote @ (b'"' | b'\'')) = self.peek() {
            return self.quoted(quote);
        }

        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, b':' | b',' | b'{' | b'}' | b'[' | b']' | b'\n') {
                break;
            }
            self.pos += 1;
        }
        let key = self.src[start..self.pos].trim();
        if key.is_empty() {
            return Err(ParseError { offset: start, message: "expected key" });
        }
        Ok(key.to_owned())
    }

    fn value(&mut self) -> Result<Value, ParseError> {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
        match self.peek() {
            Some(open @ (b'{' | b'[')) => {
                if self.depth == MAX_DEPTH {
                    return Err(self.error("nesting too deep"));
                }
                self.depth += 1;
                self.pos += 1;
                let nested = if open == b'{' {
                    self.members(Some(b'}')).map(Value::Object)
                } else {
                    self.elements().map(Value::Array)
                };
                self.depth -= 1;
                nested
            }
            Some(quote @ (b'"' | b'\'')) => Ok(Value::String(self.quoted(quote)?)),
            _ => Ok(self.bare()),
        }
    }

    fn bare(&mut self) -> Value {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, b',' | b'}' | b']' | b'\n') {
                break;
            }
            self.pos += 1;
        }
        literal(self.src[start..self.pos].trim())
    }

    fn quoted(&mut self, quote: u8) -> Result<String, ParseError> {
        let open = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(ParseError { offset: open, message: "unterminated string" });
            };
            if c == quote {
                self.pos += 1;
                return Ok(out);
            }
            if c == b'\\' {
                self.pos += 1;
                out.push(self.escape()?);
                continue;
            }
            // Delimiters are all ASCII, so `pos` is always on a char boundary.
            let ch = self.src[self.pos..].chars().next().unwrap_or_default();
            out.push(ch);
            self.pos += ch.len_utf8();
        }
    }

    fn escape(&mut self) -> Result<char, ParseError> {
        let Some(c) = self.peek() else {
            return Err(self.error("unterminated escape"));
        };
        self.pos += 1;
        let ch = match c {
            b'n' => '\n',
            b't' => '\t',
            b'r' => '\r',
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'u' => self.unicode()?,
            b'"' | b'\'' | b'\\' | b'/' => c as char,
            _ => return Err(self.error("invalid escape")),
        };
        Ok(ch)
    }

    /// The rest of a `\uXXXX` escape, joining a UTF-16 surrogate pair.
    fn unicode(&mut self) -> Result<char, ParseError> {
        let start = self.pos;
        let high = self.hex4()?;
        let code = match high {
            0xD800..=0xDBFF => {
                if !self.src[self.pos..].starts_with("\\u") {
                    return Err(ParseError { offset: start, message: "unpaired surrogate" });
                }
                self.pos += 2;
                let low = self.hex4()?;
                if !(0xDC00..=0xDFFF).contains(&low) {
                    return Err(ParseError { offset: start, message: "unpaired surrogate" });
                }
                0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
            }
            0xDC00..=0xDFFF => {
                return Err(ParseError { offset: start, message: "unpaired surrogate" });
            }
            code => code,
        };
        char::from_u32(code).ok_or(ParseError { offset: start, message: "invalid unicode escape" })
    }

    fn hex4(&mut self) -> Result<u32, ParseError> {
        let code = self.src.get(self.pos..self.pos + 4)
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .ok_or_else(|| self.error("invalid unicode escape"))?;
        self.pos += 4;
        Ok(code)
    }
}

fn literal(text: &str) -> Value {
    match text {
        "" | "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    let numeric = text.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    if numeric {
        if let Ok(n) = text.parse::<i64>() {
            return Value::Number(n.into());
        }
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_owned())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parsed(input: &str) -> Value {
        Value::Object(parse(input).unwrap())
    }

    #[test]
    fn braces_are_optional() {
        let expected = json!({"role": "user", "cmd": "load"});
        assert_eq!(parsed("{role: user, cmd: load}"), expected);
        assert_eq!(parsed("role:user,cmd:load"), expected);
        assert_eq!(parsed("  role: user\n  cmd: load\n"), expected);
    }

    #[test]
    fn bare_values_are_typed() {
        assert_eq!(
            parsed("a:1, b:-2.5, c:true, d:false, e:null, f:, g:hello world, h:1.2.3"),
            json!({
                "a": 1, "b": -2.5, "c": true, "d": false, "e": null, "f": null,
                "g": "hello world", "h": "1.2.3",
            }),
        );
    }

    #[test]
    fn words_that_look_like_floats_stay_text() {
        assert_eq!(parsed("a:inf, b:NaN"), json!({"a": "inf", "b": "NaN"}));
    }

    #[test]
    fn quoted_strings_and_escapes() {
        assert_eq!(
            parsed(r#"'the key': "a, b", s:'it\'s', u:"é\n""#),
            json!({"the key": "a, b", "s": "it's", "u": "é\n"}),
        );
    }

    #[test]
    fn surrogate_pairs_are_joined() {
        assert_eq!(parsed(r#"e:"\ud83d\ude00", b:'\u00e9'"#), json!({"e": "\u{1F600}", "b": "é"}));
    }

    #[test]
    fn lone_surrogates_are_rejected() {
        let err = parse(r#"e:"\ud83d""#).unwrap_err();
        assert_eq!(err.to_string(), "unpaired surrogate at offset 5");
        assert!(parse(r#"e:"\ud83dx""#).is_err());
        assert!(parse(r#"e:"\ud83d\u0041""#).is_err());
        assert!(parse(r#"e:"\ude00""#).is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let nested = format!("a:{}", "[".repeat(200_000));
        assert_eq!(parse(&nested).unwrap_err().message, "nesting too deep");

        let within = format!("a:{}1{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(parse(&within).is_ok());
    }

    #[test]
    fn nested_objects_and_arrays() {
        assert_eq!(
            parsed("{role:user, opts:{deep:{x:1}}, tags:[a, 'b c', 3,],}"),
            json!({"role": "user", "opts": {"deep": {"x": 1}}, "tags": ["a", "b c", 3]}),
        );
    }

    #[test]
    fn empty_input_is_empty_mapping() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("{}").unwrap().is_empty());
    }

    #[test]
    fn unterminated_object_is_rejected() {
        let err = parse("{a:1").unwrap_err();
        assert_eq!(err.offset(), 4);
        assert_eq!(err.to_string(), "unterminated object at offset 4");
    }

    #[test]
    fn missing_colon_is_rejected() {
        assert_eq!(parse("a").unwrap_err().to_string(), "expected `:` after key at offset 1");
    }

    #[test]
    fn unterminated_string_is_rejected() {
        assert_eq!(parse("a:'x").unwrap_err().offset(), 2);
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert!(parse("{a:1} b").is_err());
        assert!(parse("a:[1").is_err());
    }
}
