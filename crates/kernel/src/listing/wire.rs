//! Wire decoding for bracketed filter literals.
//!
//! Query parameters such as `columnFilters=[["name","car"]]` or
//! `numberRange=('price', 0, 500)` are decoded by a small recursive-descent
//! parser into `serde_json::Value`, then checked against the shape each
//! filter kind expects. Nothing here evaluates expressions.
//!
//! Grammar:
//! ```text
//! value   := list | string | number | keyword
//! list    := '[' items? ']' | '(' items? ')'
//! items   := value (',' value)* ','?
//! string  := '"' ... '"' | '\'' ... '\''
//! keyword := true | false | null | True | False | None
//! ```

use serde_json::{Number, Value};

use super::types::FieldFilter;
use crate::error::{ListError, ListOpResult};

/// Nesting depth accepted before the input is rejected.
const MAX_DEPTH: usize = 8;

/// Decoded `numberRange`: a field and optional raw bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberRangeSpec {
    pub field: String,
    pub min: Option<Value>,
    pub max: Option<Value>,
}

/// Decoded `dateRange`: a field, a start and an optional end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeSpec {
    pub field: String,
    pub start: String,
    pub end: Option<String>,
}

/// Parse a complete literal.
pub fn parse_literal(input: &str) -> Result<Value, String> {
    let mut parser = Parser {
        src: input.as_bytes(),
        text: input,
        pos: 0,
    };
    parser.skip_ws();
    let value = parser.value(0)?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(format!("unexpected trailing input at offset {}", parser.pos));
    }
    Ok(value)
}

/// Decode a list of `[field, value]` pairs.
pub fn decode_pairs(param: &'static str, input: &str) -> ListOpResult<Vec<FieldFilter>> {
    let value = parse_literal(input).map_err(|reason| ListError::malformed(param, reason))?;
    let Value::Array(items) = value else {
        return Err(ListError::malformed(param, "expected a list of [field, value] pairs"));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Array(mut pair) if pair.len() == 2 => {
                let value = pair.pop().unwrap_or(Value::Null);
                match pair.pop() {
                    Some(Value::String(field)) => Ok(FieldFilter { field, value }),
                    _ => Err(ListError::malformed(
                        param,
                        format!("pair {i}: field name must be a string"),
                    )),
                }
            }
            _ => Err(ListError::malformed(
                param,
                format!("pair {i}: expected [field, value]"),
            )),
        })
        .collect()
}

/// Decode `[field, min?, max?]`. Empty strings and nulls mean "no bound".
pub fn decode_number_range(input: &str) -> ListOpResult<NumberRangeSpec> {
    const PARAM: &str = "numberRange";
    let mut items = decode_tuple(PARAM, input, 1, 3)?.into_iter();
    let field = field_name(PARAM, items.next())?;
    let min = items.next().filter(|v| !is_blank(v));
    let max = items.next().filter(|v| !is_blank(v));
    Ok(NumberRangeSpec { field, min, max })
}

/// Decode `[field, start, end?]`.
pub fn decode_date_range(input: &str) -> ListOpResult<DateRangeSpec> {
    const PARAM: &str = "dateRange";
    let mut items = decode_tuple(PARAM, input, 2, 3)?.into_iter();
    let field = field_name(PARAM, items.next())?;
    let start = match items.next() {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        _ => return Err(ListError::malformed(PARAM, "start date must be a non-empty string")),
    };
    let end = match items.next() {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s),
        Some(_) => return Err(ListError::malformed(PARAM, "end date must be a string")),
    };
    Ok(DateRangeSpec { field, start, end })
}

fn decode_tuple(
    param: &'static str,
    input: &str,
    min_len: usize,
    max_len: usize,
) -> ListOpResult<Vec<Value>> {
    let value = parse_literal(input).map_err(|reason| ListError::malformed(param, reason))?;
    match value {
        Value::Array(items) if (min_len..=max_len).contains(&items.len()) => Ok(items),
        Value::Array(items) => Err(ListError::malformed(
            param,
            format!(
                "expected {min_len} to {max_len} elements, got {}",
                items.len()
            ),
        )),
        _ => Err(ListError::malformed(param, "expected a list")),
    }
}

fn field_name(param: &'static str, value: Option<Value>) -> ListOpResult<String> {
    match value {
        Some(Value::String(s)) => Ok(s),
        _ => Err(ListError::malformed(param, "first element must be a field name")),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

struct Parser<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, String> {
        match self.peek() {
            Some(b'[') => self.list(b']', depth),
            Some(b'(') => self.list(b')', depth),
            Some(quote @ (b'"' | b'\'')) => self.string(quote).map(Value::String),
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.keyword(),
            Some(c) => Err(format!(
                "unexpected character '{}' at offset {}",
                c as char, self.pos
            )),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn list(&mut self, close: u8, depth: usize) -> Result<Value, String> {
        if depth >= MAX_DEPTH {
            return Err(format!("nesting deeper than {MAX_DEPTH} levels"));
        }
        self.pos += 1;
        let mut items = Vec::new();

        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.value(depth + 1)?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(c) if c == close => {}
                Some(c) => {
                    return Err(format!(
                        "expected ',' or '{}' at offset {}, found '{}'",
                        close as char, self.pos, c as char
                    ));
                }
                None => return Err(format!("unclosed list, expected '{}'", close as char)),
            }
        }
    }

    fn string(&mut self, quote: u8) -> Result<String, String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut run_start = self.pos;

        loop {
            match self.peek() {
                None => return Err(format!("unterminated string starting at offset {start}")),
                Some(c) if c == quote => {
                    out.push_str(&self.text[run_start..self.pos]);
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    out.push_str(&self.text[run_start..self.pos]);
                    self.pos += 1;
                    let escaped = match self.peek() {
                        Some(b'\\') => '\\',
                        Some(b'\'') => '\'',
                        Some(b'"') => '"',
                        Some(b'n') => '\n',
                        Some(b't') => '\t',
                        Some(b'r') => '\r',
                        Some(c) => {
                            return Err(format!(
                                "unsupported escape '\\{}' at offset {}",
                                c as char, self.pos
                            ));
                        }
                        None => return Err("unterminated escape".to_string()),
                    };
                    out.push(escaped);
                    self.pos += 1;
                    run_start = self.pos;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                b'0'..=b'9' => {}
                b'.' | b'e' | b'E' => is_float = true,
                b'+' | b'-' if matches!(self.src.get(self.pos - 1), Some(b'e' | b'E')) => {}
                _ => break,
            }
            self.pos += 1;
        }

        let literal = &self.text[start..self.pos];
        let invalid = || format!("invalid number '{literal}' at offset {start}");
        if is_float {
            let parsed: f64 = literal.parse().map_err(|_| invalid())?;
            Number::from_f64(parsed).map(Value::Number).ok_or_else(invalid)
        } else {
            let parsed: i64 = literal.parse().map_err(|_| invalid())?;
            Ok(Value::Number(parsed.into()))
        }
    }

    fn keyword(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.pos += 1;
        }
        match &self.text[start..self.pos] {
            "true" | "True" => Ok(Value::Bool(true)),
            "false" | "False" => Ok(Value::Bool(false)),
            "null" | "None" => Ok(Value::Null),
            word => Err(format!("unknown identifier '{word}' at offset {start}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn double_quoted_pairs() {
        let pairs = decode_pairs("columnFilters", r#"[["name","car"],["stock", 4]]"#).unwrap();
        assert_eq!(
            pairs,
            vec![FieldFilter::new("name", "car"), FieldFilter::new("stock", 4)]
        );
    }

    #[test]
    fn single_quoted_and_tuple_pairs() {
        let pairs = decode_pairs(
            "columnFilters",
            "[('owner.role.title', 'admin'), ['is_active', True]]",
        )
        .unwrap();
        assert_eq!(pairs[0].field, "owner.role.title");
        assert_eq!(pairs[0].value, json!("admin"));
        assert_eq!(pairs[1].value, json!(true));
    }

    #[test]
    fn empty_list_decodes_to_no_pairs() {
        assert!(decode_pairs("columnFilters", " [ ] ").unwrap().is_empty());
    }

    #[test]
    fn unbalanced_brackets_are_malformed() {
        for bad in [r#"[["name","car"]"#, r#"["name","car"]]"#, "[[", "]"] {
            let err = decode_pairs("columnFilters", bad).unwrap_err();
            assert!(
                matches!(err, ListError::MalformedFilter { param: "columnFilters", .. }),
                "{bad:?}: {err}"
            );
        }
    }

    #[test]
    fn pairs_must_have_two_elements_and_a_string_field() {
        assert!(decode_pairs("columnFilters", r#"[["name"]]"#).is_err());
        assert!(decode_pairs("columnFilters", r#"[["name","a","b"]]"#).is_err());
        assert!(decode_pairs("columnFilters", r#"[[1,"a"]]"#).is_err());
        assert!(decode_pairs("columnFilters", r#"["name","car"]"#).is_err());
        assert!(decode_pairs("columnFilters", r#"{"name":"car"}"#).is_err());
    }

    #[test]
    fn expressions_are_not_evaluated() {
        assert!(parse_literal("[__import__('os')]").is_err());
        assert!(parse_literal("[1 + 1]").is_err());
    }

    #[test]
    fn numbers_and_escapes() {
        assert_eq!(
            parse_literal(r#"[-3, 2.5, 1e3, 'it\'s', "a\"b"]"#).unwrap(),
            json!([-3, 2.5, 1000.0, "it's", "a\"b"])
        );
        assert!(parse_literal("[1.2.3]").is_err());
        assert!(parse_literal("['unterminated]").is_err());
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}{}", "[".repeat(20), "]".repeat(20));
        assert!(parse_literal(&deep).is_err());
    }

    #[test]
    fn number_range_bounds() {
        let spec = decode_number_range(r#"["amount","0","100000"]"#).unwrap();
        assert_eq!(spec.field, "amount");
        assert_eq!(spec.min, Some(json!("0")));
        assert_eq!(spec.max, Some(json!("100000")));

        let only_max = decode_number_range(r#"["amount", "", 50]"#).unwrap();
        assert_eq!(only_max.min, None);
        assert_eq!(only_max.max, Some(json!(50)));

        let zero_min = decode_number_range(r#"["amount", 0]"#).unwrap();
        assert_eq!(zero_min.min, Some(json!(0)));
        assert_eq!(zero_min.max, None);
    }

    #[test]
    fn number_range_shape_errors() {
        assert!(decode_number_range("[]").is_err());
        assert!(decode_number_range(r#"[1, 2, 3]"#).is_err());
        assert!(decode_number_range(r#"["a", 1, 2, 3]"#).is_err());
        assert!(decode_number_range(r#""amount""#).is_err());
    }

    #[test]
    fn date_range_with_and_without_end() {
        let open = decode_date_range(r#"["created_at", "2025-01-01"]"#).unwrap();
        assert_eq!(open.start, "2025-01-01");
        assert_eq!(open.end, None);

        let closed =
            decode_date_range(r#"["created_at", "01-01-2025", "01-12-2025"]"#).unwrap();
        assert_eq!(closed.end.as_deref(), Some("01-12-2025"));

        let blank_end = decode_date_range(r#"["created_at", "2025-01-01", ""]"#).unwrap();
        assert_eq!(blank_end.end, None);
    }

    #[test]
    fn date_range_requires_start() {
        let err = decode_date_range(r#"["created_at"]"#).unwrap_err();
        assert!(matches!(err, ListError::MalformedFilter { param: "dateRange", .. }));
        assert!(decode_date_range(r#"["created_at", 20250101]"#).is_err());
    }
}
