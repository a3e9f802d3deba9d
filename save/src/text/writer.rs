//! Text format emission.
//!
//! Two modes share one code path: compact output is whitespace-free,
//! pretty output indents two spaces with newlines between elements. Both
//! are byte-exact under re-parse + re-emit in the same mode.

use crate::error::SaveError;
use crate::value::Value;

/// Emits `value` as text-format bytes.
pub fn to_bytes(value: &Value, pretty: bool) -> Result<Vec<u8>, SaveError> {
    let mut emitter = Emitter {
        out: String::new(),
        pretty,
        depth: 0,
    };
    emitter.value(value)?;
    Ok(emitter.out.into_bytes())
}

struct Emitter {
    out: String,
    pretty: bool,
    depth: usize,
}

impl Emitter {
    fn value(&mut self, value: &Value) -> Result<(), SaveError> {
        match value {
            Value::Null => self.out.push_str("null"),
            Value::Bool(true) => self.out.push_str("true"),
            Value::Bool(false) => self.out.push_str("false"),
            Value::I64(v) => self.out.push_str(&v.to_string()),
            Value::U64(v) => self.out.push_str(&v.to_string()),
            Value::F32(v) => self.float(f64::from(*v), &v.to_string())?,
            Value::F64(v) => self.float(*v, &v.to_string())?,
            Value::String(s) => self.string(s),
            Value::List(items) => self.list(items)?,
            Value::Map(entries) => self.map(entries)?,
        }
        Ok(())
    }

    fn float(&mut self, value: f64, formatted: &str) -> Result<(), SaveError> {
        if !value.is_finite() {
            return Err(SaveError::InvalidSaveFormat(format!(
                "float {value} has no text representation"
            )));
        }
        // `Display` is the shortest decimal that round-trips and never
        // uses exponent notation, so the output is always a valid number
        // token.
        self.out.push_str(formatted);
        Ok(())
    }

    fn string(&mut self, s: &str) {
        self.out.push('"');
        for c in s.chars() {
            match c {
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                '\u{08}' => self.out.push_str("\\b"),
                '\u{0C}' => self.out.push_str("\\f"),
                '\n' => self.out.push_str("\\n"),
                '\r' => self.out.push_str("\\r"),
                '\t' => self.out.push_str("\\t"),
                c if (c as u32) < 0x20 => {
                    self.out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => self.out.push(c),
            }
        }
        self.out.push('"');
    }

    fn list(&mut self, items: &[Value]) -> Result<(), SaveError> {
        if items.is_empty() {
            self.out.push_str("[]");
            return Ok(());
        }
        self.out.push('[');
        self.depth += 1;
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.out.push(',');
            }
            self.newline_indent();
            self.value(item)?;
        }
        self.depth -= 1;
        self.newline_indent();
        self.out.push(']');
        Ok(())
    }

    fn map(&mut self, entries: &[(String, Value)]) -> Result<(), SaveError> {
        if entries.is_empty() {
            self.out.push_str("{}");
            return Ok(());
        }
        self.out.push('{');
        self.depth += 1;
        for (i, (key, value)) in entries.iter().enumerate() {
            if i > 0 {
                self.out.push(',');
            }
            self.newline_indent();
            self.string(key);
            self.out.push(':');
            if self.pretty {
                self.out.push(' ');
            }
            self.value(value)?;
        }
        self.depth -= 1;
        self.newline_indent();
        self.out.push('}');
        Ok(())
    }

    fn newline_indent(&mut self) {
        if self.pretty {
            self.out.push('\n');
            for _ in 0..self.depth {
                self.out.push_str("  ");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::Map(vec![
            ("name".into(), Value::String("hero".into())),
            ("hp".into(), Value::U64(80)),
            (
                "pos".into(),
                Value::List(vec![Value::F32(1.5), Value::F32(-2.0)]),
            ),
            ("ghost".into(), Value::Null),
        ])
    }

    #[test]
    fn compact_has_no_whitespace() {
        let bytes = to_bytes(&sample(), false).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            r#"{"name":"hero","hp":80,"pos":[1.5,-2],"ghost":null}"#
        );
    }

    #[test]
    fn pretty_uses_two_space_indent() {
        let value = Value::Map(vec![(
            "pos".into(),
            Value::List(vec![Value::U64(1), Value::U64(2)]),
        )]);
        let text = String::from_utf8(to_bytes(&value, true).unwrap()).unwrap();
        assert_eq!(text, "{\n  \"pos\": [\n    1,\n    2\n  ]\n}");
    }

    #[test]
    fn empty_containers_stay_inline() {
        let value = Value::Map(vec![
            ("a".into(), Value::List(vec![])),
            ("b".into(), Value::Map(vec![])),
        ]);
        let text = String::from_utf8(to_bytes(&value, true).unwrap()).unwrap();
        assert_eq!(text, "{\n  \"a\": [],\n  \"b\": {}\n}");
    }

    #[test]
    fn strings_are_escaped() {
        let value = Value::String("a\"b\\c\nd\u{0001}".into());
        let text = String::from_utf8(to_bytes(&value, false).unwrap()).unwrap();
        assert_eq!(text, "\"a\\\"b\\\\c\\nd\\u0001\"");
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert!(to_bytes(&Value::F64(f64::NAN), false).is_err());
        assert!(to_bytes(&Value::F32(f32::INFINITY), false).is_err());
    }
}
