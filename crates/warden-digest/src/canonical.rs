use serde_json::{Map, Value};

/// Canonicalize a JSON value.
///
/// Rules:
/// - Object keys sorted lexicographically (by UTF-8 bytes)
/// - Compact separators, no whitespace
/// - UTF-8 output; only `"`, `\` and control characters are escaped
/// - Numbers as serde_json renders them
///
/// The writer walks an explicit stack, so nesting depth is bounded by heap,
/// not by the call stack.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    canonical_string(value).into_bytes()
}

/// Canonical form of a borrowed JSON object, identical to
/// `canonical_string(&Value::Object(map.clone()))` without the clone.
pub fn canonical_object(map: &Map<String, Value>) -> String {
    let mut out = String::new();
    write_frames(vec![Frame::Object(map)], &mut out);
    out
}

enum Frame<'a> {
    Value(&'a Value),
    Object(&'a Map<String, Value>),
    Key(&'a str),
    Raw(&'static str),
}

pub fn write_canonical(value: &Value, out: &mut String) {
    write_frames(vec![Frame::Value(value)], out);
}

fn write_frames(mut stack: Vec<Frame<'_>>, out: &mut String) {
    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Raw(s) => out.push_str(s),
            Frame::Key(k) => {
                push_string(k, out);
                out.push(':');
            }
            Frame::Value(Value::Null) => out.push_str("null"),
            Frame::Value(Value::Bool(b)) => out.push_str(if *b { "true" } else { "false" }),
            Frame::Value(Value::Number(n)) => out.push_str(&n.to_string()),
            Frame::Value(Value::String(s)) => push_string(s, out),
            Frame::Value(Value::Array(items)) => {
                out.push('[');
                stack.push(Frame::Raw("]"));
                for (i, item) in items.iter().enumerate().rev() {
                    stack.push(Frame::Value(item));
                    if i > 0 {
                        stack.push(Frame::Raw(","));
                    }
                }
            }
            Frame::Value(Value::Object(obj)) => stack.push(Frame::Object(obj)),
            Frame::Object(obj) => {
                out.push('{');
                stack.push(Frame::Raw("}"));
                let mut entries: Vec<(&String, &Value)> = obj.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                for (i, (k, v)) in entries.into_iter().enumerate().rev() {
                    stack.push(Frame::Value(v));
                    stack.push(Frame::Key(k));
                    if i > 0 {
                        stack.push(Frame::Raw(","));
                    }
                }
            }
        }
    }
}

fn push_string(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\x08' => out.push_str("\\b"),
            '\x0C' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c < '\x20' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}
