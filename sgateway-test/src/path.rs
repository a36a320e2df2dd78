//! A tiny JSON path DSL for assertions against nested response bodies —
//! `"groups[0].tags.len()"` rather than a chain of `.get()`/`.as_array()`.

use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathToken {
    Field(String),
    Index(usize),
    Len,
}

/// Splits a path like `"groups[0].tags.len()"` into
/// `[Field("groups"), Index(0), Field("tags"), Len]`.
pub fn tokenize_path(path: &str) -> Vec<PathToken> {
    let mut tokens = Vec::new();
    for segment in path.split('.') {
        if segment == "len()" || segment == "size()" {
            tokens.push(PathToken::Len);
            continue;
        }
        let mut rest = segment;
        match rest.find('[') {
            None => tokens.push(PathToken::Field(rest.to_string())),
            Some(bracket) => {
                let field = &rest[..bracket];
                if !field.is_empty() {
                    tokens.push(PathToken::Field(field.to_string()));
                }
                rest = &rest[bracket..];
                while let Some(close) = rest.find(']') {
                    if let Ok(idx) = rest[1..close].parse::<usize>() {
                        tokens.push(PathToken::Index(idx));
                    }
                    rest = &rest[close + 1..];
                    match rest.find('[') {
                        Some(next) => rest = &rest[next..],
                        None => break,
                    }
                }
            }
        }
    }
    tokens
}

/// Resolves a path against a JSON value, returning `Value::Null` for any
/// missing field or out-of-range index rather than panicking — a test that
/// asserts against the result still fails, just with a clearer message.
pub fn resolve_path(value: &Value, path: &str) -> Value {
    let mut current = value.clone();
    for token in tokenize_path(path) {
        current = match token {
            PathToken::Field(name) => current.get(&name).cloned().unwrap_or(Value::Null),
            PathToken::Index(idx) => current.get(idx).cloned().unwrap_or(Value::Null),
            PathToken::Len => match &current {
                Value::Array(a) => json!(a.len()),
                Value::Object(o) => json!(o.len()),
                Value::String(s) => json!(s.len()),
                _ => Value::Null,
            },
        };
        if current.is_null() {
            break;
        }
    }
    current
}
