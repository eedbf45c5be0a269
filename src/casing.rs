use serde_json::{Map, Value};

/// `snake_case` token to `camelCase`.
pub fn camelize(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut upper_next = false;
    for c in token.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `camelCase` token to `snake_case`. A digit opens a new segment, so
/// `testEvent2` becomes `test_event_2`. Idempotent on already-snake
/// input.
pub fn decamelize(token: &str) -> String {
    let mut out = String::with_capacity(token.len() + 4);
    let mut prev: Option<char> = None;
    for c in token.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else if c.is_ascii_digit()
            && prev.is_some_and(|p| !p.is_ascii_digit() && p != '_')
        {
            out.push('_');
            out.push(c);
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

/// Recursively camelize every mapping key. Arrays are transformed
/// element-wise in order; non-mapping leaves pass through untouched.
///
/// Round-trips with [`decamelize_keys`] for snake_case-expressible keys;
/// keys with ambiguous casing (consecutive capitals, leading underscores)
/// are not supported.
pub fn camelize_keys(value: Value) -> Value {
    transform_keys(value, &camelize)
}

/// Recursively decamelize every mapping key. Inverse of [`camelize_keys`].
pub fn decamelize_keys(value: Value) -> Value {
    transform_keys(value, &decamelize)
}

fn transform_keys(value: Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(f(&k), transform_keys(v, f));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| transform_keys(item, f))
                .collect(),
        ),
        other => other,
    }
}
