//! Key casing conversion between the library's camelCase and local snake_case.

use serde_json::{Map, Value};

/// Naming convention for map keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Casing {
    /// `baseVolume`
    Camel,
    /// `base_volume`
    Snake,
}

impl Casing {
    pub fn convert(&self, key: &str) -> String {
        match self {
            Casing::Camel => to_camel_case(key),
            Casing::Snake => to_snake_case(key),
        }
    }

    /// The other convention
    pub fn alternate(&self) -> Self {
        match self {
            Casing::Camel => Casing::Snake,
            Casing::Snake => Casing::Camel,
        }
    }

    /// Guess the convention a key is written in.
    pub fn detect(key: &str) -> Self {
        if key.contains('_') || !key.chars().any(|c| c.is_ascii_uppercase()) {
            Casing::Snake
        } else {
            Casing::Camel
        }
    }
}

/// `baseVolume` -> `base_volume`
pub fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `base_volume` -> `baseVolume`
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' {
            // leading underscores are kept, internal ones become boundaries
            if out.is_empty() {
                out.push(c);
            } else {
                upper_next = true;
            }
            continue;
        }
        if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Rewrites keys of `value` recursively through maps and lists.
///
/// Keys listed in `opaque` keep their own name converted but their value is
/// carried through untouched (raw exchange payloads).
pub fn convert_keys(value: Value, casing: Casing, opaque: &[&str]) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                let converted = casing.convert(&key);
                let inner = if opaque.contains(&key.as_str()) {
                    inner
                } else {
                    convert_keys(inner, casing, opaque)
                };
                out.insert(converted, inner);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| convert_keys(item, casing, opaque))
                .collect(),
        ),
        scalar => scalar,
    }
}

/// Flips every key to the convention opposite to the one it is written in.
pub fn to_alternate_casing(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, inner)| {
                    let flipped = Casing::detect(&key).alternate().convert(&key);
                    (flipped, to_alternate_casing(inner))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(to_alternate_casing).collect()),
        scalar => scalar,
    }
}
