//! Lenient numeric decoding: exchanges report prices as numbers or strings.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Reads a JSON number or numeric string as `f64`.
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Reads a JSON number or numeric string as `i64` (fractional parts dropped).
pub fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

fn decode<'de, D, T>(
    deserializer: D,
    convert: fn(&Value) -> Option<T>,
    what: &str,
) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => match convert(&v) {
            Some(n) => Ok(Some(n)),
            None => Err(de::Error::custom(format!("expected {}, got {}", what, v))),
        },
    }
}

/// `deserialize_with` helper for `Option<f64>` fields.
pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    decode(deserializer, value_to_f64, "a number")
}

/// `deserialize_with` helper for `Option<i64>` fields.
pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    decode(deserializer, value_to_i64, "an integer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "opt_f64")]
        price: Option<f64>,
        #[serde(default, deserialize_with = "opt_i64")]
        ts: Option<i64>,
    }

    #[test]
    fn accepts_numbers_and_numeric_strings() {
        let p: Probe = serde_json::from_value(json!({"price": "102906.15", "ts": 1700000000000i64}))
            .unwrap();
        assert_eq!(p.price, Some(102906.15));
        assert_eq!(p.ts, Some(1_700_000_000_000));

        let p: Probe = serde_json::from_value(json!({"price": 1.5, "ts": "42"})).unwrap();
        assert_eq!(p.price, Some(1.5));
        assert_eq!(p.ts, Some(42));
    }

    #[test]
    fn null_missing_and_blank_are_absent() {
        let p: Probe = serde_json::from_value(json!({"price": null})).unwrap();
        assert_eq!(p.price, None);
        assert_eq!(p.ts, None);
        let p: Probe = serde_json::from_value(json!({"price": ""})).unwrap();
        assert_eq!(p.price, None);
    }

    #[test]
    fn garbage_is_rejected() {
        let res: Result<Probe, _> = serde_json::from_value(json!({"price": "n/a"}));
        assert!(res.is_err());
        let res: Result<Probe, _> = serde_json::from_value(json!({"price": true}));
        assert!(res.is_err());
    }
}
