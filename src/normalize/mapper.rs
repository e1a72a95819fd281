//! Strict construction of domain records from worker responses.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

use super::casing::{convert_keys, Casing};
use crate::error::SchemaError;

/// A record that can be built from a normalized response map.
///
/// `FIELDS` lists every accepted snake_case key; anything else is rejected so
/// upstream schema drift shows up immediately.
pub trait Record: DeserializeOwned {
    const NAME: &'static str;
    const FIELDS: &'static [&'static str];
    /// Keys whose values are carried through without key conversion.
    const OPAQUE: &'static [&'static str] = &["info"];
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Builds one `T` from a raw (camelCase) response object.
pub fn map_record<T: Record>(raw: Value) -> Result<T, SchemaError> {
    let normalized = convert_keys(raw, Casing::Snake, T::OPAQUE);
    let map = match normalized {
        Value::Object(map) => map,
        other => {
            return Err(SchemaError::Invalid {
                record: T::NAME,
                reason: format!("expected object, got {}", kind(&other)),
            })
        }
    };

    if let Some(key) = map.keys().find(|k| !T::FIELDS.contains(&k.as_str())) {
        return Err(SchemaError::UnexpectedKey {
            record: T::NAME,
            key: key.clone(),
        });
    }

    serde_json::from_value(Value::Object(map)).map_err(|e| SchemaError::Invalid {
        record: T::NAME,
        reason: e.to_string(),
    })
}

/// Builds a list of `T` from a response array.
pub fn map_records<T: Record>(raw: Value) -> Result<Vec<T>, SchemaError> {
    match raw {
        Value::Array(items) => items.into_iter().map(map_record).collect(),
        other => Err(SchemaError::Invalid {
            record: T::NAME,
            reason: format!("expected array, got {}", kind(&other)),
        }),
    }
}

/// Builds a map of `T` from a response object keyed by symbol or code.
/// The outer keys are identifiers, not field names, and are kept verbatim.
pub fn map_keyed<T: Record>(raw: Value) -> Result<HashMap<String, T>, SchemaError> {
    match raw {
        Value::Object(entries) => entries
            .into_iter()
            .map(|(key, item)| map_record(item).map(|record| (key, record)))
            .collect(),
        other => Err(SchemaError::Invalid {
            record: T::NAME,
            reason: format!("expected object, got {}", kind(&other)),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Probe {
        #[serde(default)]
        symbol: Option<String>,
        #[serde(default)]
        base_volume: Option<f64>,
        #[serde(default)]
        info: Option<Value>,
    }

    impl Record for Probe {
        const NAME: &'static str = "Probe";
        const FIELDS: &'static [&'static str] = &["symbol", "base_volume", "info"];
    }

    #[test]
    fn camel_keys_map_onto_snake_fields() {
        let p: Probe =
            map_record(json!({"symbol": "BTC/USDT", "baseVolume": 12.5, "info": {"rawKey": 1}}))
                .unwrap();
        assert_eq!(p.symbol.as_deref(), Some("BTC/USDT"));
        assert_eq!(p.base_volume, Some(12.5));
        assert_eq!(p.info, Some(json!({"rawKey": 1})));
    }

    #[test]
    fn one_extra_key_fails() {
        let err = map_record::<Probe>(json!({"symbol": "X", "brandNewField": 1})).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnexpectedKey {
                record: "Probe",
                key: "brand_new_field".into()
            }
        );
    }

    #[test]
    fn missing_keys_are_absent() {
        let p: Probe = map_record(json!({})).unwrap();
        assert_eq!(
            p,
            Probe {
                symbol: None,
                base_volume: None,
                info: None
            }
        );
    }

    #[test]
    fn non_object_is_invalid() {
        assert!(matches!(
            map_record::<Probe>(json!([1, 2])),
            Err(SchemaError::Invalid { .. })
        ));
        assert!(map_records::<Probe>(json!({})).is_err());
    }

    #[test]
    fn keyed_maps_keep_outer_keys() {
        let m = map_keyed::<Probe>(json!({"ETH/BTC": {"symbol": "ETH/BTC"}})).unwrap();
        assert_eq!(m["ETH/BTC"].symbol.as_deref(), Some("ETH/BTC"));
    }
}
