//! Wire protocol between the pool and a worker process
//!
//! Newline-delimited JSON on the worker's stdin/stdout:
//! - handshake: `{"ready": true, "version": "4.4.0"}`
//! - request:   `{"id": 7, "fn": "fetchTicker", "args": ["kraken", "BTC/USDT"]}`
//! - response:  `{"id": 7, "ok": {...}}` or `{"id": 7, "error": "..."}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One call to the external library. `args` are positional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub id: u64,
    #[serde(rename = "fn")]
    pub function: String,
    pub args: Vec<Value>,
}

impl CallRequest {
    pub fn new(id: u64, function: &str, args: Vec<Value>) -> Self {
        Self {
            id,
            function: function.to_string(),
            args,
        }
    }

    /// Encodes the request as a single line, newline included.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Result of a call as reported by the worker
#[derive(Debug, Clone, PartialEq)]
pub struct CallResponse {
    pub id: u64,
    /// `Ok` carries the raw library value, `Err` the library's message verbatim
    pub result: Result<Value, String>,
}

impl CallResponse {
    pub fn ok(id: u64, value: Value) -> Self {
        Self {
            id,
            result: Ok(value),
        }
    }

    pub fn error(id: u64, reason: impl Into<String>) -> Self {
        Self {
            id,
            result: Err(reason.into()),
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let value = match &self.result {
            Ok(v) => serde_json::json!({"id": self.id, "ok": v}),
            Err(e) => serde_json::json!({"id": self.id, "error": e}),
        };
        let mut line = serde_json::to_string(&value)?;
        line.push('\n');
        Ok(line)
    }

    /// Parses one response line.
    ///
    /// A missing `ok` is read as `null`: the library returns `undefined` for
    /// some calls and JSON drops it.
    pub fn parse(line: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(line.trim()).map_err(|e| e.to_string())?;
        let map = value
            .as_object()
            .ok_or_else(|| format!("expected a JSON object, got: {}", truncate(line)))?;

        let id = map
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| format!("response without numeric id: {}", truncate(line)))?;

        if let Some(error) = map.get("error") {
            let reason = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Ok(Self::error(id, reason));
        }

        Ok(Self::ok(id, map.get("ok").cloned().unwrap_or(Value::Null)))
    }
}

/// First line a worker prints once the library is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyMessage {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ReadyMessage {
    pub fn parse(line: &str) -> Result<Self, String> {
        let msg: ReadyMessage = serde_json::from_str(line.trim()).map_err(|e| e.to_string())?;
        if !msg.ready {
            return Err("worker reported ready=false".to_string());
        }
        Ok(msg)
    }
}

fn truncate(line: &str) -> &str {
    let line = line.trim();
    match line.char_indices().nth(120) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_line_shape() {
        let req = CallRequest::new(3, "fetchTicker", vec![json!("kraken"), json!("BTC/USDT")]);
        let line = req.to_line().unwrap();
        assert!(line.ends_with('\n'));
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            parsed,
            json!({"id": 3, "fn": "fetchTicker", "args": ["kraken", "BTC/USDT"]})
        );
    }

    #[test]
    fn parse_ok_and_error() {
        let ok = CallResponse::parse(r#"{"id": 1, "ok": {"last": "1.0"}}"#).unwrap();
        assert_eq!(ok, CallResponse::ok(1, json!({"last": "1.0"})));

        let err = CallResponse::parse(r#"{"id": 2, "error": "kraken fetchTickers not supported"}"#)
            .unwrap();
        assert_eq!(err.result, Err("kraken fetchTickers not supported".to_string()));

        let undefined = CallResponse::parse(r#"{"id": 4}"#).unwrap();
        assert_eq!(undefined.result, Ok(Value::Null));
    }

    #[test]
    fn structured_errors_are_stringified() {
        let err = CallResponse::parse(r#"{"id": 5, "error": {"name": "NetworkError"}}"#).unwrap();
        assert_eq!(err.result, Err(r#"{"name":"NetworkError"}"#.to_string()));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(CallResponse::parse("not json").is_err());
        assert!(CallResponse::parse("[1,2]").is_err());
        assert!(CallResponse::parse(r#"{"ok": 1}"#).is_err());
    }

    #[test]
    fn response_lines_parse_back() {
        let line = CallResponse::error(9, "boom").to_line().unwrap();
        assert_eq!(CallResponse::parse(&line).unwrap(), CallResponse::error(9, "boom"));
    }

    #[test]
    fn ready_handshake() {
        let ready = ReadyMessage::parse(r#"{"ready": true, "version": "4.4.0"}"#).unwrap();
        assert_eq!(ready.version.as_deref(), Some("4.4.0"));
        assert!(ReadyMessage::parse(r#"{"ready": false}"#).is_err());
        assert!(ReadyMessage::parse("loading...").is_err());
    }
}
