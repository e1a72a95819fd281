//! Error types surfaced by the bridge, the pool and the facade.

use thiserror::Error;

/// A domain record could not be built from a worker response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("unexpected key `{key}` while building {record}")]
    UnexpectedKey { record: &'static str, key: String },

    #[error("invalid {record} payload: {reason}")]
    Invalid { record: &'static str, reason: String },

    #[error("{record} {side} levels out of order at index {index}")]
    UnsortedLevels {
        record: &'static str,
        side: &'static str,
        index: usize,
    },

    #[error("{record} rows out of chronological order at index {index}")]
    UnorderedRows { record: &'static str, index: usize },
}

/// Credential problems detected before anything is dispatched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredentialError {
    #[error("{exchange} requires credential fields: {}", missing.join(", "))]
    MissingFields {
        exchange: String,
        missing: Vec<String>,
    },

    #[error("credential has no exchange name")]
    MissingName,
}

#[derive(Error, Debug)]
pub enum Error {
    /// No worker could be acquired in time, or the call timed out.
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// The external library reported an error; the message is verbatim.
    #[error("remote execution error: {0}")]
    RemoteExecution(String),

    /// A payload could not cross the process boundary.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(#[from] SchemaError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The pool could not start, or exhausted its restart budget.
    #[error("pool initialization failed: {0}")]
    PoolInitialization(String),
}

impl Error {
    /// Human-readable reason without the category prefix.
    pub fn reason(&self) -> String {
        match self {
            Error::WorkerUnavailable(r)
            | Error::RemoteExecution(r)
            | Error::Serialization(r)
            | Error::PoolInitialization(r) => r.clone(),
            Error::SchemaMismatch(e) => e.to_string(),
            Error::Credential(e) => e.to_string(),
        }
    }

    /// Whether the caller may reasonably retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::WorkerUnavailable(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strips_category() {
        let err = Error::RemoteExecution("binance does not have market symbol FOO/BAR".into());
        assert_eq!(err.reason(), "binance does not have market symbol FOO/BAR");
        assert!(err.to_string().starts_with("remote execution error"));
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(Error::WorkerUnavailable("timeout".into()).is_retryable());
        assert!(!Error::RemoteExecution("x".into()).is_retryable());
        assert!(!Error::Serialization("x".into()).is_retryable());
    }

    #[test]
    fn credential_error_names_missing_fields() {
        let err = CredentialError::MissingFields {
            exchange: "binance".into(),
            missing: vec!["apiKey".into(), "secret".into()],
        };
        assert_eq!(err.to_string(), "binance requires credential fields: apiKey, secret");
    }
}
