//! Unified exchange facade
//!
//! One method per library operation. Each builds the positional argument
//! list, dispatches it through the worker pool and, for operations with a
//! local schema, maps the raw response into a typed record. Everything else
//! (balances, orders, funding rates, ...) is returned as raw JSON.

mod private;
mod public;

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::bridge::WorkerPool;
use crate::credentials::{Credential, RequiredCredentials};
use crate::error::{Error, Result};

/// Canonical error for exchanges without a bulk ticker endpoint
pub const TICKERS_NOT_SUPPORTED: &str = "fetchTickers not supported";

/// Rewrites any "fetchTickers not supported" failure to the canonical
/// reason. Every other error passes through untouched.
pub fn canonicalize_tickers_error(err: Error) -> Error {
    match err {
        Error::RemoteExecution(reason) if reason.contains(TICKERS_NOT_SUPPORTED) => {
            Error::RemoteExecution(TICKERS_NOT_SUPPORTED.to_string())
        }
        other => other,
    }
}

fn opt<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::Null)
}

fn millis(since: Option<DateTime<Utc>>) -> Value {
    opt(since.map(|t| t.timestamp_millis()))
}

fn symbols_arg(symbols: Option<&[String]>) -> Value {
    opt(symbols.map(|s| s.to_vec()))
}

/// Typed client over a shared worker pool
#[derive(Debug, Clone)]
pub struct ExchangeClient {
    pool: Arc<WorkerPool>,
    required: Arc<RwLock<HashMap<String, RequiredCredentials>>>,
}

impl ExchangeClient {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            required: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Calls any library function directly and returns its raw result.
    pub async fn call_raw(&self, function: &str, args: Vec<Value>) -> Result<Value> {
        self.pool.call(function, args).await
    }

    async fn call_typed<T>(&self, function: &str, args: Vec<Value>) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let raw = self.pool.call(function, args).await?;
        serde_json::from_value(raw).map_err(|e| {
            Error::Serialization(format!("unexpected {} result: {}", function, e))
        })
    }

    /// Lists the exchange ids the library supports.
    pub async fn exchanges(&self) -> Result<Vec<String>> {
        self.call_typed("exchanges", vec![]).await
    }

    /// The exchange's capability map (`fetchTickers: true`, `fetchOHLCV: "emulated"`, ...)
    pub async fn exchange_capabilities(&self, exchange: &str) -> Result<HashMap<String, Value>> {
        self.call_typed("has", vec![Value::from(exchange)]).await
    }

    /// Unified timeframe names the exchange accepts for OHLCV fetches
    pub async fn timeframes(&self, exchange: &str) -> Result<Vec<String>> {
        let raw: Option<HashMap<String, Value>> = self
            .call_typed("timeframes", vec![Value::from(exchange)])
            .await?;
        let mut names: Vec<String> = raw.unwrap_or_default().into_keys().collect();
        names.sort();
        Ok(names)
    }

    /// Credential fields the exchange needs. Cached per exchange; the set is
    /// static library metadata, unlike the credentials themselves.
    pub async fn required_credentials(&self, exchange: &str) -> Result<RequiredCredentials> {
        if let Some(cached) = self.required.read().await.get(exchange) {
            return Ok(cached.clone());
        }

        let raw = self
            .pool
            .call("requiredCredentials", vec![Value::from(exchange)])
            .await?;
        let required = RequiredCredentials::from_value(&raw).ok_or_else(|| {
            Error::Serialization(format!(
                "requiredCredentials for {} is not a map: {}",
                exchange, raw
            ))
        })?;

        self.required
            .write()
            .await
            .insert(exchange.to_string(), required.clone());
        Ok(required)
    }

    /// Checks a credential against its exchange's requirements.
    pub async fn validate_credential(&self, credential: &Credential) -> Result<()> {
        let required = self.required_credentials(&credential.name).await?;
        credential.validate(&required)?;
        Ok(())
    }

    /// Dispatches a private call: `function(exchange_id, secrets, args...)`.
    /// Nothing is sent unless the credential satisfies the exchange's
    /// requirements.
    async fn call_private(
        &self,
        function: &str,
        credential: &Credential,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.validate_credential(credential).await?;
        let (exchange, secrets) = credential.shape()?;

        tracing::debug!(
            exchange = %exchange,
            function,
            credential = ?credential.presence(),
            "Dispatching private call"
        );

        let mut full = Vec::with_capacity(args.len() + 2);
        full.push(Value::from(exchange));
        full.push(Value::Object(secrets));
        full.extend(args);
        self.pool.call(function, full).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tickers_error_rewrite_is_narrow() {
        let rewritten = canonicalize_tickers_error(Error::RemoteExecution(
            "kraken: fetchTickers not supported for symbols list".into(),
        ));
        assert_eq!(rewritten.reason(), TICKERS_NOT_SUPPORTED);

        let untouched =
            canonicalize_tickers_error(Error::RemoteExecution("fetchTicker not supported".into()));
        assert_eq!(untouched.reason(), "fetchTicker not supported");

        let other = canonicalize_tickers_error(Error::WorkerUnavailable(
            "fetchTickers not supported".into(),
        ));
        assert!(matches!(other, Error::WorkerUnavailable(_)));
    }

    #[test]
    fn optional_args_become_null() {
        assert_eq!(opt::<u32>(None), Value::Null);
        assert_eq!(opt(Some(5u32)), Value::from(5));
        assert_eq!(symbols_arg(None), Value::Null);
        assert_eq!(
            symbols_arg(Some(&["BTC/USDT".to_string()])),
            serde_json::json!(["BTC/USDT"])
        );
    }
}
