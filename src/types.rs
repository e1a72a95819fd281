//! Core types returned by the facade
//!
//! Each record is built by strict construction from a normalized worker
//! response: unknown keys are rejected, missing keys stay `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::SchemaError;
use crate::normalize::numeric::{opt_f64, opt_i64, value_to_f64, value_to_i64};
use crate::normalize::Record;

/// Builds the unified `BASE/QUOTE` symbol
pub fn symbol(base: &str, quote: &str) -> String {
    format!("{}/{}", base.to_uppercase(), quote.to_uppercase())
}

/// 24h ticker snapshot for one symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ticker {
    #[serde(default)]
    pub symbol: Option<String>,
    /// Milliseconds since epoch
    #[serde(default, deserialize_with = "opt_i64")]
    pub timestamp: Option<i64>,
    /// ISO 8601 rendering of `timestamp`
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub high: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub low: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub bid: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub bid_volume: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub ask: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub ask_volume: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub vwap: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub open: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub close: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub last: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub previous_close: Option<f64>,
    /// Absolute change over the period
    #[serde(default, deserialize_with = "opt_f64")]
    pub change: Option<f64>,
    /// Relative change over the period, in percent
    #[serde(default, deserialize_with = "opt_f64")]
    pub percentage: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub average: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub base_volume: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub quote_volume: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub mark_price: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub index_price: Option<f64>,
    /// Raw exchange payload
    #[serde(default)]
    pub info: Option<Value>,
}

impl Record for Ticker {
    const NAME: &'static str = "Ticker";
    const FIELDS: &'static [&'static str] = &[
        "symbol",
        "timestamp",
        "datetime",
        "high",
        "low",
        "bid",
        "bid_volume",
        "ask",
        "ask_volume",
        "vwap",
        "open",
        "close",
        "last",
        "previous_close",
        "change",
        "percentage",
        "average",
        "base_volume",
        "quote_volume",
        "mark_price",
        "index_price",
        "info",
    ];
}

impl Ticker {
    /// Mid price when both sides are quoted
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }
}

/// Single price level: `[price, amount]`, optionally with an order count
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BookLevel {
    pub price: f64,
    pub amount: f64,
    pub count: Option<f64>,
}

impl<'de> Deserialize<'de> for BookLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let row: Vec<Value> = Vec::deserialize(deserializer)?;
        if !(2..=3).contains(&row.len()) {
            return Err(serde::de::Error::custom(format!(
                "book level must have 2 or 3 entries, got {}",
                row.len()
            )));
        }
        let price = value_to_f64(&row[0])
            .ok_or_else(|| serde::de::Error::custom("book level price is not a number"))?;
        let amount = value_to_f64(&row[1])
            .ok_or_else(|| serde::de::Error::custom("book level amount is not a number"))?;
        Ok(BookLevel {
            price,
            amount,
            count: row.get(2).and_then(value_to_f64),
        })
    }
}

/// Order book snapshot: bids descending, asks ascending by price
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderBook {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
    #[serde(default, deserialize_with = "opt_i64")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub datetime: Option<String>,
    /// Exchange-assigned sequence number
    #[serde(default, deserialize_with = "opt_i64")]
    pub nonce: Option<i64>,
}

impl Record for OrderBook {
    const NAME: &'static str = "OrderBook";
    const FIELDS: &'static [&'static str] =
        &["symbol", "bids", "asks", "timestamp", "datetime", "nonce"];
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Reports the first level that breaks the side's price order.
    /// Unsorted books are surfaced to the caller rather than re-sorted.
    pub fn verify_sorted(&self) -> Result<(), SchemaError> {
        let unsorted = |levels: &[BookLevel], descending: bool| {
            levels
                .windows(2)
                .position(|w| {
                    if descending {
                        w[1].price > w[0].price
                    } else {
                        w[1].price < w[0].price
                    }
                })
                .map(|i| i + 1)
        };

        if let Some(index) = unsorted(&self.bids, true) {
            return Err(SchemaError::UnsortedLevels {
                record: Self::NAME,
                side: "bid",
                index,
            });
        }
        if let Some(index) = unsorted(&self.asks, false) {
            return Err(SchemaError::UnsortedLevels {
                record: Self::NAME,
                side: "ask",
                index,
            });
        }
        Ok(())
    }
}

/// One tradable instrument on an exchange
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Market {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub settle: Option<String>,
    #[serde(default)]
    pub base_id: Option<String>,
    #[serde(default)]
    pub quote_id: Option<String>,
    #[serde(default)]
    pub settle_id: Option<String>,
    #[serde(default)]
    pub lowercase_id: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    /// spot, margin, swap, future or option
    #[serde(default, rename = "type")]
    pub market_type: Option<String>,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub spot: Option<bool>,
    #[serde(default)]
    pub margin: Option<bool>,
    #[serde(default)]
    pub swap: Option<bool>,
    #[serde(default)]
    pub future: Option<bool>,
    #[serde(default)]
    pub option: Option<bool>,
    #[serde(default)]
    pub contract: Option<bool>,
    #[serde(default)]
    pub linear: Option<bool>,
    #[serde(default)]
    pub inverse: Option<bool>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub contract_size: Option<f64>,
    #[serde(default, deserialize_with = "opt_i64")]
    pub expiry: Option<i64>,
    #[serde(default)]
    pub expiry_datetime: Option<String>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub strike: Option<f64>,
    #[serde(default)]
    pub option_type: Option<String>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub taker: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub maker: Option<f64>,
    #[serde(default)]
    pub percentage: Option<bool>,
    #[serde(default)]
    pub tier_based: Option<bool>,
    #[serde(default)]
    pub fee_side: Option<String>,
    /// Exchange-specific precision map
    #[serde(default)]
    pub precision: Option<Value>,
    /// Exchange-specific limits map
    #[serde(default)]
    pub limits: Option<Value>,
    #[serde(default)]
    pub margin_modes: Option<Value>,
    #[serde(default, deserialize_with = "opt_i64")]
    pub created: Option<i64>,
    #[serde(default)]
    pub info: Option<Value>,
}

impl Record for Market {
    const NAME: &'static str = "Market";
    const FIELDS: &'static [&'static str] = &[
        "id",
        "symbol",
        "base",
        "quote",
        "settle",
        "base_id",
        "quote_id",
        "settle_id",
        "lowercase_id",
        "active",
        "type",
        "sub_type",
        "spot",
        "margin",
        "swap",
        "future",
        "option",
        "contract",
        "linear",
        "inverse",
        "contract_size",
        "expiry",
        "expiry_datetime",
        "strike",
        "option_type",
        "taker",
        "maker",
        "percentage",
        "tier_based",
        "fee_side",
        "precision",
        "limits",
        "margin_modes",
        "created",
        "info",
    ];
}

/// One currency as listed by an exchange
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Currency {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "opt_i64")]
    pub numeric_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub currency_type: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub deposit: Option<bool>,
    #[serde(default)]
    pub withdraw: Option<bool>,
    #[serde(default)]
    pub payin: Option<bool>,
    #[serde(default)]
    pub payout: Option<bool>,
    #[serde(default)]
    pub transfer: Option<bool>,
    #[serde(default)]
    pub margin: Option<bool>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub fee: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub precision: Option<f64>,
    #[serde(default)]
    pub limits: Option<Value>,
    #[serde(default)]
    pub networks: Option<Value>,
    #[serde(default)]
    pub info: Option<Value>,
}

impl Record for Currency {
    const NAME: &'static str = "Currency";
    const FIELDS: &'static [&'static str] = &[
        "id",
        "code",
        "numeric_id",
        "name",
        "type",
        "active",
        "deposit",
        "withdraw",
        "payin",
        "payout",
        "transfer",
        "margin",
        "fee",
        "precision",
        "limits",
        "networks",
        "info",
    ];
    // network entries are exchange-shaped as well
    const OPAQUE: &'static [&'static str] = &["info", "networks"];
}

/// Single candle; `timestamp` is the period start in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Volume in base currency
    pub base_volume: f64,
}

impl Ohlcv {
    /// Builds a candle from the library's `[ts, o, h, l, c, v]` row.
    pub fn from_row(row: &Value) -> Result<Self, SchemaError> {
        let invalid = |reason: String| SchemaError::Invalid {
            record: "Ohlcv",
            reason,
        };
        let items = row
            .as_array()
            .ok_or_else(|| invalid(format!("expected array row, got {}", row)))?;
        if items.len() != 6 {
            return Err(invalid(format!("expected 6 columns, got {}", items.len())));
        }

        let timestamp =
            value_to_i64(&items[0]).ok_or_else(|| invalid("timestamp is not a number".into()))?;
        let column = |i: usize, name: &str| {
            value_to_f64(&items[i]).ok_or_else(|| invalid(format!("{} is not a number", name)))
        };

        Ok(Ohlcv {
            timestamp,
            open: column(1, "open")?,
            high: column(2, "high")?,
            low: column(3, "low")?,
            close: column(4, "close")?,
            base_volume: column(5, "volume")?,
        })
    }

    /// Builds the series from a response array. Rows must already be in
    /// chronological order; a row older than its predecessor is reported,
    /// not re-sorted.
    pub fn from_rows(raw: &Value) -> Result<Vec<Self>, SchemaError> {
        let rows = raw.as_array().ok_or_else(|| SchemaError::Invalid {
            record: "Ohlcv",
            reason: format!("expected array of rows, got {}", raw),
        })?;
        let candles = rows.iter().map(Self::from_row).collect::<Result<Vec<_>, _>>()?;
        if let Some(index) = candles
            .windows(2)
            .position(|pair| pair[1].timestamp < pair[0].timestamp)
        {
            return Err(SchemaError::UnorderedRows {
                record: "Ohlcv",
                index: index + 1,
            });
        }
        Ok(candles)
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Parameters for an OHLCV fetch
#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvOptions {
    pub exchange: String,
    pub base: String,
    pub quote: String,
    /// e.g. `1m`, `1h`, `1d`; library default when absent
    pub timeframe: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl OhlcvOptions {
    pub fn new(exchange: &str, base: &str, quote: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            base: base.to_string(),
            quote: quote.to_string(),
            timeframe: None,
            since: None,
            limit: None,
        }
    }

    pub fn timeframe(mut self, timeframe: &str) -> Self {
        self.timeframe = Some(timeframe.to_string());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn symbol(&self) -> String {
        symbol(&self.base, &self.quote)
    }

    /// Positional arguments for `fetchOHLCV(exchange, symbol, timeframe, since, limit)`
    pub fn to_args(&self) -> Vec<Value> {
        vec![
            Value::from(self.exchange.clone()),
            Value::from(self.symbol()),
            self.timeframe
                .clone()
                .map(Value::from)
                .unwrap_or(Value::Null),
            self.since
                .map(|t| Value::from(t.timestamp_millis()))
                .unwrap_or(Value::Null),
            self.limit.map(Value::from).unwrap_or(Value::Null),
        ]
    }
}

/// Buy or sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order type accepted by `createOrder`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "market"),
            OrderType::Limit => write!(f, "limit"),
        }
    }
}
