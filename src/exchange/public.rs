//! Public market data: no credentials required

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

use super::{canonicalize_tickers_error, millis, opt, symbols_arg, ExchangeClient};
use crate::error::Result;
use crate::normalize::{map_keyed, map_record, map_records};
use crate::types::{symbol, Currency, Market, Ohlcv, OhlcvOptions, OrderBook, Ticker};

impl ExchangeClient {
    /// `fetchTicker(exchange, "BASE/QUOTE")`
    pub async fn fetch_ticker(&self, exchange: &str, base: &str, quote: &str) -> Result<Ticker> {
        let raw = self
            .call_raw(
                "fetchTicker",
                vec![Value::from(exchange), Value::from(symbol(base, quote))],
            )
            .await?;
        Ok(map_record(raw)?)
    }

    /// All tickers, or only `symbols`, keyed by symbol
    pub async fn fetch_tickers(
        &self,
        exchange: &str,
        symbols: Option<&[String]>,
    ) -> Result<HashMap<String, Ticker>> {
        let raw = self
            .call_raw(
                "fetchTickers",
                vec![Value::from(exchange), symbols_arg(symbols)],
            )
            .await
            .map_err(canonicalize_tickers_error)?;
        Ok(map_keyed(raw)?)
    }

    pub async fn fetch_markets(&self, exchange: &str) -> Result<Vec<Market>> {
        let raw = self
            .call_raw("fetchMarkets", vec![Value::from(exchange)])
            .await?;
        Ok(map_records(raw)?)
    }

    /// Currencies keyed by unified code
    pub async fn fetch_currencies(&self, exchange: &str) -> Result<HashMap<String, Currency>> {
        let raw = self
            .call_raw("fetchCurrencies", vec![Value::from(exchange)])
            .await?;
        // exchanges without a currencies endpoint answer undefined
        if raw.is_null() {
            return Ok(HashMap::new());
        }
        Ok(map_keyed(raw)?)
    }

    /// Order book with verified level ordering
    pub async fn fetch_order_book(
        &self,
        exchange: &str,
        base: &str,
        quote: &str,
        limit: Option<u32>,
    ) -> Result<OrderBook> {
        self.order_book("fetchOrderBook", exchange, base, quote, limit)
            .await
    }

    /// Aggregated (price level) order book
    pub async fn fetch_l2_order_book(
        &self,
        exchange: &str,
        base: &str,
        quote: &str,
        limit: Option<u32>,
    ) -> Result<OrderBook> {
        self.order_book("fetchL2OrderBook", exchange, base, quote, limit)
            .await
    }

    async fn order_book(
        &self,
        function: &str,
        exchange: &str,
        base: &str,
        quote: &str,
        limit: Option<u32>,
    ) -> Result<OrderBook> {
        let raw = self
            .call_raw(
                function,
                vec![
                    Value::from(exchange),
                    Value::from(symbol(base, quote)),
                    opt(limit),
                ],
            )
            .await?;
        let book: OrderBook = map_record(raw)?;
        book.verify_sorted()?;
        Ok(book)
    }

    /// Candles in chronological order
    pub async fn fetch_ohlcvs(&self, options: &OhlcvOptions) -> Result<Vec<Ohlcv>> {
        let raw = self.call_raw("fetchOHLCV", options.to_args()).await?;
        Ok(Ohlcv::from_rows(&raw)?)
    }

    pub async fn fetch_trades(
        &self,
        exchange: &str,
        base: &str,
        quote: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Value> {
        self.call_raw(
            "fetchTrades",
            vec![
                Value::from(exchange),
                Value::from(symbol(base, quote)),
                millis(since),
                opt(limit),
            ],
        )
        .await
    }

    pub async fn fetch_status(&self, exchange: &str) -> Result<Value> {
        self.call_raw("fetchStatus", vec![Value::from(exchange)])
            .await
    }

    /// Exchange server time in milliseconds
    pub async fn fetch_time(&self, exchange: &str) -> Result<i64> {
        self.call_typed("fetchTime", vec![Value::from(exchange)])
            .await
    }

    pub async fn fetch_funding_rate(&self, exchange: &str, symbol: &str) -> Result<Value> {
        self.call_raw(
            "fetchFundingRate",
            vec![Value::from(exchange), Value::from(symbol)],
        )
        .await
    }

    pub async fn fetch_funding_rates(
        &self,
        exchange: &str,
        symbols: Option<&[String]>,
    ) -> Result<Value> {
        self.call_raw(
            "fetchFundingRates",
            vec![Value::from(exchange), symbols_arg(symbols)],
        )
        .await
    }

    pub async fn fetch_funding_rate_history(
        &self,
        exchange: &str,
        symbol: &str,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Value> {
        self.call_raw(
            "fetchFundingRateHistory",
            vec![
                Value::from(exchange),
                Value::from(symbol),
                millis(since),
                opt(limit),
            ],
        )
        .await
    }

    /// Option greeks for one contract symbol
    pub async fn fetch_greeks(&self, exchange: &str, symbol: &str) -> Result<Value> {
        self.call_raw(
            "fetchGreeks",
            vec![Value::from(exchange), Value::from(symbol)],
        )
        .await
    }

    pub async fn fetch_option(&self, exchange: &str, symbol: &str) -> Result<Value> {
        self.call_raw(
            "fetchOption",
            vec![Value::from(exchange), Value::from(symbol)],
        )
        .await
    }

    /// All option contracts on an underlying currency
    pub async fn fetch_option_chain(&self, exchange: &str, code: &str) -> Result<Value> {
        self.call_raw(
            "fetchOptionChain",
            vec![Value::from(exchange), Value::from(code)],
        )
        .await
    }

    pub async fn fetch_volatility_history(&self, exchange: &str, code: &str) -> Result<Value> {
        self.call_raw(
            "fetchVolatilityHistory",
            vec![Value::from(exchange), Value::from(code)],
        )
        .await
    }

    pub async fn fetch_open_interest(&self, exchange: &str, symbol: &str) -> Result<Value> {
        self.call_raw(
            "fetchOpenInterest",
            vec![Value::from(exchange), Value::from(symbol)],
        )
        .await
    }

    pub async fn fetch_leverage_tiers(
        &self,
        exchange: &str,
        symbols: Option<&[String]>,
    ) -> Result<Value> {
        self.call_raw(
            "fetchLeverageTiers",
            vec![Value::from(exchange), symbols_arg(symbols)],
        )
        .await
    }
}
