//! Private account operations
//!
//! Every call validates the credential against the exchange's requirement
//! set before anything is dispatched. Results are returned as raw JSON since
//! their shape is exchange-defined.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{millis, opt, symbols_arg, ExchangeClient};
use crate::credentials::Credential;
use crate::error::Result;
use crate::types::{OrderType, Side};

impl ExchangeClient {
    pub async fn fetch_balance(&self, credential: &Credential) -> Result<Value> {
        self.call_private("fetchBalance", credential, vec![]).await
    }

    /// `price` is required for limit orders and ignored by most exchanges
    /// for market orders.
    pub async fn create_order(
        &self,
        credential: &Credential,
        symbol: &str,
        order_type: OrderType,
        side: Side,
        amount: f64,
        price: Option<f64>,
    ) -> Result<Value> {
        self.call_private(
            "createOrder",
            credential,
            vec![
                Value::from(symbol),
                Value::from(order_type.to_string()),
                Value::from(side.to_string()),
                Value::from(amount),
                opt(price),
            ],
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn edit_order(
        &self,
        credential: &Credential,
        id: &str,
        symbol: &str,
        order_type: OrderType,
        side: Side,
        amount: Option<f64>,
        price: Option<f64>,
    ) -> Result<Value> {
        self.call_private(
            "editOrder",
            credential,
            vec![
                Value::from(id),
                Value::from(symbol),
                Value::from(order_type.to_string()),
                Value::from(side.to_string()),
                opt(amount),
                opt(price),
            ],
        )
        .await
    }

    pub async fn cancel_order(
        &self,
        credential: &Credential,
        id: &str,
        symbol: Option<&str>,
    ) -> Result<Value> {
        self.call_private(
            "cancelOrder",
            credential,
            vec![Value::from(id), opt(symbol)],
        )
        .await
    }

    pub async fn cancel_all_orders(
        &self,
        credential: &Credential,
        symbol: Option<&str>,
    ) -> Result<Value> {
        self.call_private("cancelAllOrders", credential, vec![opt(symbol)])
            .await
    }

    pub async fn fetch_order(
        &self,
        credential: &Credential,
        id: &str,
        symbol: Option<&str>,
    ) -> Result<Value> {
        self.call_private("fetchOrder", credential, vec![Value::from(id), opt(symbol)])
            .await
    }

    pub async fn fetch_orders(
        &self,
        credential: &Credential,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Value> {
        self.order_listing("fetchOrders", credential, symbol, since, limit)
            .await
    }

    pub async fn fetch_open_orders(
        &self,
        credential: &Credential,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Value> {
        self.order_listing("fetchOpenOrders", credential, symbol, since, limit)
            .await
    }

    pub async fn fetch_closed_orders(
        &self,
        credential: &Credential,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Value> {
        self.order_listing("fetchClosedOrders", credential, symbol, since, limit)
            .await
    }

    pub async fn fetch_my_trades(
        &self,
        credential: &Credential,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Value> {
        self.order_listing("fetchMyTrades", credential, symbol, since, limit)
            .await
    }

    /// `(symbol, since, limit)` listings
    async fn order_listing(
        &self,
        function: &str,
        credential: &Credential,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Value> {
        self.call_private(
            function,
            credential,
            vec![opt(symbol), millis(since), opt(limit)],
        )
        .await
    }

    pub async fn fetch_positions(
        &self,
        credential: &Credential,
        symbols: Option<&[String]>,
    ) -> Result<Value> {
        self.call_private("fetchPositions", credential, vec![symbols_arg(symbols)])
            .await
    }

    pub async fn fetch_deposits(
        &self,
        credential: &Credential,
        code: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Value> {
        self.call_private(
            "fetchDeposits",
            credential,
            vec![opt(code), millis(since), opt(limit)],
        )
        .await
    }

    pub async fn fetch_withdrawals(
        &self,
        credential: &Credential,
        code: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Value> {
        self.call_private(
            "fetchWithdrawals",
            credential,
            vec![opt(code), millis(since), opt(limit)],
        )
        .await
    }

    pub async fn fetch_deposit_address(&self, credential: &Credential, code: &str) -> Result<Value> {
        self.call_private("fetchDepositAddress", credential, vec![Value::from(code)])
            .await
    }

    /// Withdraws `amount` of `code` to an external address. Irreversible.
    pub async fn withdraw(
        &self,
        credential: &Credential,
        code: &str,
        amount: f64,
        address: &str,
        tag: Option<&str>,
    ) -> Result<Value> {
        self.call_private(
            "withdraw",
            credential,
            vec![
                Value::from(code),
                Value::from(amount),
                Value::from(address),
                opt(tag),
            ],
        )
        .await
    }

    /// Moves funds between the account's own sub-accounts (spot, margin, ...)
    pub async fn transfer(
        &self,
        credential: &Credential,
        code: &str,
        amount: f64,
        from_account: &str,
        to_account: &str,
    ) -> Result<Value> {
        self.call_private(
            "transfer",
            credential,
            vec![
                Value::from(code),
                Value::from(amount),
                Value::from(from_account),
                Value::from(to_account),
            ],
        )
        .await
    }

    pub async fn fetch_ledger(
        &self,
        credential: &Credential,
        code: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Value> {
        self.call_private(
            "fetchLedger",
            credential,
            vec![opt(code), millis(since), opt(limit)],
        )
        .await
    }

    pub async fn fetch_trading_fees(&self, credential: &Credential) -> Result<Value> {
        self.call_private("fetchTradingFees", credential, vec![])
            .await
    }

    pub async fn set_leverage(
        &self,
        credential: &Credential,
        leverage: f64,
        symbol: &str,
    ) -> Result<Value> {
        self.call_private(
            "setLeverage",
            credential,
            vec![Value::from(leverage), Value::from(symbol)],
        )
        .await
    }

    pub async fn fetch_cross_borrow_rate(&self, credential: &Credential, code: &str) -> Result<Value> {
        self.call_private("fetchCrossBorrowRate", credential, vec![Value::from(code)])
            .await
    }

    pub async fn fetch_cross_borrow_rates(&self, credential: &Credential) -> Result<Value> {
        self.call_private("fetchCrossBorrowRates", credential, vec![])
            .await
    }

    pub async fn fetch_isolated_borrow_rate(
        &self,
        credential: &Credential,
        symbol: &str,
    ) -> Result<Value> {
        self.call_private(
            "fetchIsolatedBorrowRate",
            credential,
            vec![Value::from(symbol)],
        )
        .await
    }

    pub async fn fetch_isolated_borrow_rates(&self, credential: &Credential) -> Result<Value> {
        self.call_private("fetchIsolatedBorrowRates", credential, vec![])
            .await
    }

    /// Quote for converting `amount` of `from_code` into `to_code`
    pub async fn fetch_convert_quote(
        &self,
        credential: &Credential,
        from_code: &str,
        to_code: &str,
        amount: Option<f64>,
    ) -> Result<Value> {
        self.call_private(
            "fetchConvertQuote",
            credential,
            vec![Value::from(from_code), Value::from(to_code), opt(amount)],
        )
        .await
    }

    /// Executes a previously quoted conversion
    pub async fn create_convert_trade(
        &self,
        credential: &Credential,
        quote_id: &str,
        from_code: &str,
        to_code: &str,
        amount: Option<f64>,
    ) -> Result<Value> {
        self.call_private(
            "createConvertTrade",
            credential,
            vec![
                Value::from(quote_id),
                Value::from(from_code),
                Value::from(to_code),
                opt(amount),
            ],
        )
        .await
    }

    pub async fn fetch_convert_trade(
        &self,
        credential: &Credential,
        id: &str,
        code: Option<&str>,
    ) -> Result<Value> {
        self.call_private(
            "fetchConvertTrade",
            credential,
            vec![Value::from(id), opt(code)],
        )
        .await
    }

    pub async fn fetch_convert_trade_history(
        &self,
        credential: &Credential,
        code: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Value> {
        self.call_private(
            "fetchConvertTradeHistory",
            credential,
            vec![opt(code), millis(since), opt(limit)],
        )
        .await
    }
}
