//! Exchange facade tests against scripted workers

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ccxt_bridge::bridge::{PoolConfig, Reply, ScriptedSpawner, WorkerPool};
use ccxt_bridge::error::{CredentialError, SchemaError};
use ccxt_bridge::exchange::TICKERS_NOT_SUPPORTED;
use ccxt_bridge::types::OhlcvOptions;
use ccxt_bridge::{Credential, Error, ExchangeClient};

async fn client<F>(handler: F) -> ExchangeClient
where
    F: Fn(usize, &str, &[Value]) -> Reply + Send + Sync + 'static,
{
    let config = PoolConfig {
        size: 2,
        call_timeout: Duration::from_secs(2),
        startup_timeout: Duration::from_secs(1),
        ..PoolConfig::default()
    };
    let pool = WorkerPool::start(config, Arc::new(ScriptedSpawner::new(handler)))
        .await
        .expect("pool should start");
    ExchangeClient::new(Arc::new(pool))
}

fn kraken_ticker() -> Value {
    json!({
        "symbol": "BTC/USDT",
        "timestamp": 1_736_121_600_000i64,
        "datetime": "2025-01-06T00:00:00.000Z",
        "high": "103500.00",
        "low": "98600.10",
        "bid": "102906.10",
        "bidVolume": null,
        "ask": "102906.20",
        "askVolume": null,
        "last": "102906.15",
        "baseVolume": "1532.8",
        "quoteVolume": null,
        "info": { "a": ["102906.20", "1", "1.000"], "c": ["102906.15", "0.01"] }
    })
}

#[tokio::test]
async fn ticker_prices_arrive_as_numbers() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let client = client(move |_, function, args| {
        log.lock().unwrap().push((function.to_string(), args.to_vec()));
        match function {
            "fetchTicker" => Reply::Ok(kraken_ticker()),
            other => Reply::Error(format!("unexpected {}", other)),
        }
    })
    .await;

    let ticker = client.fetch_ticker("kraken", "BTC", "USDT").await.unwrap();
    assert_eq!(ticker.last, Some(102906.15));
    assert_eq!(ticker.symbol.as_deref(), Some("BTC/USDT"));
    assert_eq!(ticker.base_volume, Some(1532.8));
    assert_eq!(ticker.bid_volume, None);
    assert!((ticker.spread().unwrap() - 0.1).abs() < 1e-6);
    // raw payload is kept untouched
    assert_eq!(ticker.info.unwrap()["c"][0], json!("102906.15"));

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![(
            "fetchTicker".to_string(),
            vec![json!("kraken"), json!("BTC/USDT")]
        )]
    );
}

#[tokio::test]
async fn lowercase_pairs_are_upcased() {
    let client = client(|_, _, args| {
        assert_eq!(args[1], json!("ETH/BTC"));
        Reply::Ok(json!({ "symbol": "ETH/BTC", "last": 0.0321 }))
    })
    .await;
    let ticker = client.fetch_ticker("binance", "eth", "btc").await.unwrap();
    assert_eq!(ticker.last, Some(0.0321));
}

#[tokio::test]
async fn unknown_ticker_key_is_a_schema_mismatch() {
    let client = client(|_, _, _| {
        Reply::Ok(json!({ "symbol": "BTC/USDT", "last": 1.0, "lastTradeId": 7 }))
    })
    .await;
    let err = client.fetch_ticker("kraken", "BTC", "USDT").await.unwrap_err();
    match err {
        Error::SchemaMismatch(SchemaError::UnexpectedKey { record, key }) => {
            assert_eq!(record, "Ticker");
            assert_eq!(key, "last_trade_id");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn tickers_not_supported_is_canonical() {
    let client = client(|_, function, _| match function {
        "fetchTickers" => Reply::Error("kraken fetchTickers not supported".into()),
        _ => Reply::Error("kraken does not have market symbol XYZ/ABC".into()),
    })
    .await;

    let err = client.fetch_tickers("kraken", None).await.unwrap_err();
    assert!(matches!(err, Error::RemoteExecution(_)));
    assert_eq!(err.reason(), TICKERS_NOT_SUPPORTED);

    // other operations keep the library's message
    let err = client.fetch_ticker("kraken", "XYZ", "ABC").await.unwrap_err();
    assert_eq!(err.reason(), "kraken does not have market symbol XYZ/ABC");
}

#[tokio::test]
async fn tickers_are_keyed_by_symbol() {
    let client = client(|_, _, args| {
        assert_eq!(args[1], json!(["BTC/USDT", "ETH/USDT"]));
        Reply::Ok(json!({
            "BTC/USDT": { "symbol": "BTC/USDT", "last": "100" },
            "ETH/USDT": { "symbol": "ETH/USDT", "last": "10", "quoteVolume": 5 }
        }))
    })
    .await;
    let symbols = vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()];
    let tickers = client
        .fetch_tickers("binance", Some(&symbols))
        .await
        .unwrap();
    assert_eq!(tickers.len(), 2);
    assert_eq!(tickers["ETH/USDT"].quote_volume, Some(5.0));
    assert_eq!(tickers["BTC/USDT"].last, Some(100.0));
}

#[tokio::test]
async fn order_book_levels_are_checked() {
    let client = client(|_, _, args| {
        if args[0] == json!("good") {
            Reply::Ok(json!({
                "symbol": "BTC/USDT",
                "bids": [[101.0, 1.0], [100.5, 2.0]],
                "asks": [[101.5, 0.5], [102.0, 3.0, 4]],
                "timestamp": null,
                "nonce": 991
            }))
        } else {
            Reply::Ok(json!({
                "symbol": "BTC/USDT",
                "bids": [[100.0, 1.0], [100.5, 2.0]],
                "asks": []
            }))
        }
    })
    .await;

    let book = client
        .fetch_order_book("good", "BTC", "USDT", Some(2))
        .await
        .unwrap();
    assert_eq!(book.best_bid().unwrap().price, 101.0);
    assert_eq!(book.best_ask().unwrap().price, 101.5);
    assert_eq!(book.asks[1].count, Some(4.0));
    assert_eq!(book.nonce, Some(991));

    let err = client
        .fetch_order_book("bad", "BTC", "USDT", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::SchemaMismatch(SchemaError::UnsortedLevels { side: "bids", .. })
    ));
}

#[tokio::test]
async fn ohlcv_passes_positional_options() {
    let client = client(|_, function, args| {
        assert_eq!(function, "fetchOHLCV");
        assert_eq!(
            args.to_vec(),
            vec![
                json!("binance"),
                json!("BTC/USDT"),
                json!("1h"),
                json!(1_700_000_000_000i64),
                json!(2)
            ]
        );
        Reply::Ok(json!([
            [1_700_000_000_000i64, 1.0, 2.0, 0.5, 2.0, 12.5],
            [1_700_003_600_000i64, 2.0, 3.0, 1.5, 2.5, 10.0]
        ]))
    })
    .await;

    let since = chrono::DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
    let options = OhlcvOptions::new("binance", "btc", "usdt")
        .timeframe("1h")
        .since(since)
        .limit(2);
    let candles = client.fetch_ohlcvs(&options).await.unwrap();
    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].timestamp, 1_700_000_000_000);
    assert_eq!(candles[0].base_volume, 12.5);
    assert_eq!(candles[1].close, 2.5);
}

#[tokio::test]
async fn ohlcv_rejects_short_rows() {
    let client = client(|_, _, _| Reply::Ok(json!([[1, 2, 3, 4, 5]]))).await;
    let err = client
        .fetch_ohlcvs(&OhlcvOptions::new("binance", "BTC", "USDT"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::SchemaMismatch(SchemaError::Invalid { record: "Ohlcv", .. })
    ));
}

#[tokio::test]
async fn ohlcv_reports_misordered_rows() {
    let client = client(|_, _, _| {
        Reply::Ok(json!([
            [1_700_003_600_000i64, 2.0, 3.0, 1.5, 2.5, 10.0],
            [1_700_000_000_000i64, 1.0, 2.0, 0.5, 2.0, 12.5]
        ]))
    })
    .await;
    let err = client
        .fetch_ohlcvs(&OhlcvOptions::new("binance", "BTC", "USDT"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::SchemaMismatch(SchemaError::UnorderedRows { record: "Ohlcv", index: 1 })
    ));
}

#[tokio::test]
async fn markets_and_currencies_are_mapped() {
    let client = client(|_, function, _| match function {
        "fetchMarkets" => Reply::Ok(json!([{
            "id": "XXBTZUSD",
            "symbol": "BTC/USD",
            "base": "BTC",
            "quote": "USD",
            "baseId": "XXBT",
            "type": "spot",
            "spot": true,
            "taker": "0.0026",
            "precision": { "amount": 1e-8, "price": 0.1 },
            "info": { "altname": "XBTUSD" }
        }])),
        "fetchCurrencies" => Reply::Ok(json!({
            "BTC": {
                "id": "XXBT",
                "code": "BTC",
                "type": "crypto",
                "precision": "1e-8",
                "networks": { "BTC": { "withdrawFee": 0.0001 } }
            }
        })),
        _ => Reply::Ok(Value::Null),
    })
    .await;

    let markets = client.fetch_markets("kraken").await.unwrap();
    assert_eq!(markets[0].market_type.as_deref(), Some("spot"));
    assert_eq!(markets[0].base_id.as_deref(), Some("XXBT"));
    assert_eq!(markets[0].taker, Some(0.0026));

    let currencies = client.fetch_currencies("kraken").await.unwrap();
    let btc = &currencies["BTC"];
    assert_eq!(btc.currency_type.as_deref(), Some("crypto"));
    assert_eq!(btc.precision, Some(1e-8));
    // network entries keep exchange casing
    assert_eq!(btc.networks.as_ref().unwrap()["BTC"]["withdrawFee"], json!(0.0001));
}

#[tokio::test]
async fn missing_currencies_endpoint_is_empty() {
    let client = client(|_, _, _| Reply::Ok(Value::Null)).await;
    assert!(client.fetch_currencies("oddex").await.unwrap().is_empty());
}

fn binance_requirements() -> Value {
    json!({
        "apiKey": true,
        "secret": true,
        "uid": false,
        "login": false,
        "password": false,
        "twofa": false,
        "privateKey": false,
        "walletAddress": false,
        "token": false
    })
}

#[tokio::test]
async fn incomplete_credential_is_never_dispatched() {
    let dispatched = Arc::new(AtomicUsize::new(0));
    let counter = dispatched.clone();
    let client = client(move |_, function, _| match function {
        "requiredCredentials" => Reply::Ok(binance_requirements()),
        _ => {
            counter.fetch_add(1, Ordering::SeqCst);
            Reply::Ok(json!({}))
        }
    })
    .await;

    let err = client
        .fetch_balance(&Credential::new("binance"))
        .await
        .unwrap_err();
    match err {
        Error::Credential(CredentialError::MissingFields { exchange, missing }) => {
            assert_eq!(exchange, "binance");
            assert_eq!(missing, vec!["apiKey".to_string(), "secret".to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let half = Credential::new("binance").api_key("k");
    let err = client.fetch_balance(&half).await.unwrap_err();
    assert!(err.reason().contains("secret"), "{}", err.reason());
    assert!(!err.reason().contains("apiKey"), "{}", err.reason());

    assert_eq!(dispatched.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn private_calls_carry_only_present_secrets() {
    let lookups = Arc::new(AtomicUsize::new(0));
    let counter = lookups.clone();
    let client = client(move |_, function, args| match function {
        "requiredCredentials" => {
            counter.fetch_add(1, Ordering::SeqCst);
            Reply::Ok(binance_requirements())
        }
        "fetchBalance" => {
            assert_eq!(args.len(), 2);
            assert_eq!(args[0], json!("binance"));
            assert_eq!(args[1], json!({ "apiKey": "key", "secret": "shh" }));
            Reply::Ok(json!({ "BTC": { "free": 0.5, "used": 0, "total": 0.5 } }))
        }
        "createOrder" => {
            assert_eq!(
                args[2..].to_vec(),
                vec![json!("BTC/USDT"), json!("limit"), json!("buy"), json!(0.01), json!(50000.0)]
            );
            Reply::Ok(json!({ "id": "42", "status": "open" }))
        }
        other => Reply::Error(format!("unexpected {}", other)),
    })
    .await;

    let credential = Credential::new("binance")
        .api_key("key")
        .secret("shh")
        .uid("   ");
    let balance = client.fetch_balance(&credential).await.unwrap();
    assert_eq!(balance["BTC"]["free"], json!(0.5));

    let order = client
        .create_order(
            &credential,
            "BTC/USDT",
            ccxt_bridge::types::OrderType::Limit,
            ccxt_bridge::types::Side::Buy,
            0.01,
            Some(50000.0),
        )
        .await
        .unwrap();
    assert_eq!(order["id"], json!("42"));

    // requirement sets are looked up once per exchange
    assert_eq!(lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn capabilities_and_timeframes() {
    let client = client(|_, function, _| match function {
        "exchanges" => Reply::Ok(json!(["binance", "kraken"])),
        "has" => Reply::Ok(json!({ "fetchTickers": true, "fetchOHLCV": "emulated" })),
        "timeframes" => Reply::Ok(json!({ "1m": "1", "1h": "60", "1d": "1440" })),
        _ => Reply::Ok(Value::Null),
    })
    .await;

    assert_eq!(client.exchanges().await.unwrap(), vec!["binance", "kraken"]);
    let has = client.exchange_capabilities("kraken").await.unwrap();
    assert_eq!(has["fetchOHLCV"], json!("emulated"));
    assert_eq!(
        client.timeframes("kraken").await.unwrap(),
        vec!["1d", "1h", "1m"]
    );
}

#[tokio::test]
async fn raw_results_pass_through() {
    let client = client(|_, function, _| match function {
        "fetchTime" => Reply::Ok(json!(1_736_121_600_000i64)),
        "fetchFundingRate" => Reply::Ok(json!({ "fundingRate": 0.0001, "info": {} })),
        _ => Reply::Ok(Value::Null),
    })
    .await;

    assert_eq!(client.fetch_time("binance").await.unwrap(), 1_736_121_600_000);
    let rate = client
        .fetch_funding_rate("binance", "BTC/USDT:USDT")
        .await
        .unwrap();
    // raw JSON keeps library casing
    assert_eq!(rate["fundingRate"], json!(0.0001));
}

/// Needs Node.js with ccxt installed and network access.
#[tokio::test]
#[ignore]
async fn live_kraken_ticker() {
    let config = ccxt_bridge::config::BridgeConfig::load().unwrap();
    let pool = WorkerPool::start(
        PoolConfig {
            size: 1,
            ..config.pool_config()
        },
        Arc::new(config.spawner()),
    )
    .await
    .unwrap();
    let client = ExchangeClient::new(Arc::new(pool));
    let ticker = client.fetch_ticker("kraken", "BTC", "USD").await.unwrap();
    assert!(ticker.last.unwrap_or_default() > 0.0);
    client.pool().shutdown().await;
}
