use super::*;
use serde_json::json;

fn rows<R: serde::de::DeserializeOwned>(value: serde_json::Value) -> Vec<R> {
    serde_json::from_value(value).expect("rows")
}

#[test]
fn holdings_sum_value_and_split_allocation() {
    let holdings: Vec<Holding> = rows(json!([
        { "id": 1, "coin": "BTC", "usdtValue": 100.0, "amount": 2.0, "costPrice": 40.0 },
        { "id": 2, "coin": "ETH", "usdtValue": 50.0 }
    ]));

    let stats = Holding::derive_stats(&holdings);

    assert_eq!(stats.count(ROW_COUNT), Some(2));
    assert_eq!(stats.number(TOTAL_USDT_VALUE), Some(150.0));
    assert_eq!(stats.number(TOTAL_COST_BASIS), Some(80.0));
    let allocation = stats.breakdown(ALLOCATION_PCT).expect("allocation");
    assert!((allocation["BTC"] - 200.0 / 3.0).abs() < 1e-9);
    assert!((allocation["ETH"] - 100.0 / 3.0).abs() < 1e-9);
}

#[test]
fn holdings_without_value_count_as_zero() {
    let holdings: Vec<Holding> = rows(json!([
        { "id": 1, "coin": "BTC" },
        { "id": 2, "coin": "DOGE", "usdtValue": 0.0 }
    ]));

    let stats = Holding::derive_stats(&holdings);

    assert_eq!(stats.number(TOTAL_USDT_VALUE), Some(0.0));
    assert!(stats.breakdown(ALLOCATION_PCT).expect("allocation").is_empty());
}

#[test]
fn empty_page_yields_zeroed_stats() {
    let stats = Holding::derive_stats(&[]);

    assert_eq!(stats.count(ROW_COUNT), Some(0));
    assert_eq!(stats.number(TOTAL_USDT_VALUE), Some(0.0));
    assert!(CryptoMetrics::derive_stats(&[])
        .number(AVERAGE_CHANGE_24H)
        .is_none());
}

#[test]
fn messages_tally_sentiment_and_coin() {
    let messages: Vec<CryptoMessage> = rows(json!([
        { "id": 1, "coin": "BTC", "content": "etf inflows", "sentiment": "POSITIVE" },
        { "id": 2, "coin": "BTC", "content": "hashrate dip", "sentiment": "NEGATIVE" },
        { "id": 3, "coin": "ETH", "content": "upgrade", "sentiment": "POSITIVE" },
        { "id": 4, "coin": "SOL", "content": "rumour" }
    ]));

    let stats = CryptoMessage::derive_stats(&messages);

    let sentiment = stats.tally(SENTIMENT).expect("sentiment");
    assert_eq!(sentiment.get("POSITIVE"), Some(&2));
    assert_eq!(sentiment.get("NEGATIVE"), Some(&1));
    assert_eq!(sentiment.get("UNSET"), Some(&1));
    let by_coin = stats.tally(MESSAGES_BY_COIN).expect("by coin");
    assert_eq!(by_coin.get("BTC"), Some(&2));
    assert_eq!(by_coin.len(), 3);
}

#[test]
fn reports_rate_only_audited_rows() {
    let reports: Vec<InvestmentReport> = rows(json!([
        { "id": 1, "status": "0" },
        { "id": 2, "status": "1" },
        { "id": 3, "status": "1" },
        { "id": 4, "status": "2" },
        { "id": 5, "status": "1" }
    ]));

    let stats = InvestmentReport::derive_stats(&reports);

    let status = stats.tally(REPORT_STATUS).expect("status");
    assert_eq!(status.get("pending"), Some(&1));
    assert_eq!(status.get("approved"), Some(&3));
    assert_eq!(status.get("rejected"), Some(&1));
    assert_eq!(stats.number(APPROVAL_RATE_PCT), Some(75.0));

    let pending_only: Vec<InvestmentReport> = rows(json!([{ "id": 1, "status": "0" }]));
    assert!(InvestmentReport::derive_stats(&pending_only)
        .number(APPROVAL_RATE_PCT)
        .is_none());
}

#[test]
fn metrics_count_movers_and_average_change() {
    let metrics: Vec<CryptoMetrics> = rows(json!([
        { "id": 1, "symbol": "BTC", "marketCap": 1000.0, "change24h": 2.0 },
        { "id": 2, "symbol": "ETH", "marketCap": 500.0, "change24h": -4.0 },
        { "id": 3, "symbol": "SOL", "change24h": 5.0 },
        { "id": 4, "symbol": "XRP" }
    ]));

    let stats = CryptoMetrics::derive_stats(&metrics);

    assert_eq!(stats.count(ADVANCING), Some(2));
    assert_eq!(stats.count(DECLINING), Some(1));
    assert_eq!(stats.number(TOTAL_MARKET_CAP), Some(1500.0));
    assert_eq!(stats.number(AVERAGE_CHANGE_24H), Some(1.0));
}

#[test]
fn derived_stats_serialize_as_flat_object() {
    let holdings: Vec<Holding> = rows(json!([{ "id": 1, "coin": "BTC", "usdtValue": 10.0 }]));

    let value = serde_json::to_value(Holding::derive_stats(&holdings)).expect("serialize");

    assert_eq!(value["row_count"], json!(1));
    assert_eq!(value["total_usdt_value"], json!(10.0));
    assert_eq!(value["allocation_pct"]["BTC"], json!(100.0));
}
