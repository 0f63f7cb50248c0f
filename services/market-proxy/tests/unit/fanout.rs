//! Currency fan-out tests against a mock API

use pretty_assertions::assert_eq;
use serde_json::{Number, json};
use std::sync::Arc;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

use market_proxy::{
    config::MergeStrategy,
    errors::ProxyError,
    fanout::CurrencyFanoutMerger,
    models::AssetRecord,
    upstream::UpstreamClient,
};

use super::helpers::{market_row, mount_markets};

fn merger(server: &MockServer, strategy: MergeStrategy) -> CurrencyFanoutMerger {
    let config = crate::create_test_config(&server.uri());
    let upstream = UpstreamClient::new(&config.upstream).unwrap();
    CurrencyFanoutMerger::new(Arc::new(upstream), strategy)
}

fn currencies(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| (*c).to_string()).collect()
}

fn price(record: &AssetRecord, currency: &str) -> Option<Number> {
    record.current_price.get(currency).cloned().flatten()
}

#[tokio::test]
async fn test_every_record_priced_in_every_currency() {
    crate::init_test_env();
    let server = MockServer::start().await;
    mount_markets(
        &server,
        "usd",
        json!([market_row("bitcoin", 50000), market_row("ethereum", 3000)]),
        1,
    )
    .await;
    mount_markets(
        &server,
        "brl",
        json!([market_row("ethereum", 15000), market_row("bitcoin", 250000)]),
        1,
    )
    .await;

    let merged = merger(&server, MergeStrategy::FirstCurrency)
        .fetch_merged(&currencies(&["usd", "brl"]), &[])
        .await
        .unwrap();

    let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["bitcoin", "ethereum"]);
    for record in &merged {
        assert_eq!(record.current_price.len(), 2);
    }
    assert_eq!(price(&merged[0], "usd"), Some(Number::from(50000)));
    assert_eq!(price(&merged[0], "brl"), Some(Number::from(250000)));
    assert_eq!(price(&merged[1], "brl"), Some(Number::from(15000)));
}

#[tokio::test]
async fn test_forwarded_params_reach_every_call() {
    let server = MockServer::start().await;
    for currency in ["usd", "eur"] {
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .and(query_param("vs_currency", currency))
            .and(query_param("ids", "bitcoin"))
            .and(query_param("per_page", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([market_row("bitcoin", 1)])))
            .expect(1)
            .mount(&server)
            .await;
    }

    let forwarded = vec![
        ("ids".to_string(), "bitcoin".to_string()),
        ("per_page".to_string(), "10".to_string()),
    ];
    let merged = merger(&server, MergeStrategy::FirstCurrency)
        .fetch_merged(&currencies(&["usd", "eur"]), &forwarded)
        .await
        .unwrap();

    assert_eq!(merged.len(), 1);
}

#[tokio::test]
async fn test_assets_missing_from_first_currency_are_dropped() {
    let server = MockServer::start().await;
    mount_markets(&server, "usd", json!([market_row("bitcoin", 50000)]), 1).await;
    mount_markets(
        &server,
        "brl",
        json!([market_row("bitcoin", 250000), market_row("dogecoin", 1)]),
        1,
    )
    .await;

    let merged = merger(&server, MergeStrategy::FirstCurrency)
        .fetch_merged(&currencies(&["usd", "brl"]), &[])
        .await
        .unwrap();

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, "bitcoin");
}

#[tokio::test]
async fn test_asset_missing_from_later_currency_gets_null_price() {
    let server = MockServer::start().await;
    mount_markets(
        &server,
        "usd",
        json!([market_row("bitcoin", 50000), market_row("tether", 1)]),
        1,
    )
    .await;
    mount_markets(&server, "brl", json!([market_row("bitcoin", 250000)]), 1).await;

    let merged = merger(&server, MergeStrategy::FirstCurrency)
        .fetch_merged(&currencies(&["usd", "brl"]), &[])
        .await
        .unwrap();

    let value = serde_json::to_value(&merged[1]).unwrap();
    assert_eq!(value["current_price"], json!({ "usd": 1, "brl": null }));
}

#[tokio::test]
async fn test_union_keeps_assets_from_every_currency() {
    let server = MockServer::start().await;
    mount_markets(&server, "usd", json!([market_row("bitcoin", 50000)]), 1).await;
    mount_markets(
        &server,
        "brl",
        json!([market_row("bitcoin", 250000), market_row("dogecoin", 1)]),
        1,
    )
    .await;

    let merged = merger(&server, MergeStrategy::Union)
        .fetch_merged(&currencies(&["usd", "brl"]), &[])
        .await
        .unwrap();

    let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["bitcoin", "dogecoin"]);
    assert_eq!(merged[1].current_price.get("usd"), Some(&None));
}

#[tokio::test]
async fn test_single_failure_fails_whole_fanout() {
    let server = MockServer::start().await;
    // Sibling calls may be cancelled before they reach the server
    mount_markets(&server, "usd", json!([market_row("bitcoin", 50000)]), 0..=1).await;
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .and(query_param("vs_currency", "brl"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "upstream exploded" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .and(query_param("vs_currency", "eur"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([market_row("bitcoin", 45000)])))
        .mount(&server)
        .await;

    let err = merger(&server, MergeStrategy::FirstCurrency)
        .fetch_merged(&currencies(&["usd", "brl", "eur"]), &[])
        .await
        .unwrap_err();

    assert_eq!(err, ProxyError::upstream(500, "upstream exploded"));
}
