mod support;

use quant_gateway::error::FetchErrorKind;
use quant_gateway::feeds::{fetch_batch_prices, PolygonClient};

use support::{config_for, spawn_upstream, DEAD_URL};

#[tokio::test]
async fn previous_close_is_normalized() {
    let upstream = spawn_upstream().await;
    let client = PolygonClient::new(&config_for(&upstream).polygon).unwrap();

    let quote = client.previous_close(" aapl ").await.unwrap();
    assert_eq!(quote.symbol, "AAPL");
    assert_eq!(quote.price, 100.0);
    assert!((quote.change - 2.0).abs() < 1e-9);
    assert!(quote.as_of.is_some());
}

#[tokio::test]
async fn rejected_key_names_the_provider() {
    let upstream = spawn_upstream().await;
    let mut config = config_for(&upstream);
    config.polygon.api_key = "wrong".into();
    let client = PolygonClient::new(&config.polygon).unwrap();

    let err = client.previous_close("AAPL").await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::InvalidKey);
    let msg = err.to_string();
    assert!(msg.contains("Invalid"), "{msg}");
    assert!(msg.contains("Polygon"), "{msg}");
}

#[tokio::test]
async fn unknown_symbol_is_not_found() {
    let upstream = spawn_upstream().await;
    let client = PolygonClient::new(&config_for(&upstream).polygon).unwrap();

    let err = client.previous_close("ZZZZ").await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::NotFound);
    assert!(err.to_string().contains("ZZZZ"));
}

#[tokio::test]
async fn bad_input_fails_before_any_request() {
    // Nothing listens on the dead port, so a Network error would mean a request went out.
    let mut config = config_for(DEAD_URL);
    config.polygon.base_url = DEAD_URL.into();
    let client = PolygonClient::new(&config.polygon).unwrap();

    let err = client.previous_close("  ").await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::InvalidInput);

    let err = client.previous_close("AA PL").await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::InvalidInput);
}

#[tokio::test]
async fn unreachable_upstream_is_a_network_error() {
    let mut config = config_for(DEAD_URL);
    config.polygon.base_url = DEAD_URL.into();
    let client = PolygonClient::new(&config.polygon).unwrap();

    let err = client.previous_close("AAPL").await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::Network);
}

#[tokio::test]
async fn batch_settles_every_symbol() {
    let upstream = spawn_upstream().await;
    let client = PolygonClient::new(&config_for(&upstream).polygon).unwrap();
    let symbols = vec!["AAPL".to_string(), "bad".to_string()];

    let batch = fetch_batch_prices(&client, &symbols, None).await.unwrap();
    assert_eq!(batch.success_count, 1);
    assert_eq!(batch.error_count, 1);
    assert_eq!(batch.prices["AAPL"].price, 100.0);
    assert!(batch.errors.contains_key("BAD"));
}

#[tokio::test]
async fn batch_respects_a_concurrency_cap() {
    let upstream = spawn_upstream().await;
    let client = PolygonClient::new(&config_for(&upstream).polygon).unwrap();
    let symbols: Vec<String> = ["AAPL", "aapl", "MSFT"].iter().map(|s| s.to_string()).collect();

    let batch = fetch_batch_prices(&client, &symbols, Some(1)).await.unwrap();
    // Duplicates collapse onto one key.
    assert_eq!(batch.success_count, 1);
    assert_eq!(batch.error_count, 1);
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let client = PolygonClient::new(&config_for(DEAD_URL).polygon).unwrap();
    let err = fetch_batch_prices(&client, &[], None).await.unwrap_err();
    assert_eq!(err.kind(), FetchErrorKind::InvalidInput);
}

#[tokio::test]
async fn batch_fetch_runs_on_a_spawned_task() {
    let upstream = spawn_upstream().await;
    let client = PolygonClient::new(&config_for(&upstream).polygon).unwrap();
    let symbols = vec!["AAPL".to_string(), "ZZZZ".to_string(), "aapl".to_string()];

    let batch = tokio::spawn(async move { fetch_batch_prices(&client, &symbols, Some(1)).await })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.success_count, 1);
    assert_eq!(batch.error_count, 1);
    assert_eq!(batch.prices["AAPL"].price, 100.0);
}
