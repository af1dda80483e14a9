mod support;

use std::sync::Arc;
use std::time::Duration;

use quant_gateway::alerts::{
    AlertFeed, AlertKind, AlertProcessor, AnomalyFeed, JsonFeed, Severity,
};
use quant_gateway::db::{MemoryStore, Store};
use quant_gateway::events::bus::{EventBus, GatewayEvent};
use quant_gateway::feeds::PolygonClient;

use support::{config_for, spawn_upstream};

#[tokio::test]
async fn feed_items_are_stored_and_notified_once() {
    let upstream = spawn_upstream().await;
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(EventBus::new(64));
    let mut events = bus.subscribe();
    let processor = AlertProcessor::new(store.clone(), bus.clone(), 50);
    let feed = JsonFeed::new(
        AlertKind::EconomicCalendar,
        format!("{upstream}/feeds/calendar"),
        Duration::from_secs(5),
    )
    .unwrap();

    let first = processor.run_feed(&feed).await.unwrap();
    assert_eq!(first.fetched, 2);
    assert_eq!(first.appended, 2);
    assert_eq!(first.notified, 2);

    let second = processor.run_feed(&feed).await.unwrap();
    assert_eq!(second.fetched, 2);
    assert_eq!(second.appended, 0);
    assert_eq!(second.notified, 0);

    let rows = store
        .recent_alerts(Some(AlertKind::EconomicCalendar), 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.notified && r.notified_at.is_some()));

    let cpi = rows
        .iter()
        .find(|r| r.external_id == "economic_calendar:cpi-2026-10")
        .unwrap();
    assert_eq!(cpi.severity, Severity::Critical.as_str());

    let mut raised = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, GatewayEvent::AlertRaised { .. }) {
            raised += 1;
        }
    }
    assert_eq!(raised, 2);
}

#[tokio::test]
async fn unreachable_feed_surfaces_an_error_without_writing() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(EventBus::new(8));
    let processor = AlertProcessor::new(store.clone(), bus, 50);
    let feed = JsonFeed::new(
        AlertKind::WhiteHouse,
        format!("{}/feed", support::DEAD_URL),
        Duration::from_secs(2),
    )
    .unwrap();

    assert_eq!(feed.kind(), AlertKind::WhiteHouse);
    assert!(processor.run_feed(&feed).await.is_err());
    assert!(store.recent_alerts(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn anomaly_feed_flags_large_moves_once_per_session() {
    let upstream = spawn_upstream().await;
    let polygon = PolygonClient::new(&config_for(&upstream).polygon).unwrap();
    let symbols = vec!["AAPL".to_string(), "ZZZZ".to_string()];

    // AAPL opened at 98 and closed at 100: about +2.04%.
    let quiet = AnomalyFeed::new(polygon.clone(), symbols.clone(), 5.0, None);
    assert!(quiet.fetch().await.unwrap().is_empty());

    let feed = AnomalyFeed::new(polygon, symbols, 2.0, Some(2));
    let items = feed.fetch().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, AlertKind::Anomaly);
    assert_eq!(items[0].severity, Severity::Warning);
    assert!(items[0].external_id.starts_with("anomaly:AAPL:"));

    let store = Arc::new(MemoryStore::new());
    let processor = AlertProcessor::new(store.clone(), Arc::new(EventBus::new(8)), 50);
    assert_eq!(processor.run_feed(&feed).await.unwrap().appended, 1);
    assert_eq!(processor.run_feed(&feed).await.unwrap().appended, 0);
}

#[tokio::test]
async fn feeds_run_on_spawned_tasks() {
    let upstream = spawn_upstream().await;
    let polygon = PolygonClient::new(&config_for(&upstream).polygon).unwrap();
    let feed: Arc<dyn AlertFeed> = Arc::new(AnomalyFeed::new(
        polygon,
        vec!["AAPL".to_string()],
        2.0,
        None,
    ));
    let store = Arc::new(MemoryStore::new());
    let processor = Arc::new(AlertProcessor::new(store.clone(), Arc::new(EventBus::new(8)), 50));

    let report = tokio::spawn(async move { processor.run_feed(feed.as_ref()).await })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.appended, 1);
    assert_eq!(store.recent_alerts(Some(AlertKind::Anomaly), 10).await.unwrap().len(), 1);
}
