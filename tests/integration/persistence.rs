//! Label persistence through the SQLite store.

use chrono::{Duration, Utc};
use std::sync::Arc;

use address_tagger::engine::TaggingEngine;
use address_tagger::store::sqlite::SqliteStore;
use address_tagger::store::{LabelStore, MarketRecord};
use address_tagger::types::{LabelName, LabelResult, MarketCategory};

use crate::fixtures::*;

async fn sqlite() -> Arc<SqliteStore> {
    // in-memory databases are per connection
    let store = SqliteStore::connect("sqlite::memory:", 1).await.unwrap();
    store.migrate().await.unwrap();
    store.insert_entity(&profile(1, 20, 0.70)).await.unwrap();
    Arc::new(store)
}

fn engine(rules: &str, store: &Arc<SqliteStore>) -> TaggingEngine {
    TaggingEngine::from_config(&config(rules), store.clone(), store.clone(), store.clone())
}

#[tokio::test]
async fn test_retagging_updates_the_single_row_in_place() {
    let store = sqlite().await;

    engine(HIGH_WIN_RATE, &store).tag_all(None).await.unwrap();
    let first = store.labels_for(1).await.unwrap();
    assert_eq!(first.len(), 1);
    assert!((first[0].confidence_score - 1.0 / 3.0).abs() < 1e-6);

    // same entity, lower threshold: (0.70 - 0.40) / (1 - 0.40)
    let lowered = HIGH_WIN_RATE.replace("0.55", "0.40");
    engine(&lowered, &store).tag_all(None).await.unwrap();
    let second = store.labels_for(1).await.unwrap();
    assert_eq!(second.len(), 1);
    assert!((second[0].confidence_score - 0.5).abs() < 1e-6);
    assert_eq!(second[0].created_at, first[0].created_at);
    assert!(second[0].updated_at >= first[0].updated_at);

    // and running it again changes nothing
    engine(&lowered, &store).tag_all(None).await.unwrap();
    let third = store.labels_for(1).await.unwrap();
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].confidence_score, second[0].confidence_score);
}

#[tokio::test]
async fn test_update_replaces_automatic_labels_and_keeps_manual_ones() {
    let store = sqlite().await;
    store
        .insert_market(&MarketRecord {
            id: 1,
            title: "Who wins the 2028 election?".into(),
            category: Some(MarketCategory::Politics),
            created_at: Some(Utc::now() - Duration::days(60)),
            end_date: None,
        })
        .await
        .unwrap();
    store
        .insert_trade(1, &trade(1, 1, Utc::now() - Duration::days(2)), 0.0, None)
        .await
        .unwrap();
    store
        .insert_manual_label(1, &LabelResult::new(LabelName::Bot, 0.9))
        .await
        .unwrap();
    store
        .upsert_labels(1, &[LabelResult::new(LabelName::LargeVolume, 0.8)])
        .await
        .unwrap();

    let summary = engine(HIGH_WIN_RATE, &store).update_recent(7).await.unwrap();
    assert_eq!(summary.entities_total, 1);
    assert_eq!(summary.entities_labelled, 1);

    let labels = store.labels_for(1).await.unwrap();
    let mut names: Vec<(&str, bool)> = labels
        .iter()
        .map(|l| (l.label_name.as_str(), l.is_manual))
        .collect();
    names.sort();
    assert_eq!(names, vec![("bot", true), ("high win rate", false)]);
}

#[tokio::test]
async fn test_update_ignores_inactive_entities() {
    let store = sqlite().await;
    let summary = engine(HIGH_WIN_RATE, &store).update_recent(7).await.unwrap();
    assert_eq!(summary.entities_total, 0);
    assert!(store.labels_for(1).await.unwrap().is_empty());
}
