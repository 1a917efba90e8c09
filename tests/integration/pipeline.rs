//! Engine behaviour over the in-memory store.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

use address_tagger::capability::fixture::FixtureCapabilities;
use address_tagger::capability::mock::SeededMockProvider;
use address_tagger::capability::UnwiredCapabilities;
use address_tagger::config::AppConfig;
use address_tagger::engine::TaggingEngine;
use address_tagger::store::memory::InMemoryStore;
use address_tagger::store::LabelStore;
use address_tagger::taggers::HEURISTIC_CONFIDENCE;
use address_tagger::types::{LabelCategory, LabelName, PatternStats};

use crate::fixtures::*;

fn engine(cfg: &AppConfig, store: Arc<InMemoryStore>) -> TaggingEngine {
    TaggingEngine::from_config(cfg, store.clone(), store, Arc::new(UnwiredCapabilities))
}

#[tokio::test]
async fn test_high_win_rate_end_to_end() {
    let store = Arc::new(InMemoryStore::new().with_entity(profile(1, 20, 0.70)));
    let engine = engine(&config(HIGH_WIN_RATE), store.clone());

    let labels = engine.tag_entity(1).await.unwrap().unwrap();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].category, LabelCategory::TradingStyle);
    assert_eq!(labels[0].name, LabelName::HighWinRate);
    assert!((labels[0].confidence - 1.0 / 3.0).abs() < 1e-6);

    engine.tag_all(None).await.unwrap();
    let stored = store.labels_for(1).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].category, "trading style");
    assert_eq!(stored[0].label_name, "high win rate");
    assert!(!stored[0].is_manual);
}

#[tokio::test]
async fn test_failing_evaluator_only_drops_its_own_labels() {
    let mut whale = profile(1, 200, 0.70);
    whale.total_volume = 2_000_000.0;
    let inner = Arc::new(InMemoryStore::new().with_entity(whale));
    let cfg = config(&format!("{HIGH_WIN_RATE}{INSTITUTION}"));

    let healthy = TaggingEngine::from_config(&cfg, inner.clone(), inner.clone(), Arc::new(UnwiredCapabilities));
    let names: Vec<LabelName> = healthy.tag_entity(1).await.unwrap().unwrap().iter().map(|l| l.name).collect();
    assert_eq!(names, vec![LabelName::HighWinRate, LabelName::Institution]);

    // the special-label evaluator reads the trade history first and fails
    let flaky = Arc::new(FlakyStore::new(inner.clone()).break_trades(1));
    let degraded = TaggingEngine::from_config(&cfg, flaky, inner, Arc::new(UnwiredCapabilities));
    let names: Vec<LabelName> = degraded.tag_entity(1).await.unwrap().unwrap().iter().map(|l| l.name).collect();
    assert_eq!(names, vec![LabelName::HighWinRate]);
}

#[tokio::test]
async fn test_failing_entity_is_skipped_and_batch_continues() {
    let inner = Arc::new(
        InMemoryStore::new()
            .with_entity(profile(1, 20, 0.70))
            .with_entity(profile(2, 20, 0.80))
            .with_entity(profile(3, 20, 0.90)),
    );
    let flaky = Arc::new(FlakyStore::new(inner.clone()).break_profile(2));
    let engine = TaggingEngine::from_config(
        &config(HIGH_WIN_RATE),
        flaky,
        inner.clone(),
        Arc::new(UnwiredCapabilities),
    );

    let summary = engine.tag_all(None).await.unwrap();
    assert_eq!(summary.entities_total, 3);
    assert_eq!(summary.entities_processed, 2);
    assert_eq!(summary.entities_skipped, 1);
    assert_eq!(summary.entities_labelled, 2);
    assert!(inner.labels_for(2).await.unwrap().is_empty());
    assert_eq!(inner.labels_for(3).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_capability_falls_back_to_flat_confidence() {
    let now = Utc::now();
    let store = (0..25).fold(InMemoryStore::new().with_entity(profile(1, 25, 0.5)), |store, i| {
        store.with_trade(1, trade(i, 1, now - Duration::hours(i + 1)), 0.0)
    });
    let store = Arc::new(store);

    let labels = engine(&config(BOT), store.clone()).tag_entity(1).await.unwrap().unwrap();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].name, LabelName::Bot);
    assert_eq!(labels[0].confidence, HEURISTIC_CONFIDENCE);

    // with pattern statistics wired the graded path runs instead
    let stats = PatternStats {
        timing_variance: 30.0,
        amount_variance: 0.0,
        distinct_amounts: 1,
        mean_response_secs: 1.0,
    };
    let caps = FixtureCapabilities::new().with_pattern_stats(1, stats);
    let engine = TaggingEngine::from_config(&config(BOT), store.clone(), store, Arc::new(caps));
    let labels = engine.tag_entity(1).await.unwrap().unwrap();
    assert_eq!(labels.len(), 1);
    let expected = (0.5 + 2.0 / 3.0 + 0.8) / 3.0;
    assert!(approx(labels[0].confidence, expected));
}

#[tokio::test]
async fn test_zero_trade_entity_gets_no_count_dependent_labels() {
    let cfg = AppConfig::load("config.toml").unwrap();
    let store = Arc::new(InMemoryStore::new().with_entity(profile(1, 0, 0.0)));
    let labels = engine(&cfg, store).tag_entity(1).await.unwrap().unwrap();
    let count_dependent = [
        LabelCategory::TradingStyle,
        LabelCategory::Strategy,
        LabelCategory::RiskAppetite,
    ];
    assert!(
        labels.iter().all(|l| !count_dependent.contains(&l.category)),
        "unexpected labels: {labels:?}"
    );
}

#[tokio::test]
async fn test_repeated_evaluation_is_identical() {
    let cfg = AppConfig::load("config.toml").unwrap();
    let as_of = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
    let store = (0..30).fold(InMemoryStore::new().with_entity(profile(1, 30, 0.72)), |store, i| {
        store.with_trade(1, trade(i, i % 4 + 1, as_of - Duration::days(i * 3 + 1)), 10.0)
    });
    let store = Arc::new(store);
    let provider = Arc::new(SeededMockProvider::new(as_of));
    let engine = TaggingEngine::from_config(&cfg, store.clone(), store, provider);

    let entity = profile(1, 30, 0.72);
    let first = engine.evaluate(&entity, as_of).await;
    let second = engine.evaluate(&entity, as_of).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_batch_summary_and_statistics() {
    let store = Arc::new(
        InMemoryStore::new()
            .with_entity(profile(1, 20, 0.70))
            .with_entity(profile(2, 20, 0.50))
            .with_entity(profile(3, 40, 0.90)),
    );
    let engine = engine(&config(HIGH_WIN_RATE), store);

    let summary = engine.tag_all(None).await.unwrap();
    assert_eq!(summary.entities_total, 3);
    assert_eq!(summary.entities_processed, 3);
    assert_eq!(summary.entities_skipped, 0);
    assert_eq!(summary.entities_labelled, 2);
    assert_eq!(summary.total_labels, 2);
    assert_eq!(summary.distribution.get("high win rate"), Some(&2));

    let stats = engine.report().await.unwrap();
    assert_eq!(stats.total_entities, 3);
    assert_eq!(stats.labelled_entities, 2);
    assert!(approx(stats.coverage, 2.0 / 3.0));
    assert!(approx(stats.avg_labels_per_entity, 1.0));
    assert_eq!(stats.distribution[0].label_name, "high win rate");
    assert_eq!(stats.distribution[0].count, 2);
}

#[tokio::test]
async fn test_export_writes_every_stored_label() {
    let store = Arc::new(
        InMemoryStore::new()
            .with_entity(profile(1, 20, 0.70))
            .with_entity(profile(2, 20, 0.90)),
    );
    let engine = engine(&config(HIGH_WIN_RATE), store);
    engine.tag_all(None).await.unwrap();

    let dir = std::env::temp_dir().join(format!("tagger-it-{}", uuid::Uuid::new_v4()));
    assert_eq!(engine.export_csv(&dir.join("labels.csv")).await.unwrap(), 2);
    assert_eq!(engine.export_json(&dir.join("labels.json")).await.unwrap(), 2);

    let csv = std::fs::read_to_string(dir.join("labels.csv")).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.lines().nth(1).unwrap().starts_with("1,trading style,high win rate,"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("labels.json")).unwrap()).unwrap();
    assert_eq!(json.as_array().map(Vec::len), Some(2));
    assert_eq!(json[1]["entity_id"], 2);

    std::fs::remove_dir_all(&dir).unwrap();
}
