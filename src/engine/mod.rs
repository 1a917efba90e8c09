//! Core engine: the per-entity evaluate → aggregate → persist loop.
//!
//! `TaggingEngine` runs every registered evaluator against an entity and
//! concatenates what they return. A failing evaluator is logged and
//! contributes nothing; a failing entity is logged and counted as skipped.
//! Batches run up to `engine.concurrency` entities at a time and persist
//! each entity's labels in its own transaction, so an interrupted batch
//! keeps everything written before the interruption.

pub mod export;
pub mod report;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::capability::CapabilityProvider;
use crate::confidence::ConfidenceCalculator;
use crate::config::{AppConfig, EngineConfig};
use crate::store::{LabelStatistics, LabelStore, ProfileStore};
use crate::taggers::{days_before, default_taggers, Tagger, TaggerContext};
use crate::types::{EntityProfile, LabelResult, TaggerError};

pub use report::BatchSummary;

/// How a batch writes an entity's fresh labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Add or refresh labels; stale automatic labels stay.
    Upsert,
    /// Swap the entity's automatic labels for the fresh set, even if empty.
    Replace,
}

pub struct TaggingEngine {
    profiles: Arc<dyn ProfileStore>,
    labels: Arc<dyn LabelStore>,
    taggers: Vec<Arc<dyn Tagger>>,
    settings: EngineConfig,
}

impl TaggingEngine {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        labels: Arc<dyn LabelStore>,
        taggers: Vec<Arc<dyn Tagger>>,
        settings: EngineConfig,
    ) -> Self {
        Self {
            profiles,
            labels,
            taggers,
            settings,
        }
    }

    /// Wire the nine standard evaluators from a loaded configuration.
    pub fn from_config(
        cfg: &AppConfig,
        profiles: Arc<dyn ProfileStore>,
        labels: Arc<dyn LabelStore>,
        capabilities: Arc<dyn CapabilityProvider>,
    ) -> Self {
        let confidence = ConfidenceCalculator::from_config(&cfg.confidence);
        let ctx = TaggerContext::new(profiles.clone(), capabilities, confidence);
        let taggers = default_taggers(&ctx, &cfg.tags);
        info!(
            evaluators = taggers.len(),
            method = ?confidence.method(),
            concurrency = cfg.engine.concurrency,
            "Tagging engine ready"
        );
        Self::new(profiles, labels, taggers, cfg.engine.clone())
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    // -- Single entity ----------------------------------------------------

    /// Run every evaluator against one profile.
    ///
    /// Evaluators run concurrently; their results are concatenated in
    /// registration order. An evaluator error drops that evaluator's labels
    /// only.
    pub async fn evaluate(&self, profile: &EntityProfile, as_of: DateTime<Utc>) -> Vec<LabelResult> {
        let outcomes = join_all(self.taggers.iter().map(|t| t.evaluate(profile, as_of))).await;

        let mut labels = Vec::new();
        for (tagger, outcome) in self.taggers.iter().zip(outcomes) {
            match outcome {
                Ok(found) => {
                    debug!(
                        evaluator = tagger.name(),
                        entity_id = profile.id,
                        labels = found.len(),
                        "Evaluator finished"
                    );
                    labels.extend(found);
                }
                Err(e) => {
                    error!(
                        evaluator = tagger.name(),
                        entity_id = profile.id,
                        error = %e,
                        "Evaluator failed, dropping its labels"
                    );
                }
            }
        }
        labels
    }

    /// Evaluate one entity without persisting anything.
    ///
    /// `Ok(None)` when the entity does not exist.
    pub async fn tag_entity(&self, entity_id: i64) -> Result<Option<Vec<LabelResult>>> {
        let profile = self
            .profiles
            .entity(entity_id)
            .await
            .with_context(|| format!("failed to load entity {entity_id}"))?;
        let Some(profile) = profile else {
            return Ok(None);
        };
        Ok(Some(self.evaluate(&profile, Utc::now()).await))
    }

    // -- Batches ----------------------------------------------------------

    /// Tag every entity (or the first `limit` by id) and upsert the results.
    pub async fn tag_all(&self, limit: Option<usize>) -> Result<BatchSummary> {
        let ids = self
            .profiles
            .entity_ids(limit)
            .await
            .context("failed to list entities")?;
        info!(count = ids.len(), limit = ?limit, "Tagging all entities");
        Ok(self.run_batch(ids, WriteMode::Upsert).await)
    }

    /// Re-tag entities that traded in the last `days` days, replacing their
    /// automatic labels. Manual labels are kept.
    pub async fn update_recent(&self, days: u32) -> Result<BatchSummary> {
        let since = days_before(Utc::now(), i64::from(days))?;
        let ids = self
            .profiles
            .recently_active(since)
            .await
            .context("failed to list recently active entities")?;
        info!(count = ids.len(), days, "Updating recently active entities");
        Ok(self.run_batch(ids, WriteMode::Replace).await)
    }

    async fn run_batch(&self, ids: Vec<i64>, mode: WriteMode) -> BatchSummary {
        let mut summary = BatchSummary::start(ids.len());
        let progress_every = self.settings.progress_every.max(1);

        let mut outcomes = stream::iter(ids)
            .map(|id| async move { (id, self.process(id, mode).await) })
            .buffer_unordered(self.settings.concurrency.max(1));

        while let Some((id, outcome)) = outcomes.next().await {
            match outcome {
                Ok(labels) => summary.record(&labels),
                Err(e) => {
                    warn!(entity_id = id, error = %e, "Entity skipped");
                    summary.skip();
                }
            }
            if summary.handled() % progress_every == 0 {
                info!(
                    handled = summary.handled(),
                    total = summary.entities_total,
                    labels = summary.total_labels,
                    "Batch progress"
                );
            }
        }

        summary.finish();
        summary
    }

    async fn process(&self, entity_id: i64, mode: WriteMode) -> Result<Vec<LabelResult>> {
        let labels = self
            .tag_entity(entity_id)
            .await?
            .ok_or(TaggerError::EntityNotFound(entity_id))?;

        match mode {
            WriteMode::Upsert if labels.is_empty() => {}
            WriteMode::Upsert => self
                .labels
                .upsert_labels(entity_id, &labels)
                .await
                .with_context(|| format!("failed to store labels of entity {entity_id}"))?,
            WriteMode::Replace => self
                .labels
                .replace_labels(entity_id, &labels)
                .await
                .with_context(|| format!("failed to replace labels of entity {entity_id}"))?,
        }
        Ok(labels)
    }

    // -- Reporting & export -----------------------------------------------

    pub async fn report(&self) -> Result<LabelStatistics> {
        self.labels
            .statistics()
            .await
            .context("failed to compute label statistics")
    }

    /// Write every stored label to `path` as JSON; returns the record count.
    pub async fn export_json(&self, path: &Path) -> Result<usize> {
        let labels = self.labels.export_labels().await.context("failed to read labels")?;
        export::write_json(path, &labels)?;
        info!(path = %path.display(), records = labels.len(), "Labels exported as JSON");
        Ok(labels.len())
    }

    /// Write every stored label to `path` as CSV; returns the record count.
    pub async fn export_csv(&self, path: &Path) -> Result<usize> {
        let labels = self.labels.export_labels().await.context("failed to read labels")?;
        export::write_csv(path, &labels)?;
        info!(path = %path.display(), records = labels.len(), "Labels exported as CSV");
        Ok(labels.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::types::LabelName;
    use anyhow::bail;
    use async_trait::async_trait;

    struct Fixed(&'static str, Vec<LabelResult>);

    #[async_trait]
    impl Tagger for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn evaluate(&self, _profile: &EntityProfile, _as_of: DateTime<Utc>) -> Result<Vec<LabelResult>> {
            Ok(self.1.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl Tagger for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn evaluate(&self, _profile: &EntityProfile, _as_of: DateTime<Utc>) -> Result<Vec<LabelResult>> {
            bail!("query timed out")
        }
    }

    fn entity(id: i64) -> EntityProfile {
        EntityProfile {
            id,
            address: format!("0x{id:040x}"),
            total_trades: 10,
            win_rate: 0.5,
            avg_trade_size: 100.0,
            total_volume: 1_000.0,
        }
    }

    fn engine(store: Arc<InMemoryStore>, taggers: Vec<Arc<dyn Tagger>>) -> TaggingEngine {
        let settings = EngineConfig {
            concurrency: 2,
            progress_every: 1,
            update_lookback_days: 7,
        };
        TaggingEngine::new(store.clone(), store, taggers, settings)
    }

    #[tokio::test]
    async fn test_evaluator_failure_is_isolated() {
        let store = Arc::new(InMemoryStore::new().with_entity(entity(1)));
        let taggers: Vec<Arc<dyn Tagger>> = vec![
            Arc::new(Fixed("first", vec![LabelResult::new(LabelName::HighWinRate, 0.4)])),
            Arc::new(Broken),
            Arc::new(Fixed("last", vec![LabelResult::new(LabelName::Bot, 0.6)])),
        ];
        let labels = engine(store, taggers).tag_entity(1).await.unwrap().unwrap();
        let names: Vec<LabelName> = labels.iter().map(|l| l.name).collect();
        assert_eq!(names, vec![LabelName::HighWinRate, LabelName::Bot]);
    }

    #[tokio::test]
    async fn test_out_of_range_window_fails_only_its_evaluator() {
        use crate::config::{HighFrequencyRule, TradingStyleRules};
        use crate::taggers::{testing, TradingStyleTagger};

        let rules = TradingStyleRules {
            high_frequency: Some(HighFrequencyRule {
                enabled: true,
                lookback_days: 200_000_000,
                trades_per_day_threshold: 5.0,
            }),
            ..Default::default()
        };
        let store = Arc::new(InMemoryStore::new().with_entity(entity(1)));
        let taggers: Vec<Arc<dyn Tagger>> = vec![
            Arc::new(TradingStyleTagger::new(testing::unwired(InMemoryStore::new()), rules)),
            Arc::new(Fixed("last", vec![LabelResult::new(LabelName::Bot, 0.6)])),
        ];
        let labels = engine(store, taggers).tag_entity(1).await.unwrap().unwrap();
        let names: Vec<LabelName> = labels.iter().map(|l| l.name).collect();
        assert_eq!(names, vec![LabelName::Bot]);
    }

    #[tokio::test]
    async fn test_update_with_out_of_range_window_is_an_error() {
        let store = Arc::new(InMemoryStore::new().with_entity(entity(1)));
        assert!(engine(store, vec![]).update_recent(u32::MAX).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_entity_is_none() {
        let store = Arc::new(InMemoryStore::new());
        assert_eq!(engine(store, vec![]).tag_entity(42).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tag_all_persists_non_empty_sets() {
        let store = Arc::new(InMemoryStore::new().with_entity(entity(1)).with_entity(entity(2)));
        let taggers: Vec<Arc<dyn Tagger>> = vec![Arc::new(Fixed(
            "one",
            vec![LabelResult::new(LabelName::LargeVolume, 0.8)],
        ))];
        let engine = engine(store.clone(), taggers);

        let summary = engine.tag_all(None).await.unwrap();
        assert_eq!(summary.entities_total, 2);
        assert_eq!(summary.entities_processed, 2);
        assert_eq!(summary.entities_labelled, 2);
        assert_eq!(summary.distribution.get("large volume"), Some(&2));
        assert!(summary.finished_at.is_some());

        let stats = engine.report().await.unwrap();
        assert_eq!(stats.total_labels, 2);
        assert_eq!(stats.coverage, 1.0);
    }

    #[tokio::test]
    async fn test_tag_all_respects_limit() {
        let store = Arc::new(
            InMemoryStore::new()
                .with_entity(entity(1))
                .with_entity(entity(2))
                .with_entity(entity(3)),
        );
        let summary = engine(store, vec![]).tag_all(Some(2)).await.unwrap();
        assert_eq!(summary.entities_total, 2);
        assert_eq!(summary.entities_labelled, 0);
        assert_eq!(summary.total_labels, 0);
    }
}
