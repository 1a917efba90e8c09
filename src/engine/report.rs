//! Batch summaries and label statistics logging.
//!
//! A `BatchSummary` is filled in entity by entity while a batch runs and
//! closed with `finish()`; `log_summary` and `log_statistics` emit them as
//! structured log events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::store::LabelStatistics;
use crate::types::LabelResult;

// ---------------------------------------------------------------------------
// Batch summary
// ---------------------------------------------------------------------------

/// Outcome of one `tag_all` or `update_recent` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Entities selected for the batch.
    pub entities_total: usize,
    /// Entities evaluated and persisted, labelled or not.
    pub entities_processed: usize,
    /// Entities that failed (not found, store or persistence error).
    pub entities_skipped: usize,
    /// Processed entities that received at least one label.
    pub entities_labelled: usize,
    pub total_labels: usize,
    /// Label name → number of entities it was assigned to.
    pub distribution: BTreeMap<String, usize>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchSummary {
    pub fn start(entities_total: usize) -> Self {
        Self {
            entities_total,
            entities_processed: 0,
            entities_skipped: 0,
            entities_labelled: 0,
            total_labels: 0,
            distribution: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Count an entity whose labels were persisted.
    pub fn record(&mut self, labels: &[LabelResult]) {
        self.entities_processed += 1;
        if labels.is_empty() {
            return;
        }
        self.entities_labelled += 1;
        self.total_labels += labels.len();
        for label in labels {
            *self
                .distribution
                .entry(label.name.as_str().to_string())
                .or_default() += 1;
        }
    }

    pub fn skip(&mut self) {
        self.entities_skipped += 1;
    }

    /// Entities dealt with so far, successfully or not.
    pub fn handled(&self) -> usize {
        self.entities_processed + self.entities_skipped
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn elapsed_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

pub fn log_summary(summary: &BatchSummary) {
    info!(
        total = summary.entities_total,
        processed = summary.entities_processed,
        skipped = summary.entities_skipped,
        labelled = summary.entities_labelled,
        labels = summary.total_labels,
        elapsed = format!("{:.1}s", summary.elapsed_secs().unwrap_or_default()),
        "Batch complete"
    );
    for (label, count) in &summary.distribution {
        info!(label = %label, count, "Label assigned");
    }
}

pub fn log_statistics(stats: &LabelStatistics) {
    info!(
        entities = stats.total_entities,
        labelled = stats.labelled_entities,
        labels = stats.total_labels,
        coverage = format!("{:.1}%", stats.coverage * 100.0),
        avg_labels = format!("{:.2}", stats.avg_labels_per_entity),
        "Label statistics"
    );
    for count in &stats.distribution {
        info!(
            category = %count.category,
            label = %count.label_name,
            count = count.count,
            "Label frequency"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LabelName;

    #[test]
    fn test_summary_counts() {
        let mut summary = BatchSummary::start(3);
        summary.record(&[
            LabelResult::new(LabelName::HighWinRate, 0.4),
            LabelResult::new(LabelName::Bot, 0.6),
        ]);
        summary.record(&[]);
        summary.skip();
        summary.finish();

        assert_eq!(summary.entities_processed, 2);
        assert_eq!(summary.entities_labelled, 1);
        assert_eq!(summary.entities_skipped, 1);
        assert_eq!(summary.total_labels, 2);
        assert_eq!(summary.handled(), 3);
        assert_eq!(summary.distribution.get("high win rate"), Some(&1));
        assert!(summary.elapsed_secs().is_some());
    }
}
