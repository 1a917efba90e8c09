//! Label export to JSON and CSV.
//!
//! Both formats carry one record per stored label with the same fields:
//! entity_id, category, label_name, confidence_score, is_manual,
//! created_at, updated_at (RFC 3339).

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::types::{StoredLabel, TaggerError};

// ─── JSON ───────────────────────────────────────────────────────────

/// Serialize labels to a pretty JSON array.
pub fn labels_json(labels: &[StoredLabel]) -> Result<String> {
    serde_json::to_string_pretty(labels).context("failed to serialize labels to JSON")
}

pub fn write_json(path: &Path, labels: &[StoredLabel]) -> Result<()> {
    let mut out = create(path)?;
    serde_json::to_writer_pretty(&mut out, labels)
        .map_err(|e| TaggerError::Export(format!("{}: {e}", path.display())))?;
    out.flush()
        .with_context(|| format!("failed to flush {}", path.display()))
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Serialize labels to CSV with a header row.
pub fn labels_csv(labels: &[StoredLabel]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for label in labels {
        wtr.serialize(label)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn write_csv(path: &Path, labels: &[StoredLabel]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(create(path)?);
    for label in labels {
        wtr.serialize(label)
            .map_err(|e| TaggerError::Export(format!("{}: {e}", path.display())))?;
    }
    wtr.flush()
        .with_context(|| format!("failed to flush {}", path.display()))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create export dir: {}", dir.display()))?;
    }
    let file = File::create(path)
        .map_err(|e| TaggerError::Export(format!("cannot create {}: {e}", path.display())))?;
    Ok(BufWriter::new(file))
}
