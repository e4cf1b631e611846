//! Run output: results, per-unit summaries, the text report and screenshots.
//!
//! `results.json` and `summary.json` are rewritten in full after every unit
//! through a temporary file and a rename, so an interrupted run leaves the
//! last completed checkpoint intact.

use crate::engine::{CardTally, ExtractedRecord, FieldMap, FieldValue, PrepTally};
use crate::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const RESULTS_FILE: &str = "results.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const REPORT_FILE: &str = "report.txt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum UnitStatus {
    Completed,
    Failed { error: String },
    Skipped { reason: String },
}

/// Which record fields a unit summary keeps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryFields {
    /// Copied from the first of the unit's records where they are non-empty.
    pub fields: Vec<String>,
    /// Numeric fields summed over the unit's records. `parent.child` reaches
    /// into groups and into every item of a list.
    pub price_total: Vec<String>,
}

impl SummaryFields {
    pub fn pick(&self, records: &[ExtractedRecord]) -> FieldMap {
        self.fields
            .iter()
            .filter_map(|name| {
                records
                    .iter()
                    .filter_map(|r| r.field(name))
                    .find(|v| !v.is_empty())
                    .map(|v| (name.clone(), v.clone()))
            })
            .collect()
    }

    /// `None` when no path yields a number.
    pub fn price_total(&self, records: &[ExtractedRecord]) -> Option<f64> {
        let numbers: Vec<f64> = self
            .price_total
            .iter()
            .flat_map(|path| records.iter().flat_map(move |r| numbers_at(&r.fields, path)))
            .collect();
        if numbers.is_empty() {
            None
        } else {
            Some(numbers.iter().sum())
        }
    }
}

fn numbers_at(fields: &FieldMap, path: &str) -> Vec<f64> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    match (fields.get(head), rest) {
        (Some(value), None) => value.as_number().into_iter().collect(),
        (Some(FieldValue::Nested(row)), Some(rest)) => numbers_at(row, rest),
        (Some(FieldValue::List(rows)), Some(rest)) => rows.iter().flat_map(|row| numbers_at(row, rest)).collect(),
        _ => Vec::new(),
    }
}

/// Reduced record of one unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSummary {
    pub label: String,
    pub address: Option<String>,
    #[serde(flatten)]
    pub status: UnitStatus,
    pub cards: CardTally,
    pub prep: PrepTally,
    pub persistent_obstructions: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screenshots: Vec<PathBuf>,
    pub finished_at: DateTime<Utc>,
}

impl UnitSummary {
    pub fn new(label: &str, address: Option<String>, status: UnitStatus) -> Self {
        Self {
            label: label.to_string(),
            address,
            status,
            cards: CardTally::default(),
            prep: PrepTally::default(),
            persistent_obstructions: 0,
            fields: FieldMap::new(),
            price_total: None,
            screenshots: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    pub fn skipped(label: &str, address: Option<String>, reason: &str) -> Self {
        Self::new(
            label,
            address,
            UnitStatus::Skipped {
                reason: reason.to_string(),
            },
        )
    }

    /// Fill the summary fields and price total from the unit's records.
    pub fn reduce(&mut self, spec: &SummaryFields, records: &[ExtractedRecord]) {
        self.fields = spec.pick(records);
        self.price_total = spec.price_total(records);
    }
}

#[derive(Debug, Serialize)]
struct SummaryDocument<'a> {
    run_id: Uuid,
    profile: &'a str,
    started_at: DateTime<Utc>,
    units: &'a [UnitSummary],
}

pub struct ResultStore {
    dir: PathBuf,
    profile: String,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    records: Vec<ExtractedRecord>,
    units: Vec<UnitSummary>,
}

impl ResultStore {
    /// Open the output directory and truncate any previous run's files.
    pub async fn create(dir: &Path, profile: &str) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let store = Self {
            dir: dir.to_path_buf(),
            profile: profile.to_string(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            records: Vec::new(),
            units: Vec::new(),
        };
        store.checkpoint().await?;
        let _ = tokio::fs::remove_file(store.dir.join(REPORT_FILE)).await;
        info!("Writing results to {} (run {})", dir.display(), store.run_id);
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }

    pub fn units(&self) -> &[UnitSummary] {
        &self.units
    }

    /// Append a finished unit and checkpoint.
    pub async fn commit_unit(&mut self, summary: UnitSummary, records: Vec<ExtractedRecord>) -> Result<()> {
        self.records.extend(records);
        self.units.push(summary);
        self.checkpoint().await
    }

    pub async fn checkpoint(&self) -> Result<()> {
        write_atomic(&self.dir.join(RESULTS_FILE), &serde_json::to_vec_pretty(&self.records)?).await?;
        let summary = SummaryDocument {
            run_id: self.run_id,
            profile: &self.profile,
            started_at: self.started_at,
            units: &self.units,
        };
        write_atomic(&self.dir.join(SUMMARY_FILE), &serde_json::to_vec_pretty(&summary)?).await?;
        debug!("checkpoint: {} records, {} units", self.records.len(), self.units.len());
        Ok(())
    }

    pub async fn save_screenshot(&self, label: &str, stage: &str, png: &[u8]) -> Result<PathBuf> {
        let dir = self.dir.join("screenshots");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{:03}-{}-{}.png", self.units.len() + 1, slug(label), stage));
        tokio::fs::write(&path, png).await?;
        Ok(path)
    }

    /// Write the human-readable report and return its path.
    pub async fn finish(&self) -> Result<PathBuf> {
        let path = self.dir.join(REPORT_FILE);
        write_atomic(&path, self.report().as_bytes()).await?;
        info!("Report written to {}", path.display());
        Ok(path)
    }

    pub fn report(&self) -> String {
        let mut completed = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut cards = CardTally::default();
        let mut prep = PrepTally::default();
        let mut persistent = 0;
        for unit in &self.units {
            match unit.status {
                UnitStatus::Completed => completed += 1,
                UnitStatus::Failed { .. } => failed += 1,
                UnitStatus::Skipped { .. } => skipped += 1,
            }
            cards.add(&unit.cards);
            prep.add(&unit.prep);
            persistent += unit.persistent_obstructions;
        }
        let visited = completed + failed;

        let mut out = String::new();
        let rule = "=".repeat(60);
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "SCRAPE REPORT: {}", self.profile);
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "Run:      {}", self.run_id);
        let _ = writeln!(out, "Started:  {}", self.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out, "Finished: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out);
        let _ = writeln!(out, "UNITS");
        let _ = writeln!(out, "  Completed: {}", completed);
        let _ = writeln!(out, "  Failed:    {}", failed);
        let _ = writeln!(out, "  Skipped:   {}", skipped);
        let _ = writeln!(out);
        let _ = writeln!(out, "CARDS");
        let _ = writeln!(out, "  Discovered:           {}", cards.discovered);
        let _ = writeln!(out, "  Recorded:             {}", cards.recorded);
        let _ = writeln!(out, "  Skipped (duplicate):  {}", cards.skipped_duplicate);
        let _ = writeln!(out, "  Skipped (prohibited): {}", cards.skipped_prohibited);
        let _ = writeln!(out, "  Failed:               {}", cards.failed);
        let _ = writeln!(out, "  Degraded:             {}", cards.degraded);
        let _ = writeln!(out);
        let _ = writeln!(out, "PREPARATION CLICKS");
        let _ = writeln!(out, "  Clicked:              {}", prep.clicked);
        let _ = writeln!(out, "  Skipped (state):      {}", prep.skipped_state);
        let _ = writeln!(out, "  Skipped (prohibited): {}", prep.skipped_prohibited);
        let _ = writeln!(out, "  Skipped (duplicate):  {}", prep.skipped_duplicate);
        let _ = writeln!(out, "  Failed:               {}", prep.failed);
        let _ = writeln!(out, "  Persistent obstructions: {}", persistent);

        if visited > 0 {
            let _ = writeln!(out);
            let _ = writeln!(out, "AVERAGES PER VISITED UNIT");
            let _ = writeln!(out, "  Records: {:.1}", cards.recorded as f64 / visited as f64);
            let _ = writeln!(out, "  Clicks:  {:.1}", prep.clicked as f64 / visited as f64);
        }

        let coverage = field_coverage(&self.records);
        if !coverage.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "FIELD COVERAGE");
            for (field, (filled, total)) in &coverage {
                let _ = writeln!(
                    out,
                    "  {:<24} {:>5.1}% ({}/{})",
                    field,
                    100.0 * *filled as f64 / *total as f64,
                    filled,
                    total
                );
            }
        }

        let reduced: Vec<&UnitSummary> = self
            .units
            .iter()
            .filter(|u| !u.fields.is_empty() || u.price_total.is_some())
            .collect();
        if !reduced.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "UNIT SUMMARIES");
            for unit in reduced {
                let mut parts: Vec<String> = unit
                    .fields
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, display_value(value)))
                    .collect();
                if let Some(total) = unit.price_total {
                    parts.push(format!("total={:.2}", total));
                }
                let _ = writeln!(out, "  {}: {}", unit.label, parts.join(", "));
            }
        }

        let failures: Vec<&UnitSummary> = self
            .units
            .iter()
            .filter(|u| matches!(u.status, UnitStatus::Failed { .. }))
            .collect();
        if !failures.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "FAILED UNITS");
            for unit in failures {
                if let UnitStatus::Failed { error } = &unit.status {
                    let _ = writeln!(out, "  {}: {}", unit.label, error);
                }
            }
        }
        let _ = writeln!(out, "{}", rule);
        out
    }
}

fn display_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(text) => text.clone(),
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Number(n) => n.to_string(),
        nested => serde_json::to_string(nested).unwrap_or_default(),
    }
}

/// `field -> (non-empty, total)` over top-level fields.
fn field_coverage(records: &[ExtractedRecord]) -> BTreeMap<String, (usize, usize)> {
    let mut coverage: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for record in records {
        for (name, value) in &record.fields {
            let entry = coverage.entry(name.clone()).or_default();
            entry.1 += 1;
            if !value.is_empty() {
                entry.0 += 1;
            }
        }
    }
    coverage
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn slug(label: &str) -> String {
    let slug: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "unit".to_string()
    } else {
        slug.chars().take(48).collect()
    }
}
