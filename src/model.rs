use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cell::CellKey;

/// Observed per-cell counts, produced by `summarize` or an upstream export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub generated_at: String,
    pub total_profiles: u64,
    pub coverage: Vec<SummaryCell>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryCell {
    pub dialect_family: String,
    pub subregion: String,
    pub apparent_gender: String,
    pub apparent_age_band: String,
    pub count: u64,
}

/// One cell of a coverage snapshot. Invariants: `pct_of_target` is
/// `clamp(count/target, 0, 1)` and `deficit` is `max(0, target - count)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageCellRecord {
    pub cell_key: String,
    pub dialect_family: String,
    pub subregion: String,
    pub apparent_gender: String,
    pub apparent_age_band: String,
    pub count: u64,
    pub target: u64,
    pub pct_of_target: f64,
    pub deficit: u64,
}

impl CoverageCellRecord {
    /// Recover the cell identity, preferring the stored canonical key and
    /// falling back to the attribute fields when the key is absent or not in
    /// delimited form.
    pub fn cell(&self) -> CellKey {
        let trimmed = self.cell_key.trim();
        if !trimmed.is_empty() && trimmed.contains(':') {
            return CellKey::parse(trimmed);
        }
        CellKey::new(
            self.dialect_family.clone(),
            self.subregion.clone(),
            self.apparent_gender.clone(),
            self.apparent_age_band.clone(),
        )
    }
}

/// Rebuilt wholesale on every run, never mutated incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    pub generated_at: String,
    pub default_target_per_cell: u64,
    pub cells: Vec<CoverageCellRecord>,
    pub coverage_completeness: f64,
    pub lowest_cells: Vec<CoverageCellRecord>,
}

/// Per-cell alert bookkeeping, persisted across runs. Field names stay
/// camelCase on the wire for continuity with the pre-existing state files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellAlertState {
    #[serde(default)]
    pub below_since: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub last_pct: Option<f64>,
    #[serde(default)]
    pub last_deficit: Option<u64>,
    #[serde(default)]
    pub last_alerted_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertState {
    #[serde(default)]
    pub last_summary_mtime_ms: u64,
    #[serde(default)]
    pub last_run_at: Option<String>,
    #[serde(default)]
    pub cells: BTreeMap<String, CellAlertState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: String,
    pub cell: String,
    pub pct_of_target: f64,
    pub deficit: u64,
    pub stale_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoChangeRecord {
    pub timestamp: String,
    pub message: String,
}

/// One line of the append-only alert log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertLogEntry {
    Alert(AlertRecord),
    NoChange(NoChangeRecord),
}

/// Capped "latest alerts" view for quick inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertFeed {
    pub generated_at: String,
    pub alerts: Vec<AlertRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellAlpha {
    pub cell: String,
    pub alpha: Option<f64>,
    pub n_items: usize,
}

/// Agreement summary for one judgment type. `alpha_global` is null when too
/// few paired observations exist; null and zero mean different things.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgmentSummary {
    pub alpha_global: Option<f64>,
    pub n_items_global: usize,
    pub by_cell: Vec<CellAlpha>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_voice_tags: Option<Vec<MissingVoiceTag>>,
}

/// A true omission: a multi-speaker clip where neither pass produced any
/// voice-tagged cue. Distinct from ordinary disagreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingVoiceTag {
    pub asset_id: String,
    pub cell: String,
    pub evidence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrJudgments {
    pub has_code_switch: JudgmentSummary,
    pub voice_tag: JudgmentSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrReport {
    pub generated_at: String,
    pub judgments: IrrJudgments,
}

/// Rolling trend series, keyed by judgment label. One entry per calendar day;
/// a same-day rerun replaces that day's entry.
pub type IrrTrend = BTreeMap<String, Vec<TrendEntry>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendEntry {
    pub date: String,
    pub alpha_global: Option<f64>,
    pub n_items_global: usize,
    pub by_cell: Vec<CellAlpha>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CellWeight {
    pub cell: String,
    pub weight: f64,
}

/// Stdout document of the `allocate` command.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutcome {
    pub generated_at: String,
    pub snapshot_generated_at: String,
    pub alpha: f64,
    pub weights: Vec<CellWeight>,
    pub picked: Option<String>,
}
