use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use super::cues::align_cues;
use super::passes::{self, ClipPasses, PassRecord};
use super::{CUE_ALIGN_TOLERANCE_SECS, HAS_CODE_SWITCH_LABEL, TREND_MAX_ENTRIES, VOICE_TAG_LABEL};
use crate::alpha::{MIN_CELL_ITEMS, nominal_alpha};
use crate::category::TriState;
use crate::cell::CellKey;
use crate::cli::IrrArgs;
use crate::model::{
    CellAlpha, IrrJudgments, IrrReport, IrrTrend, JudgmentSummary, MissingVoiceTag, TrendEntry,
};
use crate::util::{
    ensure_directory, read_json_opt, round4, utc_compact_date, utc_date_string, utc_string,
    write_atomic, write_json_pretty,
};

pub fn run(args: IrrArgs) -> Result<()> {
    let annotations_root = args
        .annotations_root
        .clone()
        .unwrap_or_else(|| args.data_root.join("annotations"));
    let irr_dir = args.data_root.join("irr");
    ensure_directory(&irr_dir)?;

    let now = Utc::now();
    let clips = if annotations_root.is_dir() {
        passes::collect_passes(&annotations_root)?
    } else {
        warn!(path = %annotations_root.display(), "annotations root missing; scoring nothing");
        BTreeMap::new()
    };

    let mut code_switch = JudgmentItems::default();
    let mut voice_tag = JudgmentItems::default();
    let mut missing_voice_tags = Vec::new();
    let mut eligible = 0_usize;
    let mut double_pass_targets = 0_usize;

    for (asset_id, clip) in &clips {
        let meta = read_json_opt::<Value>(&passes::meta_path(&annotations_root, asset_id))?;
        if double_pass_target(meta.as_ref()) {
            double_pass_targets += 1;
        }

        let Some((first, second)) = eligible_pair(clip) else {
            continue;
        };
        eligible += 1;

        let cell = clip_cell(meta.as_ref());

        if let (Some(a), Some(b)) = (first.has_code_switch, second.has_code_switch) {
            code_switch.push(&cell, vec![i64::from(a), i64::from(b)]);
        }

        if let (Some(a), Some(b)) = (first.cues.as_deref(), second.cues.as_deref()) {
            for (left, right) in align_cues(a, b, CUE_ALIGN_TOLERANCE_SECS) {
                voice_tag.push(
                    &cell,
                    vec![i64::from(left.has_voice_tag), i64::from(right.has_voice_tag)],
                );
            }

            // A multi-speaker clip with no voice tags anywhere is an omission
            // both annotators share, which agreement scoring cannot see.
            if let Some(evidence) = multi_speaker_evidence(meta.as_ref()) {
                let tagged = a.iter().chain(b.iter()).any(|cue| cue.has_voice_tag);
                if !tagged {
                    missing_voice_tags.push(MissingVoiceTag {
                        asset_id: asset_id.clone(),
                        cell: cell.canonical(),
                        evidence,
                    });
                }
            }
        }
    }

    let mut voice_tag_summary = voice_tag.summarize();
    if !missing_voice_tags.is_empty() {
        voice_tag_summary.missing_voice_tags = Some(missing_voice_tags);
    }

    let report = IrrReport {
        generated_at: utc_string(now),
        judgments: IrrJudgments {
            has_code_switch: code_switch.summarize(),
            voice_tag: voice_tag_summary,
        },
    };

    write_json_pretty(&irr_dir.join("irr.json"), &report)?;
    update_trend(&irr_dir, &report, &utc_date_string(now))?;
    write_run_log(&irr_dir, &report, clips.len(), eligible, double_pass_targets, now)?;

    info!(
        clips = clips.len(),
        eligible,
        double_pass_targets,
        code_switch_items = report.judgments.has_code_switch.n_items_global,
        voice_tag_items = report.judgments.voice_tag.n_items_global,
        "reliability report written"
    );

    Ok(())
}

/// A clip is scoreable when passes 1 and 2 both exist and were produced by
/// two identifiable, distinct annotators.
pub(super) fn eligible_pair(clip: &ClipPasses) -> Option<(&PassRecord, &PassRecord)> {
    let first = clip.passes.get(&1)?;
    let second = clip.passes.get(&2)?;
    if first.annotator == "unknown" || second.annotator == "unknown" {
        return None;
    }
    if first.annotator == second.annotator {
        return None;
    }
    Some((first, second))
}

/// Cell for grouping reliability by stratum. Explicit assignment fields win
/// over inferring from the metadata itself; speaker-apparent fields are
/// wildcarded either way.
pub(super) fn clip_cell(meta: Option<&Value>) -> CellKey {
    let Some(meta) = meta else {
        return CellKey::unknown().speaker_wildcard();
    };

    let assigned = [
        meta.get("assigned_cell"),
        meta.get("assignedCell"),
        meta.pointer("/assignment/cell"),
        meta.pointer("/assignment/cells/0"),
        meta.get("cell"),
        meta.pointer("/cells/0"),
    ]
    .into_iter()
    .flatten()
    .next();

    let key = match assigned {
        Some(Value::String(raw)) => CellKey::parse(raw),
        Some(value) if value.is_object() => CellKey::from_attributes(value),
        _ => CellKey::from_attributes(meta),
    };
    key.speaker_wildcard()
}

/// Upstream marks clips scheduled for a second annotation pass; the run log
/// reports how many showed up so drift between scheduling and delivery is
/// visible.
fn double_pass_target(meta: Option<&Value>) -> bool {
    let Some(meta) = meta else {
        return false;
    };
    ["double_pass", "doublePass", "needs_second_pass", "needsSecondPass"]
        .iter()
        .any(|flag| {
            meta.get(*flag)
                .is_some_and(|value| TriState::from_value(value).is_true())
        })
}

pub(super) fn multi_speaker_evidence(meta: Option<&Value>) -> Option<String> {
    let meta = meta?;

    for flag in ["multi_speaker", "multiSpeaker", "is_multi_speaker"] {
        if let Some(value) = meta.get(flag) {
            if TriState::from_value(value).is_true() {
                return Some(format!("{flag}=true"));
            }
        }
    }

    for field in ["speaker_count", "speakerCount", "num_speakers"] {
        if let Some(count) = meta.get(field).and_then(Value::as_u64) {
            if count >= 2 {
                return Some(format!("{field}={count}"));
            }
        }
    }

    for field in ["speakers", "speaker_ids", "speaker_profiles"] {
        if let Some(list) = meta.get(field).and_then(Value::as_array) {
            if list.len() >= 2 {
                return Some(format!("{field} has {} entries", list.len()));
            }
        }
    }

    None
}

/// Items grouped globally and per cell, for one judgment type.
#[derive(Default)]
struct JudgmentItems {
    global: Vec<Vec<i64>>,
    by_cell: BTreeMap<String, Vec<Vec<i64>>>,
}

impl JudgmentItems {
    fn push(&mut self, cell: &CellKey, ratings: Vec<i64>) {
        self.by_cell
            .entry(cell.canonical())
            .or_default()
            .push(ratings.clone());
        self.global.push(ratings);
    }

    fn summarize(&self) -> JudgmentSummary {
        // Every observed cell is reported; ones below the item floor carry a
        // null alpha so "too sparse" stays distinguishable from "not tracked".
        let by_cell = self
            .by_cell
            .iter()
            .map(|(cell, items)| CellAlpha {
                cell: cell.clone(),
                alpha: (items.len() >= MIN_CELL_ITEMS)
                    .then(|| nominal_alpha(items).map(round4))
                    .flatten(),
                n_items: items.len(),
            })
            .collect();

        JudgmentSummary {
            alpha_global: nominal_alpha(&self.global).map(round4),
            n_items_global: self.global.len(),
            by_cell,
            missing_voice_tags: None,
        }
    }
}

/// One entry per judgment per calendar day; a same-day rerun replaces that
/// day's entry, and the series is capped to the most recent entries.
fn update_trend(irr_dir: &std::path::Path, report: &IrrReport, date: &str) -> Result<()> {
    let trend_path = irr_dir.join("irr_trend.json");
    let mut trend: IrrTrend = read_json_opt(&trend_path)?.unwrap_or_default();

    let judgments = [
        (HAS_CODE_SWITCH_LABEL, &report.judgments.has_code_switch),
        (VOICE_TAG_LABEL, &report.judgments.voice_tag),
    ];
    for (label, summary) in judgments {
        let series = trend.entry(label.to_string()).or_default();
        series.retain(|entry| entry.date != date);
        series.push(TrendEntry {
            date: date.to_string(),
            alpha_global: summary.alpha_global,
            n_items_global: summary.n_items_global,
            by_cell: summary.by_cell.clone(),
        });
        series.sort_by(|a, b| a.date.cmp(&b.date));
        if series.len() > TREND_MAX_ENTRIES {
            series.drain(..series.len() - TREND_MAX_ENTRIES);
        }
    }

    write_json_pretty(&trend_path, &trend)
}

fn write_run_log(
    irr_dir: &std::path::Path,
    report: &IrrReport,
    clips: usize,
    eligible: usize,
    double_pass_targets: usize,
    now: chrono::DateTime<Utc>,
) -> Result<()> {
    let logs_dir = irr_dir.join("logs");
    ensure_directory(&logs_dir)?;

    let mut log = String::new();
    let _ = writeln!(log, "run_at={}", report.generated_at);
    let _ = writeln!(
        log,
        "clips={clips} eligible={eligible} double_pass_targets={double_pass_targets}"
    );
    for (label, summary) in [
        (HAS_CODE_SWITCH_LABEL, &report.judgments.has_code_switch),
        (VOICE_TAG_LABEL, &report.judgments.voice_tag),
    ] {
        let alpha = summary
            .alpha_global
            .map(|alpha| alpha.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(
            log,
            "{label}: alpha={alpha} n_items={} cells={}",
            summary.n_items_global,
            summary.by_cell.len()
        );
    }
    if let Some(missing) = &report.judgments.voice_tag.missing_voice_tags {
        for item in missing {
            let _ = writeln!(
                log,
                "missing_voice_tags: asset={} cell={} ({})",
                item.asset_id, item.cell, item.evidence
            );
        }
    }

    let log_path = logs_dir.join(format!("irr_{}.log", utc_compact_date(now)));
    write_atomic(&log_path, log.as_bytes())
}
