use std::fs;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use crate::cell::CellKey;
use crate::cli::SummarizeArgs;
use crate::model::{CoverageSummary, SummaryCell};
use crate::snapshot::accumulate_counts;
use crate::util::{now_utc_string, write_json_pretty};

pub fn run(args: SummarizeArgs) -> Result<()> {
    let out_path = args
        .out_path
        .unwrap_or_else(|| args.data_root.join("coverage_summary.json"));

    let raw = fs::read_to_string(&args.dataset_path)
        .with_context(|| format!("failed to read dataset {}", args.dataset_path.display()))?;

    let mut observations: Vec<(CellKey, u64)> = Vec::new();
    let mut total_profiles: u64 = 0;

    for (index, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: Value = serde_json::from_str(trimmed).with_context(|| {
            format!(
                "failed to parse JSON on line {} of {}",
                index + 1,
                args.dataset_path.display()
            )
        })?;

        for profile in extract_speaker_profiles(&record) {
            observations.push((CellKey::from_attributes(profile), 1));
            total_profiles += 1;
        }
    }

    let counts = accumulate_counts(observations);
    let mut coverage: Vec<SummaryCell> = counts
        .into_iter()
        .map(|(cell, count)| SummaryCell {
            dialect_family: cell.dialect_family,
            subregion: cell.subregion,
            apparent_gender: cell.apparent_gender,
            apparent_age_band: cell.apparent_age_band,
            count,
        })
        .collect();
    coverage.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.dialect_family.cmp(&b.dialect_family))
            .then_with(|| a.subregion.cmp(&b.subregion))
            .then_with(|| a.apparent_gender.cmp(&b.apparent_gender))
            .then_with(|| a.apparent_age_band.cmp(&b.apparent_age_band))
    });

    let summary = CoverageSummary {
        generated_at: now_utc_string(),
        total_profiles,
        coverage,
    };

    write_json_pretty(&out_path, &summary)?;
    info!(
        path = %out_path.display(),
        total_profiles,
        distinct_cells = summary.coverage.len(),
        "wrote coverage summary"
    );

    Ok(())
}

/// Speaker profiles appear inline under a couple of spellings and shapes:
/// a plain array, or an object wrapping a `profiles`/`speakers` array, or an
/// object whose values are the profiles.
fn extract_speaker_profiles(record: &Value) -> Vec<&Value> {
    let mut profiles = Vec::new();
    for key in ["speaker_profiles", "speakerProfiles"] {
        if let Some(container) = record.get(key) {
            collect_profiles(container, &mut profiles);
        }
    }
    profiles
}

fn collect_profiles<'a>(container: &'a Value, out: &mut Vec<&'a Value>) {
    match container {
        Value::Array(items) => out.extend(items.iter().filter(|item| item.is_object())),
        Value::Object(map) => {
            for key in ["profiles", "speakers"] {
                if let Some(Value::Array(items)) = map.get(key) {
                    out.extend(items.iter().filter(|item| item.is_object()));
                    return;
                }
            }
            out.extend(map.values().filter(|item| item.is_object()));
        }
        _ => {}
    }
}
