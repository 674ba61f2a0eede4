use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::cell::CellKey;
use crate::cli::CoverageArgs;
use crate::model::{
    AlertFeed, AlertLogEntry, AlertRecord, AlertState, CellAlertState, CoverageSnapshot,
    NoChangeRecord,
};
use crate::snapshot::{accumulate_counts, build_snapshot};
use crate::targets;
use crate::util::{
    ensure_directory, file_mtime_millis, hours_between, parse_utc, read_json_opt, round1, round4,
    sha256_file, utc_string, write_atomic, write_json_pretty,
};

use super::{
    ALERT_FEED_SIZE, LOW_COVERAGE_THRESHOLD, MAX_ALERT_LOG_LINES, MIN_STALE_HOURS, REPEAT_HOURS,
};

struct CoveragePaths {
    summary: PathBuf,
    targets: PathBuf,
    snapshot: PathBuf,
    prev_snapshot: PathBuf,
    state: PathBuf,
    alerts_log: PathBuf,
    alerts_feed: PathBuf,
}

impl CoveragePaths {
    fn resolve(args: &CoverageArgs) -> Self {
        let root = &args.data_root;
        Self {
            summary: args
                .summary_path
                .clone()
                .unwrap_or_else(|| root.join("coverage_summary.json")),
            targets: args
                .targets_path
                .clone()
                .unwrap_or_else(|| root.join("coverage_targets.json")),
            snapshot: root.join("coverage_snapshot.json"),
            prev_snapshot: root.join("coverage_snapshot.prev.json"),
            state: root.join("coverage_state.json"),
            alerts_log: root.join("alerts.log"),
            alerts_feed: root.join("alerts.json"),
        }
    }
}

pub fn run(args: CoverageArgs) -> Result<()> {
    ensure_directory(&args.data_root)?;
    let paths = CoveragePaths::resolve(&args);

    if !paths.summary.exists() {
        bail!("coverage summary not found at {}", paths.summary.display());
    }
    let summary_mtime_ms = file_mtime_millis(&paths.summary)?;

    let state = read_json_opt::<AlertState>(&paths.state)?.unwrap_or_default();
    let now = Utc::now();
    let generated_at = utc_string(now);

    // Modification-marker short-circuit: nothing new upstream means no
    // snapshot churn and no alert evaluation, but the skip itself is logged.
    if state.last_summary_mtime_ms != 0 && summary_mtime_ms <= state.last_summary_mtime_ms {
        let entry = AlertLogEntry::NoChange(NoChangeRecord {
            timestamp: generated_at.clone(),
            message: "no new coverage updates detected; snapshot refresh skipped".to_string(),
        });
        update_alert_artifacts(&paths, &[entry], &generated_at)?;

        let mut next_state = state;
        next_state.last_run_at = Some(generated_at);
        write_json_pretty(&paths.state, &next_state)?;
        info!("no coverage changes detected; skipped snapshot refresh");
        return Ok(());
    }

    let summary: Value = read_json_opt(&paths.summary)?
        .with_context(|| format!("coverage summary vanished: {}", paths.summary.display()))?;
    let config = targets::load_targets(&paths.targets)?;
    let targets_sha = if paths.targets.exists() {
        sha256_file(&paths.targets)?
    } else {
        String::from("builtin")
    };

    let counts = extract_counts(&summary);
    let snapshot = build_snapshot(&counts, &config, &generated_at);

    let previous_snapshot = read_json_opt::<CoverageSnapshot>(&paths.snapshot)?;
    rotate_snapshot(&paths)?;
    write_json_pretty(&paths.snapshot, &snapshot)?;

    let prev_generated_at = previous_snapshot
        .as_ref()
        .map(|prev| prev.generated_at.clone());
    let prev_low_cells: BTreeSet<String> = previous_snapshot
        .as_ref()
        .map(|prev| {
            prev.cells
                .iter()
                .filter(|record| record.pct_of_target < LOW_COVERAGE_THRESHOLD)
                .map(|record| record.cell().canonical())
                .collect()
        })
        .unwrap_or_default();

    let mut next_cells = BTreeMap::new();
    let mut appended = Vec::new();
    for record in &snapshot.cells {
        let key = record.cell_key.clone();
        let (cell_state, alert) = advance_cell_state(
            &key,
            state.cells.get(&key),
            prev_low_cells.contains(&key),
            prev_generated_at.as_deref(),
            record.pct_of_target,
            record.deficit,
            now,
        );
        if let Some(alert) = alert {
            appended.push(AlertLogEntry::Alert(alert));
        }
        next_cells.insert(key, cell_state);
    }

    let alert_count = appended.len();
    let next_state = AlertState {
        last_summary_mtime_ms: summary_mtime_ms,
        last_run_at: Some(generated_at.clone()),
        cells: next_cells,
    };
    write_json_pretty(&paths.state, &next_state)?;
    update_alert_artifacts(&paths, &appended, &generated_at)?;

    info!(
        cells = snapshot.cells.len(),
        coverage_completeness = round4(snapshot.coverage_completeness),
        alerts = alert_count,
        targets_sha = %targets_sha,
        "coverage snapshot refreshed"
    );

    Ok(())
}

/// One cell through the hysteresis machine. `below_since` survives across
/// runs: when a cell re-enters low coverage and the previous snapshot already
/// had it low, staleness continues from that snapshot's timestamp instead of
/// restarting. Emission keys off tracked staleness plus the repeat window.
pub(super) fn advance_cell_state(
    cell_key: &str,
    previous: Option<&CellAlertState>,
    was_low_in_prev_snapshot: bool,
    prev_snapshot_generated_at: Option<&str>,
    pct_of_target: f64,
    deficit: u64,
    now: DateTime<Utc>,
) -> (CellAlertState, Option<AlertRecord>) {
    let now_string = utc_string(now);
    let below = pct_of_target < LOW_COVERAGE_THRESHOLD;

    let mut below_since = previous.and_then(|state| state.below_since.clone());
    if below {
        if below_since.is_none() {
            let since = if was_low_in_prev_snapshot {
                prev_snapshot_generated_at
                    .map(str::to_string)
                    .unwrap_or_else(|| now_string.clone())
            } else {
                now_string.clone()
            };
            below_since = Some(since);
        }
    } else {
        below_since = None;
    }

    let mut last_alerted_at = previous.and_then(|state| state.last_alerted_at.clone());
    let mut alert = None;

    if below {
        if let Some(since) = below_since.as_deref().and_then(parse_utc) {
            let stale_hours = hours_between(now, since);
            let hours_since_alert = last_alerted_at
                .as_deref()
                .and_then(parse_utc)
                .map(|at| hours_between(now, at));
            let repeat_ok = hours_since_alert.is_none_or(|hours| hours >= REPEAT_HOURS);

            if stale_hours >= MIN_STALE_HOURS && repeat_ok {
                alert = Some(AlertRecord {
                    timestamp: now_string.clone(),
                    cell: cell_key.to_string(),
                    pct_of_target: round4(pct_of_target),
                    deficit,
                    stale_hours: round1(stale_hours),
                });
                last_alerted_at = Some(now_string.clone());
            }
        }
    }

    let state = CellAlertState {
        below_since,
        last_seen: Some(now_string),
        last_pct: Some(round4(pct_of_target)),
        last_deficit: Some(deficit),
        last_alerted_at,
    };
    (state, alert)
}

fn extract_counts(summary: &Value) -> BTreeMap<CellKey, u64> {
    let Some(entries) = summary.get("coverage").and_then(Value::as_array) else {
        warn!("coverage summary has no 'coverage' array; treating as empty");
        return BTreeMap::new();
    };

    accumulate_counts(entries.iter().filter_map(|entry| {
        if !entry.is_object() {
            return None;
        }
        let count = entry.get("count").and_then(read_count)?;
        Some((CellKey::from_attributes(entry), count))
    }))
}

fn read_count(value: &Value) -> Option<u64> {
    if let Some(count) = value.as_u64() {
        return Some(count);
    }
    value
        .as_f64()
        .filter(|count| count.is_finite() && *count >= 0.0)
        .map(|count| count.floor() as u64)
}

/// Rotate current -> `.prev` with plain renames so the replacement is atomic;
/// a missing current snapshot simply means no rotation.
fn rotate_snapshot(paths: &CoveragePaths) -> Result<()> {
    match fs::remove_file(&paths.prev_snapshot) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to remove {}", paths.prev_snapshot.display())
            });
        }
    }

    match fs::rename(&paths.snapshot, &paths.prev_snapshot) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| {
            format!(
                "failed to rotate {} to {}",
                paths.snapshot.display(),
                paths.prev_snapshot.display()
            )
        }),
    }
}

fn update_alert_artifacts(
    paths: &CoveragePaths,
    appended: &[AlertLogEntry],
    feed_timestamp: &str,
) -> Result<()> {
    let existing = match fs::read_to_string(&paths.alerts_log) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read {}", paths.alerts_log.display()));
        }
    };

    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();
    for entry in appended {
        lines.push(serde_json::to_string(entry).context("failed to serialize alert log entry")?);
    }
    if lines.len() > MAX_ALERT_LOG_LINES {
        lines.drain(..lines.len() - MAX_ALERT_LOG_LINES);
    }

    let mut log = lines.join("\n");
    if !log.is_empty() {
        log.push('\n');
    }
    write_atomic(&paths.alerts_log, log.as_bytes())?;

    // Malformed lines stay in the log for auditability but are skipped here.
    let alerts: Vec<AlertRecord> = lines
        .iter()
        .filter_map(|line| serde_json::from_str::<AlertLogEntry>(line).ok())
        .filter_map(|entry| match entry {
            AlertLogEntry::Alert(record) => Some(record),
            AlertLogEntry::NoChange(_) => None,
        })
        .collect();
    let start = alerts.len().saturating_sub(ALERT_FEED_SIZE);
    let feed = AlertFeed {
        generated_at: feed_timestamp.to_string(),
        alerts: alerts[start..].to_vec(),
    };
    write_json_pretty(&paths.alerts_feed, &feed)
}
