use tracing::{info, warn};

use anyhow::Result;

use crate::cli::StatusArgs;
use crate::model::{AlertFeed, AlertState, CoverageSnapshot, IrrReport, IrrTrend};
use crate::util::read_json_opt;

/// Read-only inspection of the persisted artifacts. Missing files are
/// reported, never fatal: a fresh data root is a valid state.
pub fn run(args: StatusArgs) -> Result<()> {
    let root = &args.data_root;
    info!(data_root = %root.display(), "status requested");

    let snapshot_path = root.join("coverage_snapshot.json");
    match read_json_opt::<CoverageSnapshot>(&snapshot_path)? {
        Some(snapshot) => {
            let worst = snapshot
                .lowest_cells
                .first()
                .map(|record| record.cell_key.clone())
                .unwrap_or_default();
            info!(
                generated_at = %snapshot.generated_at,
                cells = snapshot.cells.len(),
                coverage_completeness = snapshot.coverage_completeness,
                lowest_cells = snapshot.lowest_cells.len(),
                worst_cell = %worst,
                "coverage snapshot"
            );
        }
        None => warn!(path = %snapshot_path.display(), "coverage snapshot missing"),
    }

    let state_path = root.join("coverage_state.json");
    match read_json_opt::<AlertState>(&state_path)? {
        Some(state) => {
            let below = state
                .cells
                .values()
                .filter(|cell| cell.below_since.is_some())
                .count();
            info!(
                last_run_at = %state.last_run_at.unwrap_or_default(),
                tracked_cells = state.cells.len(),
                cells_below_threshold = below,
                "alert state"
            );
        }
        None => warn!(path = %state_path.display(), "alert state missing"),
    }

    let feed_path = root.join("alerts.json");
    match read_json_opt::<AlertFeed>(&feed_path)? {
        Some(feed) => {
            let latest = feed
                .alerts
                .last()
                .map(|alert| alert.cell.clone())
                .unwrap_or_default();
            info!(
                generated_at = %feed.generated_at,
                alerts = feed.alerts.len(),
                latest_cell = %latest,
                "alert feed"
            );
        }
        None => warn!(path = %feed_path.display(), "alert feed missing"),
    }

    let report_path = root.join("irr").join("irr.json");
    match read_json_opt::<IrrReport>(&report_path)? {
        Some(report) => {
            for (label, summary) in [
                ("has_code_switch", &report.judgments.has_code_switch),
                ("voice_tag", &report.judgments.voice_tag),
            ] {
                info!(
                    judgment = label,
                    alpha_global = %summary
                        .alpha_global
                        .map(|alpha| alpha.to_string())
                        .unwrap_or_else(|| "n/a".to_string()),
                    n_items_global = summary.n_items_global,
                    cells = summary.by_cell.len(),
                    "reliability report"
                );
            }
        }
        None => warn!(path = %report_path.display(), "reliability report missing"),
    }

    let trend_path = root.join("irr").join("irr_trend.json");
    match read_json_opt::<IrrTrend>(&trend_path)? {
        Some(trend) => {
            for (label, series) in &trend {
                let latest = series
                    .last()
                    .map(|entry| entry.date.clone())
                    .unwrap_or_default();
                info!(
                    judgment = %label,
                    entries = series.len(),
                    latest = %latest,
                    "reliability trend"
                );
            }
        }
        None => warn!(path = %trend_path.display(), "reliability trend missing"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tolerates_an_empty_data_root() {
        let dir = tempfile::tempdir().unwrap();
        run(StatusArgs {
            data_root: dir.path().to_path_buf(),
        })
        .unwrap();
    }

    #[test]
    fn status_reads_existing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let counts = crate::snapshot::accumulate_counts([(
            crate::cell::CellKey::parse("gulf:coastal:f:18-29"),
            4,
        )]);
        let snapshot = crate::snapshot::build_snapshot(
            &counts,
            &crate::targets::TargetsConfig::builtin(),
            "2025-06-01T00:00:00Z",
        );
        crate::util::write_json_pretty(&dir.path().join("coverage_snapshot.json"), &snapshot)
            .unwrap();

        run(StatusArgs {
            data_root: dir.path().to_path_buf(),
        })
        .unwrap();
    }
}
