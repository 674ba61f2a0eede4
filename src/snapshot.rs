use std::collections::BTreeMap;

use crate::cell::CellKey;
use crate::model::{CoverageCellRecord, CoverageSnapshot};
use crate::targets::{self, TargetsConfig};

pub const LOWEST_CELLS_LIMIT: usize = 10;

/// Sum duplicate observations of the same cell instead of overwriting.
pub fn accumulate_counts(
    observations: impl IntoIterator<Item = (CellKey, u64)>,
) -> BTreeMap<CellKey, u64> {
    let mut counts = BTreeMap::new();
    for (cell, count) in observations {
        *counts.entry(cell).or_insert(0) += count;
    }
    counts
}

/// Pure snapshot construction: no side effects, timestamp supplied by the
/// caller. Cells come out sorted by key for stable serialization.
pub fn build_snapshot(
    counts: &BTreeMap<CellKey, u64>,
    config: &TargetsConfig,
    generated_at: &str,
) -> CoverageSnapshot {
    let cells: Vec<CoverageCellRecord> = counts
        .iter()
        .map(|(cell, count)| {
            let target = targets::resolve_target(cell, config);
            cell_record(cell, *count, target)
        })
        .collect();

    let coverage_completeness = if cells.is_empty() {
        0.0
    } else {
        cells.iter().map(|cell| cell.pct_of_target).sum::<f64>() / cells.len() as f64
    };

    let mut lowest_cells: Vec<CoverageCellRecord> = cells
        .iter()
        .filter(|cell| cell.deficit > 0)
        .cloned()
        .collect();
    lowest_cells.sort_by(|a, b| {
        b.deficit
            .cmp(&a.deficit)
            .then_with(|| a.pct_of_target.total_cmp(&b.pct_of_target))
            .then_with(|| a.cell_key.cmp(&b.cell_key))
    });
    lowest_cells.truncate(LOWEST_CELLS_LIMIT);

    CoverageSnapshot {
        generated_at: generated_at.to_string(),
        default_target_per_cell: config.default_target_per_cell,
        cells,
        coverage_completeness,
        lowest_cells,
    }
}

fn cell_record(cell: &CellKey, count: u64, target: u64) -> CoverageCellRecord {
    // Targets resolve to >= 1, so the ratio is always defined.
    let pct_of_target = (count as f64 / target as f64).clamp(0.0, 1.0);
    CoverageCellRecord {
        cell_key: cell.canonical(),
        dialect_family: cell.dialect_family.clone(),
        subregion: cell.subregion.clone(),
        apparent_gender: cell.apparent_gender.clone(),
        apparent_age_band: cell.apparent_age_band.clone(),
        count,
        target,
        pct_of_target,
        deficit: target.saturating_sub(count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::TargetRule;

    fn config_with_default(default: u64) -> TargetsConfig {
        TargetsConfig {
            default_target_per_cell: default,
            rules: Vec::new(),
        }
    }

    fn cell(family: &str) -> CellKey {
        CellKey::new(family, "coastal", "female", "18-29")
    }

    #[test]
    fn wildcard_rule_scenario_matches_expected_numbers() {
        let config = TargetsConfig {
            default_target_per_cell: 25,
            rules: vec![TargetRule {
                dialect_family: "*".to_string(),
                subregion: "*".to_string(),
                apparent_gender: "*".to_string(),
                apparent_age_band: "*".to_string(),
                target: 10,
            }],
        };
        let counts = accumulate_counts([(cell("levantine"), 4)]);
        let snapshot = build_snapshot(&counts, &config, "2025-06-01T00:00:00Z");

        assert_eq!(snapshot.cells.len(), 1);
        let record = &snapshot.cells[0];
        assert_eq!(record.count, 4);
        assert_eq!(record.target, 10);
        assert!((record.pct_of_target - 0.4).abs() < 1e-12);
        assert_eq!(record.deficit, 6);
        assert!((snapshot.coverage_completeness - 0.4).abs() < 1e-12);
    }

    #[test]
    fn duplicate_observations_sum() {
        let counts = accumulate_counts([(cell("gulf"), 3), (cell("gulf"), 5)]);
        assert_eq!(counts.get(&cell("gulf")), Some(&8));
    }

    #[test]
    fn pct_clamps_and_deficit_floors_for_overfilled_cells() {
        let counts = accumulate_counts([(cell("gulf"), 99)]);
        let snapshot = build_snapshot(&counts, &config_with_default(10), "t");
        let record = &snapshot.cells[0];
        assert_eq!(record.pct_of_target, 1.0);
        assert_eq!(record.deficit, 0);
    }

    #[test]
    fn invariants_hold_across_mixed_counts() {
        let counts = accumulate_counts([
            (cell("a"), 0),
            (cell("b"), 7),
            (cell("c"), 25),
            (cell("d"), 40),
        ]);
        let snapshot = build_snapshot(&counts, &config_with_default(25), "t");
        for record in &snapshot.cells {
            assert!((0.0..=1.0).contains(&record.pct_of_target));
            assert_eq!(record.deficit == 0, record.count >= record.target);
            assert_eq!(record.pct_of_target == 1.0, record.count >= record.target);
        }
    }

    #[test]
    fn empty_input_yields_zero_completeness_not_nan() {
        let snapshot = build_snapshot(&BTreeMap::new(), &config_with_default(25), "t");
        assert_eq!(snapshot.coverage_completeness, 0.0);
        assert!(snapshot.cells.is_empty());
        assert!(snapshot.lowest_cells.is_empty());
    }

    #[test]
    fn lowest_cells_order_by_deficit_then_pct() {
        let counts = accumulate_counts([
            (cell("a"), 20), // deficit 5
            (cell("b"), 5),  // deficit 20
            (cell("c"), 25), // deficit 0, excluded
            (CellKey::new("d", "inland", "male", "45+"), 5), // deficit 20, same as b
        ]);
        let snapshot = build_snapshot(&counts, &config_with_default(25), "t");
        let keys: Vec<&str> = snapshot
            .lowest_cells
            .iter()
            .map(|record| record.cell_key.as_str())
            .collect();
        // b and d tie on deficit and pct; key order breaks the tie.
        assert_eq!(keys.len(), 3);
        assert!(keys[0].starts_with('b'));
        assert!(keys[1].starts_with('d'));
        assert!(keys[2].starts_with('a'));
    }

    #[test]
    fn snapshot_serde_round_trip_is_identical() {
        let counts = accumulate_counts([(cell("a"), 4), (cell("b"), 30), (cell("c"), 12)]);
        let snapshot = build_snapshot(&counts, &config_with_default(25), "2025-06-01T00:00:00Z");

        let encoded = serde_json::to_string_pretty(&snapshot).unwrap();
        let decoded: crate::model::CoverageSnapshot = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.coverage_completeness, snapshot.coverage_completeness);
        assert_eq!(decoded.cells.len(), snapshot.cells.len());
        for (a, b) in decoded.cells.iter().zip(snapshot.cells.iter()) {
            assert_eq!(a.cell_key, b.cell_key);
            assert_eq!(a.count, b.count);
            assert_eq!(a.target, b.target);
            assert_eq!(a.pct_of_target, b.pct_of_target);
            assert_eq!(a.deficit, b.deficit);
        }
        let decoded_lowest: Vec<&str> = decoded
            .lowest_cells
            .iter()
            .map(|record| record.cell_key.as_str())
            .collect();
        let original_lowest: Vec<&str> = snapshot
            .lowest_cells
            .iter()
            .map(|record| record.cell_key.as_str())
            .collect();
        assert_eq!(decoded_lowest, original_lowest);
    }
}
