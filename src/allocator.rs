use std::collections::BTreeMap;

use crate::cell::CellKey;
use crate::model::CoverageSnapshot;

pub const DEFAULT_ALPHA: f64 = 2.0;
const UNDER_TARGET_BOOST: f64 = 1.25;
const DEFICIT_BOOST: f64 = 1.15;
const DEFICIT_BOOST_MIN: u64 = 20;

/// Probability mass over cells, biased toward under-filled ones:
/// `(1 - pct)^alpha` with boosts for badly-covered and high-deficit cells.
/// Fully covered cells stay in the output with weight zero so callers see
/// every tracked cell; when no cell has positive mass the weights are all
/// zero rather than dividing by zero.
pub fn compute_weights(snapshot: &CoverageSnapshot, alpha: f64) -> Vec<(CellKey, f64)> {
    let alpha = if alpha.is_finite() && alpha > 0.0 {
        alpha
    } else {
        DEFAULT_ALPHA
    };

    let mut scores: BTreeMap<CellKey, f64> = BTreeMap::new();
    let mut total = 0.0_f64;

    for record in &snapshot.cells {
        if record.target == 0 {
            continue;
        }
        let pct = (record.count as f64 / record.target as f64).clamp(0.0, 1.0);
        let mut score = (1.0 - pct).powf(alpha);
        if !score.is_finite() || score <= 0.0 {
            score = 0.0;
        } else {
            if pct < 0.5 {
                score *= UNDER_TARGET_BOOST;
            }
            if record.deficit >= DEFICIT_BOOST_MIN {
                score *= DEFICIT_BOOST;
            }
        }

        *scores.entry(record.cell()).or_insert(0.0) += score;
        total += score;
    }

    if total > 0.0 {
        scores
            .into_iter()
            .map(|(cell, score)| (cell, score / total))
            .collect()
    } else {
        scores.into_iter().map(|(cell, _)| (cell, 0.0)).collect()
    }
}

/// Inverse-CDF draw over entries with positive weight. All-zero weights fall
/// back to the last entry (documented degenerate case, not an error); an
/// empty slice yields `None`. The random source is injected so draws are
/// reproducible in tests.
pub fn pick_cell<F>(weights: &[(CellKey, f64)], mut rng: F) -> Option<&CellKey>
where
    F: FnMut() -> f64,
{
    if weights.is_empty() {
        return None;
    }

    let positive: Vec<&(CellKey, f64)> = weights
        .iter()
        .filter(|(_, weight)| weight.is_finite() && *weight > 0.0)
        .collect();
    let Some(last_positive) = positive.last() else {
        return weights.last().map(|(cell, _)| cell);
    };

    let total: f64 = positive.iter().map(|(_, weight)| weight).sum();
    let roll = rng().clamp(0.0, 1.0) * total;

    let mut cumulative = 0.0;
    for (cell, weight) in &positive {
        cumulative += weight;
        if roll <= cumulative {
            return Some(cell);
        }
    }
    Some(&last_positive.0)
}
