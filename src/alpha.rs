use std::collections::BTreeMap;

/// Minimum items a cell needs before a per-cell alpha is reported at all.
pub const MIN_CELL_ITEMS: usize = 10;

/// Nominal (categorical) Krippendorff's alpha over items, each item being the
/// list of ratings independent annotators gave it. Items with fewer than two
/// ratings contribute nothing.
///
/// Returns `None` when there are no rateable pairs: "no data" is not the same
/// as zero, which would mean perfect disagreement. When the marginal
/// distribution has no variation at all (`De == 0`), agreement is exact by
/// construction, so the result is 1 if observed disagreement is zero and 0
/// otherwise.
pub fn nominal_alpha(items: &[Vec<i64>]) -> Option<f64> {
    let mut total_pairs: u64 = 0;
    let mut disagreements: u64 = 0;
    let mut total_ratings: u64 = 0;
    let mut category_counts: BTreeMap<i64, u64> = BTreeMap::new();

    for ratings in items {
        let n = ratings.len() as u64;
        if n < 2 {
            continue;
        }

        total_ratings += n;
        total_pairs += n * (n - 1) / 2;

        for rating in ratings {
            *category_counts.entry(*rating).or_insert(0) += 1;
        }

        for (i, left) in ratings.iter().enumerate() {
            for right in &ratings[i + 1..] {
                if left != right {
                    disagreements += 1;
                }
            }
        }
    }

    if total_pairs == 0 || total_ratings < 2 {
        return None;
    }

    let observed = disagreements as f64 / total_pairs as f64;

    let denom = (total_ratings * (total_ratings - 1)) as f64;
    let expected = category_counts
        .values()
        .map(|count| (count * (total_ratings - count)) as f64)
        .sum::<f64>()
        / denom;

    if expected == 0.0 {
        return Some(if observed == 0.0 { 1.0 } else { 0.0 });
    }

    let alpha = 1.0 - observed / expected;
    alpha.is_finite().then_some(alpha)
}
