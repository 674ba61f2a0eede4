use anyhow::{Context, Result, bail};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::info;

use crate::allocator::{compute_weights, pick_cell};
use crate::cli::AllocateArgs;
use crate::model::{AllocationOutcome, CellWeight, CoverageSnapshot};
use crate::util::{now_utc_string, read_json_opt, round4};

pub fn run(args: AllocateArgs) -> Result<()> {
    let snapshot_path = args
        .snapshot_path
        .unwrap_or_else(|| args.data_root.join("coverage_snapshot.json"));

    let Some(snapshot) = read_json_opt::<CoverageSnapshot>(&snapshot_path)? else {
        bail!(
            "coverage snapshot not found at {}; run the coverage job first",
            snapshot_path.display()
        );
    };

    let weights = compute_weights(&snapshot, args.alpha);

    let mut rng: Box<dyn RngCore> = match args.seed {
        Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
        None => Box::new(rand::rng()),
    };
    let picked = pick_cell(&weights, || rng.random::<f64>());

    let outcome = AllocationOutcome {
        generated_at: now_utc_string(),
        snapshot_generated_at: snapshot.generated_at.clone(),
        alpha: args.alpha,
        picked: picked.map(|cell| cell.canonical()),
        weights: weights
            .iter()
            .map(|(cell, weight)| CellWeight {
                cell: cell.canonical(),
                weight: round4(*weight),
            })
            .collect(),
    };

    let rendered =
        serde_json::to_string_pretty(&outcome).context("failed to serialize allocation")?;
    println!("{rendered}");

    info!(
        cells = outcome.weights.len(),
        picked = outcome.picked.as_deref().unwrap_or("none"),
        "allocation drawn"
    );

    Ok(())
}
