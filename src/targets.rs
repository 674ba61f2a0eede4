use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use tracing::warn;

use crate::cell::{CellKey, WILDCARD};
use crate::category;
use crate::util::read_json_opt;

/// Fallback when configuration is absent or supplies an unusable default.
pub const DEFAULT_TARGET_PER_CELL: u64 = 25;

/// One configured target rule. Fields are either a normalized concrete value
/// or the wildcard `*`; `specificity` counts the concrete ones.
#[derive(Debug, Clone)]
pub struct TargetRule {
    pub dialect_family: String,
    pub subregion: String,
    pub apparent_gender: String,
    pub apparent_age_band: String,
    pub target: u64,
}

impl TargetRule {
    pub fn specificity(&self) -> usize {
        [
            &self.dialect_family,
            &self.subregion,
            &self.apparent_gender,
            &self.apparent_age_band,
        ]
        .iter()
        .filter(|field| field.as_str() != WILDCARD)
        .count()
    }
}

#[derive(Debug, Clone)]
pub struct TargetsConfig {
    pub default_target_per_cell: u64,
    pub rules: Vec<TargetRule>,
}

impl TargetsConfig {
    pub fn builtin() -> Self {
        Self {
            default_target_per_cell: DEFAULT_TARGET_PER_CELL,
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTargetsFile {
    #[serde(default)]
    default_target_per_cell: Option<f64>,
    #[serde(default)]
    rules: Vec<RawTargetRule>,
}

#[derive(Debug, Deserialize)]
struct RawTargetRule {
    #[serde(default)]
    dialect_family: Option<String>,
    #[serde(default)]
    subregion: Option<String>,
    #[serde(default)]
    apparent_gender: Option<String>,
    #[serde(default)]
    apparent_age_band: Option<String>,
    #[serde(default)]
    target: Option<f64>,
}

/// Load target rules, read once per run. A missing file is not an error: it
/// means the built-in default target and no rules.
pub fn load_targets(path: &Path) -> Result<TargetsConfig> {
    let Some(raw) = read_json_opt::<RawTargetsFile>(path)? else {
        warn!(path = %path.display(), "targets config missing; using built-in default");
        return Ok(TargetsConfig::builtin());
    };

    // Targets must stay >= 1 after rounding or downstream ratios divide by
    // zero, so fractional values below 0.5 round up instead of down.
    let default_target_per_cell = match raw.default_target_per_cell {
        Some(value) if value.is_finite() && value > 0.0 => (value.round() as u64).max(1),
        Some(value) => {
            warn!(
                configured = value,
                fallback = DEFAULT_TARGET_PER_CELL,
                "non-positive default target in config; using fallback"
            );
            DEFAULT_TARGET_PER_CELL
        }
        None => DEFAULT_TARGET_PER_CELL,
    };

    let mut rules = Vec::with_capacity(raw.rules.len());
    for (index, rule) in raw.rules.into_iter().enumerate() {
        let target = match rule.target {
            Some(value) if value.is_finite() && value > 0.0 => (value.round() as u64).max(1),
            _ => {
                warn!(rule_index = index, "dropping target rule without a positive target");
                continue;
            }
        };

        rules.push(TargetRule {
            dialect_family: normalize_rule_field(rule.dialect_family),
            subregion: normalize_rule_field(rule.subregion),
            apparent_gender: normalize_rule_field(rule.apparent_gender),
            apparent_age_band: normalize_rule_field(rule.apparent_age_band),
            target,
        });
    }

    Ok(TargetsConfig {
        default_target_per_cell,
        rules,
    })
}

fn normalize_rule_field(value: Option<String>) -> String {
    match value {
        Some(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed == WILDCARD {
                WILDCARD.to_string()
            } else {
                category::normalize_category_str(trimmed)
            }
        }
        None => WILDCARD.to_string(),
    }
}

/// Most specific matching rule wins; ties resolve to the earliest rule in
/// config order, so resolution is deterministic for a fixed config.
pub fn resolve_target(cell: &CellKey, config: &TargetsConfig) -> u64 {
    let mut best: Option<(usize, u64)> = None;

    for rule in &config.rules {
        if !cell.matches_rule(rule) {
            continue;
        }
        let specificity = rule.specificity();
        match best {
            Some((current, _)) if specificity <= current => {}
            _ => best = Some((specificity, rule.target)),
        }
    }

    best.map(|(_, target)| target)
        .unwrap_or(config.default_target_per_cell)
}
