use std::fmt;

use serde_json::Value;

use crate::category::{
    self, AGE_BAND_ALIASES, DIALECT_FAMILY_ALIASES, GENDER_ALIASES, SUBREGION_ALIASES, UNKNOWN,
};
use crate::targets::TargetRule;

pub const FIELD_DELIMITER: char = ':';
pub const WILDCARD: &str = "*";

/// One stratification cell, identified purely by its normalized 4-tuple.
/// Two keys with equal tuples are the same cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub dialect_family: String,
    pub subregion: String,
    pub apparent_gender: String,
    pub apparent_age_band: String,
}

impl CellKey {
    pub fn new(
        dialect_family: impl Into<String>,
        subregion: impl Into<String>,
        apparent_gender: impl Into<String>,
        apparent_age_band: impl Into<String>,
    ) -> Self {
        Self {
            dialect_family: category::normalize_category_str(&dialect_family.into()),
            subregion: category::normalize_category_str(&subregion.into()),
            apparent_gender: category::normalize_category_str(&apparent_gender.into()),
            apparent_age_band: category::normalize_category_str(&apparent_age_band.into()),
        }
    }

    pub fn unknown() -> Self {
        Self {
            dialect_family: UNKNOWN.to_string(),
            subregion: UNKNOWN.to_string(),
            apparent_gender: UNKNOWN.to_string(),
            apparent_age_band: UNKNOWN.to_string(),
        }
    }

    /// Build a key from a loosely-shaped attributes object, probing the alias
    /// tables for each field.
    pub fn from_attributes(source: &Value) -> Self {
        Self {
            dialect_family: category::category_from(source, DIALECT_FAMILY_ALIASES),
            subregion: category::category_from(source, SUBREGION_ALIASES),
            apparent_gender: category::category_from(source, GENDER_ALIASES),
            apparent_age_band: category::category_from(source, AGE_BAND_ALIASES),
        }
    }

    /// Parse the canonical `:`-joined form. A bare value with no delimiter is
    /// treated as a dialect family with the remaining fields unknown; missing
    /// trailing fields fill in as unknown.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::unknown();
        }
        if !trimmed.contains(FIELD_DELIMITER) {
            let mut key = Self::unknown();
            key.dialect_family = category::normalize_category_str(trimmed);
            return key;
        }

        let mut parts = trimmed.splitn(4, FIELD_DELIMITER);
        let mut next = |fallback: &str| {
            parts
                .next()
                .map(|part| {
                    let part = part.trim();
                    if part == WILDCARD {
                        WILDCARD.to_string()
                    } else {
                        category::normalize_category_str(part)
                    }
                })
                .unwrap_or_else(|| fallback.to_string())
        };

        Self {
            dialect_family: next(UNKNOWN),
            subregion: next(UNKNOWN),
            apparent_gender: next(UNKNOWN),
            apparent_age_band: next(UNKNOWN),
        }
    }

    pub fn canonical(&self) -> String {
        format!(
            "{}{delim}{}{delim}{}{delim}{}",
            self.dialect_family,
            self.subregion,
            self.apparent_gender,
            self.apparent_age_band,
            delim = FIELD_DELIMITER
        )
    }

    /// Grouping key for reliability summaries: speaker-apparent fields are
    /// wildcarded because per-pass metadata rarely carries them.
    pub fn speaker_wildcard(mut self) -> Self {
        self.apparent_gender = WILDCARD.to_string();
        self.apparent_age_band = WILDCARD.to_string();
        self
    }

    pub fn matches_rule(&self, rule: &TargetRule) -> bool {
        field_matches(&rule.dialect_family, &self.dialect_family)
            && field_matches(&rule.subregion, &self.subregion)
            && field_matches(&rule.apparent_gender, &self.apparent_gender)
            && field_matches(&rule.apparent_age_band, &self.apparent_age_band)
    }
}

fn field_matches(rule_value: &str, cell_value: &str) -> bool {
    rule_value == WILDCARD || rule_value == cell_value
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_attributes_is_commutative_under_alias_choice() {
        let canonical = CellKey::from_attributes(&json!({
            "dialect_family": "Levantine",
            "subregion": "Urban North",
            "apparent_gender": "Female",
            "apparent_age_band": "18-29"
        }));
        let aliased = CellKey::from_attributes(&json!({
            "dialect": "levantine",
            "dialect_region": "  urban north ",
            "gender_norm": "FEMALE",
            "age_group": "18-29"
        }));
        assert_eq!(canonical, aliased);
        assert_eq!(canonical.canonical(), "levantine:urban north:female:18-29");
    }

    #[test]
    fn missing_attributes_fall_back_to_unknown() {
        let key = CellKey::from_attributes(&json!({ "dialect_family": "Gulf" }));
        assert_eq!(key.canonical(), "gulf:unknown:unknown:unknown");
        assert_eq!(CellKey::from_attributes(&json!(null)), CellKey::unknown());
    }

    #[test]
    fn parse_handles_delimited_bare_and_blank_forms() {
        assert_eq!(
            CellKey::parse("Levantine:Urban North:FEMALE:18-29").canonical(),
            "levantine:urban north:female:18-29"
        );
        assert_eq!(CellKey::parse("gulf").canonical(), "gulf:unknown:unknown:unknown");
        assert_eq!(CellKey::parse("  "), CellKey::unknown());
        assert_eq!(CellKey::parse("gulf:coastal").canonical(), "gulf:coastal:unknown:unknown");
    }

    #[test]
    fn parse_preserves_wildcard_fields() {
        let key = CellKey::parse("levantine:urban north:*:*");
        assert_eq!(key.apparent_gender, WILDCARD);
        assert_eq!(key.apparent_age_band, WILDCARD);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let key = CellKey::new("Gulf", "Coastal", "male", "30-44");
        assert_eq!(CellKey::parse(&key.to_string()), key);
    }

    #[test]
    fn speaker_wildcard_masks_gender_and_age() {
        let key = CellKey::new("gulf", "coastal", "male", "30-44").speaker_wildcard();
        assert_eq!(key.canonical(), "gulf:coastal:*:*");
    }

    #[test]
    fn matches_rule_respects_wildcards() {
        let cell = CellKey::new("gulf", "coastal", "male", "30-44");
        let rule = TargetRule {
            dialect_family: "gulf".to_string(),
            subregion: WILDCARD.to_string(),
            apparent_gender: WILDCARD.to_string(),
            apparent_age_band: WILDCARD.to_string(),
            target: 10,
        };
        assert!(cell.matches_rule(&rule));

        let mismatched = TargetRule {
            dialect_family: "levantine".to_string(),
            ..rule
        };
        assert!(!cell.matches_rule(&mismatched));
    }
}
