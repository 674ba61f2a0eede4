use serde_json::Value;

pub const UNKNOWN: &str = "unknown";

/// Accepted field spellings per logical speaker attribute, most canonical
/// first. Upstream records come from several editors and export paths, so the
/// probe order is part of the contract: the first non-null alias wins.
pub const DIALECT_FAMILY_ALIASES: &[&str] = &[
    "dialect_family",
    "dialectFamily",
    "dialect_family_code",
    "dialect_family_label",
    "dialect",
    "family",
];

pub const SUBREGION_ALIASES: &[&str] = &[
    "subregion",
    "dialect_subregion",
    "dialectSubregion",
    "dialect_region",
    "sub_dialect",
    "region",
    "province",
];

pub const GENDER_ALIASES: &[&str] = &[
    "apparent_gender",
    "apparentGender",
    "gender",
    "gender_norm",
    "speaker_gender",
];

pub const AGE_BAND_ALIASES: &[&str] = &[
    "apparent_age_band",
    "apparentAgeBand",
    "age_band",
    "ageBand",
    "age",
    "age_group",
    "ageGroup",
];

/// Canonicalize a free-form attribute value. Total and idempotent: every
/// input has a defined output, and normalizing an already-normalized value
/// returns it unchanged.
pub fn normalize_category(value: &Value) -> String {
    match value {
        Value::String(text) => normalize_category_str(text),
        Value::Number(num) => num.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

pub fn normalize_category_str(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        UNKNOWN.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

/// First alias present on `source` with a usable value. Null and
/// whitespace-only strings do not count as present.
pub fn first_defined<'a>(source: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let object = source.as_object()?;
    for key in keys {
        match object.get(*key) {
            None | Some(Value::Null) => continue,
            Some(Value::String(text)) if text.trim().is_empty() => continue,
            Some(value) => return Some(value),
        }
    }
    None
}

pub fn category_from(source: &Value, keys: &[&str]) -> String {
    first_defined(source, keys)
        .map(normalize_category)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Shared parser for boolean-ish flags ("yes", "true", 1, ...). Every flag
/// consumer goes through this; unknown inputs stay unknown instead of
/// collapsing to false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    True,
    False,
    Unknown,
}

impl TriState {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(true) => Self::True,
            Value::Bool(false) => Self::False,
            Value::Number(num) => match num.as_f64() {
                Some(v) if v == 0.0 => Self::False,
                Some(_) => Self::True,
                None => Self::Unknown,
            },
            Value::String(text) => match text.trim().to_lowercase().as_str() {
                "yes" | "y" | "true" | "1" => Self::True,
                "no" | "n" | "false" | "0" => Self::False,
                _ => Self::Unknown,
            },
            _ => Self::Unknown,
        }
    }

    pub fn is_true(self) -> bool {
        self == Self::True
    }
}
