use anyhow::{Context, Result};
use regex::Regex;

/// One transcript cue, reduced to what agreement scoring needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
    pub has_voice_tag: bool,
}

/// Tolerant WebVTT reader: anything that is not a recognizable timing line or
/// its payload is skipped, including the header, notes, and cue identifiers.
pub fn parse_vtt_cues(raw: &str) -> Result<Vec<Cue>> {
    let timing = Regex::new(
        r"(\d{2}):(\d{2}):(\d{2})(?:\.(\d+))?\s*-->\s*(\d{2}):(\d{2}):(\d{2})(?:\.(\d+))?",
    )
    .context("invalid cue timing pattern")?;
    let voice_tag = Regex::new(r"(?i)^<v\s+s\d+>").context("invalid voice tag pattern")?;

    let mut cues = Vec::new();
    let mut current: Option<Cue> = None;

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');

        if let Some(caps) = timing.captures(line) {
            if let Some(cue) = current.take() {
                cues.push(cue);
            }
            current = Some(Cue {
                start_secs: timestamp_secs(&caps, 1),
                end_secs: timestamp_secs(&caps, 5),
                text: String::new(),
                has_voice_tag: false,
            });
            continue;
        }

        if line.trim().is_empty() {
            if let Some(cue) = current.take() {
                cues.push(cue);
            }
            continue;
        }

        let Some(cue) = current.as_mut() else {
            continue;
        };

        if voice_tag.is_match(line.trim_start()) {
            cue.has_voice_tag = true;
        }
        if !cue.text.is_empty() {
            cue.text.push(' ');
        }
        cue.text.push_str(line.trim());
    }

    if let Some(cue) = current.take() {
        cues.push(cue);
    }

    Ok(cues)
}

fn timestamp_secs(caps: &regex::Captures<'_>, base: usize) -> f64 {
    let field = |index: usize| {
        caps.get(base + index)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    let frac = caps
        .get(base + 3)
        .map(|m| {
            let digits = m.as_str();
            digits.parse::<f64>().unwrap_or(0.0) / 10_f64.powi(digits.len() as i32)
        })
        .unwrap_or(0.0);
    field(0) * 3600.0 + field(1) * 60.0 + field(2) + frac
}

/// Two-pointer alignment of cue lists by start time. Each cue pairs with at
/// most one counterpart; unpaired cues fall out of the comparison entirely.
pub fn align_cues<'a>(
    left: &'a [Cue],
    right: &'a [Cue],
    tolerance_secs: f64,
) -> Vec<(&'a Cue, &'a Cue)> {
    let mut pairs = Vec::new();
    let mut i = 0;
    let mut j = 0;

    while i < left.len() && j < right.len() {
        let delta = left[i].start_secs - right[j].start_secs;
        if delta.abs() <= tolerance_secs {
            pairs.push((&left[i], &right[j]));
            i += 1;
            j += 1;
        } else if delta < 0.0 {
            i += 1;
        } else {
            j += 1;
        }
    }

    pairs
}
