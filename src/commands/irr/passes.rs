use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use super::cues::{Cue, parse_vtt_cues};
use crate::util::file_mtime_millis;

const CODE_SWITCH_FILE: &str = "code_switch_spans.json";
const TRANSCRIPT_FILE: &str = "transcript.vtt";

/// Everything one annotation pass contributed for one clip. Either artifact
/// may be missing; a clip only becomes comparable when both passes carry the
/// same judgment.
#[derive(Debug, Default, Clone)]
pub struct PassRecord {
    pub annotator: String,
    pub has_code_switch: Option<bool>,
    pub cues: Option<Vec<Cue>>,
    code_switch_mtime_ms: u64,
    transcript_mtime_ms: u64,
}

#[derive(Debug, Default, Clone)]
pub struct ClipPasses {
    pub passes: BTreeMap<u32, PassRecord>,
}

/// Walk the annotations tree and bucket pass artifacts per clip. The layout
/// is loose by necessity: annotators and passes appear as path segments in
/// either order (`<asset>/pass_1/<annotator>/...` or
/// `<asset>/<annotator>/pass-1/...`). Unreadable artifacts are logged and
/// skipped so one bad export cannot sink the nightly run.
pub fn collect_passes(root: &Path) -> Result<BTreeMap<String, ClipPasses>> {
    let pass_pattern = Regex::new(r"(?i)^pass[_-]?(\d+)$").context("invalid pass pattern")?;

    let mut clips: BTreeMap<String, ClipPasses> = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "skipping unreadable directory");
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if file_name != CODE_SWITCH_FILE && file_name != TRANSCRIPT_FILE {
                continue;
            }

            let Some(location) = locate_artifact(root, &path, &pass_pattern) else {
                continue;
            };

            let record = clips
                .entry(location.asset_id)
                .or_default()
                .passes
                .entry(location.pass)
                .or_default();
            if record.annotator.is_empty() {
                record.annotator = location.annotator;
            }

            let mtime_ms = match file_mtime_millis(&path) {
                Ok(mtime) => mtime,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping artifact");
                    continue;
                }
            };

            // Re-exports land next to stale copies; the newest file wins.
            match file_name {
                CODE_SWITCH_FILE if mtime_ms >= record.code_switch_mtime_ms => {
                    if let Some(vote) = read_code_switch_vote(&path) {
                        record.has_code_switch = Some(vote);
                        record.code_switch_mtime_ms = mtime_ms;
                    }
                }
                TRANSCRIPT_FILE if mtime_ms >= record.transcript_mtime_ms => {
                    if let Some(cues) = read_transcript(&path) {
                        record.cues = Some(cues);
                        record.transcript_mtime_ms = mtime_ms;
                    }
                }
                _ => {}
            }
        }
    }

    Ok(clips)
}

struct ArtifactLocation {
    asset_id: String,
    pass: u32,
    annotator: String,
}

fn locate_artifact(root: &Path, path: &Path, pass_pattern: &Regex) -> Option<ArtifactLocation> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<&str> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .collect();
    // <asset>/.../<file>: need at least a clip directory and a pass segment.
    if segments.len() < 3 {
        return None;
    }

    let asset_id = segments[0].to_string();
    let intermediate = &segments[1..segments.len() - 1];

    let pass = intermediate.iter().find_map(|segment| {
        pass_pattern
            .captures(segment)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    })?;

    let annotator = intermediate
        .iter()
        .find(|segment| {
            !pass_pattern.is_match(segment)
                && !matches!(segment.to_lowercase().as_str(), "merged" | "aggregate")
        })
        .map(|segment| segment.to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());

    Some(ArtifactLocation {
        asset_id,
        pass,
        annotator,
    })
}

/// A pass votes "code-switching present" by exporting at least one span.
fn read_code_switch_vote(path: &Path) -> Option<bool> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping unreadable code switch spans");
            return None;
        }
    };
    let value: Value = match serde_json::from_slice(&raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping malformed code switch spans");
            return None;
        }
    };

    let spans = match &value {
        Value::Array(spans) => spans,
        Value::Object(map) => match map.get("spans") {
            Some(Value::Array(spans)) => spans,
            _ => return None,
        },
        _ => return None,
    };
    Some(!spans.is_empty())
}

fn read_transcript(path: &Path) -> Option<Vec<Cue>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping unreadable transcript");
            return None;
        }
    };
    match parse_vtt_cues(&raw) {
        Ok(cues) => Some(cues),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping unparsable transcript");
            None
        }
    }
}

pub fn meta_path(root: &Path, asset_id: &str) -> PathBuf {
    root.join(asset_id).join("item_meta.json")
}
