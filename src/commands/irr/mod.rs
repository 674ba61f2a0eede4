mod cues;
mod passes;
mod run;
#[cfg(test)]
mod tests;

pub use run::run;

/// Cue start times within this many seconds are treated as the same cue
/// across passes.
pub const CUE_ALIGN_TOLERANCE_SECS: f64 = 0.12;
/// Rolling trend keeps at most this many daily entries per judgment.
pub const TREND_MAX_ENTRIES: usize = 30;

pub const HAS_CODE_SWITCH_LABEL: &str = "has_code_switch";
pub const VOICE_TAG_LABEL: &str = "voice_tag";
