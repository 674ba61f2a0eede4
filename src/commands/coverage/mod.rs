mod run;

pub use run::run;

/// Coverage below this fraction of target counts as "low".
pub const LOW_COVERAGE_THRESHOLD: f64 = 0.25;
/// A cell must dwell below threshold this long before it alerts at all.
pub const MIN_STALE_HOURS: f64 = 48.0;
/// Repeat suppression window once a cell has alerted.
pub const REPEAT_HOURS: f64 = 24.0;
/// Append-only alert log cap; oldest lines drop beyond this.
pub const MAX_ALERT_LOG_LINES: usize = 1000;
/// Size of the "latest alerts" feed view.
pub const ALERT_FEED_SIZE: usize = 50;
