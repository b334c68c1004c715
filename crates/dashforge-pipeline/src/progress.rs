//! Transcoder progress tracking.
//!
//! ffmpeg is run with `-progress pipe:2`, so its stderr interleaves
//! `out_time=HH:MM:SS.ffffff` lines with ordinary log output. Every line is
//! either turned into a completion fraction or handed to the diagnostic sink.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::sink::{DiagnosticSink, ProgressSink};

fn elapsed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"time=(-?)(\d+):([0-5]\d):([0-5]\d(?:\.\d+)?)")
            .expect("valid elapsed-time regex")
    })
}

/// Extract the elapsed media time from a transcoder output line.
///
/// Matches both `out_time=00:01:02.500000` and the classic stats line
/// `... time=00:01:02.50 bitrate=...`. ffmpeg reports a small negative time
/// before the first frame; that reads as zero. A time too large to represent
/// yields `None`.
pub fn parse_elapsed(line: &str) -> Option<Duration> {
    let caps = elapsed_pattern().captures(line)?;
    if !caps[1].is_empty() {
        return Some(Duration::ZERO);
    }
    let hours: u64 = caps[2].parse().ok()?;
    let minutes: u64 = caps[3].parse().ok()?;
    let seconds: f64 = caps[4].parse().ok()?;
    let whole = hours.checked_mul(3600)?.checked_add(minutes * 60)?;
    Duration::from_secs(whole).checked_add(Duration::from_secs_f64(seconds))
}

/// Converts transcoder output lines into completion fractions for one run.
pub struct ProgressTracker<'a> {
    duration_secs: f64,
    progress: &'a dyn ProgressSink,
    diagnostics: &'a dyn DiagnosticSink,
}

impl<'a> ProgressTracker<'a> {
    /// `duration_secs` is the source duration; when it is not positive no
    /// progress can be computed and elapsed-time lines are dropped.
    pub fn new(
        duration_secs: f64,
        progress: &'a dyn ProgressSink,
        diagnostics: &'a dyn DiagnosticSink,
    ) -> Self {
        Self {
            duration_secs,
            progress,
            diagnostics,
        }
    }

    /// Handle one line of transcoder output.
    pub fn observe(&self, line: &str) {
        match parse_elapsed(line) {
            Some(elapsed) => {
                if self.duration_secs > 0.0 {
                    let seconds = elapsed.as_millis() as f64 / 1000.0;
                    self.progress
                        .report((seconds / self.duration_secs).clamp(0.0, 1.0));
                }
            }
            None => self.diagnostics.accept(line),
        }
    }
}
