// Run artifact struct definitions
//
// These are the records a run produces: per-frame spelling errors and the
// aggregate report persisted (as text, JSON and CSV) in the output directory.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A word that failed lookup, with up to N ranked corrections.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpellError {
    pub word: String,
    pub suggestions: Vec<String>,
}

impl fmt::Display for SpellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.suggestions.is_empty() {
            write!(f, "{} (no suggestions)", self.word)
        } else {
            write!(f, "{} (maybe: {})", self.word, self.suggestions.join(", "))
        }
    }
}

/// Errors found on one sampled frame. Only frames with at least one error get one.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FrameResult {
    pub frame_index: usize,
    pub timecode_secs: f64,
    pub errors: Vec<SpellError>,
    pub full_text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed { message: String },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Cancelled => write!(f, "cancelled"),
            RunOutcome::Failed { message } => write!(f, "failed: {}", message),
        }
    }
}

/// Aggregate result of a run, built incrementally and finalized once.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Report {
    pub video_path: PathBuf,
    pub source_fps: f64,
    pub interval_secs: f64,
    pub start_secs: f64,
    pub end_secs: f64,
    pub started_at: DateTime<Local>,
    pub total_frames_processed: usize,
    /// Sampled frames dropped because decoding or OCR failed.
    pub frames_skipped: usize,
    pub frames_with_errors: Vec<FrameResult>,
    pub total_error_count: usize,
    pub output_dir: PathBuf,
    pub report_file: Option<PathBuf>,
    pub outcome: RunOutcome,
}

impl Report {
    pub fn frames_with_errors_count(&self) -> usize {
        self.frames_with_errors.len()
    }

    pub fn record(&mut self, frame: FrameResult) {
        self.total_error_count += frame.errors.len();
        self.frames_with_errors.push(frame);
    }
}

/// `12.34 s (0:12)`
pub fn format_timecode(secs: f64) -> String {
    let whole = secs.max(0.0) as u64;
    format!("{:.2} s ({}:{:02})", secs, whole / 60, whole % 60)
}

/// `m:ss`, used in window descriptions.
pub fn format_clock(secs: f64) -> String {
    let whole = secs.max(0.0) as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}
