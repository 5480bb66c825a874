// Runtime configuration resolved once at startup and passed down to each component.

use crate::video::VideoBackend;
use serde::Serialize;
use std::path::PathBuf;

pub const DEFAULT_LINE_THRESHOLD: f32 = 20.0;
pub const DEFAULT_MIN_WORD_LEN: usize = 3;
pub const DEFAULT_MAX_SUGGESTIONS: usize = 3;
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Tokenizer and lookup policy for the spell checker.
#[derive(Debug, Clone, Serialize)]
pub struct SpellingPolicy {
    /// Candidates shorter than this (in characters) are ignored.
    pub min_word_len: usize,
    pub max_suggestions: usize,
}

impl Default for SpellingPolicy {
    fn default() -> Self {
        Self {
            min_word_len: DEFAULT_MIN_WORD_LEN,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpellerConfig {
    /// Directory holding `ru_RU.aff/.dic` and `en_US.aff/.dic`.
    pub dictionary_dir: PathBuf,
    /// One word per line, `#` comments allowed.
    pub whitelist_path: PathBuf,
    pub output_dir: PathBuf,
    /// Directory holding `text-detection.rten` and `text-recognition.rten`.
    pub model_dir: PathBuf,
    pub backend: VideoBackend,
    /// Max vertical distance (pixels) between a detection and the first
    /// detection of the line it joins.
    pub line_threshold: f32,
    pub spelling: SpellingPolicy,
    pub event_capacity: usize,
}

impl Default for SpellerConfig {
    fn default() -> Self {
        Self {
            dictionary_dir: PathBuf::from("dictionaries"),
            whitelist_path: PathBuf::from("custom_dictionary.txt"),
            output_dir: PathBuf::from("screenshots_with_errors"),
            model_dir: PathBuf::from("models"),
            backend: VideoBackend::Opencv,
            line_threshold: DEFAULT_LINE_THRESHOLD,
            spelling: SpellingPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Which part of the video to analyse and how densely.
#[derive(Debug, Clone, Serialize)]
pub struct SamplingConfig {
    pub interval_secs: f64,
    pub start_secs: f64,
    /// `None` means "until the end of the video".
    pub end_secs: Option<f64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2.0,
            start_secs: 0.0,
            end_secs: None,
        }
    }
}
