use crate::config::{
    SamplingConfig, SpellerConfig, SpellingPolicy, DEFAULT_EVENT_CAPACITY,
    DEFAULT_LINE_THRESHOLD, DEFAULT_MAX_SUGGESTIONS, DEFAULT_MIN_WORD_LEN,
};
use crate::video::VideoBackend;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Find spelling errors in on-screen video text", long_about = None)]
pub struct Args {
    /// Directory holding ru_RU and en_US Hunspell dictionaries
    #[arg(long, global = true, env = "VIDEO_SPELLER_DICTIONARY_DIR", default_value = "dictionaries")]
    pub dictionary_dir: PathBuf,

    /// Whitelist file, one accepted word per line
    #[arg(long, global = true, env = "VIDEO_SPELLER_WHITELIST", default_value = "custom_dictionary.txt")]
    pub whitelist: PathBuf,

    /// Directory for evidence frames and reports
    #[arg(long, global = true, env = "VIDEO_SPELLER_OUTPUT_DIR", default_value = "screenshots_with_errors")]
    pub output_dir: PathBuf,

    /// Directory holding the OCR models
    #[arg(long, global = true, env = "VIDEO_SPELLER_MODEL_DIR", default_value = "models")]
    pub model_dir: PathBuf,

    /// Video decoding backend
    #[arg(long, global = true, env = "VIDEO_SPELLER_BACKEND", value_enum, default_value_t = VideoBackend::Opencv)]
    pub backend: VideoBackend,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sample a video, OCR each frame and report misspelled words
    Check(CheckArgs),

    /// Print frame rate, frame count and duration of a video
    Info {
        video: PathBuf,
    },

    /// Show which dictionaries and whitelist are available
    Dictionaries,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    pub video: PathBuf,

    /// Seconds between sampled frames
    #[arg(long, default_value_t = 2.0)]
    pub interval: f64,

    /// Start of the analysed range, in seconds
    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    /// End of the analysed range, in seconds (default: end of video)
    #[arg(long)]
    pub end: Option<f64>,

    /// Max vertical pixel distance for words on the same line
    #[arg(long, default_value_t = DEFAULT_LINE_THRESHOLD)]
    pub line_threshold: f32,

    /// Shortest word (in characters) that is checked
    #[arg(long, default_value_t = DEFAULT_MIN_WORD_LEN)]
    pub min_word_len: usize,

    /// Suggestions listed per misspelled word
    #[arg(long, default_value_t = DEFAULT_MAX_SUGGESTIONS)]
    pub max_suggestions: usize,

    /// Stop (as a cancellation) after this many sampled frames
    #[arg(long)]
    pub max_frames: Option<usize>,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Runtime configuration shared by every command.
    pub fn speller_config(&self) -> SpellerConfig {
        let mut config = SpellerConfig {
            dictionary_dir: self.dictionary_dir.clone(),
            whitelist_path: self.whitelist.clone(),
            output_dir: self.output_dir.clone(),
            model_dir: self.model_dir.clone(),
            backend: self.backend,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            ..SpellerConfig::default()
        };
        if let Command::Check(check) = &self.command {
            config.line_threshold = check.line_threshold;
            config.spelling = SpellingPolicy {
                min_word_len: check.min_word_len,
                max_suggestions: check.max_suggestions,
            };
        }
        config
    }
}

impl CheckArgs {
    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            interval_secs: self.interval,
            start_secs: self.start,
            end_secs: self.end,
        }
    }
}
