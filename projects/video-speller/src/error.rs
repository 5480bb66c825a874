use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// How the pipeline reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Bad video or time range. Reported before any processing starts.
    Input,
    /// A lexicon could not be loaded. Checking continues without it.
    ResourceMissing,
    /// One frame could not be decoded or read. That frame is skipped.
    TransientFrame,
    /// The run cannot continue.
    Fatal,
}

#[derive(Debug, Error)]
pub enum SpellerError {
    #[error("failed to open video {path}: {reason}")]
    VideoOpen { path: PathBuf, reason: String },

    #[error("video reports an invalid frame rate ({0})")]
    InvalidFps(f64),

    #[error("invalid time range: {0}")]
    InvalidRange(String),

    #[error("failed to load OCR models: {0}")]
    OcrInit(String),

    #[error("{language} dictionary unavailable: {reason}")]
    ResourceMissing { language: String, reason: String },

    #[error("failed to decode frame {index}: {reason}")]
    FrameDecode { index: usize, reason: String },

    #[error("text detection failed on frame {index}: {reason}")]
    Ocr { index: usize, reason: String },

    #[error("a pipeline run is already active")]
    AlreadyRunning,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Fatal(String),
}

impl SpellerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SpellerError::VideoOpen { .. }
            | SpellerError::InvalidFps(_)
            | SpellerError::InvalidRange(_)
            | SpellerError::OcrInit(_)
            | SpellerError::AlreadyRunning => ErrorClass::Input,
            SpellerError::ResourceMissing { .. } => ErrorClass::ResourceMissing,
            SpellerError::FrameDecode { .. } | SpellerError::Ocr { .. } => {
                ErrorClass::TransientFrame
            }
            SpellerError::Io { .. } | SpellerError::Fatal(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::TransientFrame
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SpellerError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type SpellerResult<T> = std::result::Result<T, SpellerError>;
