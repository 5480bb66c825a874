use crate::error::ErrorClass;
use crate::pipeline::geometry::Quad;
use crate::run_artifacts::Report;
use image::RgbImage;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A decoded frame selected by the sampler.
pub struct SampledFrame {
    pub index: usize,
    pub image: RgbImage,
}

/// One OCR hit: four corners (top-left first) and the recognised string.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub corners: Quad,
    pub text: String,
}

impl Detection {
    pub fn new(corners: Quad, text: impl Into<String>) -> Self {
        Self {
            corners,
            text: text.into(),
        }
    }

    /// Axis-aligned detection, mostly useful for scripted OCR output.
    #[cfg(test)]
    pub fn from_rect(x: f32, y: f32, w: f32, h: f32, text: impl Into<String>) -> Self {
        Self::new(crate::pipeline::geometry::quad_from_rect(x, y, w, h), text)
    }

    pub fn left(&self) -> f32 {
        self.corners[0].x
    }

    pub fn top(&self) -> f32 {
        self.corners[0].y
    }
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Sampling,
    Detecting,
    Reconstructing,
    CheckingSpelling,
    Recording,
    Aggregating,
    Done,
    Cancelled,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Sampling => "sampling",
            RunState::Detecting => "detecting",
            RunState::Reconstructing => "reconstructing",
            RunState::CheckingSpelling => "checking spelling",
            RunState::Recording => "recording",
            RunState::Aggregating => "aggregating",
            RunState::Done => "done",
            RunState::Cancelled => "cancelled",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Messages delivered to the context that started a run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Log(String),
    FramePreview { index: usize, image: Arc<RgbImage> },
    Progress(u8),
    Completed(Report),
    Cancelled(Report),
    Failed {
        message: String,
        class: ErrorClass,
        partial: Option<Report>,
    },
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::Completed(_) | PipelineEvent::Cancelled(_) | PipelineEvent::Failed { .. }
        )
    }
}

/// Cooperative cancellation flag, checked by the worker between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
