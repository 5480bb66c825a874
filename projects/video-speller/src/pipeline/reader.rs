// Reader stage: resolves the analysis window and samples frames from the video.

use crate::error::{SpellerError, SpellerResult};
use crate::pipeline::types::SampledFrame;
use crate::video::VideoReader;
use std::path::{Path, PathBuf};

/// Consecutive undecodable frames after which the decoder is considered broken.
const MAX_CONSECUTIVE_DECODE_FAILURES: usize = 8;

/// Frame range of one run. `start_frame < end_frame <= total_frames`.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoWindow {
    pub path: PathBuf,
    pub fps: f64,
    pub total_frames: usize,
    pub start_frame: usize,
    pub end_frame: usize,
    /// The requested start lay beyond the end of the video and was reset to 0.
    pub start_clamped: bool,
}

impl VideoWindow {
    pub fn resolve(
        path: &Path,
        fps: f64,
        total_frames: usize,
        start_secs: f64,
        end_secs: Option<f64>,
    ) -> SpellerResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SpellerError::InvalidFps(fps));
        }
        if !start_secs.is_finite() || start_secs < 0.0 {
            return Err(SpellerError::InvalidRange(format!(
                "start time {}s must be a non-negative number",
                start_secs
            )));
        }
        if let Some(end) = end_secs {
            if !end.is_finite() || end < 0.0 {
                return Err(SpellerError::InvalidRange(format!(
                    "end time {}s must be a non-negative number",
                    end
                )));
            }
        }

        let mut start_frame = (start_secs * fps) as usize;
        let mut end_frame = end_secs.map_or(total_frames, |end| (end * fps) as usize);

        let mut start_clamped = false;
        if start_frame >= total_frames {
            tracing::warn!(
                "Start time {}s exceeds video duration {:.1}s, starting from 0",
                start_secs,
                total_frames as f64 / fps
            );
            start_frame = 0;
            start_clamped = true;
        }
        if end_frame > total_frames {
            end_frame = total_frames;
        }
        if start_frame >= end_frame {
            return Err(SpellerError::InvalidRange(format!(
                "start time ({}s) must be before end time ({})",
                start_secs,
                end_secs.map_or_else(|| "end of video".to_string(), |e| format!("{}s", e))
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            fps,
            total_frames,
            start_frame,
            end_frame,
            start_clamped,
        })
    }

    pub fn start_secs(&self) -> f64 {
        self.start_frame as f64 / self.fps
    }

    pub fn end_secs(&self) -> f64 {
        self.end_frame as f64 / self.fps
    }

    /// Number of frames the sampler will select if the stream is not cut short.
    pub fn expected_samples(&self, frame_interval: usize) -> usize {
        (self.end_frame - self.start_frame).div_ceil(frame_interval.max(1))
    }
}

/// Frames between two samples; never less than 1.
pub fn frame_interval(fps: f64, interval_secs: f64) -> usize {
    let frames = (fps * interval_secs).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as usize
    } else {
        1
    }
}

/// Single-pass iterator over the frames selected from a window.
///
/// Decoding is sequential: every frame in the window is read, and those at
/// `start_frame + k * frame_interval` are yielded. A selected frame that fails
/// to decode yields a transient error; a run of failures turns fatal.
pub struct FrameSampler<'a> {
    reader: &'a mut dyn VideoReader,
    start_frame: usize,
    end_frame: usize,
    frame_interval: usize,
    current: usize,
    consecutive_failures: usize,
    finished: bool,
}

impl<'a> FrameSampler<'a> {
    pub fn new(
        reader: &'a mut dyn VideoReader,
        window: &VideoWindow,
        frame_interval: usize,
    ) -> SpellerResult<Self> {
        reader.seek_to_frame(window.start_frame).map_err(|e| {
            SpellerError::Fatal(format!(
                "failed to seek to frame {}: {:#}",
                window.start_frame, e
            ))
        })?;

        Ok(Self {
            reader,
            start_frame: window.start_frame,
            end_frame: window.end_frame,
            frame_interval: frame_interval.max(1),
            current: window.start_frame,
            consecutive_failures: 0,
            finished: false,
        })
    }

    fn is_selected(&self, index: usize) -> bool {
        (index - self.start_frame) % self.frame_interval == 0
    }
}

impl Iterator for FrameSampler<'_> {
    type Item = SpellerResult<SampledFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished && self.current < self.end_frame {
            let index = self.current;
            self.current += 1;

            match self.reader.read_frame() {
                Ok(Some(image)) => {
                    self.consecutive_failures = 0;
                    if self.is_selected(index) {
                        return Some(Ok(SampledFrame { index, image }));
                    }
                }
                Ok(None) => {
                    tracing::debug!("End of stream at frame {}", index);
                    self.finished = true;
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    if self.consecutive_failures >= MAX_CONSECUTIVE_DECODE_FAILURES {
                        self.finished = true;
                        return Some(Err(SpellerError::Fatal(format!(
                            "decoder failed on {} consecutive frames (last at {}): {:#}",
                            self.consecutive_failures, index, e
                        ))));
                    }
                    if self.is_selected(index) {
                        return Some(Err(SpellerError::FrameDecode {
                            index,
                            reason: format!("{:#}", e),
                        }));
                    }
                    tracing::debug!("Skipping undecodable frame {}: {:#}", index, e);
                }
            }
        }
        None
    }
}
