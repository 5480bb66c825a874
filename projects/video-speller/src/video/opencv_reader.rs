use super::VideoReader;
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_HW_ACCELERATION,
        CAP_PROP_POS_FRAMES, VIDEO_ACCELERATION_ANY,
    },
};
use std::path::Path;

pub struct OpencvReader {
    capture: VideoCapture,
    source_fps: f64,
    total_frames: usize,
}

impl OpencvReader {
    pub fn new(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Video path is not valid UTF-8: {:?}", path))?;
        let mut capture = VideoCapture::from_file(path_str, CAP_ANY)
            .with_context(|| format!("Failed to open video file: {}", path_str))?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open video file: {}", path_str));
        }

        // Hardware decoding is best effort (VideoToolbox, VA-API, ...).
        match capture.set(CAP_PROP_HW_ACCELERATION, VIDEO_ACCELERATION_ANY as f64) {
            Ok(true) => tracing::debug!("OpencvReader: hardware acceleration enabled"),
            _ => tracing::debug!("OpencvReader: hardware acceleration not available"),
        }

        // A non-positive fps is passed through untouched; window resolution rejects it.
        let source_fps = capture.get(CAP_PROP_FPS)?;
        let raw_count = capture.get(CAP_PROP_FRAME_COUNT)?;
        let total_frames = if raw_count > 0.0 { raw_count as usize } else { 0 };
        let duration_secs = if source_fps > 0.0 {
            total_frames as f64 / source_fps
        } else {
            0.0
        };

        tracing::info!(
            "OpencvReader: opened {}, duration={:.2}s, fps={:.2}, stream_frames={}",
            path_str,
            duration_secs,
            source_fps,
            total_frames
        );

        Ok(Self {
            capture,
            source_fps,
            total_frames,
        })
    }
}

impl VideoReader for OpencvReader {
    fn frame_count(&self) -> Result<usize> {
        Ok(self.total_frames)
    }

    fn source_fps(&self) -> Result<f64> {
        Ok(self.source_fps)
    }

    fn seek_to_frame(&mut self, frame_num: usize) -> Result<()> {
        if !self.capture.set(CAP_PROP_POS_FRAMES, frame_num as f64)? {
            return Err(anyhow!("Failed to seek to frame {}", frame_num));
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            return Ok(None);
        }
        bgr_mat_to_rgb_image(&frame).map(Some)
    }
}

/// Convert an OpenCV Mat (BGR) into an owned RGB raster.
fn bgr_mat_to_rgb_image(mat: &Mat) -> Result<RgbImage> {
    let mut rgb_mat = Mat::default();
    imgproc::cvt_color_def(mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB)?;

    let size = rgb_mat.size()?;
    let width = size.width as u32;
    let height = size.height as u32;

    if !rgb_mat.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }

    let buffer = rgb_mat.data_bytes()?.to_vec();
    RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| anyhow!("Failed to create RgbImage from Mat data"))
}
