pub mod ffmpeg_reader;
pub mod opencv_reader;

use anyhow::Result;
use clap::ValueEnum;
use image::RgbImage;
use serde::Serialize;
use std::path::Path;

use ffmpeg_reader::FfmpegReader;
use opencv_reader::OpencvReader;

/// Sequential frame source. Frames come out as RGB rasters.
pub trait VideoReader: Send {
    fn frame_count(&self) -> Result<usize>;
    fn source_fps(&self) -> Result<f64>;
    fn seek_to_frame(&mut self, frame_num: usize) -> Result<()>;
    /// Decode the next frame. `Ok(None)` marks the end of the stream.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoBackend {
    Opencv,
    Ffmpeg,
}

pub fn open_reader(path: &Path, backend: VideoBackend) -> Result<Box<dyn VideoReader>> {
    let reader: Box<dyn VideoReader> = match backend {
        VideoBackend::Opencv => Box::new(OpencvReader::new(path)?),
        VideoBackend::Ffmpeg => Box::new(FfmpegReader::new(path)?),
    };
    Ok(reader)
}
