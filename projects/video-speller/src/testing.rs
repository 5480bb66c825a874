// In-memory stand-ins for the video, OCR and lexicon capabilities.

use crate::dictionary::Lexicon;
use crate::pipeline::ocr::TextDetector;
use crate::pipeline::types::Detection;
use crate::video::VideoReader;
use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::collections::{HashMap, HashSet};

/// Encode a frame index into a tiny raster so fakes downstream can recover it.
pub fn tagged_frame(index: usize) -> RgbImage {
    let pixel = Rgb([
        (index & 0xff) as u8,
        ((index >> 8) & 0xff) as u8,
        ((index >> 16) & 0xff) as u8,
    ]);
    RgbImage::from_pixel(4, 4, pixel)
}

pub fn frame_tag(image: &RgbImage) -> usize {
    let [r, g, b] = image.get_pixel(0, 0).0;
    r as usize | (g as usize) << 8 | (b as usize) << 16
}

/// Video whose frames are tagged with their index.
pub struct SyntheticVideo {
    fps: f64,
    total_frames: usize,
    decodable: usize,
    broken: HashSet<usize>,
    position: usize,
}

impl SyntheticVideo {
    pub fn new(fps: f64, total_frames: usize) -> Self {
        Self {
            fps,
            total_frames,
            decodable: total_frames,
            broken: HashSet::new(),
            position: 0,
        }
    }

    /// The stream ends after `count` frames even if the container claims more.
    pub fn with_decodable_frames(mut self, count: usize) -> Self {
        self.decodable = count;
        self
    }

    pub fn with_broken_frames(mut self, indices: &[usize]) -> Self {
        self.broken.extend(indices.iter().copied());
        self
    }
}

impl VideoReader for SyntheticVideo {
    fn frame_count(&self) -> Result<usize> {
        Ok(self.total_frames)
    }

    fn source_fps(&self) -> Result<f64> {
        Ok(self.fps)
    }

    fn seek_to_frame(&mut self, frame_num: usize) -> Result<()> {
        self.position = frame_num;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.position >= self.decodable {
            return Ok(None);
        }
        let index = self.position;
        self.position += 1;
        if self.broken.contains(&index) {
            return Err(anyhow!("corrupt packet at frame {}", index));
        }
        Ok(Some(tagged_frame(index)))
    }
}

/// OCR that returns canned detections per frame index.
#[derive(Default)]
pub struct ScriptedDetector {
    detections: HashMap<usize, Vec<Detection>>,
    failing: HashSet<usize>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// One detection per word, laid out left to right on a single row.
    pub fn with_line(mut self, frame: usize, y: f32, text: &str) -> Self {
        let entry = self.detections.entry(frame).or_default();
        for (i, word) in text.split_whitespace().enumerate() {
            entry.push(Detection::from_rect(i as f32 * 100.0, y, 90.0, 20.0, word));
        }
        self
    }

    pub fn failing_on(mut self, frame: usize) -> Self {
        self.failing.insert(frame);
        self
    }
}

impl TextDetector for ScriptedDetector {
    fn detect_text(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let index = frame_tag(image);
        if self.failing.contains(&index) {
            return Err(anyhow!("inference failed"));
        }
        Ok(self.detections.get(&index).cloned().unwrap_or_default())
    }
}

/// Exact-match lexicon with optional canned suggestions.
pub struct WordListLexicon {
    words: HashSet<String>,
    suggestions: HashMap<String, Vec<String>>,
}

impl WordListLexicon {
    pub fn new<const N: usize>(words: [&str; N]) -> Self {
        Self {
            words: words.iter().map(|w| w.to_string()).collect(),
            suggestions: HashMap::new(),
        }
    }

    pub fn with_suggestions<const N: usize>(mut self, word: &str, suggestions: [&str; N]) -> Self {
        self.suggestions.insert(
            word.to_string(),
            suggestions.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

impl Lexicon for WordListLexicon {
    fn lookup(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    fn suggest(&self, word: &str) -> Vec<String> {
        self.suggestions.get(word).cloned().unwrap_or_default()
    }
}
