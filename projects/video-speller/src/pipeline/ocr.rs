use crate::pipeline::geometry::enclosing_quad;
use crate::pipeline::types::Detection;
use anyhow::{anyhow, Context, Result};
use geo_types::Coord;
use image::RgbImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use std::path::Path;

pub const DETECTION_MODEL_FILE: &str = "text-detection.rten";
pub const RECOGNITION_MODEL_FILE: &str = "text-recognition.rten";

/// Finds text in a raster. Detections come back unordered.
pub trait TextDetector: Send {
    fn detect_text(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// Pure-Rust OCR using the ocrs engine and its rten models.
pub struct OcrsDetector {
    engine: OcrEngine,
}

impl OcrsDetector {
    /// Load the detection and recognition models from `model_dir`.
    pub fn new(model_dir: &Path) -> Result<Self> {
        let detection_path = model_dir.join(DETECTION_MODEL_FILE);
        let recognition_path = model_dir.join(RECOGNITION_MODEL_FILE);

        let detection_model = rten::Model::load_file(&detection_path)
            .with_context(|| format!("Failed to load detection model {:?}", detection_path))?;
        let recognition_model = rten::Model::load_file(&recognition_path)
            .with_context(|| format!("Failed to load recognition model {:?}", recognition_path))?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .context("Failed to create OCR engine")?;

        tracing::info!("OCR models loaded from {:?}", model_dir);
        Ok(Self { engine })
    }
}

impl TextDetector for OcrsDetector {
    fn detect_text(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let source = ImageSource::from_bytes(image.as_raw(), image.dimensions())
            .map_err(|e| anyhow!("Failed to convert image: {}", e))?;
        let input = self.engine.prepare_input(source)?;

        let word_rects = self.engine.detect_words(&input)?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self.engine.recognize_text(&input, &line_rects)?;

        let mut detections = Vec::new();
        for line in lines.iter().flatten() {
            for word in line.words() {
                let text = word.to_string();
                if text.trim().is_empty() {
                    continue;
                }
                let corners: Vec<Coord<f32>> = word
                    .rotated_rect()
                    .corners()
                    .iter()
                    .map(|p| Coord { x: p.x, y: p.y })
                    .collect();
                if let Some(quad) = enclosing_quad(&corners) {
                    detections.push(Detection::new(quad, text));
                }
            }
        }

        tracing::debug!("OCR found {} words", detections.len());
        Ok(detections)
    }
}
