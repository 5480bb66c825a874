// Spell-check pipeline: sampling, OCR, reconstruction, checking and reporting

pub mod finalize;
pub mod geometry;
pub mod ocr;
pub mod orchestrator;
pub mod reader;
pub mod reconstruct;
pub mod spelling;
pub mod types;
