// Text reconstruction: turns unordered OCR detections into reading-order lines.
//
// Detections are sorted by the Y of their top-left corner and clustered into
// rows: a detection joins the current row while its Y stays within the
// threshold of the Y of the detection that opened the row. Each row is then
// ordered left to right.

use crate::pipeline::types::Detection;

/// Detections sharing one visual row, ordered by ascending left edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLine {
    pub detections: Vec<Detection>,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.detections
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Lines ordered top to bottom.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructedText {
    pub lines: Vec<TextLine>,
}

impl ReconstructedText {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn to_text(&self) -> String {
        self.lines
            .iter()
            .map(TextLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn reconstruct(detections: &[Detection], line_threshold: f32) -> ReconstructedText {
    let mut sorted: Vec<&Detection> = detections.iter().collect();
    sorted.sort_by(|a, b| a.top().total_cmp(&b.top()));

    let mut lines = Vec::new();
    let mut current: Vec<Detection> = Vec::new();
    let mut line_y = 0.0f32;

    for detection in sorted {
        if current.is_empty() {
            line_y = detection.top();
        } else if (detection.top() - line_y).abs() > line_threshold {
            lines.push(close_line(std::mem::take(&mut current)));
            line_y = detection.top();
        }
        current.push(detection.clone());
    }

    if !current.is_empty() {
        lines.push(close_line(current));
    }

    ReconstructedText { lines }
}

fn close_line(mut detections: Vec<Detection>) -> TextLine {
    detections.sort_by(|a, b| a.left().total_cmp(&b.left()));
    TextLine { detections }
}
