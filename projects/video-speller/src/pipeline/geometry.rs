use geo::BoundingRect;
use geo_types::{Coord, MultiPoint, Point};

/// Corner order used throughout the pipeline: top-left, top-right,
/// bottom-right, bottom-left.
pub type Quad = [Coord<f32>; 4];

/// Axis-aligned quad from a top-left origin and a size.
pub fn quad_from_rect(x: f32, y: f32, w: f32, h: f32) -> Quad {
    [
        Coord { x, y },
        Coord { x: x + w, y },
        Coord { x: x + w, y: y + h },
        Coord { x, y: y + h },
    ]
}

/// Normalize an arbitrary (possibly rotated) set of corner points into the
/// axis-aligned quad that encloses them.
pub fn enclosing_quad(points: &[Coord<f32>]) -> Option<Quad> {
    let multi: MultiPoint<f32> = points.iter().map(|c| Point::from(*c)).collect();
    let rect = multi.bounding_rect()?;
    let min = rect.min();
    let max = rect.max();
    Some(quad_from_rect(min.x, min.y, max.x - min.x, max.y - min.y))
}
