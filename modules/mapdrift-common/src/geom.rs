use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A coordinate in the projected, meter-based storage CRS.
///
/// All distance and threshold math in the engine happens on these
/// coordinates. Nothing here is lat/lng; display projections are not
/// locally metric and never enter the matching path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point, in meters.
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned bounding box in storage CRS meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A degenerate or inverted box matches nothing and is rejected at
    /// ruleset validation time.
    pub fn is_valid(&self) -> bool {
        self.min_x < self.max_x && self.min_y < self.max_y
    }

    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Grow the box by `margin` meters on every side.
    pub fn expanded(&self, margin: f64) -> BBox {
        BBox {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }
}

/// Geometry of an upstream item or live feature: a point or a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "coordinates", rename_all = "snake_case")]
pub enum Geometry {
    Point(Point),
    Line(Vec<Point>),
}

impl Geometry {
    pub fn centroid(&self) -> Option<Point> {
        match self {
            Geometry::Point(p) => Some(*p),
            Geometry::Line(pts) => {
                if pts.is_empty() {
                    return None;
                }
                let n = pts.len() as f64;
                let (sx, sy) = pts.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
                Some(Point::new(sx / n, sy / n))
            }
        }
    }

    pub fn bbox(&self) -> Option<BBox> {
        let pts: &[Point] = match self {
            Geometry::Point(p) => std::slice::from_ref(p),
            Geometry::Line(pts) => pts,
        };
        let first = pts.first()?;
        let mut b = BBox::new(first.x, first.y, first.x, first.y);
        for p in pts {
            b.min_x = b.min_x.min(p.x);
            b.min_y = b.min_y.min(p.y);
            b.max_x = b.max_x.max(p.x);
            b.max_y = b.max_y.max(p.y);
        }
        Some(b)
    }

    /// True if any part of the geometry's bounding box overlaps `bbox`.
    pub fn intersects_bbox(&self, bbox: &BBox) -> bool {
        self.bbox().map(|b| b.intersects(bbox)).unwrap_or(false)
    }

    /// Minimum distance between two geometries, in meters.
    pub fn distance(&self, other: &Geometry) -> f64 {
        match (self, other) {
            (Geometry::Point(a), Geometry::Point(b)) => a.distance(b),
            (Geometry::Point(p), Geometry::Line(l)) | (Geometry::Line(l), Geometry::Point(p)) => {
                point_to_line(p, l)
            }
            (Geometry::Line(a), Geometry::Line(b)) => line_to_line(a, b),
        }
    }
}

/// Minimum distance from a point to a polyline.
fn point_to_line(p: &Point, line: &[Point]) -> f64 {
    match line {
        [] => f64::INFINITY,
        [only] => p.distance(only),
        _ => line
            .windows(2)
            .map(|seg| point_to_segment(p, &seg[0], &seg[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Distance from point `p` to the segment `a`-`b`.
fn point_to_segment(p: &Point, a: &Point, b: &Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(&Point::new(a.x + t * dx, a.y + t * dy))
}

/// Minimum vertex-to-segment distance between two polylines.
///
/// Exact segment-segment distance is not needed at the thresholds the
/// matcher runs with (tens of meters against survey-grade geometry), so
/// both directions of vertex-to-line are checked instead.
fn line_to_line(a: &[Point], b: &[Point]) -> f64 {
    let ab = a
        .iter()
        .map(|p| point_to_line(p, b))
        .fold(f64::INFINITY, f64::min);
    let ba = b
        .iter()
        .map(|p| point_to_line(p, a))
        .fold(f64::INFINITY, f64::min);
    ab.min(ba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_distance_is_euclidean() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn point_to_segment_projects_onto_interior() {
        let p = Point::new(5.0, 3.0);
        let d = point_to_segment(&p, &Point::new(0.0, 0.0), &Point::new(10.0, 0.0));
        assert!((d - 3.0).abs() < 1e-9);
    }

    #[test]
    fn point_to_segment_clamps_to_endpoint() {
        let p = Point::new(-4.0, 3.0);
        let d = point_to_segment(&p, &Point::new(0.0, 0.0), &Point::new(10.0, 0.0));
        assert!((d - 5.0).abs() < 1e-9);
    }

    #[test]
    fn geometry_distance_point_to_line() {
        let p = Geometry::Point(Point::new(5.0, 10.0));
        let l = Geometry::Line(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 20.0),
        ]);
        assert!((p.distance(&l) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn line_centroid_averages_vertices() {
        let l = Geometry::Line(vec![Point::new(0.0, 0.0), Point::new(10.0, 20.0)]);
        let c = l.centroid().unwrap();
        assert!((c.x - 5.0).abs() < 1e-9);
        assert!((c.y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn empty_line_has_no_centroid() {
        assert!(Geometry::Line(vec![]).centroid().is_none());
        assert!(Geometry::Line(vec![]).bbox().is_none());
    }

    #[test]
    fn bbox_intersects_touching_edges() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(10.0, 0.0, 20.0, 10.0);
        let c = BBox::new(10.1, 0.0, 20.0, 10.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn inverted_bbox_is_invalid() {
        assert!(!BBox::new(10.0, 0.0, 0.0, 10.0).is_valid());
        assert!(BBox::new(0.0, 0.0, 1.0, 1.0).is_valid());
    }
}
