//! Geometry clipping against a tile's (buffered) bounding box.

use mapdrift_common::{BBox, Point};

/// Liang–Barsky clip of segment `a`-`b` to `bbox`. Returns the clipped
/// segment, or `None` when it lies entirely outside.
pub fn clip_segment(a: &Point, b: &Point, bbox: &BBox) -> Option<(Point, Point)> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;

    // (p, q) per edge: p is the direction component against the edge,
    // q the distance to it.
    let checks = [
        (-dx, a.x - bbox.min_x),
        (dx, bbox.max_x - a.x),
        (-dy, a.y - bbox.min_y),
        (dy, bbox.max_y - a.y),
    ];

    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None; // parallel and outside
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    if t0 > t1 {
        return None;
    }
    Some((
        Point::new(a.x + t0 * dx, a.y + t0 * dy),
        Point::new(a.x + t1 * dx, a.y + t1 * dy),
    ))
}
