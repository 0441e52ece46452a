//! Plane geometry shared by hit testing, anchor snapping, and placement
//! collision checks. All coordinates are in a room's local space.

use serde::{Deserialize, Serialize};

/// A 2-D point in room-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Axis-aligned square: top-left corner plus side length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Square {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl Square {
    pub const fn new(x: f32, y: f32, size: f32) -> Self {
        Self { x, y, size }
    }

    /// Inclusive on all four edges.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.size && p.y >= self.y && p.y <= self.y + self.size
    }

    pub fn center(&self) -> Point {
        let half = self.size / 2.0;
        Point::new(self.x + half, self.y + half)
    }

    /// Project from the center toward `toward`, landing exactly on the
    /// square's boundary. Uses Chebyshev scaling (`half / max(|dx|, |dy|)`).
    /// A target equal to the center yields the midpoint of the right edge.
    pub fn edge_point_toward(&self, toward: Point) -> Point {
        let center = self.center();
        let dx = toward.x - center.x;
        let dy = toward.y - center.y;
        let half = self.size / 2.0;
        if dx == 0.0 && dy == 0.0 {
            return Point::new(center.x + half, center.y);
        }
        let scale = half / dx.abs().max(dy.abs());
        Point::new(center.x + dx * scale, center.y + dy * scale)
    }
}

/// Shortest distance from `p` to the segment `a`–`b`.
/// A degenerate segment collapses to the distance to `a`.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let ab_x = b.x - a.x;
    let ab_y = b.y - a.y;
    let ap_x = p.x - a.x;
    let ap_y = p.y - a.y;
    let len_sq = ab_x * ab_x + ab_y * ab_y;
    if len_sq <= 1e-6 {
        return ap_x.hypot(ap_y);
    }
    let t = ((ap_x * ab_x + ap_y * ab_y) / len_sq).clamp(0.0, 1.0);
    let closest = Point::new(a.x + ab_x * t, a.y + ab_y * t);
    p.distance(closest)
}

/// Whether a circle touches or overlaps a square.
pub fn circle_intersects_square(center: Point, radius: f32, square: &Square) -> bool {
    let closest_x = center.x.clamp(square.x, square.x + square.size);
    let closest_y = center.y.clamp(square.y, square.y + square.size);
    center.distance(Point::new(closest_x, closest_y)) <= radius
}

/// Whether a circle comes within `radius` of any segment of a poly-line.
pub fn circle_intersects_path(center: Point, radius: f32, path: &[Point]) -> bool {
    path.windows(2)
        .any(|seg| distance_to_segment(center, seg[0], seg[1]) <= radius)
}
