//! Geometric primitives for contours in frame pixel space.

use glam::Vec2 as GlamVec2;
use serde::{Deserialize, Serialize};

/// 2D vector.
pub type Vec2 = GlamVec2;

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle.
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a rectangle from two corners.
    pub fn from_corners(min: Vec2, max: Vec2) -> Self {
        Self {
            x: min.x,
            y: min.y,
            width: max.x - min.x,
            height: max.y - min.y,
        }
    }

    /// Smallest rectangle containing every point, or `None` for an empty set.
    pub fn bounding(points: &[Vec2]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p)));
        Some(Self::from_corners(min, max))
    }

    /// Minimum corner (top-left).
    #[inline]
    pub fn min(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Maximum corner (bottom-right).
    #[inline]
    pub fn max(self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }

    /// Center point.
    #[inline]
    pub fn center(self) -> Vec2 {
        Vec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Area of the rectangle.
    #[inline]
    pub fn area(self) -> f32 {
        self.width * self.height
    }

    /// Compute intersection with another rectangle.
    pub fn intersection(self, other: Self) -> Option<Self> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x1 < x2 && y1 < y2 {
            Some(Self::new(x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }

    /// Intersection over union, 0.0 for disjoint or degenerate rectangles.
    pub fn iou(self, other: Self) -> f32 {
        let Some(inter) = self.intersection(other) else {
            return 0.0;
        };
        let union = self.area() + other.area() - inter.area();
        if union <= 0.0 {
            0.0
        } else {
            inter.area() / union
        }
    }

    /// Distance from the rectangle to the nearest edge of a `width` x `height`
    /// frame. Zero when the rectangle touches or crosses the border.
    pub fn clearance_within(self, width: f32, height: f32) -> f32 {
        let left = self.x;
        let top = self.y;
        let right = width - (self.x + self.width);
        let bottom = height - (self.y + self.height);
        left.min(top).min(right).min(bottom).max(0.0)
    }
}

/// Polygon area via the shoelace formula. Vertex order does not matter.
pub fn polygon_area(points: &[Vec2]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0f32;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        twice += a.x * b.y - b.x * a.y;
    }
    (twice * 0.5).abs()
}

/// Length of the closed polygon outline.
pub fn polygon_perimeter(points: &[Vec2]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .enumerate()
        .map(|(i, a)| a.distance(points[(i + 1) % points.len()]))
        .sum()
}

/// Convex hull (Andrew's monotone chain), counter-clockwise, no repeated
/// closing vertex.
pub fn convex_hull(points: &[Vec2]) -> Vec<Vec2> {
    let mut pts: Vec<Vec2> = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    fn cross(o: Vec2, a: Vec2, b: Vec2) -> f32 {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    }

    let mut hull: Vec<Vec2> = Vec::with_capacity(pts.len() * 2);
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Ray-casting point-in-polygon test.
pub fn polygon_contains(points: &[Vec2], p: Vec2) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (a, b) = (points[i], points[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Clip a polygon to an axis-aligned rectangle (Sutherland-Hodgman). The
/// result is empty when the polygon lies entirely outside.
pub fn clip_to_rect(points: &[Vec2], rect: Rect) -> Vec<Vec2> {
    let (min, max) = (rect.min(), rect.max());
    let mut clipped = points.to_vec();

    for edge in 0..4 {
        if clipped.is_empty() {
            break;
        }
        let inside = |p: Vec2| match edge {
            0 => p.x >= min.x,
            1 => p.x <= max.x,
            2 => p.y >= min.y,
            _ => p.y <= max.y,
        };
        // Only called for segments with one end on each side of the edge
        let crossing = |a: Vec2, b: Vec2| {
            let t = match edge {
                0 => (min.x - a.x) / (b.x - a.x),
                1 => (max.x - a.x) / (b.x - a.x),
                2 => (min.y - a.y) / (b.y - a.y),
                _ => (max.y - a.y) / (b.y - a.y),
            };
            (a + (b - a) * t).clamp(min, max)
        };

        let input = std::mem::take(&mut clipped);
        let mut prev = input[input.len() - 1];
        for &cur in &input {
            match (inside(prev), inside(cur)) {
                (true, true) => clipped.push(cur),
                (true, false) => clipped.push(crossing(prev, cur)),
                (false, true) => {
                    clipped.push(crossing(prev, cur));
                    clipped.push(cur);
                }
                (false, false) => {}
            }
            prev = cur;
        }
    }
    clipped
}

/// Move every vertex away from `center` by `distance` along the ray from the
/// center. Vertices sitting on the center are left in place.
pub fn grow_radially(points: &[Vec2], center: Vec2, distance: f32) -> Vec<Vec2> {
    points
        .iter()
        .map(|&p| {
            let offset = p - center;
            let len = offset.length();
            if len <= f32::EPSILON {
                p
            } else {
                center + offset * ((len + distance) / len)
            }
        })
        .collect()
}
