//! Geometry primitives shared by the tracking and gesture stages
//!
//! Boxes and landmarks are in normalized image coordinates (0.0..1.0) as
//! produced by the inference gateway.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of points in a hand landmark set
pub const LANDMARK_COUNT: usize = 21;

/// Landmark indices (MediaPipe hand model convention)
#[allow(dead_code)]
pub mod joints {
    pub const WRIST: usize = 0;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_DIP: usize = 7;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_DIP: usize = 11;
    pub const MIDDLE_TIP: usize = 12;
}

/// Which hand a track or gesture belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Handedness score from the landmark model: > 0.5 is a right hand
    pub fn from_handedness(score: f32) -> Self {
        if score > 0.5 {
            Self::Right
        } else {
            Self::Left
        }
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned bounding box `[x_min, y_min, x_max, y_max]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection-over-Union with another box (0.0 when disjoint or degenerate)
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x_max.min(other.x_max) - self.x_min.max(other.x_min)).max(0.0);
        let iy = (self.y_max.min(other.y_max) - self.y_min.max(other.y_min)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= f32::EPSILON {
            return 0.0;
        }
        intersection / union
    }

    /// Exponential blend: `alpha * self + (1 - alpha) * raw`
    pub fn blend(&self, raw: &BoundingBox, alpha: f32) -> BoundingBox {
        let mix = |prev: f32, new: f32| alpha * prev + (1.0 - alpha) * new;
        BoundingBox {
            x_min: mix(self.x_min, raw.x_min),
            y_min: mix(self.y_min, raw.y_min),
            x_max: mix(self.x_max, raw.x_max),
            y_max: mix(self.y_max, raw.y_max),
        }
    }

    fn coords(&self) -> [f32; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }

    /// Largest per-coordinate distance to another box
    pub fn max_distance(&self, other: &BoundingBox) -> f32 {
        self.coords()
            .iter()
            .zip(other.coords().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max)
    }
}

/// A single landmark point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_2d(&self, other: &Landmark) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    fn blend(&self, raw: &Landmark, alpha: f32) -> Landmark {
        Landmark {
            x: alpha * self.x + (1.0 - alpha) * raw.x,
            y: alpha * self.y + (1.0 - alpha) * raw.y,
            z: alpha * self.z + (1.0 - alpha) * raw.z,
        }
    }
}

/// Ordered set of 21 hand landmarks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Landmark>", into = "Vec<Landmark>")]
pub struct LandmarkSet {
    points: [Landmark; LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.points
    }

    pub fn point(&self, index: usize) -> &Landmark {
        &self.points[index]
    }

    /// Tight bounding box around all points, used as the next-frame ROI
    pub fn bounds(&self) -> BoundingBox {
        let mut bbox = BoundingBox::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for p in &self.points {
            bbox.x_min = bbox.x_min.min(p.x);
            bbox.y_min = bbox.y_min.min(p.y);
            bbox.x_max = bbox.x_max.max(p.x);
            bbox.y_max = bbox.y_max.max(p.y);
        }
        bbox
    }

    /// Exponential blend of every point: `alpha * self + (1 - alpha) * raw`
    pub fn blend(&self, raw: &LandmarkSet, alpha: f32) -> LandmarkSet {
        let mut points = self.points;
        for (smoothed, new) in points.iter_mut().zip(raw.points.iter()) {
            *smoothed = smoothed.blend(new, alpha);
        }
        LandmarkSet { points }
    }

    /// Largest per-point 2D distance to another set
    pub fn max_distance(&self, other: &LandmarkSet) -> f32 {
        self.points
            .iter()
            .zip(other.points.iter())
            .map(|(a, b)| a.distance_2d(b))
            .fold(0.0, f32::max)
    }
}

impl TryFrom<Vec<Landmark>> for LandmarkSet {
    type Error = String;

    fn try_from(points: Vec<Landmark>) -> Result<Self, Self::Error> {
        let len = points.len();
        let points: [Landmark; LANDMARK_COUNT] = points
            .try_into()
            .map_err(|_| format!("expected {} landmarks, got {}", LANDMARK_COUNT, len))?;
        Ok(Self { points })
    }
}

impl From<LandmarkSet> for Vec<Landmark> {
    fn from(set: LandmarkSet) -> Self {
        set.points.to_vec()
    }
}

/// Angle in degrees at `vertex` formed by `a - vertex - b`
///
/// Degenerate triangles (zero-length side) read as a straight 180°.
pub fn joint_angle(a: &Landmark, vertex: &Landmark, b: &Landmark) -> f32 {
    let v1 = (a.x - vertex.x, a.y - vertex.y);
    let v2 = (b.x - vertex.x, b.y - vertex.y);

    let mag1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let mag2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if mag1 < 1e-6 || mag2 < 1e-6 {
        return 180.0;
    }

    let cos_angle = ((v1.0 * v2.0 + v1.1 * v2.1) / (mag1 * mag2)).clamp(-1.0, 1.0);
    cos_angle.acos().to_degrees()
}

/// Unsigned angle in degrees (0..=90) between the directions `a0→a1` and `b0→b1`
///
/// Degenerate vectors read as perpendicular.
pub fn direction_angle(a0: &Landmark, a1: &Landmark, b0: &Landmark, b1: &Landmark) -> f32 {
    let va = (a1.x - a0.x, a1.y - a0.y);
    let vb = (b1.x - b0.x, b1.y - b0.y);

    let mag_a = (va.0 * va.0 + va.1 * va.1).sqrt();
    let mag_b = (vb.0 * vb.0 + vb.1 * vb.1).sqrt();
    if mag_a < 1e-6 || mag_b < 1e-6 {
        return 90.0;
    }

    let cos_angle = ((va.0 * vb.0 + va.1 * vb.1) / (mag_a * mag_b)).clamp(-1.0, 1.0);
    cos_angle.abs().acos().to_degrees()
}
