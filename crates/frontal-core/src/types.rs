use serde::{Deserialize, Serialize};

/// A 2-D point in pixel space. Origin top-left, y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Midpoint with each coordinate truncated toward zero, matching integer
    /// pixel division on the landmark grid.
    pub fn midpoint_trunc(&self, other: &Point) -> Point {
        Point {
            x: ((self.x + other.x) / 2.0).trunc(),
            y: ((self.y + other.y) / 2.0).trunc(),
        }
    }

    /// 2-D cross product `self.x * other.y - other.x * self.y`.
    pub fn cross(&self, other: &Point) -> f64 {
        self.x * other.y - other.x * self.y
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Region of a detected face, in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceRegion {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}
