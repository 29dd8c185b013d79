//! The 68-point facial landmark layout.
//!
//! ```text
//!  0-16  jaw contour, 8 is the chin
//! 17-26  brows
//! 27-35  nose
//! 36-41  left eye (image left), 36 outer corner, 39 inner corner
//! 42-47  right eye (image right), 42 inner corner, 45 outer corner
//! 48-67  mouth
//! ```

use crate::classifier::ClassifyError;
use crate::types::Point;

pub const NUM_LANDMARKS: usize = 68;

pub const JAW_START: usize = 0;
pub const CHIN: usize = 8;
pub const JAW_END: usize = 16;

pub const LEFT_EYE_OUTER: usize = 36;
pub const LEFT_EYE_INNER: usize = 39;
pub const RIGHT_EYE_INNER: usize = 42;
pub const RIGHT_EYE_OUTER: usize = 45;

/// Exactly 68 landmark points, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [Point; NUM_LANDMARKS],
}

impl LandmarkSet {
    /// Build from a slice that must hold exactly [`NUM_LANDMARKS`] points.
    pub fn from_slice(points: &[Point]) -> Result<Self, ClassifyError> {
        let points: [Point; NUM_LANDMARKS] = points.try_into().map_err(|_| {
            ClassifyError::InvalidInput(format!(
                "expected {NUM_LANDMARKS} landmarks, got {}",
                points.len()
            ))
        })?;
        Ok(Self { points })
    }

    /// Bounds-checked access.
    pub fn get(&self, idx: usize) -> Result<Point, ClassifyError> {
        self.points.get(idx).copied().ok_or_else(|| {
            ClassifyError::InvalidInput(format!(
                "landmark index {idx} out of range 0..{NUM_LANDMARKS}"
            ))
        })
    }

    /// Inclusive index range, e.g. `span(0, 8)` for the left jaw half.
    pub fn span(&self, first: usize, last: usize) -> Result<&[Point], ClassifyError> {
        if first > last || last >= NUM_LANDMARKS {
            return Err(ClassifyError::InvalidInput(format!(
                "landmark span {first}..={last} out of range 0..{NUM_LANDMARKS}"
            )));
        }
        Ok(&self.points[first..=last])
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }
}

impl TryFrom<Vec<Point>> for LandmarkSet {
    type Error = ClassifyError;

    fn try_from(points: Vec<Point>) -> Result<Self, Self::Error> {
        Self::from_slice(&points)
    }
}
