//! Frontal and head tilt classification from 68-point landmark geometry.
//!
//! Two independent tests, both on pixel coordinates only:
//!
//! - **Symmetry**: shoelace area of the left jaw half (points 0..=8) against
//!   the right half (8..=16). The chin is shared. A face is frontal when the
//!   normalized area difference is below [`Thresholds::area_ratio`].
//! - **Roll**: slope of the line joining the two eye centers. Beyond
//!   ±[`Thresholds::slope`] the head is tilted `Left` (positive slope, the
//!   right eye sits lower) or `Right`.

use crate::landmarks::{
    LandmarkSet, CHIN, JAW_END, JAW_START, LEFT_EYE_INNER, LEFT_EYE_OUTER, RIGHT_EYE_INNER,
    RIGHT_EYE_OUTER,
};
use crate::types::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Added to every denominator so degenerate landmarks never divide by zero.
pub const EPSILON: f64 = 1e-10;
pub const DEFAULT_AREA_RATIO_THRESHOLD: f64 = 0.01;
pub const DEFAULT_SLOPE_THRESHOLD: f64 = 0.05;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("classification produced a non-finite {0}")]
    NonFinite(&'static str),
}

/// How each jaw half is turned into a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Contour {
    /// Sum only consecutive pairs; the last point is not joined back to the first.
    #[default]
    Open,
    /// Join the last point back to the first (true polygon area).
    Closed,
}

/// Policy thresholds for the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Maximum `|L - R| / (L + R)` for a frontal face (exclusive).
    pub area_ratio: f64,
    /// Eye-line slope magnitude beyond which the head counts as tilted (exclusive).
    pub slope: f64,
    pub contour: Contour,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            area_ratio: DEFAULT_AREA_RATIO_THRESHOLD,
            slope: DEFAULT_SLOPE_THRESHOLD,
            contour: Contour::Open,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ClassifyError> {
        if !self.area_ratio.is_finite() || self.area_ratio < 0.0 {
            return Err(ClassifyError::InvalidInput(format!(
                "area ratio threshold must be finite and non-negative, got {}",
                self.area_ratio
            )));
        }
        if !self.slope.is_finite() || self.slope < 0.0 {
            return Err(ClassifyError::InvalidInput(format!(
                "slope threshold must be finite and non-negative, got {}",
                self.slope
            )));
        }
        Ok(())
    }
}

/// Head roll direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tilt {
    Left,
    Right,
}

impl Tilt {
    /// Which way the subject should roll their head to level it.
    pub fn correction(&self) -> &'static str {
        match self {
            Tilt::Left => "right",
            Tilt::Right => "left",
        }
    }
}

/// Classification of one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "isFrontal")]
    pub is_frontal: bool,
    pub area_ratio_diff: f64,
    /// `None` when the eye line is within the slope threshold.
    #[serde(alias = "tile")]
    pub tilt: Option<Tilt>,
    pub slope_horizontal: f64,
    /// True when no tilt was detected.
    pub is_level: bool,
}

/// Shoelace area of `points` treated per `contour`.
fn contour_area(points: &[Point], contour: Contour) -> f64 {
    let mut sum: f64 = points.windows(2).map(|w| w[0].cross(&w[1])).sum();
    if contour == Contour::Closed {
        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            sum += last.cross(first);
        }
    }
    0.5 * sum.abs()
}

/// Areas of the left (0..=8) and right (8..=16) jaw halves.
pub fn compute_areas(
    landmarks: &LandmarkSet,
    contour: Contour,
) -> Result<(f64, f64), ClassifyError> {
    let left = landmarks.span(JAW_START, CHIN)?;
    let right = landmarks.span(CHIN, JAW_END)?;
    Ok((contour_area(left, contour), contour_area(right, contour)))
}

/// Returns `(area_ratio_diff, is_frontal)`.
pub fn compute_frontalness(left_area: f64, right_area: f64, threshold: f64) -> (f64, bool) {
    let diff = (left_area - right_area).abs() / (left_area + right_area + EPSILON);
    (diff, diff < threshold)
}

/// Returns `(slope_horizontal, tilt)` for the line from the left to the right eye center.
pub fn compute_tilt(
    landmarks: &LandmarkSet,
    threshold: f64,
) -> Result<(f64, Option<Tilt>), ClassifyError> {
    let left_eye = landmarks
        .get(LEFT_EYE_OUTER)?
        .midpoint_trunc(&landmarks.get(LEFT_EYE_INNER)?);
    let right_eye = landmarks
        .get(RIGHT_EYE_INNER)?
        .midpoint_trunc(&landmarks.get(RIGHT_EYE_OUTER)?);

    let slope = (right_eye.y - left_eye.y) / (right_eye.x - left_eye.x + EPSILON);

    let tilt = if slope > threshold {
        Some(Tilt::Left)
    } else if slope < -threshold {
        Some(Tilt::Right)
    } else {
        None
    };

    Ok((slope, tilt))
}

/// Classify a validated landmark set.
pub fn classify_set(
    landmarks: &LandmarkSet,
    thresholds: &Thresholds,
) -> Result<Classification, ClassifyError> {
    let (left_area, right_area) = compute_areas(landmarks, thresholds.contour)?;
    let (area_ratio_diff, is_frontal) =
        compute_frontalness(left_area, right_area, thresholds.area_ratio);
    if !area_ratio_diff.is_finite() {
        return Err(ClassifyError::NonFinite("area ratio"));
    }

    let (slope_horizontal, tilt) = compute_tilt(landmarks, thresholds.slope)?;
    if !slope_horizontal.is_finite() {
        return Err(ClassifyError::NonFinite("eye-line slope"));
    }

    tracing::trace!(
        left_area,
        right_area,
        area_ratio_diff,
        slope_horizontal,
        "classified landmarks"
    );

    Ok(Classification {
        is_frontal,
        area_ratio_diff,
        tilt,
        slope_horizontal,
        is_level: tilt.is_none(),
    })
}

/// Classify raw landmark points. Fails with [`ClassifyError::InvalidInput`]
/// unless exactly 68 points are given.
pub fn classify(points: &[Point], thresholds: &Thresholds) -> Result<Classification, ClassifyError> {
    let landmarks = LandmarkSet::from_slice(points)?;
    classify_set(&landmarks, thresholds)
}
