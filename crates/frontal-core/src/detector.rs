//! Face locator: SCRFD face detection via ONNX Runtime.
//!
//! Letterboxes the grayscale image into the 640×640 model input, decodes the
//! anchor-free outputs of the three strides and suppresses overlaps with NMS.

use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Finds face regions in a grayscale image.
///
/// Implementations return regions sorted by descending confidence.
pub trait FaceLocator: Send {
    fn locate(&mut self, image: &GrayImage) -> Result<Vec<FaceRegion>, DetectorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorSettings {
    /// Minimum anchor score kept before NMS.
    pub confidence_threshold: f32,
    /// IoU above which the weaker of two detections is dropped.
    pub nms_threshold: f32,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
        }
    }
}

/// Placement of the resized image inside the square model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputs = (usize, usize);

pub struct ScrfdLocator {
    session: Session,
    settings: LocatorSettings,
    stride_outputs: [StrideOutputs; 3],
}

impl ScrfdLocator {
    /// Load the SCRFD ONNX model. Fails fast if the file is missing or the
    /// model does not expose score and bbox outputs for every stride.
    pub fn load(model_path: &Path, settings: LocatorSettings) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_outputs = discover_outputs(&output_names);
        tracing::debug!(?stride_outputs, "SCRFD output mapping");

        Ok(Self {
            session,
            settings,
            stride_outputs,
        })
    }
}

impl FaceLocator for ScrfdLocator {
    fn locate(&mut self, image: &GrayImage) -> Result<Vec<FaceRegion>, DetectorError> {
        let (input, letterbox) = letterbox(image);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_outputs[pos];

            let (_, scores) = outputs[score_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
            })?;
            let (_, bboxes) = outputs[bbox_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
            })?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                &letterbox,
                self.settings.confidence_threshold,
            ));
        }

        let faces = nms(candidates, self.settings.nms_threshold);
        tracing::debug!(count = faces.len(), "faces located");
        Ok(faces)
    }
}

/// Resize into the square model input, keeping aspect ratio, and normalize.
///
/// Padding is left at zero, which is what the mean pixel normalizes to.
fn letterbox(image: &GrayImage) -> (Array4<f32>, Letterbox) {
    let (width, height) = image.dimensions();
    let side = SCRFD_INPUT_SIZE as f32;
    let scale = (side / width as f32).min(side / height as f32);

    let new_w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let off_x = (SCRFD_INPUT_SIZE - new_w as usize) / 2;
    let off_y = (SCRFD_INPUT_SIZE - new_h as usize) / 2;

    let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let value = (pixel.0[0] as f32 - SCRFD_MEAN) / SCRFD_STD;
        let (ty, tx) = (y as usize + off_y, x as usize + off_x);
        // gray replicated into all three channels
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = value;
        }
    }

    let letterbox = Letterbox {
        scale,
        pad_x: off_x as f32,
        pad_y: off_y as f32,
    };
    (tensor, letterbox)
}

/// Map output names to stride slots.
///
/// Named exports use `score_8`, `bbox_16`, ... Anything else falls back to
/// the standard positional layout: scores at 0-2, bboxes at 3-5.
fn discover_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(found) => [found[0], found[1], found[2]],
        None => {
            tracing::info!(?names, "SCRFD output names not recognized, using positional mapping");
            [(0, 3), (1, 4), (2, 5)]
        }
    }
}

/// Decode one stride level into candidate regions in source image pixels.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<FaceRegion> {
    let grid_w = SCRFD_INPUT_SIZE / stride;
    let grid_h = SCRFD_INPUT_SIZE / stride;
    let num_anchors = grid_w * grid_h * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    (0..num_anchors)
        .filter_map(|idx| {
            let score = *scores.get(idx)?;
            if score <= threshold {
                return None;
            }
            let offsets = bboxes.get(idx * 4..idx * 4 + 4)?;

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let anchor_x = (cell % grid_w) as f32 * step;
            let anchor_y = (cell / grid_w) as f32 * step;

            let (x1, y1) =
                letterbox.to_source(anchor_x - offsets[0] * step, anchor_y - offsets[1] * step);
            let (x2, y2) =
                letterbox.to_source(anchor_x + offsets[2] * step, anchor_y + offsets[3] * step);

            Some(FaceRegion {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            })
        })
        .collect()
}

/// Non-maximum suppression. Output is sorted by descending confidence.
fn nms(mut candidates: Vec<FaceRegion>, iou_threshold: f32) -> Vec<FaceRegion> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceRegion> = Vec::new();
    for candidate in candidates {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &FaceRegion, b: &FaceRegion) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
