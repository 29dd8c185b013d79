//! Landmark extractor: 68-point landmark regression via ONNX Runtime.
//!
//! The face region is squared, padded by a margin, cropped and resized to the
//! model input. The model regresses 136 values (x0, y0, x1, y1, ...) in
//! crop-normalized [0, 1] coordinates, which are mapped back to image pixels.

use crate::landmarks::NUM_LANDMARKS;
use crate::types::{FaceRegion, Point};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_INPUT_SIZE: u32 = 112;
pub const DEFAULT_CROP_MARGIN: f32 = 0.2;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face region {0:?} does not overlap the image")]
    EmptyCrop(FaceRegion),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Produces the 68 ordered landmarks for one face region.
pub trait LandmarkExtractor: Send {
    fn extract(&mut self, image: &GrayImage, face: &FaceRegion)
        -> Result<Vec<Point>, ExtractorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    /// Side of the square model input in pixels.
    pub input_size: u32,
    /// Extra context around the face, as a fraction of the longer side.
    pub crop_margin: f32,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            crop_margin: DEFAULT_CROP_MARGIN,
        }
    }
}

/// A square crop window in source pixels. May extend past the image edges.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CropWindow {
    x: f32,
    y: f32,
    side: f32,
}

impl CropWindow {
    fn around(face: &FaceRegion, margin: f32) -> Self {
        let (cx, cy) = face.center();
        let side = face.width.max(face.height) * (1.0 + margin);
        Self {
            x: cx - side / 2.0,
            y: cy - side / 2.0,
            side,
        }
    }

    /// Map a crop-normalized coordinate back to source pixels.
    fn to_source(&self, u: f32, v: f32) -> Point {
        Point::new(
            (self.x + u * self.side) as f64,
            (self.y + v * self.side) as f64,
        )
    }
}

pub struct OnnxLandmarkExtractor {
    session: Session,
    settings: ExtractorSettings,
}

impl OnnxLandmarkExtractor {
    /// Load the landmark ONNX model from the given path.
    pub fn load(model_path: &Path, settings: ExtractorSettings) -> Result<Self, ExtractorError> {
        if !model_path.exists() {
            return Err(ExtractorError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            input_size = settings.input_size,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded landmark model"
        );

        Ok(Self { session, settings })
    }
}

impl LandmarkExtractor for OnnxLandmarkExtractor {
    fn extract(
        &mut self,
        image: &GrayImage,
        face: &FaceRegion,
    ) -> Result<Vec<Point>, ExtractorError> {
        let window = CropWindow::around(face, self.settings.crop_margin);
        let crop = crop_square(image, &window, self.settings.input_size)
            .ok_or(ExtractorError::EmptyCrop(*face))?;
        let input = to_tensor(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractorError::InferenceFailed(format!("landmark output: {e}")))?;

        decode_landmarks(raw, &window)
    }
}

/// Crop `window` out of `image` into a `size`×`size` buffer.
///
/// Parts of the window outside the image stay black. Returns `None` when the
/// window misses the image entirely.
fn crop_square(image: &GrayImage, window: &CropWindow, size: u32) -> Option<GrayImage> {
    let (width, height) = image.dimensions();
    if window.side <= 0.0 || !window.side.is_finite() {
        return None;
    }

    let x0 = window.x.floor().max(0.0) as u32;
    let y0 = window.y.floor().max(0.0) as u32;
    let x1 = ((window.x + window.side).ceil().max(0.0) as u32).min(width);
    let y1 = ((window.y + window.side).ceil().max(0.0) as u32).min(height);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }

    let scale = size as f32 / window.side;
    let visible = imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();
    let scaled_w = (((x1 - x0) as f32 * scale).round() as u32).clamp(1, size);
    let scaled_h = (((y1 - y0) as f32 * scale).round() as u32).clamp(1, size);
    let scaled = imageops::resize(&visible, scaled_w, scaled_h, FilterType::Triangle);

    let mut out = GrayImage::from_pixel(size, size, Luma([0]));
    let off_x = ((x0 as f32 - window.x) * scale).round() as i64;
    let off_y = ((y0 as f32 - window.y) * scale).round() as i64;
    imageops::replace(&mut out, &scaled, off_x, off_y);
    Some(out)
}

/// NCHW tensor, gray replicated to 3 channels, scaled to [0, 1].
fn to_tensor(crop: &GrayImage) -> Array4<f32> {
    let (w, h) = crop.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, pixel) in crop.enumerate_pixels() {
        let value = pixel.0[0] as f32 / 255.0;
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = value;
        }
    }
    tensor
}

fn decode_landmarks(raw: &[f32], window: &CropWindow) -> Result<Vec<Point>, ExtractorError> {
    if raw.len() != NUM_LANDMARKS * 2 {
        return Err(ExtractorError::InferenceFailed(format!(
            "expected {} landmark values, got {}",
            NUM_LANDMARKS * 2,
            raw.len()
        )));
    }
    Ok(raw
        .chunks_exact(2)
        .map(|uv| window.to_source(uv[0], uv[1]))
        .collect())
}
