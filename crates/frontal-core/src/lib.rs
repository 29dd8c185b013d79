//! frontal-core: Frontal face and head tilt classification.
//!
//! The classifier works on the standard 68-point landmark layout only. Face
//! location (SCRFD) and landmark regression run through ONNX Runtime behind
//! the [`FaceLocator`] and [`LandmarkExtractor`] traits, and [`FacePipeline`]
//! chains them for one encoded image.

pub mod classifier;
pub mod decode;
pub mod detector;
pub mod extractor;
pub mod landmarks;
pub mod pipeline;
pub mod types;

pub use classifier::{classify, Classification, ClassifyError, Contour, Thresholds, Tilt};
pub use detector::{FaceLocator, LocatorSettings, ScrfdLocator};
pub use extractor::{ExtractorSettings, LandmarkExtractor, OnnxLandmarkExtractor};
pub use landmarks::LandmarkSet;
pub use pipeline::{Analysis, FacePipeline, FaceReport, PipelineError};
pub use types::{FaceRegion, Point};

use std::path::PathBuf;

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the 68-point landmark model inside the model directory.
pub const LANDMARK_MODEL_FILE: &str = "landmarks_68.onnx";

/// `$XDG_DATA_HOME/frontal/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("frontal/models")
}
