//! Decode → locate → extract → classify, for every face in one image.

use crate::classifier::{classify, Classification, ClassifyError, Thresholds};
use crate::decode::{decode_grayscale, DecodeError};
use crate::detector::{DetectorError, FaceLocator};
use crate::extractor::{ExtractorError, LandmarkExtractor};
use crate::types::FaceRegion;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_FACES: usize = 8;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmark error: {0}")]
    Extractor(#[from] ExtractorError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error("No face detected")]
    NoFaceDetected,
}

impl PipelineError {
    /// True for failures caused by the request itself rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Decode(_)
                | PipelineError::NoFaceDetected
                | PipelineError::Classify(ClassifyError::InvalidInput(_))
        )
    }
}

/// One located face and its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceReport {
    #[serde(flatten)]
    pub region: FaceRegion,
    #[serde(flatten)]
    pub classification: Classification,
}

/// Every classified face in one image, most confident first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub width: u32,
    pub height: u32,
    pub faces: Vec<FaceReport>,
}

impl Analysis {
    /// The most confident face. `analyze` never returns an empty analysis.
    pub fn primary(&self) -> Option<&FaceReport> {
        self.faces.first()
    }
}

/// Owns the external capabilities and the classifier policy.
pub struct FacePipeline {
    locator: Box<dyn FaceLocator>,
    extractor: Box<dyn LandmarkExtractor>,
    thresholds: Thresholds,
    max_faces: usize,
}

impl FacePipeline {
    pub fn new(
        locator: Box<dyn FaceLocator>,
        extractor: Box<dyn LandmarkExtractor>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            locator,
            extractor,
            thresholds,
            max_faces: DEFAULT_MAX_FACES,
        }
    }

    /// Cap the number of faces classified per image (at least one).
    pub fn with_max_faces(mut self, max_faces: usize) -> Self {
        self.max_faces = max_faces.max(1);
        self
    }

    /// Run the full pipeline on encoded image bytes.
    pub fn analyze(&mut self, bytes: &[u8]) -> Result<Analysis, PipelineError> {
        let image = decode_grayscale(bytes)?;
        let (width, height) = image.dimensions();

        let mut regions = self.locator.locate(&image)?;
        if regions.is_empty() {
            return Err(PipelineError::NoFaceDetected);
        }
        regions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        if regions.len() > self.max_faces {
            tracing::debug!(
                located = regions.len(),
                max_faces = self.max_faces,
                "ignoring low-confidence faces"
            );
        }

        let mut faces = Vec::with_capacity(regions.len().min(self.max_faces));
        for region in regions.into_iter().take(self.max_faces) {
            let points = self.extractor.extract(&image, &region)?;
            let classification = classify(&points, &self.thresholds)?;
            tracing::debug!(
                confidence = region.confidence,
                is_frontal = classification.is_frontal,
                tilt = ?classification.tilt,
                "face classified"
            );
            faces.push(FaceReport {
                region,
                classification,
            });
        }

        Ok(Analysis {
            width,
            height,
            faces,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Tilt;
    use crate::landmarks::{
        LEFT_EYE_INNER, LEFT_EYE_OUTER, NUM_LANDMARKS, RIGHT_EYE_INNER, RIGHT_EYE_OUTER,
    };
    use crate::types::Point;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    struct FixedLocator(Vec<FaceRegion>);

    impl FaceLocator for FixedLocator {
        fn locate(&mut self, _image: &GrayImage) -> Result<Vec<FaceRegion>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    /// Level eyes for faces left of x = 100, right eye dropped otherwise.
    struct GeometryExtractor {
        count: usize,
    }

    impl LandmarkExtractor for GeometryExtractor {
        fn extract(
            &mut self,
            _image: &GrayImage,
            face: &FaceRegion,
        ) -> Result<Vec<Point>, ExtractorError> {
            let mut points = vec![Point::default(); self.count];
            if self.count == NUM_LANDMARKS {
                let sag = if face.x < 100.0 { 0.0 } else { 10.0 };
                points[LEFT_EYE_OUTER] = Point::new(90.0, 100.0);
                points[LEFT_EYE_INNER] = Point::new(110.0, 100.0);
                points[RIGHT_EYE_INNER] = Point::new(130.0, 100.0 + sag);
                points[RIGHT_EYE_OUTER] = Point::new(150.0, 100.0 + sag);
            }
            Ok(points)
        }
    }

    fn region(x: f32, confidence: f32) -> FaceRegion {
        FaceRegion {
            x,
            y: 10.0,
            width: 40.0,
            height: 40.0,
            confidence,
        }
    }

    fn png() -> Vec<u8> {
        let img = GrayImage::from_pixel(32, 24, Luma([120]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn pipeline(regions: Vec<FaceRegion>, count: usize) -> FacePipeline {
        FacePipeline::new(
            Box::new(FixedLocator(regions)),
            Box::new(GeometryExtractor { count }),
            Thresholds::default(),
        )
    }

    #[test]
    fn test_no_face() {
        let err = pipeline(vec![], NUM_LANDMARKS).analyze(&png()).unwrap_err();
        assert!(matches!(err, PipelineError::NoFaceDetected));
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "No face detected");
    }

    #[test]
    fn test_every_face_most_confident_first() {
        let mut p = pipeline(vec![region(10.0, 0.9), region(200.0, 0.6)], NUM_LANDMARKS);
        let analysis = p.analyze(&png()).unwrap();

        assert_eq!((analysis.width, analysis.height), (32, 24));
        assert_eq!(analysis.faces.len(), 2);
        assert_eq!(analysis.primary().unwrap().region.confidence, 0.9);
        assert_eq!(analysis.faces[0].classification.tilt, None);
        assert_eq!(analysis.faces[1].classification.tilt, Some(Tilt::Left));
    }

    #[test]
    fn test_max_faces() {
        let regions = (0..5).map(|i| region(i as f32, 0.9 - i as f32 * 0.1)).collect();
        let mut p = pipeline(regions, NUM_LANDMARKS).with_max_faces(2);
        let analysis = p.analyze(&png()).unwrap();
        assert_eq!(analysis.faces.len(), 2);
    }

    #[test]
    fn test_unsorted_regions_reordered_before_cap() {
        let regions = vec![region(200.0, 0.4), region(10.0, 0.95), region(150.0, 0.7)];
        let mut p = pipeline(regions, NUM_LANDMARKS).with_max_faces(2);
        let analysis = p.analyze(&png()).unwrap();

        let confidences: Vec<f32> = analysis.faces.iter().map(|f| f.region.confidence).collect();
        assert_eq!(confidences, vec![0.95, 0.7]);
        let primary = analysis.primary().unwrap();
        assert_eq!(primary.region.x, 10.0);
        assert_eq!(primary.classification.tilt, None);
    }

    #[test]
    fn test_short_landmarks_are_invalid_input() {
        let mut p = pipeline(vec![region(10.0, 0.9)], 46);
        let err = p.analyze(&png()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Classify(ClassifyError::InvalidInput(_))
        ));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_bad_image_is_client_error() {
        let err = pipeline(vec![region(10.0, 0.9)], NUM_LANDMARKS)
            .analyze(b"\x00\x01garbage")
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_detector_failure_is_server_error() {
        struct Broken;
        impl FaceLocator for Broken {
            fn locate(&mut self, _: &GrayImage) -> Result<Vec<FaceRegion>, DetectorError> {
                Err(DetectorError::InferenceFailed("boom".into()))
            }
        }
        let mut p = FacePipeline::new(
            Box::new(Broken),
            Box::new(GeometryExtractor { count: 68 }),
            Thresholds::default(),
        );
        let err = p.analyze(&png()).unwrap_err();
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_report_json_is_flat() {
        let mut p = pipeline(vec![region(10.0, 0.9)], NUM_LANDMARKS);
        let analysis = p.analyze(&png()).unwrap();
        let json = serde_json::to_value(&analysis.faces[0]).unwrap();
        assert_eq!(json["x"], 10.0);
        assert_eq!(json["isFrontal"], true);
        assert!(json["tilt"].is_null());
    }
}
