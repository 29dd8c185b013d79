use crate::engine::{EngineError, EngineHandle};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use frontal_core::{Analysis, Classification, FaceReport, PipelineError, Thresholds};
use serde::Serialize;

/// Multipart field carrying the uploaded image.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    engine: EngineHandle,
    thresholds: Thresholds,
}

impl AppState {
    pub fn new(engine: EngineHandle, thresholds: Thresholds) -> Self {
        Self { engine, thresholds }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", post(detect_face))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Response body for `POST /`.
///
/// The flattened classification describes the most confident face; `faces`
/// lists every classified face.
#[derive(Debug, Serialize)]
pub struct PoseResponse {
    #[serde(flatten)]
    pub primary: Classification,
    pub width: u32,
    pub height: u32,
    pub faces: Vec<FaceReport>,
}

impl TryFrom<Analysis> for PoseResponse {
    type Error = PipelineError;

    fn try_from(analysis: Analysis) -> Result<Self, Self::Error> {
        let primary = analysis
            .primary()
            .ok_or(PipelineError::NoFaceDetected)?
            .classification
            .clone();
        Ok(Self {
            primary,
            width: analysis.width,
            height: analysis.height,
            faces: analysis.faces,
        })
    }
}

/// JSON error payload `{"error": ...}` with its status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Pipeline(e) if e.is_client_error() => Self::bad_request(e.to_string()),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: other.to_string(),
            },
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        EngineError::Pipeline(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        } else {
            tracing::info!(status = %self.status, error = %self.message, "request rejected");
        }
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// Classify every face in the uploaded image.
async fn detect_face(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PoseResponse>, ApiError> {
    let multipart = multipart.map_err(|e| ApiError {
        status: e.status(),
        message: e.body_text(),
    })?;
    let image = read_upload(multipart).await?;
    tracing::info!(bytes = image.len(), "detect requested");

    let analysis = state.engine.analyze(image).await?;
    Ok(Json(PoseResponse::try_from(analysis)?))
}

async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    let multipart_error = |e: axum::extract::multipart::MultipartError| ApiError {
        status: e.status(),
        message: e.body_text(),
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field.bytes().await.map_err(multipart_error)?;
            return Ok(bytes.to_vec());
        }
    }
    Err(ApiError::bad_request(format!(
        "missing multipart field `{UPLOAD_FIELD}`"
    )))
}

/// Daemon status.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "models_loaded": true,
        "engine_running": state.engine.is_running(),
        "thresholds": state.thresholds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use axum::body::Body;
    use axum::http::{header, Request};
    use frontal_core::detector::DetectorError;
    use frontal_core::extractor::ExtractorError;
    use frontal_core::landmarks::{
        LEFT_EYE_INNER, LEFT_EYE_OUTER, RIGHT_EYE_INNER, RIGHT_EYE_OUTER,
    };
    use frontal_core::{FaceLocator, FaceRegion, FacePipeline, LandmarkExtractor, Point};
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "frontal-test-boundary";

    struct Faces(Vec<FaceRegion>);

    impl FaceLocator for Faces {
        fn locate(&mut self, _: &GrayImage) -> Result<Vec<FaceRegion>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl FaceLocator for Broken {
        fn locate(&mut self, _: &GrayImage) -> Result<Vec<FaceRegion>, DetectorError> {
            Err(DetectorError::InferenceFailed("session poisoned".into()))
        }
    }

    /// Right eye 10px lower than the left: slope 0.25, tilt Left.
    struct TiltedLeft;

    impl LandmarkExtractor for TiltedLeft {
        fn extract(&mut self, _: &GrayImage, _: &FaceRegion) -> Result<Vec<Point>, ExtractorError> {
            let mut points = vec![Point::default(); 68];
            points[LEFT_EYE_OUTER] = Point::new(90.0, 100.0);
            points[LEFT_EYE_INNER] = Point::new(110.0, 100.0);
            points[RIGHT_EYE_INNER] = Point::new(130.0, 110.0);
            points[RIGHT_EYE_OUTER] = Point::new(150.0, 110.0);
            Ok(points)
        }
    }

    fn face(confidence: f32) -> FaceRegion {
        FaceRegion {
            x: 4.0,
            y: 4.0,
            width: 20.0,
            height: 20.0,
            confidence,
        }
    }

    fn app(locator: Box<dyn FaceLocator>) -> Router {
        app_with_limit(locator, 1024 * 1024)
    }

    fn app_with_limit(locator: Box<dyn FaceLocator>, max_upload_bytes: usize) -> Router {
        let pipeline = FacePipeline::new(locator, Box::new(TiltedLeft), Thresholds::default());
        let engine = spawn_engine(pipeline, 2).unwrap();
        router(AppState::new(engine, Thresholds::default()), max_upload_bytes)
    }

    fn png() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        GrayImage::from_pixel(32, 32, Luma([128]))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn upload(field: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
                 filename=\"face.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_detect_success() {
        let app = app(Box::new(Faces(vec![face(0.9), face(0.7)])));
        let (status, json) = send(app, upload("file", &png())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["isFrontal"], true);
        assert_eq!(json["tilt"], "Left");
        assert!((json["slope_horizontal"].as_f64().unwrap() - 0.25).abs() < 1e-9);
        assert_eq!(json["width"], 32);
        let faces = json["faces"].as_array().unwrap();
        assert_eq!(faces.len(), 2);
        assert!((faces[0]["confidence"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_no_face_is_400() {
        let app = app(Box::new(Faces(Vec::new())));
        let (status, json) = send(app, upload("file", &png())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, serde_json::json!({ "error": "No face detected" }));
    }

    #[tokio::test]
    async fn test_undecodable_image_is_400() {
        let app = app(Box::new(Faces(vec![face(0.9)])));
        let (status, json) = send(app, upload("file", b"not an image")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("decode"));
    }

    #[tokio::test]
    async fn test_missing_field_is_400() {
        let app = app(Box::new(Faces(vec![face(0.9)])));
        let (status, json) = send(app, upload("photo", &png())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("file"));
    }

    #[tokio::test]
    async fn test_not_multipart_is_json_error() {
        let app = app(Box::new(Faces(vec![face(0.9)])));
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, json) = send(app, req).await;
        assert!(status.is_client_error());
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_oversized_upload_is_413() {
        let app = app_with_limit(Box::new(Faces(vec![face(0.9)])), 1000);
        let (status, json) = send(app, upload("file", &vec![0u8; 5 * 1024])).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_detector_failure_is_500() {
        let app = app(Box::new(Broken));
        let (status, json) = send(app, upload("file", &png())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().contains("session poisoned"));
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(Box::new(Faces(Vec::new())));
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, json) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["engine_running"], true);
        assert_eq!(json["thresholds"]["slope"], 0.05);
        assert_eq!(json["thresholds"]["contour"], "open");
    }
}
