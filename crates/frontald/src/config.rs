use frontal_core::{ClassifyError, Contour, ExtractorSettings, LocatorSettings, Thresholds};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid thresholds: {0}")]
    Thresholds(#[from] ClassifyError),
    #[error("extractor input_size must be positive")]
    ZeroInputSize,
}

/// Daemon configuration.
///
/// Defaults, then the TOML file named by `FRONTAL_CONFIG` (if set), then
/// `FRONTAL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:5000).
    pub bind: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    pub thresholds: Thresholds,
    pub locator: LocatorSettings,
    pub extractor: ExtractorSettings,
    /// Faces classified per image, most confident first.
    pub max_faces: usize,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
    /// Requests buffered ahead of the engine thread.
    pub queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            model_dir: frontal_core::default_model_dir(),
            thresholds: Thresholds::default(),
            locator: LocatorSettings::default(),
            extractor: ExtractorSettings::default(),
            max_faces: frontal_core::pipeline::DEFAULT_MAX_FACES,
            max_upload_bytes: 10 * 1024 * 1024,
            queue_depth: 4,
        }
    }
}

impl Config {
    /// Load from the optional config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("FRONTAL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        let config = base.with_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the models cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        if self.extractor.input_size == 0 {
            return Err(ConfigError::ZeroInputSize);
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FRONTAL_*` overrides read through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("FRONTAL_BIND") {
            self.bind = bind;
        }
        if let Some(dir) = lookup("FRONTAL_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }

        let t = &mut self.thresholds;
        t.area_ratio = parse_or(&lookup, "FRONTAL_AREA_RATIO_THRESHOLD", t.area_ratio);
        t.slope = parse_or(&lookup, "FRONTAL_SLOPE_THRESHOLD", t.slope);
        let closed = parse_flag(
            &lookup,
            "FRONTAL_CLOSED_CONTOUR",
            t.contour == Contour::Closed,
        );
        t.contour = if closed { Contour::Closed } else { Contour::Open };

        self.locator.confidence_threshold = parse_or(
            &lookup,
            "FRONTAL_DETECTION_THRESHOLD",
            self.locator.confidence_threshold,
        );
        self.max_faces = parse_or(&lookup, "FRONTAL_MAX_FACES", self.max_faces);
        self.max_upload_bytes =
            parse_or(&lookup, "FRONTAL_MAX_UPLOAD_BYTES", self.max_upload_bytes);
        self.queue_depth = parse_or(&lookup, "FRONTAL_QUEUE_DEPTH", self.queue_depth).max(1);
        self
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(frontal_core::DETECTOR_MODEL_FILE)
    }

    /// Path to the 68-point landmark model.
    pub fn landmark_model_path(&self) -> PathBuf {
        self.model_dir.join(frontal_core::LANDMARK_MODEL_FILE)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable override");
            default
        }),
        None => default,
    }
}

fn parse_flag<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!(key, value = %raw, "ignoring unparsable flag");
            default
        }
    }
}
