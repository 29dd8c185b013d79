use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use frontal_core::{
    classify, Analysis, Classification, Contour, ExtractorSettings, FacePipeline,
    LocatorSettings, OnnxLandmarkExtractor, Point, ScrfdLocator, Thresholds,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "frontal", about = "Frontal face and head tilt checks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a JSON file of 68 landmark points
    Classify {
        /// JSON array of [x, y] pairs or {"x": .., "y": ..} objects
        landmarks: PathBuf,
        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Detect and classify every face in an image file
    Analyze {
        image: PathBuf,
        /// Directory containing the ONNX models
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Maximum number of faces to classify
        #[arg(long, default_value_t = frontal_core::pipeline::DEFAULT_MAX_FACES)]
        max_faces: usize,
        /// Print a short human-readable summary instead of JSON
        #[arg(long)]
        summary: bool,
        #[command(flatten)]
        policy: PolicyArgs,
    },
}

#[derive(Args)]
struct PolicyArgs {
    /// Largest left/right area difference (fraction of total) still counted as frontal
    #[arg(long, default_value_t = frontal_core::classifier::DEFAULT_AREA_RATIO_THRESHOLD)]
    area_ratio_threshold: f64,
    /// Eye-line slope magnitude beyond which the head counts as tilted
    #[arg(long, default_value_t = frontal_core::classifier::DEFAULT_SLOPE_THRESHOLD)]
    slope_threshold: f64,
    /// Close each jaw half back to its first point before measuring area
    #[arg(long)]
    closed_contour: bool,
}

impl PolicyArgs {
    fn thresholds(&self) -> Result<Thresholds> {
        let thresholds = Thresholds {
            area_ratio: self.area_ratio_threshold,
            slope: self.slope_threshold,
            contour: if self.closed_contour {
                Contour::Closed
            } else {
                Contour::Open
            },
        };
        thresholds.validate()?;
        Ok(thresholds)
    }
}

/// Accepted landmark encodings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPoint {
    Pair([f64; 2]),
    Object { x: f64, y: f64 },
}

impl From<RawPoint> for Point {
    fn from(raw: RawPoint) -> Self {
        match raw {
            RawPoint::Pair([x, y]) => Point::new(x, y),
            RawPoint::Object { x, y } => Point::new(x, y),
        }
    }
}

fn read_landmarks(path: &Path) -> Result<Vec<Point>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let raw: Vec<RawPoint> = serde_json::from_str(&text)
        .with_context(|| format!("parsing landmarks in {}", path.display()))?;
    Ok(raw.into_iter().map(Point::from).collect())
}

fn summarize(label: &str, c: &Classification) -> String {
    let pose = if c.is_frontal { "frontal" } else { "not frontal" };
    let tilt = match c.tilt {
        Some(tilt) => format!(
            "tilted {tilt:?}, tilt your head slightly to the {}",
            tilt.correction()
        ),
        None => "level".to_string(),
    };
    format!(
        "{label}: {pose} (area diff {:.4}), {tilt} (slope {:.4})",
        c.area_ratio_diff, c.slope_horizontal
    )
}

fn print_analysis(analysis: &Analysis, summary: bool) -> Result<()> {
    if !summary {
        println!("{}", serde_json::to_string_pretty(analysis)?);
        return Ok(());
    }
    for (i, face) in analysis.faces.iter().enumerate() {
        let label = format!("face {} ({:.2})", i + 1, face.region.confidence);
        println!("{}", summarize(&label, &face.classification));
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Classify { landmarks, policy } => {
            let points = read_landmarks(&landmarks)?;
            let result = classify(&points, &policy.thresholds()?)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Analyze {
            image,
            model_dir,
            max_faces,
            summary,
            policy,
        } => {
            let model_dir = model_dir.unwrap_or_else(frontal_core::default_model_dir);
            tracing::debug!(model_dir = %model_dir.display(), "loading models");
            let bytes =
                std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;

            let locator = ScrfdLocator::load(
                &model_dir.join(frontal_core::DETECTOR_MODEL_FILE),
                LocatorSettings::default(),
            )?;
            let extractor = OnnxLandmarkExtractor::load(
                &model_dir.join(frontal_core::LANDMARK_MODEL_FILE),
                ExtractorSettings::default(),
            )?;
            let mut pipeline =
                FacePipeline::new(Box::new(locator), Box::new(extractor), policy.thresholds()?)
                    .with_max_faces(max_faces);

            match pipeline.analyze(&bytes) {
                Ok(analysis) => print_analysis(&analysis, summary)?,
                Err(e) if e.is_client_error() => bail!("{}: {e}", image.display()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}
