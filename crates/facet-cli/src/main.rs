//! facet — drive the enrollment/recognition pipeline from image files.
//!
//! Operates on pre-cropped face images: detection and landmark localization
//! are external collaborators, so the CLI wraps each input in a static
//! detector carrying the pose given on the command line and an optional
//! landmarks JSON file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facet_core::types::{
    BoundingBox, DetectError, DetectedFace, FaceAngle, FaceDetector, Landmarks,
};
use facet_engine::{
    load_optional_embedder, spawn_engine, Config, EngineHandle, EnrollOutcome, FrameOutcome,
    RecognizeOutcome, SqliteStore,
};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "facet", about = "Facet face enrollment and recognition CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll one face capture for an identity
    Enroll {
        /// Display name for a new identity
        #[arg(short, long)]
        name: Option<String>,
        /// Continue enrollment of an existing identity by ID
        #[arg(long, conflicts_with = "name")]
        identity: Option<String>,
        /// Pre-cropped face image
        #[arg(short, long)]
        image: PathBuf,
        /// Head pose in degrees
        #[arg(long, default_value_t = 0.0)]
        yaw: f32,
        #[arg(long, default_value_t = 0.0)]
        pitch: f32,
        #[arg(long, default_value_t = 0.0)]
        roll: f32,
        /// Landmarks JSON file (points, bounding_box, confidence)
        #[arg(long)]
        landmarks: Option<PathBuf>,
    },
    /// Recognize a face against the enrolled gallery
    Recognize {
        /// Pre-cropped face image
        #[arg(short, long)]
        image: PathBuf,
        #[arg(long, default_value_t = 0.0)]
        yaw: f32,
        #[arg(long, default_value_t = 0.0)]
        pitch: f32,
        #[arg(long, default_value_t = 0.0)]
        roll: f32,
        #[arg(long)]
        landmarks: Option<PathBuf>,
    },
    /// List enrolled identities
    List,
    /// Remove an identity and all of its captures
    Remove {
        /// Identity ID to remove
        id: String,
    },
    /// Show pipeline status
    Status,
}

/// Trivial detector for pre-cropped inputs: one face covering the whole
/// frame, with pose and landmarks supplied by the caller.
struct StaticDetector {
    angle: FaceAngle,
    landmarks: Option<Landmarks>,
}

impl FaceDetector for StaticDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, DetectError> {
        let bounding_box = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: frame.width() as f32,
            height: frame.height() as f32,
        };
        let landmarks = self
            .landmarks
            .clone()
            .unwrap_or_else(|| Landmarks::empty(bounding_box));
        Ok(vec![DetectedFace {
            bounding_box,
            landmarks,
            angle: self.angle,
            confidence: 1.0,
            crop: frame.clone(),
        }])
    }
}

fn load_landmarks(path: Option<&PathBuf>) -> Result<Option<Landmarks>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading landmarks file {}", path.display()))?;
    let landmarks: Landmarks =
        serde_json::from_str(&json).with_context(|| "parsing landmarks JSON")?;
    Ok(Some(landmarks))
}

fn load_image(path: &PathBuf) -> Result<RgbImage> {
    let img = image::open(path)
        .with_context(|| format!("opening image {}", path.display()))?;
    Ok(img.to_rgb8())
}

fn spawn(config: &Config, angle: FaceAngle, landmarks: Option<Landmarks>) -> Result<EngineHandle> {
    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let embedder = load_optional_embedder(config.embed_model_path.as_deref());
    let detector = Box::new(StaticDetector { angle, landmarks });
    Ok(spawn_engine(
        detector,
        embedder,
        store,
        config.match_policy(),
        config.quality_policy(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Enroll {
            name,
            identity,
            image,
            yaw,
            pitch,
            roll,
            landmarks,
        } => {
            let frame = load_image(&image)?;
            let landmarks = load_landmarks(landmarks.as_ref())?;
            let handle = spawn(&config, FaceAngle::new(yaw, pitch, roll), landmarks)?;

            let identity_id = match (identity, name) {
                (Some(id), _) => id,
                (None, Some(name)) => {
                    let identity = handle.create_identity(name).await?;
                    println!("Created identity {} ({})", identity.display_name, identity.id);
                    identity.id
                }
                (None, None) => anyhow::bail!("either --name or --identity is required"),
            };

            match handle.enroll_capture(identity_id, frame).await? {
                FrameOutcome::Processed(EnrollOutcome::Captured(progress)) => {
                    println!(
                        "Captured {} ({}/5 angles, {:.0}%)",
                        progress.angle,
                        progress.captured.len(),
                        progress.progress * 100.0
                    );
                    match (progress.is_complete, progress.instruction) {
                        (true, _) => println!("Enrollment complete"),
                        (false, Some(instruction)) => println!("Next: {instruction}"),
                        (false, None) => {}
                    }
                }
                FrameOutcome::Processed(EnrollOutcome::Rejected(rejection)) => {
                    println!("Capture rejected: {rejection}");
                }
                FrameOutcome::Skipped => println!("Frame skipped: pipeline busy"),
                FrameOutcome::Stopped => println!("Session stopped"),
            }
        }
        Commands::Recognize {
            image,
            yaw,
            pitch,
            roll,
            landmarks,
        } => {
            let frame = load_image(&image)?;
            let landmarks = load_landmarks(landmarks.as_ref())?;
            let handle = spawn(&config, FaceAngle::new(yaw, pitch, roll), landmarks)?;

            match handle.recognize(frame).await? {
                FrameOutcome::Processed(RecognizeOutcome::Match(result)) => {
                    println!(
                        "Match: {} ({:.1}% confidence, matched {} capture)",
                        result.display_name,
                        result.confidence * 100.0,
                        result.matched_angle
                    );
                }
                FrameOutcome::Processed(RecognizeOutcome::NoMatch) => println!("No match"),
                FrameOutcome::Processed(RecognizeOutcome::Rejected(rejection)) => {
                    println!("Frame rejected: {rejection}");
                }
                FrameOutcome::Skipped => println!("Frame skipped: pipeline busy"),
                FrameOutcome::Stopped => println!("Session stopped"),
            }
        }
        Commands::List => {
            let handle = spawn(&config, FaceAngle::new(0.0, 0.0, 0.0), None)?;
            let identities = handle.list_identities().await?;
            if identities.is_empty() {
                println!("No identities enrolled");
            }
            for identity in identities {
                let angles: Vec<&str> =
                    identity.captured_angles.iter().map(|a| a.as_str()).collect();
                println!(
                    "{}  {}  [{}]{}",
                    identity.id,
                    identity.display_name,
                    angles.join(", "),
                    if identity.is_complete { "  complete" } else { "" }
                );
            }
        }
        Commands::Remove { id } => {
            let handle = spawn(&config, FaceAngle::new(0.0, 0.0, 0.0), None)?;
            if handle.delete_identity(id.clone()).await? {
                println!("Removed identity {id}");
            } else {
                println!("No identity with ID {id}");
            }
        }
        Commands::Status => {
            let handle = spawn(&config, FaceAngle::new(0.0, 0.0, 0.0), None)?;
            let status = handle.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
