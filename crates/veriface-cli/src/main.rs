use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use veriface_core::{
    embed_image, embedder::SCRFD_MODEL_FILE, EuclideanMatcher, FaceDetector, Matcher,
    OnnxFaceEmbedder,
};

const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";

#[derive(Parser)]
#[command(name = "veriface", about = "Veriface face verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a running verifaced whether two image URLs show the same face
    Verify {
        /// URL of the reference image
        #[arg(short, long)]
        reference: String,
        /// URL of the captured image
        #[arg(short, long)]
        captured: String,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Show daemon status
    Status {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Run face detection on a local image file
    Detect {
        file: PathBuf,
        /// Directory containing the ONNX models
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Compare the first face in two local image files, without the daemon
    Compare {
        reference: PathBuf,
        captured: PathBuf,
        #[arg(short, long, default_value_t = OnnxFaceEmbedder::RECOMMENDED_TOLERANCE)]
        tolerance: f32,
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            reference,
            captured,
            server,
        } => {
            let body = json!({ "referenceImageUrl": reference, "capturedImageUrl": captured });
            let response = reqwest::Client::new()
                .post(endpoint(&server, "verify"))
                .json(&body)
                .send()
                .await
                .with_context(|| format!("verifaced not reachable at {server}"))?;
            print_response(response).await?;
        }
        Commands::Status { server } => {
            let response = reqwest::get(endpoint(&server, "status"))
                .await
                .with_context(|| format!("verifaced not reachable at {server}"))?;
            print_response(response).await?;
        }
        Commands::Detect { file, model_dir } => {
            let model_dir = model_dir.unwrap_or_else(veriface_core::default_model_dir);
            let model = model_dir.join(SCRFD_MODEL_FILE);
            let mut detector = FaceDetector::load(&model.to_string_lossy())?;

            let image = image::open(&file)
                .with_context(|| format!("failed to open {}", file.display()))?
                .to_rgb8();
            let faces = detector.detect(&image)?;

            println!("{}: {} face(s)", file.display(), faces.len());
            for (i, face) in faces.iter().enumerate() {
                println!(
                    "  [{i}] x={:.0} y={:.0} w={:.0} h={:.0} confidence={:.3}",
                    face.x, face.y, face.width, face.height, face.confidence
                );
            }
        }
        Commands::Compare {
            reference,
            captured,
            tolerance,
            model_dir,
        } => {
            let model_dir = model_dir.unwrap_or_else(veriface_core::default_model_dir);
            let mut embedder = OnnxFaceEmbedder::load(&model_dir)?;
            let matcher = EuclideanMatcher::new(tolerance);

            let Some(reference_face) = first_face(&mut embedder, &reference)? else {
                bail!("no face detected in {}", reference.display());
            };
            let Some(captured_face) = first_face(&mut embedder, &captured)? else {
                bail!("no face detected in {}", captured.display());
            };

            let result = matcher.compare(&reference_face, &captured_face)?;
            println!(
                "{}",
                json!({ "match": result.matched, "distance": result.distance })
            );
        }
    }

    Ok(())
}

fn endpoint(server: &str, path: &str) -> String {
    format!("{}/{path}", server.trim_end_matches('/'))
}

async fn print_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let body: Value = response.json().await.context("invalid JSON from verifaced")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        bail!("verifaced responded with {status}");
    }
    Ok(())
}

fn first_face(
    embedder: &mut OnnxFaceEmbedder,
    path: &Path,
) -> Result<Option<veriface_core::Embedding>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let faces = embed_image(embedder, &bytes)?;
    if faces.len() > 1 {
        tracing::warn!(path = %path.display(), faces = faces.len(), "multiple faces; using the first");
    }
    Ok(faces.into_iter().next())
}
