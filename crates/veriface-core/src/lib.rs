//! veriface-core: Face embedding adapter and matching.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition,
//! both running via ONNX Runtime for CPU inference, behind the
//! [`FaceEmbedder`] trait.

pub mod alignment;
pub mod detector;
pub mod embedder;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use embedder::{embed_image, EmbedError, FaceEmbedder, OnnxFaceEmbedder};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Embedding, EuclideanMatcher, MatchError, MatchResult, Matcher};

const SYSTEM_MODEL_DIR: &str = "/usr/share/veriface/models";

/// Default ONNX model directory: the system location when installed,
/// otherwise `./models`.
pub fn default_model_dir() -> PathBuf {
    let system = PathBuf::from(SYSTEM_MODEL_DIR);
    if system.is_dir() {
        system
    } else {
        PathBuf::from("models")
    }
}
