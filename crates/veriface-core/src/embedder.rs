//! Face embedding adapter.
//!
//! [`FaceEmbedder`] is the contract the rest of the system depends on: given
//! a decoded RGB image, return one embedding per detected face in detection
//! order. [`OnnxFaceEmbedder`] fulfils it with the SCRFD + ArcFace models.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("embedding backend error: {0}")]
    Backend(String),
}

impl EmbedError {
    /// True when the input bytes were not a decodable image.
    pub fn is_decode(&self) -> bool {
        matches!(self, EmbedError::Decode(_))
    }
}

/// Face detection + embedding capability.
///
/// Implementations may hold non-reentrant state (ONNX sessions), hence `&mut self`.
pub trait FaceEmbedder: Send {
    fn embed_faces(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EmbedError>;
}

/// Decode raw image bytes and embed every face found in them.
pub fn embed_image<E>(embedder: &mut E, bytes: &[u8]) -> Result<Vec<Embedding>, EmbedError>
where
    E: FaceEmbedder + ?Sized,
{
    let image = image::load_from_memory(bytes)?.to_rgb8();
    tracing::debug!(width = image.width(), height = image.height(), "decoded image");
    embedder.embed_faces(&image)
}

/// SCRFD detector + ArcFace recognizer.
pub struct OnnxFaceEmbedder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEmbedder {
    /// Euclidean tolerance suited to the L2-normalized ArcFace embeddings.
    ///
    /// For unit vectors d² = 2 - 2·cos, so 1.10 corresponds to a cosine
    /// similarity of about 0.40, the usual same-identity threshold for
    /// w600k_r50. A tolerance of 0.4 requires cosine ≥ 0.92 and only accepts
    /// near-identical photos.
    pub const RECOMMENDED_TOLERANCE: f32 = 1.10;

    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self { detector, recognizer }
    }

    /// Load both models from `model_dir` (`det_10g.onnx`, `w600k_r50.onnx`).
    pub fn load(model_dir: &Path) -> Result<Self, EmbedError> {
        let scrfd = model_dir.join(SCRFD_MODEL_FILE);
        let arcface = model_dir.join(ARCFACE_MODEL_FILE);
        let detector = FaceDetector::load(&scrfd.to_string_lossy())?;
        let recognizer = FaceRecognizer::load(&arcface.to_string_lossy())?;
        Ok(Self::new(detector, recognizer))
    }
}

impl FaceEmbedder for OnnxFaceEmbedder {
    fn embed_faces(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EmbedError> {
        let faces = self.detector.detect(image)?;
        faces
            .iter()
            .map(|face| self.recognizer.extract(image, face).map_err(EmbedError::from))
            .collect()
    }
}
