use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, in [0, 1].
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;

        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings. Smaller = more similar.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Outcome of comparing two embeddings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Euclidean distance between the two embeddings.
    pub distance: f32,
}

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("embedding dimensions differ: {reference} vs {probe}")]
    DimensionMismatch { reference: usize, probe: usize },
    #[error("embedding is empty")]
    Empty,
    #[error("distance is not finite")]
    NonFinite,
}

/// Strategy for deciding whether two embeddings belong to the same face.
pub trait Matcher {
    fn compare(&self, reference: &Embedding, probe: &Embedding) -> Result<MatchResult, MatchError>;
}

/// Tolerance-based Euclidean matcher: a match iff `distance < tolerance`.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub tolerance: f32,
}

impl EuclideanMatcher {
    pub const DEFAULT_TOLERANCE: f32 = 0.4;

    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TOLERANCE)
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, reference: &Embedding, probe: &Embedding) -> Result<MatchResult, MatchError> {
        if reference.dim() != probe.dim() {
            return Err(MatchError::DimensionMismatch {
                reference: reference.dim(),
                probe: probe.dim(),
            });
        }
        if reference.values.is_empty() {
            return Err(MatchError::Empty);
        }

        let distance = reference.euclidean_distance(probe);
        if !distance.is_finite() {
            return Err(MatchError::NonFinite);
        }

        Ok(MatchResult {
            matched: distance < self.tolerance,
            distance,
        })
    }
}
