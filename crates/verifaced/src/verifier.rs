use crate::engine::{EngineError, EngineHandle};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use veriface_core::{EmbedError, Embedding, EuclideanMatcher, MatchError, MatchResult, Matcher};
use veriface_net::{FetchError, ImageFetcher};

/// Which of the two request images an outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Reference,
    Captured,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageRole::Reference => "reference",
            ImageRole::Captured => "captured",
        })
    }
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("{role} image download failed: {source}")]
    Download {
        role: ImageRole,
        #[source]
        source: FetchError,
    },
    #[error("{role} image could not be decoded: {source}")]
    Decode {
        role: ImageRole,
        #[source]
        source: EmbedError,
    },
    #[error("embedding {role} image failed: {source}")]
    Embedding {
        role: ImageRole,
        #[source]
        source: EngineError,
    },
    #[error("embedding comparison failed: {0}")]
    Compare(#[from] MatchError),
    #[error("verification did not finish within {0:?}")]
    DeadlineExceeded(Duration),
}

/// Result of one verification.
#[derive(Debug)]
pub enum Outcome {
    /// Both images had a face; the comparison ran.
    Compared(MatchResult),
    /// The given image had no detectable face. A valid answer, not a fault.
    NoFace(ImageRole),
    Failed(VerifyError),
}

/// Fetch → embed → compare, for one pair of image URLs.
pub struct Verifier {
    fetcher: ImageFetcher,
    engine: EngineHandle,
    matcher: EuclideanMatcher,
    deadline: Duration,
}

impl Verifier {
    pub fn new(fetcher: ImageFetcher, engine: EngineHandle, matcher: EuclideanMatcher, deadline: Duration) -> Self {
        Self {
            fetcher,
            engine,
            matcher,
            deadline,
        }
    }

    pub fn tolerance(&self) -> f32 {
        self.matcher.tolerance
    }

    pub fn workers(&self) -> usize {
        self.engine.workers()
    }

    pub fn max_attempts(&self) -> u32 {
        self.fetcher.policy().max_attempts
    }

    /// Verify that both URLs show the same face.
    ///
    /// Both images are fetched and embedded concurrently under a single
    /// deadline; never returns an error, every failure is an [`Outcome::Failed`].
    pub async fn verify(&self, reference_url: &str, captured_url: &str) -> Outcome {
        match tokio::time::timeout(self.deadline, self.run(reference_url, captured_url)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Outcome::Failed(e),
            Err(_) => Outcome::Failed(VerifyError::DeadlineExceeded(self.deadline)),
        }
    }

    async fn run(&self, reference_url: &str, captured_url: &str) -> Result<Outcome, VerifyError> {
        let (reference, captured) = tokio::try_join!(
            self.faces(ImageRole::Reference, reference_url),
            self.faces(ImageRole::Captured, captured_url),
        )?;

        let Some(reference) = first_face(ImageRole::Reference, reference) else {
            return Ok(Outcome::NoFace(ImageRole::Reference));
        };
        let Some(captured) = first_face(ImageRole::Captured, captured) else {
            return Ok(Outcome::NoFace(ImageRole::Captured));
        };

        let result = self.matcher.compare(&reference, &captured)?;
        tracing::info!(
            matched = result.matched,
            distance = result.distance,
            tolerance = self.matcher.tolerance,
            "verification result"
        );
        Ok(Outcome::Compared(result))
    }

    /// Download one image and embed every face in it.
    async fn faces(&self, role: ImageRole, url: &str) -> Result<Vec<Embedding>, VerifyError> {
        tracing::info!(%role, url, "downloading image");
        let bytes = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|source| VerifyError::Download { role, source })?;

        self.engine.embed(bytes).await.map_err(|source| match source {
            EngineError::Embed(e) if e.is_decode() => VerifyError::Decode { role, source: e },
            other => VerifyError::Embedding { role, source: other },
        })
    }
}

/// First face in detection order; logs when there are none or several.
fn first_face(role: ImageRole, faces: Vec<Embedding>) -> Option<Embedding> {
    match faces.len() {
        0 => tracing::warn!(%role, "no face detected"),
        1 => {}
        n => tracing::warn!(%role, faces = n, "multiple faces detected; using the first"),
    }
    faces.into_iter().next()
}
