use reqwest::StatusCode;
use std::error::Error as _;
use thiserror::Error;

/// Failure of a single download attempt.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("request timed out")]
    Timeout,
    #[error("server responded with {0}")]
    Status(StatusCode),
    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("{0}")]
    Transport(String),
}

impl AttemptError {
    /// Oversized bodies will not shrink on retry; everything else may be transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AttemptError::TooLarge { .. })
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AttemptError::Timeout
        } else {
            // FetchError already carries the URL; keep the cause chain instead.
            let e = e.without_url();
            let mut detail = e.to_string();
            let mut source = e.source();
            while let Some(cause) = source {
                detail.push_str(": ");
                detail.push_str(&cause.to_string());
                source = cause.source();
            }
            AttemptError::Transport(detail)
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid image URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("GET {url} failed after {attempts} attempt(s): {cause}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        cause: AttemptError,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// True when the last attempt failed because it timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FetchError::Exhausted {
                cause: AttemptError::Timeout,
                ..
            }
        )
    }
}
