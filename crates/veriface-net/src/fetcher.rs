//! HTTP image download with bounded, fixed-delay retries.

use crate::error::{AttemptError, FetchError};
use reqwest::{Client, Url};
use std::time::Duration;

/// Retry and size policy for image downloads.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Timeout applied to each attempt (connect + body).
    pub attempt_timeout: Duration,
    /// Fixed delay between attempts.
    pub backoff: Duration,
    /// Largest accepted body, in bytes.
    pub max_bytes: usize,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(20),
            backoff: Duration::from_secs(1),
            max_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Downloads raw image bytes. Cheap to clone; clones share a connection pool.
#[derive(Clone)]
pub struct ImageFetcher {
    client: Client,
    policy: FetchPolicy,
}

impl ImageFetcher {
    pub fn new(policy: FetchPolicy) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(policy.attempt_timeout)
            .user_agent(concat!("veriface/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// GET `url` and return the body of the first 2xx response.
    ///
    /// Failed attempts are logged and retried after the fixed backoff until
    /// `max_attempts` is reached; only the final failure is returned.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(&parsed).await {
                Ok(bytes) => {
                    tracing::debug!(url, attempt, size = bytes.len(), "image downloaded");
                    return Ok(bytes);
                }
                Err(cause) if cause.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        url,
                        attempt,
                        max_attempts,
                        error = %cause,
                        "image download failed; retrying"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                    attempt += 1;
                }
                Err(cause) => {
                    tracing::warn!(url, attempt, error = %cause, "image download failed");
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        cause,
                    });
                }
            }
        }
    }

    async fn attempt(&self, url: &Url) -> Result<Vec<u8>, AttemptError> {
        let mut response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status));
        }

        let limit = self.policy.max_bytes;
        if let Some(len) = response.content_length() {
            if len > limit as u64 {
                return Err(AttemptError::TooLarge { limit });
            }
        }

        // Content-Length may be absent (chunked) or wrong; enforce on the stream.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(AttemptError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn fast_policy() -> FetchPolicy {
        FetchPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_millis(500),
            backoff: Duration::from_millis(10),
            max_bytes: 1024,
        }
    }

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    /// Route that answers 503 for the first `failures` hits, then the payload.
    fn flaky(failures: u32, hits: Arc<AtomicU32>) -> Router {
        Router::new().route(
            "/image",
            get(move || {
                let hits = hits.clone();
                async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        (StatusCode::SERVICE_UNAVAILABLE, Vec::new())
                    } else {
                        (StatusCode::OK, b"image-bytes".to_vec())
                    }
                }
            }),
        )
    }

    #[tokio::test]
    async fn test_fetch_success_first_attempt() {
        let hits = Arc::new(AtomicU32::new(0));
        let addr = serve(flaky(0, hits.clone())).await;

        let fetcher = ImageFetcher::new(fast_policy()).unwrap();
        let bytes = fetcher.fetch(&format!("http://{addr}/image")).await.unwrap();

        assert_eq!(bytes, b"image-bytes");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_recovers_from_transient_failures() {
        let hits = Arc::new(AtomicU32::new(0));
        let addr = serve(flaky(2, hits.clone())).await;

        let fetcher = ImageFetcher::new(fast_policy()).unwrap();
        let bytes = fetcher.fetch(&format!("http://{addr}/image")).await.unwrap();

        assert_eq!(bytes, b"image-bytes");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_exhausts_attempts() {
        let hits = Arc::new(AtomicU32::new(0));
        let addr = serve(flaky(3, hits.clone())).await;

        let fetcher = ImageFetcher::new(fast_policy()).unwrap();
        let err = fetcher.fetch(&format!("http://{addr}/image")).await.unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        match err {
            FetchError::Exhausted { attempts, cause, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(cause, AttemptError::Status(s) if s == StatusCode::SERVICE_UNAVAILABLE));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Bind then drop to obtain a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = ImageFetcher::new(fast_policy()).unwrap();
        let url = format!("http://{addr}/image");
        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }), "{err}");
        assert!(!err.is_timeout());
        assert!(err.to_string().contains(&url), "{err}");
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let addr = serve(router).await;

        let policy = FetchPolicy {
            max_attempts: 2,
            attempt_timeout: Duration::from_millis(100),
            ..fast_policy()
        };
        let fetcher = ImageFetcher::new(policy).unwrap();
        let err = fetcher.fetch(&format!("http://{addr}/slow")).await.unwrap_err();

        assert!(err.is_timeout(), "{err}");
        assert!(matches!(err, FetchError::Exhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_fetch_too_large_is_not_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/big",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    vec![0u8; 4096]
                }
            }),
        );
        let addr = serve(router).await;

        let fetcher = ImageFetcher::new(fast_policy()).unwrap();
        let err = fetcher.fetch(&format!("http://{addr}/big")).await.unwrap_err();

        assert!(
            matches!(err, FetchError::Exhausted { attempts: 1, cause: AttemptError::TooLarge { limit: 1024 }, .. }),
            "{err}"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    /// Raw HTTP server streaming 4 KiB chunks forever, with no Content-Length.
    async fn endless_chunked(connections: Arc<AtomicU32>) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut request = [0u8; 1024];
                    let _ = socket.read(&mut request).await;
                    let head = "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nTransfer-Encoding: chunked\r\n\r\n";
                    if socket.write_all(head.as_bytes()).await.is_err() {
                        return;
                    }
                    let chunk = format!("1000\r\n{}\r\n", "x".repeat(4096));
                    while socket.write_all(chunk.as_bytes()).await.is_ok() {}
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_fetch_chunked_body_over_limit_stops_early() {
        let connections = Arc::new(AtomicU32::new(0));
        let addr = endless_chunked(connections.clone()).await;

        let policy = FetchPolicy {
            attempt_timeout: Duration::from_secs(10),
            ..fast_policy()
        };
        let fetcher = ImageFetcher::new(policy).unwrap();
        let started = Instant::now();
        let err = fetcher.fetch(&format!("http://{addr}/big")).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
        assert!(!err.is_timeout(), "{err}");
        assert!(
            matches!(err, FetchError::Exhausted { attempts: 1, cause: AttemptError::TooLarge { limit: 1024 }, .. }),
            "{err}"
        );
        assert_eq!(connections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let fetcher = ImageFetcher::new(fast_policy()).unwrap();
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }), "{err}");
    }
}
