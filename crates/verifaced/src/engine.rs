use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use veriface_core::{EmbedError, Embedding, FaceEmbedder};

/// Pending requests per worker before senders wait.
const WORKER_QUEUE_DEPTH: usize = 8;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error("engine needs at least one worker")]
    NoWorkers,
    #[error("failed to spawn engine worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine worker exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to an engine worker.
enum EngineRequest {
    Embed {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<Embedding>, EmbedError>>,
    },
}

/// Clone-safe handle to the engine worker pool.
#[derive(Clone)]
pub struct EngineHandle {
    workers: Arc<[mpsc::Sender<EngineRequest>]>,
    next: Arc<AtomicUsize>,
}

impl EngineHandle {
    /// Decode `image` and embed every face in it on the next live worker
    /// (round-robin). Workers whose thread has exited are skipped.
    pub async fn embed(&self, image: Vec<u8>) -> Result<Vec<Embedding>, EngineError> {
        let count = self.workers.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        let worker = (0..count)
            .map(|offset| start.wrapping_add(offset) % count)
            .find(|&idx| {
                let closed = self.workers[idx].is_closed();
                if closed {
                    tracing::warn!(worker = idx, "engine worker is gone; skipping");
                }
                !closed
            })
            .ok_or(EngineError::ChannelClosed)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.workers[worker]
            .send(EngineRequest::Embed {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

/// Spawn `workers` engine threads, each owning one embedder from `load`.
///
/// Every embedder is constructed on the calling thread before any worker
/// starts, so a missing or broken model fails startup instead of the first
/// request. Workers exit once every handle is dropped.
pub fn spawn_engine<E, F>(workers: usize, mut load: F) -> Result<EngineHandle, EngineError>
where
    E: FaceEmbedder + 'static,
    F: FnMut() -> Result<E, EmbedError>,
{
    if workers == 0 {
        return Err(EngineError::NoWorkers);
    }

    let embedders = (0..workers).map(|_| load()).collect::<Result<Vec<_>, _>>()?;

    let mut senders = Vec::with_capacity(workers);
    for (id, mut embedder) in embedders.into_iter().enumerate() {
        let (tx, mut rx) = mpsc::channel::<EngineRequest>(WORKER_QUEUE_DEPTH);

        std::thread::Builder::new()
            .name(format!("veriface-engine-{id}"))
            .spawn(move || {
                tracing::info!(worker = id, "engine worker started");
                while let Some(req) = rx.blocking_recv() {
                    match req {
                        EngineRequest::Embed { image, reply } => {
                            let result = veriface_core::embed_image(&mut embedder, &image);
                            if let Ok(faces) = &result {
                                tracing::debug!(worker = id, faces = faces.len(), "embedded image");
                            }
                            // Receiver gone means the request was cancelled (deadline).
                            let _ = reply.send(result);
                        }
                    }
                }
                tracing::info!(worker = id, "engine worker exiting");
            })
            .map_err(EngineError::Spawn)?;

        senders.push(tx);
    }

    Ok(EngineHandle {
        workers: senders.into(),
        next: Arc::new(AtomicUsize::new(0)),
    })
}
