//! HTTP surface: `POST /verify` and `GET /status`.

use crate::verifier::{Outcome, Verifier, VerifyError};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::Instrument;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<Verifier>,
    pub expose_error_details: bool,
}

/// Body of `POST /verify`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub reference_image_url: Option<String>,
    pub captured_image_url: Option<String>,
}

impl VerifyRequest {
    /// Both URLs, if present and non-empty.
    fn urls(&self) -> Option<(&str, &str)> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        Some((
            non_empty(&self.reference_image_url)?,
            non_empty(&self.captured_image_url)?,
        ))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/verify", post(verify))
        .route("/status", get(status))
        .with_state(state)
}

async fn verify(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("verify", %request_id);

    async move {
        let Json(request) = match payload {
            Ok(body) => body,
            Err(rejection) => {
                tracing::warn!(error = %rejection, "rejected request body");
                return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body");
            }
        };

        let Some((reference_url, captured_url)) = request.urls() else {
            tracing::warn!("missing image URLs in request");
            return error_response(StatusCode::BAD_REQUEST, "Missing image URLs");
        };

        let outcome = state.verifier.verify(reference_url, captured_url).await;
        if let Outcome::Failed(e) = &outcome {
            tracing::error!(error = %e, "verification failed");
        }

        let (status, body) = render(&outcome, state.expose_error_details);
        (status, Json(body)).into_response()
    }
    .instrument(span)
    .await
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workers": state.verifier.workers(),
        "tolerance": state.verifier.tolerance(),
        "max_attempts": state.verifier.max_attempts(),
    }))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Map a verification outcome to its HTTP status and JSON body.
///
/// With `expose_details` off, underlying error text never reaches the client.
pub fn render(outcome: &Outcome, expose_details: bool) -> (StatusCode, Value) {
    match outcome {
        Outcome::Compared(result) => (
            StatusCode::OK,
            json!({ "match": result.matched, "distance": result.distance }),
        ),
        Outcome::NoFace(role) => (
            StatusCode::OK,
            json!({ "match": false, "error": format!("No face detected in {role} image") }),
        ),
        Outcome::Failed(VerifyError::Download { source, .. }) => {
            let message = if source.is_timeout() {
                "Failed to download image: Connection timed out.".to_string()
            } else if expose_details {
                format!("Failed to download image: {source}")
            } else {
                "Failed to download image.".to_string()
            };
            (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message }))
        }
        Outcome::Failed(e) => {
            let body = if expose_details {
                json!({ "error": "Internal server error", "details": e.to_string() })
            } else {
                json!({ "error": "Internal server error" })
            };
            (StatusCode::INTERNAL_SERVER_ERROR, body)
        }
    }
}
