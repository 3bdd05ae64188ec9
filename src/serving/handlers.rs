//! HTTP handlers and their error mapping.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::ModelLoader;
use crate::model::Record;
use crate::Error;

/// `POST /predict` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Records to score, one prediction each
    pub data: Vec<Record>,
}

/// `POST /predict` success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Class labels in request order
    pub predictions: Vec<u8>,
}

/// Error response: a status plus `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    /// 400 Bad Request.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    /// 503 Service Unavailable.
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            detail: detail.into(),
        }
    }

    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Message sent to the client.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(msg) => Self::bad_request(msg),
            Error::ModelUnavailable(msg) => Self::unavailable(msg),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// Health check endpoint
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Score records with the loader's current model.
pub async fn predict<L: ModelLoader>(
    State(loader): State<Arc<L>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let started = Instant::now();
    match score(loader.as_ref(), payload).await {
        Ok(predictions) => {
            info!(
                prediction_count = predictions.len(),
                duration_ms = elapsed_ms(started),
                "served predictions"
            );
            Ok(Json(PredictResponse { predictions }))
        }
        Err(e) => {
            warn!(
                status = e.status.as_u16(),
                error = %e.detail,
                duration_ms = elapsed_ms(started),
                "prediction request failed"
            );
            Err(e)
        }
    }
}

async fn score<L: ModelLoader>(
    loader: &L,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Vec<u8>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    if request.data.is_empty() {
        return Err(ApiError::bad_request("data must contain at least one record"));
    }

    let model = loader
        .load_current_model()
        .await
        .map_err(|e| ApiError::unavailable(e.to_string()))?;

    Ok(model.predict(&request.data)?)
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
