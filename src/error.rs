//! Adapter error types.
//!
//! Every failure a load/unload/status request can hit maps to exactly one
//! variant, so the mesh can tell from the error code whether shared state may
//! have drifted: placement and sizing failures are local to the request,
//! persistence failures leave the previous document authoritative, and the
//! two reload failures mean the config document was already mutated.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Adapter-level errors, one variant per failing stage.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Artifact placement failed. The partially created target directory has
    /// already been removed; the config document was not touched.
    #[error("placement of model '{model_id}' failed: {reason}")]
    Placement { model_id: String, reason: String },

    /// A defined-size marker was present but unparsable.
    #[error("size estimation for model '{model_id}' failed: {reason}")]
    SizeEstimation { model_id: String, reason: String },

    /// The config document could not be written; the previous on-disk
    /// document is intact and authoritative.
    #[error("failed to persist model config document: {0}")]
    Persistence(String),

    /// The backend was unreachable or answered with a non-success status.
    /// The config document has already been mutated, so adapter and backend
    /// state may have drifted until a retry or the next reload.
    #[error("runtime reload request for model '{model_id}' failed: {reason}")]
    ReloadTransport { model_id: String, reason: String },

    /// The backend answered, but the model never reached the expected state.
    /// The config document has already been mutated; a retried Load/Unload
    /// re-applies the same name-keyed mutation.
    #[error("model '{model_id}' did not reach the expected state: {reason}")]
    ReloadVerification { model_id: String, reason: String },
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AdapterError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            AdapterError::Placement { .. } => (StatusCode::BAD_REQUEST, "MODEL_PLACEMENT_FAILED"),
            AdapterError::SizeEstimation { .. } => {
                (StatusCode::BAD_REQUEST, "SIZE_ESTIMATION_FAILED")
            }
            AdapterError::Persistence(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_PERSISTENCE_FAILED")
            }
            AdapterError::ReloadTransport { .. } => {
                (StatusCode::BAD_GATEWAY, "RELOAD_TRANSPORT_FAILED")
            }
            AdapterError::ReloadVerification { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "RELOAD_VERIFICATION_FAILED")
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;
