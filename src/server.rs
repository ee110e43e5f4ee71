//! Axum-based adapter RPC service.
//!
//! [`AdapterServer`] wires the placement planner, size estimator, config
//! store, and reload client into the RPC surface the mesh control plane
//! consumes.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check — always `200 OK`. |
//! | `GET`  | `/v1/runtime/status` | Model capacity of the backend container. |
//! | `POST` | `/v1/models/load` | Place, configure, and reload one model. |
//! | `POST` | `/v1/models/unload` | Drop one model's config entry and reload. |
//!
//! # Concurrency
//!
//! Requests for distinct model ids run placement and sizing fully in
//! parallel; a per-model lock serializes requests for the same id, and the
//! config store mutex is held across the mutate-persist-reload-verify span so
//! two racing loads cannot drop one another's entry. Once the document is
//! persisted nothing is rolled back: a failed request leaves the model
//! placed/configured but not serving, which a retried Load or an explicit
//! Unload corrects.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::model::{ModelDescriptor, ModelKey};
use crate::placement::PlacementPlanner;
use crate::reload::RuntimeClient;
use crate::sizing::SizeEstimator;
use crate::store::ConfigStore;

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into every handler via [`State`] extractor.
#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<ConfigStore>>,
    runtime: Arc<RuntimeClient>,
    planner: Arc<PlacementPlanner>,
    estimator: SizeEstimator,
    capacity_bytes: u64,
    model_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn from_config(config: &AdapterConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(ConfigStore::new(&config.model_config_file))),
            runtime: Arc::new(RuntimeClient::new(
                config.runtime_base_url(),
                config.reload_timeout,
            )),
            planner: Arc::new(PlacementPlanner::new(&config.root_model_dir)),
            estimator: SizeEstimator::new(config.model_size_multiplier),
            capacity_bytes: config.capacity_bytes(),
            model_locks: Arc::new(DashMap::new()),
        }
    }

    /// Establish the known-empty baseline: persist a cleared document and
    /// trigger one unconditional reload, so the adapter never inherits live
    /// state from a previous process incarnation.
    pub async fn bootstrap(&self) -> AdapterResult<()> {
        let mut store = self.store.lock().await;
        store.clear();
        store.persist().await?;
        self.runtime.reload("(bootstrap)").await?;
        info!("backend reset to empty config baseline");
        Ok(())
    }

    fn model_lock(&self, model_id: &str) -> Arc<Mutex<()>> {
        self.model_locks
            .entry(model_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock table entry for an identity nobody is waiting on, so
    /// the table stays bounded by live models rather than every identity
    /// ever seen. Callers must have released their own clone first; a
    /// contended entry (strong count above the table's own reference) is
    /// left in place.
    fn prune_model_lock(&self, model_id: &str) {
        self.model_locks
            .remove_if(model_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AdapterServer
// ─────────────────────────────────────────────────────────────────────────────

/// High-level adapter server: builds the router and serves it.
pub struct AdapterServer {
    config: AdapterConfig,
}

impl AdapterServer {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    /// Build the axum [`Router`] over the given state.
    pub fn build_app(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/v1/runtime/status", get(runtime_status_handler))
            .route("/v1/models/load", post(load_model_handler))
            .route("/v1/models/unload", post(unload_model_handler))
            .with_state(state)
    }

    /// Reset the backend to the empty baseline, then bind `0.0.0.0:{port}`
    /// and serve until the process exits.
    pub async fn start(self) -> std::io::Result<()> {
        let state = AppState::from_config(&self.config);
        state
            .bootstrap()
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        let app = Self::build_app(state);
        let addr = format!("0.0.0.0:{}", self.config.adapter_port);
        info!(addr = %addr, "OVMS adapter starting");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for `POST /v1/models/load`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadModelRequest {
    pub model_id: String,
    /// Free-form format hint; ignored when the key declares a format.
    #[serde(default)]
    pub model_type: String,
    pub model_path: String,
    /// Opaque JSON key blob.
    #[serde(default)]
    pub model_key: String,
}

/// Request body for `POST /v1/models/unload`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnloadModelRequest {
    pub model_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health` — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "ovms-adapter" }))
}

/// `GET /v1/runtime/status` — capacity available for models.
///
/// A pure function of static configuration, independent of load history.
async fn runtime_status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "capacityBytes": state.capacity_bytes }))
}

/// `POST /v1/models/load`
///
/// Place artifacts, estimate size, write the config entry, reload the
/// backend, and verify the model is serving.
async fn load_model_handler(
    State(state): State<AppState>,
    Json(req): Json<LoadModelRequest>,
) -> Result<Json<serde_json::Value>, AdapterError> {
    if req.model_id.is_empty() {
        return Err(AdapterError::InvalidRequest(
            "modelId must not be empty".to_string(),
        ));
    }
    let key = ModelKey::parse(&req.model_id, &req.model_key)?;
    let descriptor = ModelDescriptor {
        model_id: req.model_id,
        model_type: req.model_type,
        model_path: PathBuf::from(req.model_path),
        key,
    };

    let lock = state.model_lock(&descriptor.model_id);
    let _guard = lock.lock().await;

    // Placement and sizing touch only this model's own subdirectory and run
    // outside the global critical section.
    let placement = state.planner.place(&descriptor).await?;
    let size_bytes = state.estimator.estimate(&descriptor, &placement).await?;

    let list = descriptor.resolved_format().config_list();
    {
        let mut store = state.store.lock().await;
        store.upsert(
            list,
            &descriptor.model_id,
            &placement.model_dir.to_string_lossy(),
        );
        store.persist().await?;
        let report = state.runtime.reload(&descriptor.model_id).await?;
        RuntimeClient::verify_loaded(&report, &descriptor.model_id)?;
    }

    info!(
        model_id = %descriptor.model_id,
        size_bytes,
        base_path = %placement.model_dir.display(),
        "model loaded"
    );
    Ok(Json(json!({ "sizeBytes": size_bytes })))
}

/// `POST /v1/models/unload`
///
/// Drop the model's config entry (a no-op for unknown models), reload the
/// backend, verify the model is gone, then sweep its placed artifacts.
async fn unload_model_handler(
    State(state): State<AppState>,
    Json(req): Json<UnloadModelRequest>,
) -> Result<Json<serde_json::Value>, AdapterError> {
    if req.model_id.is_empty() {
        return Err(AdapterError::InvalidRequest(
            "modelId must not be empty".to_string(),
        ));
    }

    let lock = state.model_lock(&req.model_id);
    let guard = lock.lock().await;

    {
        let mut store = state.store.lock().await;
        store.remove(&req.model_id);
        store.persist().await?;
        let report = state.runtime.reload(&req.model_id).await?;
        RuntimeClient::verify_unloaded(&report, &req.model_id)?;
    }

    // File cleanup is a separate idempotent reconciliation step; a failure
    // here never fails the unload, the next load of this id overwrites.
    if let Err(e) = state.planner.remove(&req.model_id).await {
        warn!(model_id = %req.model_id, error = %e, "failed to sweep placed artifacts");
    }

    // The model is gone; retire its lock table entry unless another request
    // is already queued on it.
    drop(guard);
    drop(lock);
    state.prune_model_lock(&req.model_id);

    info!(model_id = %req.model_id, "model unloaded");
    Ok(Json(json!({ "modelId": req.model_id })))
}
