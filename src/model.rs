//! Model descriptors, the caller-supplied model key, and format resolution.
//!
//! The mesh sends a free-form `modelType` hint next to an opaque JSON key
//! blob. When the key declares a `model_type` of its own, the key wins; an
//! unrecognised hint is never an error, since the resolved format only
//! selects the placement strategy and the target config list.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{AdapterError, AdapterResult};

// ─────────────────────────────────────────────────────────────────────────────
// Model key
// ─────────────────────────────────────────────────────────────────────────────

/// The key's `model_type` field appears in the wild both as a bare string
/// and as an object carrying a version.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ModelTypeField {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        version: Option<String>,
    },
}

impl ModelTypeField {
    pub fn name(&self) -> &str {
        match self {
            ModelTypeField::Name(n) => n,
            ModelTypeField::Detailed { name, .. } => name,
        }
    }
}

/// Optional metadata carried in the load request's key blob.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelKey {
    #[serde(default)]
    pub model_type: Option<ModelTypeField>,
    #[serde(default)]
    pub storage_key: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    /// Declared on-disk size; scaled by the configured multiplier since disk
    /// size understates runtime footprint.
    #[serde(default)]
    pub disk_size_bytes: Option<u64>,
}

impl ModelKey {
    /// Parse the key blob. An empty blob is treated as an empty key; a
    /// non-empty blob that is not valid JSON rejects the request.
    pub fn parse(model_id: &str, raw: &str) -> AdapterResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|e| {
            AdapterError::InvalidRequest(format!(
                "model key for '{model_id}' is not valid JSON: {e}"
            ))
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Descriptor and format table
// ─────────────────────────────────────────────────────────────────────────────

/// A fully parsed load request.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub model_id: String,
    /// Caller's separate format hint, possibly `rt:`-prefixed or garbage.
    pub model_type: String,
    pub model_path: PathBuf,
    pub key: ModelKey,
}

impl ModelDescriptor {
    /// Resolve the model format: the key's declared type wins, then the hint
    /// with any `prefix:` stripped.
    pub fn resolved_format(&self) -> ModelFormat {
        let name = match &self.key.model_type {
            Some(t) => t.name(),
            None => self
                .model_type
                .rsplit_once(':')
                .map_or(self.model_type.as_str(), |(_, n)| n),
        };
        ModelFormat::from_name(name)
    }
}

/// Which of the backend document's two entry lists an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigList {
    Model,
    Mediapipe,
}

/// Placement strategy table keyed by resolved format name.
///
/// Formats without structural requirements fall into `Other` and are placed
/// generically (every regular file in the source directory is copied).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelFormat {
    /// OpenVINO IR: a paired `<stem>.xml` definition + `<stem>.bin` weights.
    Openvino,
    /// MediaPipe pipeline: a single `graph.pbtxt` graph definition.
    MediapipeGraph,
    Other(String),
}

impl ModelFormat {
    pub fn from_name(name: &str) -> Self {
        match name {
            "openvino" => ModelFormat::Openvino,
            "mediapipe_graph" => ModelFormat::MediapipeGraph,
            other => ModelFormat::Other(other.to_string()),
        }
    }

    /// Graph pipelines are declared in the mediapipe list, everything else in
    /// the general model list.
    pub fn config_list(&self) -> ConfigList {
        match self {
            ModelFormat::MediapipeGraph => ConfigList::Mediapipe,
            _ => ConfigList::Model,
        }
    }
}
