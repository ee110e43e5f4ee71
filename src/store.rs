//! Backend config document store.
//!
//! The document is the single source of truth for what the backend should
//! serve. The store keeps an in-memory mirror and writes the whole document
//! through on every mutation; it never re-parses the file at call sites, so
//! there is no read-modify-write race to lose updates to. Callers serialize
//! mutating access behind a lock (see `server::AppState`).
//!
//! Persistence is atomic: the document is written to a sibling temp file and
//! renamed over the target, so the backend's config watcher never observes a
//! partially written document.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{AdapterError, AdapterResult};
use crate::model::ConfigList;

// ─────────────────────────────────────────────────────────────────────────────
// Document shape
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of the general model list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelConfig {
    pub name: String,
    pub base_path: String,
}

/// The general list wraps each config in an object; the mediapipe list does
/// not. Both quirks come from the backend's expected document shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelConfigEntry {
    pub config: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediapipeEntry {
    pub name: String,
    pub base_path: String,
}

/// The backend's declarative multi-model configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigDocument {
    pub model_config_list: Vec<ModelConfigEntry>,
    #[serde(default)]
    pub mediapipe_config_list: Vec<MediapipeEntry>,
}

impl ConfigDocument {
    /// Look up an entry by name across both lists.
    pub fn find(&self, name: &str) -> Option<(ConfigList, &str)> {
        if let Some(e) = self.model_config_list.iter().find(|e| e.config.name == name) {
            return Some((ConfigList::Model, e.config.base_path.as_str()));
        }
        self.mediapipe_config_list
            .iter()
            .find(|e| e.name == name)
            .map(|e| (ConfigList::Mediapipe, e.base_path.as_str()))
    }

    /// Number of entries carrying this name, across both lists.
    pub fn count(&self, name: &str) -> usize {
        self.model_config_list
            .iter()
            .filter(|e| e.config.name == name)
            .count()
            + self
                .mediapipe_config_list
                .iter()
                .filter(|e| e.name == name)
                .count()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Write-through store for the backend config document.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    doc: ConfigDocument,
}

impl ConfigStore {
    /// Create a store with an empty in-memory document. The on-disk file is
    /// replaced at the first `persist`; the bootstrap reload clears any state
    /// a previous process incarnation left behind.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: ConfigDocument::default(),
        }
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.doc
    }

    /// Insert or replace the entry with this name in the given list. Name
    /// equality defines identity: the name is stripped from the other list
    /// too, so both lists together never hold more than one entry per model.
    pub fn upsert(&mut self, list: ConfigList, name: &str, base_path: &str) {
        match list {
            ConfigList::Model => {
                self.doc.mediapipe_config_list.retain(|e| e.name != name);
                let config = ModelConfig {
                    name: name.to_string(),
                    base_path: base_path.to_string(),
                };
                match self
                    .doc
                    .model_config_list
                    .iter_mut()
                    .find(|e| e.config.name == name)
                {
                    Some(entry) => entry.config = config,
                    None => self.doc.model_config_list.push(ModelConfigEntry { config }),
                }
            }
            ConfigList::Mediapipe => {
                self.doc.model_config_list.retain(|e| e.config.name != name);
                let entry = MediapipeEntry {
                    name: name.to_string(),
                    base_path: base_path.to_string(),
                };
                match self
                    .doc
                    .mediapipe_config_list
                    .iter_mut()
                    .find(|e| e.name == name)
                {
                    Some(existing) => *existing = entry,
                    None => self.doc.mediapipe_config_list.push(entry),
                }
            }
        }
    }

    /// Remove the entry with this name from whichever list holds it. Unload
    /// of an unknown model is a no-op at this layer, not an error.
    pub fn remove(&mut self, name: &str) -> bool {
        let before =
            self.doc.model_config_list.len() + self.doc.mediapipe_config_list.len();
        self.doc.model_config_list.retain(|e| e.config.name != name);
        self.doc.mediapipe_config_list.retain(|e| e.name != name);
        before > self.doc.model_config_list.len() + self.doc.mediapipe_config_list.len()
    }

    /// Drop every entry. Used once at bootstrap to establish the known-empty
    /// baseline.
    pub fn clear(&mut self) {
        self.doc = ConfigDocument::default();
    }

    /// Atomically write the full document to disk. On failure the previous
    /// on-disk document is left intact.
    pub async fn persist(&self) -> AdapterResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.doc)
            .map_err(|e| AdapterError::Persistence(e.to_string()))?;

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| {
                AdapterError::Persistence(format!(
                    "config path '{}' has no file name",
                    self.path.display()
                ))
            })?
            .to_string_lossy();
        let tmp_path = self.path.with_file_name(format!("{file_name}.tmp"));

        fs::write(&tmp_path, &bytes).await.map_err(|e| {
            AdapterError::Persistence(format!("writing '{}': {e}", tmp_path.display()))
        })?;
        fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            AdapterError::Persistence(format!("renaming into '{}': {e}", self.path.display()))
        })?;

        debug!(
            path = %self.path.display(),
            models = self.doc.model_config_list.len(),
            graphs = self.doc.mediapipe_config_list.len(),
            "persisted config document"
        );
        Ok(())
    }
}
