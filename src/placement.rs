//! Model placement planner.
//!
//! Materialises a model's artifacts into the layout the backend expects:
//! `<root>/<modelId>/1/<artifact files>`. The source is never mutated, and a
//! placement that fails part-way removes its target directory before
//! returning, so the config store never sees a half-populated layout.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{AdapterError, AdapterResult};
use crate::model::{ModelDescriptor, ModelFormat};

/// Backends expect artifacts inside a numbered version directory.
pub const VERSION_SUBDIR: &str = "1";

/// Sidecar file holding a precomputed memory-footprint estimate.
pub const DEFINED_SIZE_FILENAME: &str = "model_size";

/// What a completed placement produced on disk.
#[derive(Debug, Clone)]
pub struct PlacementRecord {
    /// `<root>/<modelId>` — the base path written into the config document.
    pub model_dir: PathBuf,
    /// `<model_dir>/1` — where the artifact files live.
    pub version_dir: PathBuf,
    /// Total bytes copied, for the fallback size estimate.
    pub artifact_bytes: u64,
}

/// Plans and executes artifact placement under a managed root directory.
#[derive(Debug, Clone)]
pub struct PlacementPlanner {
    root: PathBuf,
}

impl PlacementPlanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Target directory for a model id.
    pub fn model_dir(&self, model_id: &str) -> PathBuf {
        self.root.join(model_id)
    }

    /// Place the model's artifacts. Idempotent: an existing placement for the
    /// same id is replaced wholesale.
    pub async fn place(&self, descriptor: &ModelDescriptor) -> AdapterResult<PlacementRecord> {
        let model_dir = self.model_dir(&descriptor.model_id);
        let version_dir = model_dir.join(VERSION_SUBDIR);

        if fs::try_exists(&model_dir).await.unwrap_or(false) {
            fs::remove_dir_all(&model_dir)
                .await
                .map_err(|e| self.err(descriptor, "replacing existing placement", e))?;
        }
        fs::create_dir_all(&version_dir)
            .await
            .map_err(|e| self.err(descriptor, "creating target directory", e))?;

        match self.copy_artifacts(descriptor, &version_dir).await {
            Ok(artifact_bytes) => {
                debug!(
                    model_id = %descriptor.model_id,
                    bytes = artifact_bytes,
                    target = %version_dir.display(),
                    "placed model artifacts"
                );
                Ok(PlacementRecord {
                    model_dir,
                    version_dir,
                    artifact_bytes,
                })
            }
            Err(e) => {
                // Never leave a half-populated layout behind.
                if let Err(rm_err) = fs::remove_dir_all(&model_dir).await {
                    warn!(
                        model_id = %descriptor.model_id,
                        error = %rm_err,
                        "failed to clean up partial placement"
                    );
                }
                Err(e)
            }
        }
    }

    /// Remove a model's placed artifacts. Idempotent reconciliation step,
    /// separate from the config mutation itself.
    pub async fn remove(&self, model_id: &str) -> std::io::Result<()> {
        let model_dir = self.model_dir(model_id);
        match fs::remove_dir_all(&model_dir).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    async fn copy_artifacts(
        &self,
        descriptor: &ModelDescriptor,
        version_dir: &Path,
    ) -> AdapterResult<u64> {
        let source = &descriptor.model_path;
        let meta = fs::metadata(source)
            .await
            .map_err(|e| self.err(descriptor, "reading source path", e))?;

        // Direct-to-file models carry no discoverable layout; the resolved
        // format is trusted verbatim.
        if meta.is_file() {
            return self
                .copy_file(descriptor, source, version_dir)
                .await;
        }

        match descriptor.resolved_format() {
            ModelFormat::Openvino => self.copy_ir_pairs(descriptor, source, version_dir).await,
            ModelFormat::MediapipeGraph => {
                let graph = source.join("graph.pbtxt");
                if !fs::try_exists(&graph).await.unwrap_or(false) {
                    return Err(AdapterError::Placement {
                        model_id: descriptor.model_id.clone(),
                        reason: format!("no graph.pbtxt found in '{}'", source.display()),
                    });
                }
                self.copy_file(descriptor, &graph, version_dir).await
            }
            ModelFormat::Other(_) => self.copy_all_files(descriptor, source, version_dir).await,
        }
    }

    /// Copy every `<stem>.xml` + `<stem>.bin` IR pair found in the source.
    async fn copy_ir_pairs(
        &self,
        descriptor: &ModelDescriptor,
        source: &Path,
        version_dir: &Path,
    ) -> AdapterResult<u64> {
        let names = self.list_file_names(descriptor, source).await?;
        let mut total = 0u64;
        let mut pairs = 0usize;
        for name in &names {
            let Some(stem) = name.strip_suffix(".xml") else {
                continue;
            };
            let weights = format!("{stem}.bin");
            if !names.contains(&weights) {
                continue;
            }
            total += self.copy_file(descriptor, &source.join(name), version_dir).await?;
            total += self
                .copy_file(descriptor, &source.join(&weights), version_dir)
                .await?;
            pairs += 1;
        }
        if pairs == 0 {
            return Err(AdapterError::Placement {
                model_id: descriptor.model_id.clone(),
                reason: format!(
                    "no .xml/.bin definition/weights pair found in '{}'",
                    source.display()
                ),
            });
        }
        Ok(total)
    }

    /// Generic placement for formats without structural requirements.
    async fn copy_all_files(
        &self,
        descriptor: &ModelDescriptor,
        source: &Path,
        version_dir: &Path,
    ) -> AdapterResult<u64> {
        let names = self.list_file_names(descriptor, source).await?;
        let mut total = 0u64;
        for name in &names {
            if name == DEFINED_SIZE_FILENAME {
                continue;
            }
            total += self.copy_file(descriptor, &source.join(name), version_dir).await?;
        }
        Ok(total)
    }

    async fn list_file_names(
        &self,
        descriptor: &ModelDescriptor,
        dir: &Path,
    ) -> AdapterResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| self.err(descriptor, "listing source directory", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| self.err(descriptor, "listing source directory", e))?
        {
            let ftype = entry
                .file_type()
                .await
                .map_err(|e| self.err(descriptor, "listing source directory", e))?;
            if ftype.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Copy one file into the version directory, returning its size.
    async fn copy_file(
        &self,
        descriptor: &ModelDescriptor,
        file: &Path,
        version_dir: &Path,
    ) -> AdapterResult<u64> {
        let name = file.file_name().ok_or_else(|| AdapterError::Placement {
            model_id: descriptor.model_id.clone(),
            reason: format!("source path '{}' has no file name", file.display()),
        })?;
        fs::copy(file, version_dir.join(name)).await.map_err(|e| {
            self.err(descriptor, &format!("copying '{}'", file.display()), e)
        })
    }

    fn err(&self, descriptor: &ModelDescriptor, stage: &str, e: std::io::Error) -> AdapterError {
        AdapterError::Placement {
            model_id: descriptor.model_id.clone(),
            reason: format!("{stage}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelKey;
    use std::path::PathBuf;

    fn descriptor(id: &str, path: PathBuf, key: &str) -> ModelDescriptor {
        ModelDescriptor {
            model_id: id.to_string(),
            model_type: "rt:openvino".to_string(),
            model_path: path,
            key: ModelKey::parse(id, key).unwrap(),
        }
    }

    fn write(dir: &Path, name: &str, content: &[u8]) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[tokio::test]
    async fn openvino_pair_is_copied_into_version_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir(&src).unwrap();
        write(&src, "ir_model.xml", b"<net/>");
        write(&src, "ir_model.bin", &[0u8; 64]);
        write(&src, "notes.txt", b"ignored");

        let planner = PlacementPlanner::new(tmp.path().join("root"));
        let d = descriptor("ov", src, r#"{"model_type": "openvino"}"#);
        let record = planner.place(&d).await.unwrap();

        assert!(record.version_dir.join("ir_model.xml").is_file());
        assert!(record.version_dir.join("ir_model.bin").is_file());
        assert!(!record.version_dir.join("notes.txt").exists());
        assert_eq!(record.artifact_bytes, 6 + 64);
    }

    #[tokio::test]
    async fn missing_ir_pair_fails_and_leaves_no_target() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir(&src).unwrap();
        write(&src, "ir_model.xml", b"<net/>"); // no .bin

        let planner = PlacementPlanner::new(tmp.path().join("root"));
        let d = descriptor("ov", src, r#"{"model_type": "openvino"}"#);
        let err = planner.place(&d).await.unwrap_err();
        assert!(matches!(err, AdapterError::Placement { .. }));
        assert!(!planner.model_dir("ov").exists());
    }

    #[tokio::test]
    async fn single_file_source_is_copied_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("model.onnx");
        std::fs::write(&src, [1u8; 32]).unwrap();

        let planner = PlacementPlanner::new(tmp.path().join("root"));
        let d = descriptor("onnx", src, r#"{"model_type": {"name": "onnx"}}"#);
        let record = planner.place(&d).await.unwrap();
        assert!(record.version_dir.join("model.onnx").is_file());
        assert_eq!(record.artifact_bytes, 32);
    }

    #[tokio::test]
    async fn generic_format_copies_all_files_except_size_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir(&src).unwrap();
        write(&src, "weights.dat", &[0u8; 10]);
        write(&src, "labels.txt", &[0u8; 5]);
        write(&src, DEFINED_SIZE_FILENAME, b"123000000");

        let planner = PlacementPlanner::new(tmp.path().join("root"));
        let d = descriptor("gen", src, r#"{"model_type": "tensorflow"}"#);
        let record = planner.place(&d).await.unwrap();
        assert!(record.version_dir.join("weights.dat").is_file());
        assert!(record.version_dir.join("labels.txt").is_file());
        assert!(!record.version_dir.join(DEFINED_SIZE_FILENAME).exists());
        assert_eq!(record.artifact_bytes, 15);
    }

    #[tokio::test]
    async fn replacing_a_placement_drops_stale_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir(&src).unwrap();
        write(&src, "a.xml", b"x");
        write(&src, "a.bin", b"y");

        let planner = PlacementPlanner::new(tmp.path().join("root"));
        let d = descriptor("ov", src.clone(), r#"{"model_type": "openvino"}"#);
        planner.place(&d).await.unwrap();

        // Second placement of the same id sees a different artifact set.
        std::fs::remove_file(src.join("a.xml")).unwrap();
        std::fs::remove_file(src.join("a.bin")).unwrap();
        write(&src, "b.xml", b"x2");
        write(&src, "b.bin", b"y2");
        let record = planner.place(&d).await.unwrap();
        assert!(record.version_dir.join("b.xml").is_file());
        assert!(!record.version_dir.join("a.xml").exists());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let planner = PlacementPlanner::new(tmp.path().join("root"));
        planner.remove("never-loaded").await.unwrap();
        planner.remove("never-loaded").await.unwrap();
    }
}
