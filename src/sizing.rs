//! Memory-footprint estimation for loaded models.
//!
//! Three signals, in precedence order:
//! 1. a `disk_size_bytes` declared in the model key, scaled by the configured
//!    multiplier (declared disk size understates runtime footprint);
//! 2. a defined-size marker file next to the source artifacts, used verbatim
//!    (it already is a footprint estimate, not a disk size);
//! 3. the measured bytes of the copied artifacts, scaled by the multiplier.
//!
//! The estimate is computed once per load and never revisited.

use tokio::fs;
use tracing::debug;

use crate::error::{AdapterError, AdapterResult};
use crate::model::ModelDescriptor;
use crate::placement::{DEFINED_SIZE_FILENAME, PlacementRecord};

/// Computes size estimates for placed models.
#[derive(Debug, Clone, Copy)]
pub struct SizeEstimator {
    multiplier: f64,
}

impl SizeEstimator {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }

    /// Estimate the model's memory footprint in bytes. Pure with respect to
    /// the filesystem: only reads files that placement already validated.
    pub async fn estimate(
        &self,
        descriptor: &ModelDescriptor,
        placement: &PlacementRecord,
    ) -> AdapterResult<u64> {
        if let Some(disk_size) = descriptor.key.disk_size_bytes {
            let estimate = self.scale(disk_size);
            debug!(
                model_id = %descriptor.model_id,
                disk_size,
                estimate,
                "size from declared disk size"
            );
            return Ok(estimate);
        }

        if let Some(defined) = self.defined_size(descriptor).await? {
            debug!(model_id = %descriptor.model_id, estimate = defined, "size from marker file");
            return Ok(defined);
        }

        let estimate = self.scale(placement.artifact_bytes);
        debug!(
            model_id = %descriptor.model_id,
            artifact_bytes = placement.artifact_bytes,
            estimate,
            "size from measured artifacts"
        );
        Ok(estimate)
    }

    fn scale(&self, bytes: u64) -> u64 {
        (bytes as f64 * self.multiplier) as u64
    }

    /// Read the defined-size marker from the source directory, if any. A
    /// present but unparsable marker is an error; an absent one is not a
    /// signal at all.
    async fn defined_size(&self, descriptor: &ModelDescriptor) -> AdapterResult<Option<u64>> {
        let marker = descriptor.model_path.join(DEFINED_SIZE_FILENAME);
        let content = match fs::read_to_string(&marker).await {
            Ok(c) => c,
            Err(_) => return Ok(None),
        };
        let size = content.trim().parse::<u64>().map_err(|e| {
            AdapterError::SizeEstimation {
                model_id: descriptor.model_id.clone(),
                reason: format!("unparsable size marker '{}': {e}", marker.display()),
            }
        })?;
        Ok(Some(size))
    }
}
