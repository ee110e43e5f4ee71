//! Adapter configuration, read from environment variables.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ADAPTER_PORT` | `8085` | TCP port the adapter listens on. |
//! | `RUNTIME_PORT` | `8888` | REST port of the co-located backend. |
//! | `MODEL_CONFIG_FILE` | `/models/model_config_list.json` | Path of the backend config document. |
//! | `ROOT_MODEL_DIR` | `/models` | Root directory for placed model artifacts. |
//! | `CONTAINER_MEM_REQ_BYTES` | `1073741824` | Memory budget of the backend container. |
//! | `MEM_BUFFER_BYTES` | `134217728` | Fixed memory the backend consumes independent of models. |
//! | `MODEL_SIZE_MULTIPLIER` | `1.25` | Safety margin applied to disk-derived size estimates. |
//! | `RELOAD_TIMEOUT_SECS` | `30` | Timeout for the backend reload request. |

use std::path::PathBuf;
use std::time::Duration;

/// Fixed memory the backend process needs before loading any model.
pub const DEFAULT_MEM_BUFFER_BYTES: u64 = 128 * 1024 * 1024;

/// Runtime configuration for the adapter process.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Port the adapter's RPC surface listens on.
    pub adapter_port: u16,
    /// REST port of the backend on localhost.
    pub runtime_port: u16,
    /// Path of the backend's multi-model config document.
    pub model_config_file: PathBuf,
    /// Root directory under which model artifacts are placed.
    pub root_model_dir: PathBuf,
    /// Total memory budget of the backend container.
    pub container_mem_req_bytes: u64,
    /// Memory reserved for the backend itself, excluded from capacity.
    pub mem_buffer_bytes: u64,
    /// Multiplier (> 1.0) applied to disk-derived size estimates.
    pub model_size_multiplier: f64,
    /// Bound on the backend reload round-trip.
    pub reload_timeout: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            adapter_port: 8085,
            runtime_port: 8888,
            model_config_file: PathBuf::from("/models/model_config_list.json"),
            root_model_dir: PathBuf::from("/models"),
            container_mem_req_bytes: 1024 * 1024 * 1024,
            mem_buffer_bytes: DEFAULT_MEM_BUFFER_BYTES,
            model_size_multiplier: 1.25,
            reload_timeout: Duration::from_secs(30),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AdapterConfig {
    /// Build the configuration from the process environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            adapter_port: env_parsed("ADAPTER_PORT", defaults.adapter_port),
            runtime_port: env_parsed("RUNTIME_PORT", defaults.runtime_port),
            model_config_file: std::env::var("MODEL_CONFIG_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_config_file),
            root_model_dir: std::env::var("ROOT_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.root_model_dir),
            container_mem_req_bytes: env_parsed(
                "CONTAINER_MEM_REQ_BYTES",
                defaults.container_mem_req_bytes,
            ),
            mem_buffer_bytes: env_parsed("MEM_BUFFER_BYTES", defaults.mem_buffer_bytes),
            model_size_multiplier: env_parsed(
                "MODEL_SIZE_MULTIPLIER",
                defaults.model_size_multiplier,
            ),
            reload_timeout: Duration::from_secs(env_parsed(
                "RELOAD_TIMEOUT_SECS",
                defaults.reload_timeout.as_secs(),
            )),
        }
    }

    /// Memory available for models: container budget minus the fixed buffer.
    /// Independent of what is currently loaded.
    pub fn capacity_bytes(&self) -> u64 {
        self.container_mem_req_bytes
            .saturating_sub(self.mem_buffer_bytes)
    }

    /// Base URL of the backend's REST API.
    pub fn runtime_base_url(&self) -> String {
        format!("http://localhost:{}", self.runtime_port)
    }
}
