//! Reload coordination against the backend.
//!
//! After every config mutation the adapter triggers the backend's reload
//! endpoint and reconciles the returned per-model status against what the
//! request expects. Transport failures and verification failures are kept
//! apart: the former means the backend may not have observed the committed
//! document at all, the latter means it did and rejected (or is still
//! processing) the change.
//!
//! No internal retry: the mutation is idempotent by name-keyed upsert/remove,
//! so retry policy belongs to the mesh caller.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{AdapterError, AdapterResult};

/// Backend state for a version that is live and serving.
pub const STATE_AVAILABLE: &str = "AVAILABLE";
/// Backend state for a version that has been retired.
pub const STATE_END: &str = "END";

#[derive(Debug, Clone, Deserialize)]
pub struct ModelVersionStatus {
    pub state: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelStatus {
    #[serde(rename = "modelVersionStatus", default)]
    pub model_version_status: Vec<ModelVersionStatus>,
}

/// Per-model status map returned by the backend after a reload.
pub type StatusReport = HashMap<String, ModelStatus>;

/// HTTP client for the backend's reload endpoint.
pub struct RuntimeClient {
    base_url: String,
    client: Client,
}

impl RuntimeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Trigger a config reload and return the backend's status report.
    ///
    /// A request timeout maps to the verification error, not transport: the
    /// document mutation is already committed and the backend may simply
    /// still be processing it.
    #[instrument(skip_all, fields(model_id = %model_id))]
    pub async fn reload(&self, model_id: &str) -> AdapterResult<StatusReport> {
        let url = format!("{}/v1/config/reload", self.base_url);
        debug!(url = %url, "triggering backend reload");

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| Self::classify(model_id, &e, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::ReloadTransport {
                model_id: model_id.to_string(),
                reason: format!("backend returned {status}: {body}"),
            });
        }

        response.json::<StatusReport>().await.map_err(|e| {
            Self::classify(model_id, &e, format!("unparsable status report: {e}"))
        })
    }

    /// A timeout anywhere in the reload round-trip (connect, send, or body
    /// read) maps to the verification error: the document mutation is
    /// already committed and the backend may simply still be processing it.
    fn classify(model_id: &str, e: &reqwest::Error, transport_reason: String) -> AdapterError {
        if e.is_timeout() {
            AdapterError::ReloadVerification {
                model_id: model_id.to_string(),
                reason: "timed out awaiting reload status".to_string(),
            }
        } else {
            AdapterError::ReloadTransport {
                model_id: model_id.to_string(),
                reason: transport_reason,
            }
        }
    }

    /// A load succeeded when at least one version of the model is serving.
    pub fn verify_loaded(report: &StatusReport, model_id: &str) -> AdapterResult<()> {
        let versions = report
            .get(model_id)
            .map(|s| s.model_version_status.as_slice())
            .unwrap_or_default();
        if versions.iter().any(|v| v.state == STATE_AVAILABLE) {
            return Ok(());
        }
        let states: Vec<&str> = versions.iter().map(|v| v.state.as_str()).collect();
        Err(AdapterError::ReloadVerification {
            model_id: model_id.to_string(),
            reason: if states.is_empty() {
                "model absent from backend status report".to_string()
            } else {
                format!("no available version, observed states {states:?}")
            },
        })
    }

    /// An unload succeeded when the model is gone or every remaining version
    /// is terminal.
    pub fn verify_unloaded(report: &StatusReport, model_id: &str) -> AdapterResult<()> {
        let versions = report
            .get(model_id)
            .map(|s| s.model_version_status.as_slice())
            .unwrap_or_default();
        if versions.iter().all(|v| v.state == STATE_END) {
            return Ok(());
        }
        let states: Vec<&str> = versions.iter().map(|v| v.state.as_str()).collect();
        Err(AdapterError::ReloadVerification {
            model_id: model_id.to_string(),
            reason: format!("model still present with states {states:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(entries: &[(&str, &[&str])]) -> StatusReport {
        entries
            .iter()
            .map(|(name, states)| {
                (
                    name.to_string(),
                    ModelStatus {
                        model_version_status: states
                            .iter()
                            .map(|s| ModelVersionStatus {
                                state: s.to_string(),
                            })
                            .collect(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn loaded_requires_an_available_version() {
        let r = report(&[("m", &["LOADING", "AVAILABLE"])]);
        assert!(RuntimeClient::verify_loaded(&r, "m").is_ok());

        let r = report(&[("m", &["LOADING"])]);
        assert!(matches!(
            RuntimeClient::verify_loaded(&r, "m"),
            Err(AdapterError::ReloadVerification { .. })
        ));
    }

    #[test]
    fn loaded_fails_when_model_is_absent() {
        let r = report(&[("other", &[STATE_AVAILABLE])]);
        assert!(RuntimeClient::verify_loaded(&r, "m").is_err());
    }

    #[test]
    fn unloaded_accepts_absent_model() {
        let r = report(&[("other", &[STATE_AVAILABLE])]);
        assert!(RuntimeClient::verify_unloaded(&r, "m").is_ok());
    }

    #[test]
    fn unloaded_accepts_terminal_versions_only() {
        let r = report(&[("m", &[STATE_END])]);
        assert!(RuntimeClient::verify_unloaded(&r, "m").is_ok());

        let r = report(&[("m", &[STATE_END, STATE_AVAILABLE])]);
        assert!(RuntimeClient::verify_unloaded(&r, "m").is_err());
    }

    #[tokio::test]
    async fn body_stall_timeout_maps_to_verification_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Backend sends response headers, then never delivers the body.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n",
                )
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = RuntimeClient::new(format!("http://{addr}"), Duration::from_millis(250));
        let err = client.reload("m").await.unwrap_err();
        assert!(
            matches!(err, AdapterError::ReloadVerification { .. }),
            "expected verification error, got {err:?}"
        );
    }

    #[tokio::test]
    async fn refused_connection_maps_to_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RuntimeClient::new(format!("http://{addr}"), Duration::from_secs(1));
        let err = client.reload("m").await.unwrap_err();
        assert!(matches!(err, AdapterError::ReloadTransport { .. }));
    }

    #[test]
    fn status_report_parses_backend_shape() {
        let raw = r#"{
            "onnx-mnist": { "modelVersionStatus": [ { "state": "AVAILABLE", "version": "1" } ] },
            "retired": { "modelVersionStatus": [ { "state": "END" } ] }
        }"#;
        let report: StatusReport = serde_json::from_str(raw).unwrap();
        assert!(RuntimeClient::verify_loaded(&report, "onnx-mnist").is_ok());
        assert!(RuntimeClient::verify_unloaded(&report, "retired").is_ok());
    }
}
