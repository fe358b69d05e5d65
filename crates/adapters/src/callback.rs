// SPDX-License-Identifier: MIT

//! Upstream-callback client: announces `PROCESSING`, then reports `DONE`
//! with artifacts attached. A transient upstream outage must never abort
//! the queue manager — callers are expected to log and swallow
//! [`CallbackError`], never propagate it past the job pipeline.

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to read artifact {path}: {source}")]
    ReadArtifact {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
struct Artifact {
    name: String,
    contents: String,
}

#[derive(Debug, Serialize)]
struct DonePayload {
    bundle: String,
    status: &'static str,
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Serialize)]
struct ProcessingPayload {
    bundle: String,
    status: &'static str,
}

/// The upstream-facing reporting interface used to announce a job's status.
#[async_trait]
pub trait CallbackClient: Send + Sync {
    /// Announce that a bundle has begun processing (no artifacts attached).
    async fn announce_processing(&self, bundle_name: &str) -> Result<(), CallbackError>;

    /// Report that a bundle finished processing, attaching every `*.vmr`
    /// artifact produced under its unpack directory.
    async fn report_done(&self, bundle_name: &str, vmr_files: &[&Path]) -> Result<(), CallbackError>;
}

/// Production callback client: posts JSON to the upstream submission
/// service's callback endpoint.
pub struct HttpCallbackClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCallbackClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn status_url(&self, bundle_name: &str) -> String {
        format!("{}/jobs/{}/status", self.base_url.trim_end_matches('/'), bundle_name)
    }
}

#[async_trait]
impl CallbackClient for HttpCallbackClient {
    async fn announce_processing(&self, bundle_name: &str) -> Result<(), CallbackError> {
        let payload = ProcessingPayload {
            bundle: bundle_name.to_string(),
            status: "PROCESSING",
        };
        self.client
            .post(self.status_url(bundle_name))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn report_done(&self, bundle_name: &str, vmr_files: &[&Path]) -> Result<(), CallbackError> {
        let mut artifacts = Vec::with_capacity(vmr_files.len());
        for path in vmr_files {
            let contents =
                std::fs::read_to_string(path).map_err(|source| CallbackError::ReadArtifact {
                    path: path.to_path_buf(),
                    source,
                })?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            artifacts.push(Artifact { name, contents });
        }
        let payload = DonePayload {
            bundle: bundle_name.to_string(),
            status: "DONE",
            artifacts,
        };
        self.client
            .post(self.status_url(bundle_name))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub enum RecordedCallback {
        Processing { bundle: String },
        Done { bundle: String, artifacts: Vec<PathBuf> },
    }

    /// In-memory callback client for tests: records every call and never
    /// fails (a separate constructor lets tests simulate an upstream
    /// outage).
    #[derive(Clone, Default)]
    pub struct FakeCallbackClient {
        calls: Arc<Mutex<Vec<RecordedCallback>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl FakeCallbackClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Build a client whose calls always fail, to exercise the
        /// "callback failure does not abort the queue manager" policy.
        pub fn always_failing() -> Self {
            let client = Self::default();
            *client.fail.lock() = true;
            client
        }

        pub fn calls(&self) -> Vec<RecordedCallback> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl CallbackClient for FakeCallbackClient {
        async fn announce_processing(&self, bundle_name: &str) -> Result<(), CallbackError> {
            self.calls.lock().push(RecordedCallback::Processing {
                bundle: bundle_name.to_string(),
            });
            if *self.fail.lock() {
                return Err(CallbackError::ReadArtifact {
                    path: PathBuf::from("simulated-outage"),
                    source: std::io::Error::other("simulated upstream outage"),
                });
            }
            Ok(())
        }

        async fn report_done(
            &self,
            bundle_name: &str,
            vmr_files: &[&Path],
        ) -> Result<(), CallbackError> {
            self.calls.lock().push(RecordedCallback::Done {
                bundle: bundle_name.to_string(),
                artifacts: vmr_files.iter().map(|p| p.to_path_buf()).collect(),
            });
            if *self.fail.lock() {
                return Err(CallbackError::ReadArtifact {
                    path: PathBuf::from("simulated-outage"),
                    source: std::io::Error::other("simulated upstream outage"),
                });
            }
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeCallbackClient, RecordedCallback};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_client_records_processing_then_done() {
        let client = FakeCallbackClient::new();
        client.announce_processing("sub1.zip").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let vmr = dir.path().join("grade.vmr");
        std::fs::write(&vmr, "done").unwrap();
        client.report_done("sub1.zip", &[vmr.as_path()]).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], RecordedCallback::Processing { bundle } if bundle == "sub1.zip"));
        assert!(matches!(&calls[1], RecordedCallback::Done { bundle, .. } if bundle == "sub1.zip"));
    }

    #[tokio::test]
    async fn always_failing_client_returns_error_but_records_the_call() {
        let client = FakeCallbackClient::always_failing();
        let result = client.announce_processing("sub1.zip").await;
        assert!(result.is_err());
        assert_eq!(client.calls().len(), 1);
    }
}
