//! Shared fixtures for router integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use civdl_axum::{AxumContext, CorsConfig, create_router};
use civdl_core::ports::{ArtifactRef, CatalogError, CatalogPort, ResolvedArtifact, SharedSettings};
use civdl_core::{DownloadMethod, DownloadResult, Settings, TaskId, TaskView};
use civdl_download::executor::{ProgressReporter, TransferJob, TransferOutcome};
use civdl_download::{QueueConfig, QueueManager, QueueManagerDeps, TransferExecutor};

/// Knows a single model, 4201, with versions 1 and 2.
pub struct FakeCatalog;

#[async_trait]
impl CatalogPort for FakeCatalog {
    async fn resolve(&self, artifact: ArtifactRef) -> Result<ResolvedArtifact, CatalogError> {
        if artifact.model_id != 4201 {
            return Err(CatalogError::ModelNotFound {
                model_id: artifact.model_id,
            });
        }
        let version_id = artifact.version_id.unwrap_or(2);
        if version_id > 2 {
            return Err(CatalogError::VersionNotFound {
                model_id: 4201,
                version_id,
            });
        }
        Ok(ResolvedArtifact {
            model_id: 4201,
            version_id,
            file_id: artifact.file_id.unwrap_or(7),
            model_name: "Dreamlike".to_string(),
            model_type: "Checkpoint".to_string(),
            filename: format!("dreamlike-v{version_id}.safetensors"),
            download_url: "http://127.0.0.1:1/api/download/models/7".to_string(),
            size_bytes: Some(100),
        })
    }
}

/// Reports 40 of 100 bytes, then holds until a permit is released.
pub struct HoldingExecutor {
    pub release: Arc<Semaphore>,
}

#[async_trait]
impl TransferExecutor for HoldingExecutor {
    fn method(&self) -> DownloadMethod {
        DownloadMethod::Direct
    }

    async fn start(
        &self,
        job: &TransferJob,
        progress: &ProgressReporter,
    ) -> DownloadResult<TransferOutcome> {
        progress.bytes(40, Some(100));
        let permit = self.release.acquire().await;
        drop(permit);
        progress.bytes(100, Some(100));
        Ok(TransferOutcome {
            path: job.plan.destination.final_path(),
            bytes: 100,
            already_present: false,
        })
    }

    async fn cancel(&self, _job: &TransferJob, _progress: &ProgressReporter) {}
}

/// A router over a real queue manager with fake collaborators.
pub struct TestApp {
    pub router: Router,
    pub manager: Arc<QueueManager>,
    pub release: Arc<Semaphore>,
    dir: tempfile::TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_capacity(2)
    }

    pub fn with_capacity(max_concurrent: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let release = Arc::new(Semaphore::new(0));

        let mut settings = Settings::with_defaults();
        settings.model_dir = dir.path().to_path_buf();
        settings.use_aria2 = false;
        let settings = Arc::new(SharedSettings::new(settings));

        let manager = QueueManager::init(QueueManagerDeps {
            catalog: Arc::new(FakeCatalog),
            settings: settings.clone(),
            direct: Arc::new(HoldingExecutor {
                release: Arc::clone(&release),
            }),
            delegated: None,
            config: QueueConfig::default()
                .with_max_concurrent(max_concurrent)
                .with_progress_interval(Duration::from_millis(10))
                .with_cancel_timeout(Duration::from_secs(2)),
        });

        let ctx = AxumContext {
            manager: Arc::clone(&manager),
            settings,
        };
        Self {
            router: create_router(ctx, &CorsConfig::AllowAll),
            manager,
            release,
            dir,
        }
    }

    pub fn model_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Send a request and decode the JSON body (`Null` when empty).
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Poll until `check` holds, failing after two seconds.
    pub async fn wait_for(&self, id: TaskId, check: impl Fn(&TaskView) -> bool) -> TaskView {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let view = self.manager.get(id).unwrap();
            if check(&view) {
                return view;
            }
            assert!(Instant::now() < deadline, "timed out, last state: {view:?}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub fn task_id(json: &Value) -> TaskId {
    json["id"].as_str().unwrap().parse().unwrap()
}
