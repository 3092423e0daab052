use crate::artifacts::{Artifact, ArtifactManifest, ArtifactRegistry, FetchedArtifact};
use crate::config::TrackingConfig;
use crate::error::ArtifactServiceError;
use crate::gateway::BlobStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Identity of a run within the tracking project
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub project: String,
    pub group: String,
    pub job_type: String,
}

impl From<&TrackingConfig> for RunSettings {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            project: config.project.clone(),
            group: config.group.clone(),
            job_type: config.job_type.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// What gets persisted at `<project>/runs/<id>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub project: String,
    pub group: String,
    pub job_type: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config: serde_json::Map<String, serde_json::Value>,
    pub used_artifacts: Vec<String>,
    pub logged_artifacts: Vec<String>,
    pub summary: serde_json::Value,
    pub error: Option<String>,
}

/// A tracked execution of the cleaning job
pub struct Run {
    record: RunRecord,
    store: Arc<dyn BlobStore>,
    registry: ArtifactRegistry,
}

impl Run {
    /// Start a run and persist its initial record
    #[instrument(skip(store, download_dir))]
    pub async fn init(
        store: Arc<dyn BlobStore>,
        settings: RunSettings,
        download_dir: impl Into<PathBuf>,
    ) -> Result<Self, ArtifactServiceError> {
        let record = RunRecord {
            id: Uuid::new_v4().to_string(),
            project: settings.project.clone(),
            group: settings.group,
            job_type: settings.job_type,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            config: serde_json::Map::new(),
            used_artifacts: Vec::new(),
            logged_artifacts: Vec::new(),
            summary: serde_json::Value::Null,
            error: None,
        };
        let registry = ArtifactRegistry::new(store.clone(), &settings.project, download_dir);
        let run = Self {
            record,
            store,
            registry,
        };
        run.save().await?;
        info!("Started run {} ({})", run.id(), run.record.job_type);
        Ok(run)
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    pub fn record_key(project: &str, id: &str) -> String {
        format!("{}/runs/{}.json", project, id)
    }

    /// Merge the fields of `config` into the run's recorded configuration
    pub fn update_config<T: Serialize>(&mut self, config: &T) -> Result<(), ArtifactServiceError> {
        match serde_json::to_value(config)? {
            serde_json::Value::Object(fields) => self.record.config.extend(fields),
            other => {
                self.record.config.insert("value".to_string(), other);
            }
        }
        Ok(())
    }

    pub fn set_summary<T: Serialize>(&mut self, summary: &T) -> Result<(), ArtifactServiceError> {
        self.record.summary = serde_json::to_value(summary)?;
        Ok(())
    }

    /// Download an artifact and record it as an input of this run
    pub async fn use_artifact(&mut self, reference: &str) -> Result<FetchedArtifact, ArtifactServiceError> {
        let fetched = self.registry.download(reference).await?;
        self.record
            .used_artifacts
            .push(fetched.manifest.qualified_name());
        Ok(fetched)
    }

    /// Publish an artifact produced by this run
    pub async fn log_artifact(&mut self, artifact: &Artifact) -> Result<ArtifactManifest, ArtifactServiceError> {
        let manifest = self.registry.publish(artifact, Some(self.record.id.as_str())).await?;
        self.record
            .logged_artifacts
            .push(manifest.qualified_name());
        Ok(manifest)
    }

    pub async fn finish(&mut self) -> Result<RunRecord, ArtifactServiceError> {
        self.close(RunStatus::Finished, None).await
    }

    /// Mark the run as failed. Also valid after a `finish` that could not be saved.
    pub async fn fail(&mut self, error: &str) -> Result<RunRecord, ArtifactServiceError> {
        self.close(RunStatus::Failed, Some(error.to_string())).await
    }

    async fn close(&mut self, status: RunStatus, error: Option<String>) -> Result<RunRecord, ArtifactServiceError> {
        self.record.status = status;
        self.record.finished_at = Some(Utc::now());
        self.record.error = error;
        self.save().await?;
        info!("Run {} {:?}", self.record.id, status);
        Ok(self.record.clone())
    }

    async fn save(&self) -> Result<(), ArtifactServiceError> {
        let key = Self::record_key(&self.record.project, &self.record.id);
        self.store
            .put(&key, &serde_json::to_vec_pretty(&self.record)?)
            .await?;
        debug!("Saved run record {}", key);
        Ok(())
    }
}

/// Load a persisted run record
pub async fn load_record(
    store: &dyn BlobStore,
    project: &str,
    id: &str,
) -> Result<RunRecord, ArtifactServiceError> {
    let key = Run::record_key(project, id);
    let bytes = store
        .get(&key)
        .await?
        .ok_or_else(|| ArtifactServiceError::NotFound(key.clone()))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::FsBlobStore;

    fn settings() -> RunSettings {
        RunSettings {
            project: "nyc_airbnb".to_string(),
            group: "basic_cleaning".to_string(),
            job_type: "basic_cleaning".to_string(),
        }
    }

    #[tokio::test]
    async fn test_run_record_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(dir.path().join("store")));

        let mut run = Run::init(store.clone(), settings(), dir.path().join("dl")).await.unwrap();
        let id = run.id().to_string();

        let started = load_record(store.as_ref(), "nyc_airbnb", &id).await.unwrap();
        assert_eq!(started.status, RunStatus::Running);
        assert!(started.finished_at.is_none());

        run.update_config(&serde_json::json!({ "min_price": 10.0, "max_price": 350.0 }))
            .unwrap();
        run.set_summary(&serde_json::json!({ "rows_out": 3 })).unwrap();
        let record = run.finish().await.unwrap();
        assert_eq!(record.status, RunStatus::Finished);

        let stored = load_record(store.as_ref(), "nyc_airbnb", &id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Finished);
        assert_eq!(stored.config["max_price"], serde_json::json!(350.0));
        assert_eq!(stored.summary["rows_out"], 3);
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_run_keeps_error() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(dir.path()));

        let mut run = Run::init(store.clone(), settings(), dir.path().join("dl")).await.unwrap();
        let record = run.fail("Missing required column: price").await.unwrap();

        let stored = load_record(store.as_ref(), "nyc_airbnb", &record.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("Missing required column: price"));
    }
}
