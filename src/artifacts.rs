//! Versioned artifacts on top of a [`BlobStore`].
//!
//! Layout under the store:
//!
//! ```text
//! <project>/artifacts/<name>/latest.json          {"version": N}
//! <project>/artifacts/<name>/v<N>/manifest.json
//! <project>/artifacts/<name>/v<N>/files/<file>
//! ```

use crate::error::ArtifactServiceError;
use crate::gateway::{sha256_hex, BlobStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

type Result<T> = std::result::Result<T, ArtifactServiceError>;

/// Which version of an artifact a reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alias {
    Latest,
    Version(u32),
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alias::Latest => f.write_str("latest"),
            Alias::Version(v) => write!(f, "v{}", v),
        }
    }
}

/// A parsed `[entity/][project/]name[:alias]` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub project: Option<String>,
    pub name: String,
    pub alias: Alias,
}

impl FromStr for ArtifactRef {
    type Err = ArtifactServiceError;

    fn from_str(reference: &str) -> Result<Self> {
        let invalid = |reason: &str| ArtifactServiceError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let segments: Vec<&str> = reference.trim().split('/').collect();
        let (project, last) = match segments.as_slice() {
            [last] => (None, *last),
            [project, last] | [_, project, last] => (Some(project.to_string()), *last),
            _ => return Err(invalid("too many path segments")),
        };

        let (name, alias) = match last.split_once(':') {
            Some((name, alias)) => (name, parse_alias(alias).ok_or_else(|| invalid("unknown alias"))?),
            None => (last, Alias::Latest),
        };

        if !valid_segment(name) {
            return Err(invalid("empty or invalid name"));
        }
        if let Some(project) = &project {
            if !valid_segment(project) {
                return Err(invalid("empty or invalid project"));
            }
        }

        Ok(ArtifactRef {
            project,
            name: name.to_string(),
            alias,
        })
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(project) = &self.project {
            write!(f, "{}/", project)?;
        }
        write!(f, "{}:{}", self.name, self.alias)
    }
}

fn parse_alias(alias: &str) -> Option<Alias> {
    if alias == "latest" {
        return Some(Alias::Latest);
    }
    alias
        .strip_prefix('v')
        .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        .and_then(|n| n.parse().ok())
        .map(Alias::Version)
}

fn valid_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(':')
}

/// A name that stays inside the directory it is joined onto
fn safe_file_name(s: &str) -> bool {
    valid_segment(s) && !s.contains(['/', '\\'])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub name: String,
    pub size: u64,
    pub sha256: String,
}

/// Metadata stored next to every artifact version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub name: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub description: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub producer_run: Option<String>,
    pub files: Vec<ManifestFile>,
}

impl ArtifactManifest {
    /// `name:vN`
    pub fn qualified_name(&self) -> String {
        format!("{}:v{}", self.name, self.version)
    }

    fn same_content(&self, artifact_type: &str, files: &[ManifestFile]) -> bool {
        self.artifact_type == artifact_type && self.files == files
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LatestPointer {
    version: u32,
}

/// An artifact being assembled for publishing
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub artifact_type: String,
    pub description: String,
    files: Vec<PathBuf>,
}

impl Artifact {
    pub fn new(name: &str, artifact_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            artifact_type: artifact_type.to_string(),
            description: description.to_string(),
            files: Vec::new(),
        }
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// An artifact version downloaded to local disk
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub manifest: ArtifactManifest,
    pub dir: PathBuf,
}

impl FetchedArtifact {
    /// Path of the artifact's only file
    pub fn file(&self) -> Result<PathBuf> {
        match self.manifest.files.as_slice() {
            [only] => Ok(self.dir.join(&only.name)),
            files => Err(ArtifactServiceError::NotSingleFile {
                artifact: self.manifest.qualified_name(),
                count: files.len(),
            }),
        }
    }
}

/// Resolves, downloads and publishes artifacts of one project
pub struct ArtifactRegistry {
    store: Arc<dyn BlobStore>,
    project: String,
    download_dir: PathBuf,
}

impl ArtifactRegistry {
    pub fn new(store: Arc<dyn BlobStore>, project: &str, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            project: project.to_string(),
            download_dir: download_dir.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn artifact_key(project: &str, name: &str) -> String {
        format!("{}/artifacts/{}", project, name)
    }

    fn version_key(project: &str, name: &str, version: u32) -> String {
        format!("{}/v{}", Self::artifact_key(project, name), version)
    }

    async fn latest_version(&self, project: &str, name: &str) -> Result<Option<u32>> {
        let key = format!("{}/latest.json", Self::artifact_key(project, name));
        match self.store.get(&key).await? {
            Some(bytes) => {
                let pointer: LatestPointer = serde_json::from_slice(&bytes)?;
                Ok(Some(pointer.version))
            }
            None => Ok(None),
        }
    }

    async fn load_manifest(&self, project: &str, name: &str, version: u32) -> Result<Option<ArtifactManifest>> {
        let key = format!("{}/manifest.json", Self::version_key(project, name, version));
        match self.store.get(&key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Find the manifest a reference points at
    pub async fn resolve(&self, reference: &ArtifactRef) -> Result<ArtifactManifest> {
        let project = reference.project.as_deref().unwrap_or(&self.project);
        let not_found = || ArtifactServiceError::NotFound(reference.to_string());

        let version = match reference.alias {
            Alias::Version(v) => v,
            Alias::Latest => self
                .latest_version(project, &reference.name)
                .await?
                .ok_or_else(not_found)?,
        };

        self.load_manifest(project, &reference.name, version)
            .await?
            .ok_or_else(not_found)
    }

    /// Download every file of the referenced artifact, verifying digests
    pub async fn download(&self, reference: &str) -> Result<FetchedArtifact> {
        let parsed: ArtifactRef = reference.parse()?;
        let project = parsed.project.clone().unwrap_or_else(|| self.project.clone());
        let manifest = self.resolve(&parsed).await?;
        info!("Resolved {} to {}", reference, manifest.qualified_name());

        if !safe_file_name(&manifest.name) {
            return Err(ArtifactServiceError::InvalidReference {
                reference: parsed.to_string(),
                reason: format!("manifest carries unsafe name '{}'", manifest.name),
            });
        }
        let dir = self
            .download_dir
            .join(format!("{}-v{}", manifest.name, manifest.version));
        fs::create_dir_all(&dir).await?;

        let files_key = format!(
            "{}/files",
            Self::version_key(&project, &manifest.name, manifest.version)
        );
        for file in &manifest.files {
            if !safe_file_name(&file.name) {
                return Err(ArtifactServiceError::InvalidReference {
                    reference: manifest.qualified_name(),
                    reason: format!("manifest lists unsafe file name '{}'", file.name),
                });
            }
            let key = format!("{}/{}", files_key, file.name);
            let bytes = self
                .store
                .get(&key)
                .await?
                .ok_or_else(|| ArtifactServiceError::NotFound(key.clone()))?;

            let actual = sha256_hex(&bytes);
            if actual != file.sha256 {
                return Err(ArtifactServiceError::DigestMismatch {
                    file: file.name.clone(),
                    expected: file.sha256.clone(),
                    actual,
                });
            }
            fs::write(dir.join(&file.name), &bytes).await?;
            debug!("Downloaded {} ({} bytes)", file.name, bytes.len());
        }

        Ok(FetchedArtifact { manifest, dir })
    }

    /// Publish `artifact` as the next version of its name.
    ///
    /// When the newest version already holds identical files of the same
    /// type, that version is returned and nothing is written.
    pub async fn publish(&self, artifact: &Artifact, producer_run: Option<&str>) -> Result<ArtifactManifest> {
        let name = artifact.name.as_str();
        if !safe_file_name(name) {
            return Err(ArtifactServiceError::InvalidReference {
                reference: name.to_string(),
                reason: "empty or invalid name".to_string(),
            });
        }

        let mut contents = Vec::with_capacity(artifact.files().len());
        let mut entries: Vec<ManifestFile> = Vec::with_capacity(artifact.files().len());
        for path in artifact.files() {
            let file_name = file_name(path)?;
            if entries.iter().any(|e| e.name == file_name) {
                return Err(ArtifactServiceError::InvalidReference {
                    reference: name.to_string(),
                    reason: format!("duplicate file name '{}'", file_name),
                });
            }
            let bytes = fs::read(path).await?;
            entries.push(ManifestFile {
                name: file_name,
                size: bytes.len() as u64,
                sha256: sha256_hex(&bytes),
            });
            contents.push(bytes);
        }

        let latest = self.latest_version(&self.project, name).await?;
        if let Some(version) = latest {
            if let Some(existing) = self.load_manifest(&self.project, name, version).await? {
                if existing.same_content(&artifact.artifact_type, &entries) {
                    info!("{} is unchanged, not creating a new version", existing.qualified_name());
                    return Ok(existing);
                }
            }
        }

        let version = latest.map(|v| v + 1).unwrap_or(0);
        let version_key = Self::version_key(&self.project, name, version);
        for (entry, bytes) in entries.iter().zip(&contents) {
            self.store
                .put(&format!("{}/files/{}", version_key, entry.name), bytes)
                .await?;
        }

        let manifest = ArtifactManifest {
            name: name.to_string(),
            artifact_type: artifact.artifact_type.clone(),
            description: artifact.description.clone(),
            version,
            created_at: Utc::now(),
            producer_run: producer_run.map(str::to_string),
            files: entries,
        };
        self.store
            .put(
                &format!("{}/manifest.json", version_key),
                &serde_json::to_vec_pretty(&manifest)?,
            )
            .await?;

        // Moving the pointer last keeps `latest` on a complete version
        self.store
            .put(
                &format!("{}/latest.json", Self::artifact_key(&self.project, name)),
                &serde_json::to_vec(&LatestPointer { version })?,
            )
            .await?;

        info!(
            "Published {} to {}",
            manifest.qualified_name(),
            self.store.describe()
        );
        Ok(manifest)
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ArtifactServiceError::InvalidReference {
            reference: path.display().to_string(),
            reason: "file has no usable name".to_string(),
        })
}
