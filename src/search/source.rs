//! Candidate artifacts for a scan and access to their content

use crate::search::error::{SearchError, SearchResult};
use crate::search::metadata::{classify, FileKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One scannable unit of the corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// `/`-separated name relative to the corpus root
    pub name: String,
    pub kind: FileKind,
    pub last_modified: DateTime<Utc>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, kind: FileKind, last_modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            kind,
            last_modified,
        }
    }

    /// Tracker records stay searchable regardless of age
    pub fn ignores_age(&self) -> bool {
        self.kind.is_tracker_record()
    }
}

/// Enumerates artifacts and reads their content
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Every artifact currently in the corpus
    async fn list(&self) -> SearchResult<Vec<Artifact>>;

    /// Full text of one artifact; invalid UTF-8 is replaced
    async fn read(&self, artifact: &Artifact) -> SearchResult<String>;
}

/// Corpus stored as files under a root directory
#[derive(Debug, Clone)]
pub struct FsArtifactSource {
    root: PathBuf,
}

impl FsArtifactSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn walk(root: &Path) -> SearchResult<Vec<Artifact>> {
        if !root.is_dir() {
            return Err(SearchError::Source(format!(
                "artifact root {} is not a directory",
                root.display()
            )));
        }

        let mut artifacts = Vec::new();
        for entry in walkdir::WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unreadable corpus entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let Some(kind) = classify(&name) else {
                tracing::trace!(name = %name, "Ignoring file outside the corpus layout");
                continue;
            };
            let last_modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(Utc::now);
            artifacts.push(Artifact::new(name, kind, last_modified));
        }

        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(artifacts)
    }
}

#[async_trait]
impl ArtifactSource for FsArtifactSource {
    async fn list(&self) -> SearchResult<Vec<Artifact>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || Self::walk(&root)).await?
    }

    async fn read(&self, artifact: &Artifact) -> SearchResult<String> {
        let bytes = tokio::fs::read(self.root.join(&artifact.name)).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Corpus held in memory, in insertion order
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactSource {
    artifacts: Vec<(Artifact, String)>,
    read_delay: Option<Duration>,
}

impl MemoryArtifactSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact modified now; its kind follows the corpus layout,
    /// falling back to a build log
    pub fn with_artifact(self, name: &str, content: &str) -> Self {
        self.with_artifact_at(name, content, Utc::now())
    }

    pub fn with_artifact_at(
        mut self,
        name: &str,
        content: &str,
        last_modified: DateTime<Utc>,
    ) -> Self {
        let kind = classify(name).unwrap_or(FileKind::BuildLog);
        self.artifacts.push((
            Artifact::new(name, kind, last_modified),
            content.to_string(),
        ));
        self
    }

    /// Delay every read, to simulate slow storage
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }
}

#[async_trait]
impl ArtifactSource for MemoryArtifactSource {
    async fn list(&self) -> SearchResult<Vec<Artifact>> {
        Ok(self.artifacts.iter().map(|(a, _)| a.clone()).collect())
    }

    async fn read(&self, artifact: &Artifact) -> SearchResult<String> {
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        self.artifacts
            .iter()
            .find(|(a, _)| a.name == artifact.name)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| SearchError::Source(format!("artifact {} not found", artifact.name)))
    }
}
