//! Where job listings come from

use super::model::{Job, JobList};
use super::JobsResult;
use async_trait::async_trait;
use std::path::PathBuf;

/// A source of the current job list
#[async_trait]
pub trait JobLister: Send + Sync {
    async fn list(&self) -> JobsResult<Vec<Job>>;
}

/// Job list read from a JSON document on disk, typically a periodically
/// synced dump of the CI system's job API
#[derive(Debug, Clone)]
pub struct FileJobSource {
    path: PathBuf,
}

impl FileJobSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl JobLister for FileJobSource {
    async fn list(&self) -> JobsResult<Vec<Job>> {
        let data = tokio::fs::read(&self.path).await?;
        let list: JobList = serde_json::from_slice(&data)?;
        Ok(list.items)
    }
}

/// Fixed job list
#[derive(Debug, Clone, Default)]
pub struct StaticJobSource {
    jobs: Vec<Job>,
}

impl StaticJobSource {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl JobLister for StaticJobSource {
    async fn list(&self) -> JobsResult<Vec<Job>> {
        Ok(self.jobs.clone())
    }
}
