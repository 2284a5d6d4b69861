//! Cached job list with periodic refresh

use super::model::{sort_jobs, Job};
use super::source::JobLister;
use super::{JobsError, JobsResult};
use crate::metrics;
use crate::search::farm::{retain_by_farm, FarmLookup, FarmSelector};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Snapshot {
    jobs: Arc<Vec<Job>>,
    /// Job URL → cluster, for URLs with a cluster
    farm_by_url: HashMap<String, String>,
    refreshed_at: Option<DateTime<Utc>>,
}

fn url_key(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// The most recent job list, shared by `/jobs` and the search farm filter
pub struct JobIndex {
    lister: Arc<dyn JobLister>,
    snapshot: RwLock<Snapshot>,
}

impl JobIndex {
    pub fn new(lister: Arc<dyn JobLister>) -> Self {
        Self {
            lister,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// Reload from the lister. On failure the previous list is kept.
    pub async fn refresh(&self) -> JobsResult<usize> {
        let jobs = match self.lister.list().await {
            Ok(jobs) => jobs,
            Err(err) => {
                metrics::JOBS_REFRESH_TOTAL.with_label_values(&["error"]).inc();
                return Err(err);
            }
        };

        let farm_by_url = jobs
            .iter()
            .filter(|job| !job.status.url.is_empty() && !job.spec.cluster.is_empty())
            .map(|job| (url_key(&job.status.url).to_string(), job.spec.cluster.clone()))
            .collect();
        let count = jobs.len();

        *self.snapshot.write() = Snapshot {
            jobs: Arc::new(jobs),
            farm_by_url,
            refreshed_at: Some(Utc::now()),
        };
        metrics::JOBS_REFRESH_TOTAL.with_label_values(&["success"]).inc();
        tracing::debug!(jobs = count, "Refreshed job list");
        Ok(count)
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().refreshed_at
    }

    /// Jobs run on the selected farm, incomplete first then newest first
    pub fn list(&self, selector: &FarmSelector) -> JobsResult<Vec<Job>> {
        let snapshot = self.snapshot.read();
        if snapshot.refreshed_at.is_none() {
            return Err(JobsError::NotLoaded);
        }
        let mut jobs = snapshot.jobs.as_ref().clone();
        drop(snapshot);

        retain_by_farm(&mut jobs, selector, |job| Some(job.spec.cluster.clone()));
        sort_jobs(&mut jobs);
        Ok(jobs)
    }

    /// Refresh every `every` until `cancel` fires
    pub fn start_refresh(self: Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately; the caller has already loaded once.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(err) = self.refresh().await {
                            tracing::warn!(error = %err, "Failed to refresh job list");
                        }
                    }
                }
            }
            tracing::debug!("Job refresh stopped");
        })
    }
}

impl FarmLookup for JobIndex {
    fn farm_for(&self, uri: &str) -> Option<String> {
        self.snapshot.read().farm_by_url.get(url_key(uri)).cloned()
    }
}
