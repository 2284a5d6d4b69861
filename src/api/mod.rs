pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::jobs::JobIndex;
use crate::search::SearchService;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    /// Absent when no job source is configured
    pub jobs: Option<Arc<JobIndex>>,
    /// Deadline for a single search
    pub request_timeout: Duration,
    /// Fires on server shutdown; every search runs under a child of it
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(search: Arc<SearchService>, request_timeout: Duration) -> Self {
        Self {
            search,
            jobs: None,
            request_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the job index
    pub fn with_jobs(mut self, jobs: Arc<JobIndex>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
