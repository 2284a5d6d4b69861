//! Job listing: the `/jobs` endpoint's data and the URL → farm attribution
//! used when filtering search results by build farm.

mod index;
mod model;
mod source;

pub use index::JobIndex;
pub use model::{sort_jobs, Job, JobList, JobMetadata, JobSpec, JobStatus};
pub use source::{FileJobSource, JobLister, StaticJobSource};

use crate::error::AppError;

pub type JobsResult<T> = std::result::Result<T, JobsError>;

#[derive(Debug, thiserror::Error)]
pub enum JobsError {
    #[error("Unable to serve jobs data because no prow data source was configured.")]
    Unconfigured,

    #[error("job list has not been loaded yet")]
    NotLoaded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid job list: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<JobsError> for AppError {
    fn from(err: JobsError) -> Self {
        match err {
            JobsError::Unconfigured => AppError::UpstreamUnavailable(err.to_string()),
            other => AppError::UpstreamUnavailable(format!("Failed to load jobs: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_jobs_errors_are_server_errors() {
        let unconfigured = AppError::from(JobsError::Unconfigured);
        assert_eq!(unconfigured.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            unconfigured.to_string(),
            "Unable to serve jobs data because no prow data source was configured."
        );

        let not_loaded = AppError::from(JobsError::NotLoaded);
        assert!(not_loaded.to_string().starts_with("Failed to load jobs"));
    }
}
