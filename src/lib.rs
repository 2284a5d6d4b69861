//! Live regular-expression search over CI build logs, test results and the
//! bugs and issues linked to them.
//!
//! The HTTP surface lives in [`api`]; the query model, scan engine and
//! result aggregation in [`search`]; the job listing and build-farm
//! attribution in [`jobs`].

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod search;

pub use error::{AppError, Result};
