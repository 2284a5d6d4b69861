//! Prow-style job records as served by `/jobs`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// periodic, postsubmit, presubmit or batch
    #[serde(rename = "type", default)]
    pub job_type: String,
    #[serde(default)]
    pub job: String,
    /// Build farm that ran the job; empty when unattributed
    #[serde(default)]
    pub cluster: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Absent while the job is still running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    /// Job detail page
    #[serde(default)]
    pub url: String,
    #[serde(rename = "build_id", default)]
    pub build_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub metadata: JobMetadata,
    #[serde(default)]
    pub spec: JobSpec,
    #[serde(default)]
    pub status: JobStatus,
}

/// Wire shape of a job listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobList {
    #[serde(default)]
    pub items: Vec<Job>,
}

/// Incomplete jobs first, then completed jobs newest first
fn by_completion(a: &Job, b: &Job) -> Ordering {
    match (a.status.completion_time, b.status.completion_time) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => b.cmp(&a),
    }
}

/// Sort for display. The sort is stable: jobs with equal completion times
/// keep their listing order.
pub fn sort_jobs(jobs: &mut [Job]) {
    jobs.sort_by(by_completion);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(name: &str, completed: Option<i64>) -> Job {
        Job {
            metadata: JobMetadata { name: name.into() },
            status: JobStatus {
                completion_time: completed.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn names(jobs: &[Job]) -> Vec<&str> {
        jobs.iter().map(|j| j.metadata.name.as_str()).collect()
    }

    #[test]
    fn test_running_first_then_newest() {
        let mut jobs = vec![
            job("zero-a", None),
            job("t1", Some(1_000)),
            job("zero-b", None),
            job("t2", Some(2_000)),
        ];
        sort_jobs(&mut jobs);
        assert_eq!(names(&jobs), vec!["zero-a", "zero-b", "t2", "t1"]);
    }

    #[test]
    fn test_equal_completion_keeps_listing_order() {
        let mut jobs = vec![job("a", Some(5)), job("b", Some(9)), job("c", Some(5))];
        sort_jobs(&mut jobs);
        assert_eq!(names(&jobs), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_wire_format() {
        let raw = r#"{"items":[{
            "metadata":{"name":"abc"},
            "spec":{"type":"periodic","job":"periodic-ci-e2e","cluster":"build01"},
            "status":{"state":"success","startTime":"2024-01-01T00:00:00Z",
                      "completionTime":"2024-01-01T01:00:00Z",
                      "url":"https://prow.example.com/view/gs/b/logs/periodic-ci-e2e/7",
                      "build_id":"7"}
        }]}"#;
        let list: JobList = serde_json::from_str(raw).unwrap();
        let first = &list.items[0];
        assert_eq!(first.spec.job_type, "periodic");
        assert_eq!(first.spec.cluster, "build01");
        assert_eq!(first.status.build_id, "7");
        assert!(first.status.completion_time.is_some());

        let running = serde_json::to_value(job("x", None)).unwrap();
        assert!(running["status"].get("completionTime").is_none());
    }
}
