//! End-to-end tests of the HTTP surface over an in-memory corpus

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use ci_search::api::{build_router, handlers::TRUNCATED_HEADER, AppState};
use ci_search::jobs::{Job, JobIndex, JobMetadata, JobSpec, JobStatus, StaticJobSource};
use ci_search::search::{
    FarmLookup, LayoutResolver, MemoryArtifactSource, ScanEngine, SearchService, StaticFarmLookup,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const JOB_PREFIX: &str = "https://prow.example.com/view/";
const BUILD_LOG_URL: &str = "https://prow.example.com/view/logs/periodic-e2e/11";
const JUNIT_URL: &str = "https://prow.example.com/view/pr-logs/pull/org_repo/7/pull-unit/3";

fn corpus() -> MemoryArtifactSource {
    MemoryArtifactSource::new()
        .with_artifact(
            "logs/periodic-e2e/11/build-log.txt",
            "starting\nerror: disk full\nretrying\n",
        )
        .with_artifact(
            "pr-logs/pull/org_repo/7/pull-unit/3/junit.failures",
            "TestMount failed: error: timeout\n",
        )
        .with_artifact("bugs/1001", "Reported: error: disk full on nodes\n")
        .with_artifact("issues/OCPBUGS-42", "error: timeout while mounting\n")
}

fn service(source: MemoryArtifactSource, farms: Arc<dyn FarmLookup>) -> Arc<SearchService> {
    Arc::new(SearchService::new(
        ScanEngine::new(Arc::new(source), 2, 4),
        Arc::new(LayoutResolver::new(
            JOB_PREFIX,
            "https://bugs.example.com/show_bug.cgi?id=",
            "https://issues.example.com/browse/",
        )),
        farms,
        Duration::from_secs(14 * 24 * 3600),
    ))
}

fn app(source: MemoryArtifactSource) -> Router {
    let state = AppState::new(
        service(source, Arc::new(StaticFarmLookup::default())),
        Duration::from_secs(30),
    );
    build_router(state)
}

fn job(name: &str, cluster: &str, url: &str, completed: Option<i64>) -> Job {
    Job {
        metadata: JobMetadata {
            name: name.to_string(),
        },
        spec: JobSpec {
            job_type: "periodic".to_string(),
            job: name.to_string(),
            cluster: cluster.to_string(),
        },
        status: JobStatus {
            state: if completed.is_some() { "success" } else { "pending" }.to_string(),
            start_time: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
            completion_time: completed.map(|secs| Utc.timestamp_opt(secs, 0).unwrap()),
            url: url.to_string(),
            build_id: "1".to_string(),
        },
    }
}

/// Router whose farm attribution comes from a loaded job index
async fn app_with_jobs(source: MemoryArtifactSource, jobs: Vec<Job>) -> Router {
    let index = Arc::new(JobIndex::new(Arc::new(StaticJobSource::new(jobs))));
    index.refresh().await.unwrap();
    let state = AppState::new(service(source, index.clone()), Duration::from_secs(30))
        .with_jobs(index);
    build_router(state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, headers, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (status, _, body) = get(app(corpus()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body.get("jobs_refreshed_at").is_none());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let response = app(corpus())
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_search_is_rejected() {
    for uri in ["/search", "/v2/search?maxAge=1h", "/v2/search/grouped?type=bug"] {
        let (status, _, body) = get(app(corpus()), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "MISSING_PARAMETER");
    }
}

#[tokio::test]
async fn test_invalid_parameters_are_rejected() {
    let cases = [
        "/search?search=error&maxMatches=501",
        "/search?search=error&maxBytes=abc",
        "/search?search=error&context=20",
        "/search?search=error&type=everything",
        "/search?search=error&maxAge=soon",
        "/v2/search?search=error&excludeName=(",
    ];
    for uri in cases {
        let (status, _, body) = get(app(corpus()), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["status"], 400);
    }
}

#[tokio::test]
async fn test_exclude_name_error_names_its_field() {
    let (_, _, body) = get(app(corpus()), "/search?search=error&excludeName=(").await;
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("excludeName"), "{message}");
}

#[tokio::test]
async fn test_v1_search_keys_by_url() {
    let (status, headers, body) = get(app(corpus()), "/search?search=disk%20full&type=all").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(TRUNCATED_HEADER).is_none());

    let results = body.as_object().unwrap();
    assert_eq!(results.len(), 2);

    let log = &body[BUILD_LOG_URL]["disk full"][0];
    assert_eq!(log["fileType"], "build-log");
    assert_eq!(log["name"], "periodic-e2e");
    assert_eq!(log["moreLines"], 0);
    assert!(log["context"][0]
        .as_str()
        .unwrap()
        .contains("error: disk full"));
    assert!(log.get("url").is_none());

    let bug = &body["https://bugs.example.com/show_bug.cgi?id=1001"]["disk full"][0];
    assert_eq!(bug["fileType"], "bug");
    assert_eq!(bug["bug"]["number"], 1001);
}

#[tokio::test]
async fn test_default_type_skips_build_logs() {
    let (status, _, body) = get(app(corpus()), "/search?search=error").await;
    assert_eq!(status, StatusCode::OK);
    let results = body.as_object().unwrap();
    assert!(!results.contains_key(BUILD_LOG_URL));
    assert!(results.contains_key(JUNIT_URL));
}

#[tokio::test]
async fn test_v2_search_keys_by_pattern() {
    let (status, _, body) = get(
        app(corpus()),
        "/v2/search?search=timeout&search=disk%20full&type=all",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let timeout = body["results"]["timeout"]["matches"].as_array().unwrap();
    assert_eq!(timeout.len(), 2);
    let urls: Vec<&str> = timeout.iter().map(|m| m["url"].as_str().unwrap()).collect();
    assert!(urls.contains(&JUNIT_URL));
    assert!(urls.contains(&"https://issues.example.com/browse/OCPBUGS-42"));

    let disk = body["results"]["disk full"]["matches"].as_array().unwrap();
    assert_eq!(disk.len(), 2);
}

#[tokio::test]
async fn test_name_filter_spares_tracker_records() {
    let (status, _, body) = get(app(corpus()), "/search?search=error&type=all&name=%5Eperiodic-").await;
    assert_eq!(status, StatusCode::OK);
    let results = body.as_object().unwrap();
    assert!(results.contains_key(BUILD_LOG_URL));
    assert!(!results.contains_key(JUNIT_URL));
    assert!(results.contains_key("https://bugs.example.com/show_bug.cgi?id=1001"));
    assert!(results.contains_key("https://issues.example.com/browse/OCPBUGS-42"));
}

#[tokio::test]
async fn test_grouped_search_shape() {
    let source = corpus().with_artifact(
        "logs/periodic-e2e/12/build-log.txt",
        "error: disk full again\n",
    );
    let (status, _, body) = get(app(source), "/v2/search/grouped?search=disk%20full&type=all").await;
    assert_eq!(status, StatusCode::OK);

    assert!(body["Query"].as_str().unwrap().contains("search=disk"));
    assert_eq!(body["Matches"], 3);

    let bugs = body["Bugs"].as_array().unwrap();
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0]["Number"], 1001);

    let jobs = body["Jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["Name"], "periodic-e2e");
    assert_eq!(jobs[0]["Trigger"], "build");
    let runs: Vec<u64> = jobs[0]["Instances"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["Number"].as_u64().unwrap())
        .collect();
    assert_eq!(runs.len(), 2);
    assert!(runs.contains(&11) && runs.contains(&12));

    let names = body["JobNames"].as_array().unwrap();
    assert!(names
        .iter()
        .any(|n| n == "logs/periodic-e2e/11/build-log.txt"));
}

#[tokio::test]
async fn test_chart_uses_default_patterns() {
    let source = MemoryArtifactSource::new().with_artifact(
        "logs/periodic-e2e/11/build-log.txt",
        "nothing interesting here\n",
    );
    let (status, _, body) = get(app(source), "/chart").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Matches"], 0);
    assert!(body["Jobs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_truncated_header_on_exhausted_budget() {
    let mut source = MemoryArtifactSource::new();
    for run in 0..20 {
        source = source.with_artifact(
            &format!("logs/periodic-e2e/{run}/build-log.txt"),
            &format!("error: {}\n", "x".repeat(200)),
        );
    }
    let (status, headers, _) = get(app(source), "/search?search=error&type=all&maxBytes=300&context=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[TRUNCATED_HEADER], "true");
}

#[tokio::test]
async fn test_slow_search_times_out() {
    let source = corpus().with_read_delay(Duration::from_secs(5));
    let state = AppState::new(
        service(source, Arc::new(StaticFarmLookup::default())),
        Duration::from_millis(50),
    );
    let (status, _, body) = get(build_router(state), "/search?search=error").await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body["error"]["code"], "TIMEOUT");
}

#[tokio::test]
async fn test_jobs_unconfigured() {
    let (status, _, body) = get(app(corpus()), "/jobs").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["error"]["message"],
        "Unable to serve jobs data because no prow data source was configured."
    );
}

#[tokio::test]
async fn test_jobs_sorted_and_filtered_by_farm() {
    let jobs = vec![
        job("a", "build01", "https://prow.example.com/view/logs/a/1", Some(1_700_000_100)),
        job("b", "build02", "https://prow.example.com/view/logs/b/1", None),
        job("c", "build01", "https://prow.example.com/view/logs/c/1", Some(1_700_000_900)),
        job("d", "build01", "https://prow.example.com/view/logs/d/1", None),
        job("e", "", "https://prow.example.com/view/logs/e/1", None),
    ];

    let (status, _, body) = get(app_with_jobs(corpus(), jobs.clone()).await, "/jobs").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["metadata"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["b", "d", "e", "c", "a"]);

    let (_, _, body) = get(app_with_jobs(corpus(), jobs.clone()).await, "/jobs?buildFarm=build01").await;
    let names: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["metadata"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["d", "c", "a"]);

    let (_, _, body) = get(app_with_jobs(corpus(), jobs).await, "/jobs?buildFarm=unknown").await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["metadata"]["name"], "e");
}

#[tokio::test]
async fn test_search_restricted_to_build_farm() {
    let jobs = vec![
        job("periodic-e2e", "build01", BUILD_LOG_URL, Some(1_700_000_100)),
        job("pull-unit", "build02", JUNIT_URL, Some(1_700_000_200)),
    ];
    let (status, _, body) = get(
        app_with_jobs(corpus(), jobs.clone()).await,
        "/search?search=error&type=all&buildFarm=build01",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results = body.as_object().unwrap();
    assert_eq!(results.len(), 1);
    assert!(results.contains_key(BUILD_LOG_URL));

    let (_, _, body) = get(
        app_with_jobs(corpus(), jobs).await,
        "/v2/search/grouped?search=error&type=all&buildFarm=build02",
    )
    .await;
    let jobs = body["Jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["Name"], "pull-unit");
}

#[tokio::test]
async fn test_search_during_shutdown_is_cancelled() {
    let shutdown = CancellationToken::new();
    let state = AppState::new(
        service(corpus(), Arc::new(StaticFarmLookup::default())),
        Duration::from_secs(30),
    )
    .with_shutdown(shutdown.clone());
    shutdown.cancel();

    for uri in ["/search?search=error", "/v2/search/grouped?search=error"] {
        let (status, _, body) = get(build_router(state.clone()), uri).await;
        assert_eq!(status.as_u16(), 499, "{uri}");
        assert!(!status.is_server_error());
        assert_eq!(body["error"]["code"], "SEARCH_CANCELLED");
    }
}
