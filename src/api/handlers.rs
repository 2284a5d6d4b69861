use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::jobs::{JobList, JobsError};
use crate::metrics;
use crate::search::duration::format_duration;
use crate::search::{OrderedResponse, RawParams, SearchMode, SearchQuery, SearchResponse};
use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Set on responses whose scan stopped at the byte budget
pub const TRUNCATED_HEADER: &str = "x-search-truncated";

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        jobs_refreshed_at: state
            .jobs
            .as_ref()
            .and_then(|jobs| jobs.refreshed_at())
            .map(|at| at.to_rfc3339()),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs_refreshed_at: Option<String>,
}

/// Prometheus metrics endpoint
///
/// Returns metrics in Prometheus text exposition format
pub async fn metrics() -> (StatusCode, String) {
    (StatusCode::OK, crate::metrics::gather_metrics())
}

/// How a finished scan is rendered
#[derive(Debug, Clone, Copy)]
enum Rendering {
    /// URL → pattern → matches, filtered again by farm
    Legacy,
    /// pattern → matches tagged with their URL
    ByPattern,
    /// Bugs, issues and jobs in first-seen order
    Grouped,
}

/// v1 search: matches keyed by URL
pub async fn search(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Result<Response> {
    execute(&state, "search", SearchMode::Text, Rendering::Legacy, raw).await
}

/// v2 search: matches keyed by pattern
pub async fn search_v2(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Result<Response> {
    execute(&state, "search_v2", SearchMode::Text, Rendering::ByPattern, raw).await
}

/// Grouped search: bugs, issues and jobs
pub async fn search_grouped(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Response> {
    execute(&state, "search_grouped", SearchMode::Text, Rendering::Grouped, raw).await
}

/// Chart view: grouped search with the diagnostic defaults
pub async fn chart(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Result<Response> {
    execute(&state, "chart", SearchMode::Chart, Rendering::Grouped, raw).await
}

fn outcome(result: &Result<Response>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(AppError::Validation(_) | AppError::MissingSearch) => "invalid",
        Err(AppError::Cancelled) => "cancelled",
        Err(AppError::Timeout(_)) => "timeout",
        Err(_) => "error",
    }
}

async fn execute(
    state: &AppState,
    endpoint: &'static str,
    mode: SearchMode,
    rendering: Rendering,
    raw: Option<String>,
) -> Result<Response> {
    let start = Instant::now();
    let params = RawParams::from_query(raw.as_deref().unwrap_or_default());

    let parsed = state
        .search
        .parse_query(&params, mode)
        .map_err(AppError::from)
        .and_then(|query| {
            if query.patterns().is_empty() {
                Err(AppError::MissingSearch)
            } else {
                Ok(query)
            }
        });

    let (shown, result) = match parsed {
        Ok(query) => {
            let result = run_with_deadline(state, &query, rendering).await;
            (query.to_string(), result)
        }
        Err(err) => (raw.unwrap_or_default(), Err(err)),
    };

    let elapsed = start.elapsed();
    let outcome = outcome(&result);
    metrics::record_search(endpoint, outcome, elapsed.as_secs_f64());
    tracing::info!(
        endpoint,
        query = %shown,
        duration_ms = elapsed.as_millis() as u64,
        success = result.is_ok(),
        outcome,
        "Render search"
    );
    result
}

/// Run one search under the server deadline. Dropping the returned future
/// (the client went away) cancels the scan.
async fn run_with_deadline(
    state: &AppState,
    query: &SearchQuery,
    rendering: Rendering,
) -> Result<Response> {
    let cancel = state.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match tokio::time::timeout(state.request_timeout, render(state, &cancel, query, rendering))
        .await
    {
        Ok(result) => result,
        Err(_) => {
            cancel.cancel();
            Err(AppError::Timeout(format!(
                "search did not finish within {}",
                format_duration(state.request_timeout)
            )))
        }
    }
}

async fn render(
    state: &AppState,
    cancel: &CancellationToken,
    query: &SearchQuery,
    rendering: Rendering,
) -> Result<Response> {
    match rendering {
        Rendering::Legacy => {
            let (results, summary) = state.search.search_by_url_filtered(cancel, query).await?;
            json_response(&results, summary.truncated)
        }
        Rendering::ByPattern => {
            let (results, summary) = state.search.search_by_url(cancel, query).await?;
            json_response(&SearchResponse::from_url_results(results), summary.truncated)
        }
        Rendering::Grouped => {
            let (result, summary) = state.search.search_ordered(cancel, query).await?;
            let body = OrderedResponse {
                query: query.to_query_string(),
                result,
            };
            json_response(&body, summary.truncated)
        }
    }
}

fn json_response<T: Serialize>(body: &T, truncated: bool) -> Result<Response> {
    let data = serde_json::to_vec(body)?;
    let mut response = (
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        data,
    )
        .into_response();
    if truncated {
        response
            .headers_mut()
            .insert(TRUNCATED_HEADER, HeaderValue::from_static("true"));
    }
    Ok(response)
}

/// Job listing, filtered by `buildFarm` and sorted for display
pub async fn list_jobs(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Result<Response> {
    let start = Instant::now();
    let result = render_jobs(&state, raw.as_deref().unwrap_or_default());
    let elapsed = start.elapsed();

    metrics::record_search("jobs", outcome(&result), elapsed.as_secs_f64());
    tracing::info!(
        duration_ms = elapsed.as_millis() as u64,
        success = result.is_ok(),
        "Render jobs"
    );
    result
}

fn render_jobs(state: &AppState, raw: &str) -> Result<Response> {
    let query = state
        .search
        .parse_query(&RawParams::from_query(raw), SearchMode::Text)?;
    let jobs = state.jobs.as_ref().ok_or(JobsError::Unconfigured)?;
    let items = jobs.list(query.build_farm())?;
    json_response(&JobList { items }, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome(&Err(AppError::MissingSearch)), "invalid");
        assert_eq!(outcome(&Err(AppError::Cancelled)), "cancelled");
        assert_eq!(outcome(&Err(AppError::Timeout("x".into()))), "timeout");
        assert_eq!(outcome(&Err(AppError::Scan("x".into()))), "error");
        assert_eq!(outcome(&Ok(StatusCode::OK.into_response())), "success");
    }

    #[test]
    fn test_truncated_header() {
        let response = json_response(&serde_json::json!({}), true).unwrap();
        assert_eq!(response.headers()[TRUNCATED_HEADER], "true");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let response = json_response(&serde_json::json!({}), false).unwrap();
        assert!(response.headers().get(TRUNCATED_HEADER).is_none());
    }
}
