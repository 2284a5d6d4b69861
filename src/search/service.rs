//! Search service: runs a scan and folds its events into a result shape

use crate::search::aggregate::{
    retain_urls_by_farm, OrderedFold, OrderedSearchResult, UrlFold, UrlResults,
};
use crate::search::engine::{ScanEngine, ScanSummary};
use crate::search::error::SearchResult;
use crate::search::farm::FarmLookup;
use crate::search::metadata::MetadataResolver;
use crate::search::query::{RawParams, SearchMode, SearchQuery};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Entry point shared by every search endpoint
pub struct SearchService {
    engine: ScanEngine,
    resolver: Arc<dyn MetadataResolver>,
    farms: Arc<dyn FarmLookup>,
    /// Ceiling applied to every request's `maxAge`
    max_age: Duration,
}

impl SearchService {
    pub fn new(
        engine: ScanEngine,
        resolver: Arc<dyn MetadataResolver>,
        farms: Arc<dyn FarmLookup>,
        max_age: Duration,
    ) -> Self {
        Self {
            engine,
            resolver,
            farms,
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn farms(&self) -> &dyn FarmLookup {
        self.farms.as_ref()
    }

    /// Validate request parameters against this server's age ceiling
    pub fn parse_query(&self, params: &RawParams, mode: SearchMode) -> SearchResult<SearchQuery> {
        SearchQuery::parse(params, mode, self.max_age)
    }

    /// Matches keyed by URL then pattern. URLs outside the selected farm are
    /// dropped while folding.
    pub async fn search_by_url(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> SearchResult<(UrlResults, ScanSummary)> {
        let mut fold = UrlFold::new(
            self.resolver.as_ref(),
            query.name_filter(),
            self.farms.as_ref(),
            query.build_farm(),
        );
        let summary = self
            .engine
            .scan(cancel, query, None, |event| {
                fold.fold(event);
                Ok(())
            })
            .await?;
        let results = fold.into_results();

        tracing::debug!(
            urls = results.len(),
            events = summary.events,
            truncated = summary.truncated,
            "Folded scan by URL"
        );
        Ok((results, summary))
    }

    /// Like [`search_by_url`](Self::search_by_url), then filtered again by
    /// farm: the legacy endpoint's rendering.
    pub async fn search_by_url_filtered(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> SearchResult<(UrlResults, ScanSummary)> {
        let (mut results, summary) = self.search_by_url(cancel, query).await?;
        retain_urls_by_farm(&mut results, self.farms.as_ref(), query.build_farm());
        Ok((results, summary))
    }

    /// Bugs, issues and jobs in first-seen order, with the names of every
    /// artifact visited
    pub async fn search_ordered(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> SearchResult<(OrderedSearchResult, ScanSummary)> {
        let mut fold = OrderedFold::new(self.resolver.as_ref(), query.name_filter());
        let mut names = BTreeSet::new();
        let summary = self
            .engine
            .scan(cancel, query, Some(&mut names), |event| {
                fold.fold(event);
                Ok(())
            })
            .await?;

        let mut result = fold.finish(names);
        result.retain_jobs_by_farm(self.farms.as_ref(), query.build_farm());

        tracing::debug!(
            matches = result.matches,
            jobs = result.jobs.len(),
            bugs = result.bugs.len(),
            issues = result.issues.len(),
            truncated = summary.truncated,
            "Folded scan in order"
        );
        Ok((result, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::farm::StaticFarmLookup;
    use crate::search::metadata::LayoutResolver;
    use crate::search::source::MemoryArtifactSource;

    const PREFIX: &str = "https://prow.example.com/view/";

    fn service(source: MemoryArtifactSource, farms: StaticFarmLookup) -> SearchService {
        SearchService::new(
            ScanEngine::new(Arc::new(source), 2, 4),
            Arc::new(LayoutResolver::new(
                PREFIX,
                "https://bugs.example.com/",
                "https://issues.example.com/",
            )),
            Arc::new(farms),
            Duration::from_secs(14 * 24 * 3600),
        )
    }

    fn corpus() -> MemoryArtifactSource {
        MemoryArtifactSource::new()
            .with_artifact("logs/job-a/1/build-log.txt", "ok\nfailed: (boom)\n")
            .with_artifact("logs/job-b/7/build-log.txt", "failed: (bang)\n")
            .with_artifact("logs/job-c/2/build-log.txt", "all good\n")
    }

    fn query(service: &SearchService, pairs: &[(&str, &str)]) -> SearchQuery {
        service
            .parse_query(&RawParams::from_pairs(pairs.iter().copied()), SearchMode::Text)
            .unwrap()
    }

    #[tokio::test]
    async fn test_search_by_url_groups_by_run() {
        let service = service(corpus(), StaticFarmLookup::default());
        let q = query(&service, &[("search", "failed"), ("type", "all")]);
        let (results, summary) = service
            .search_by_url(&CancellationToken::new(), &q)
            .await
            .unwrap();

        assert_eq!(summary.artifacts_scanned, 3);
        let mut urls: Vec<_> = results.keys().cloned().collect();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                format!("{PREFIX}logs/job-a/1"),
                format!("{PREFIX}logs/job-b/7")
            ]
        );
    }

    #[tokio::test]
    async fn test_legacy_rendering_filters_by_farm() {
        let farms: StaticFarmLookup = vec![(format!("{PREFIX}logs/job-b/7"), "build02".to_string())]
            .into_iter()
            .collect();
        let service = service(corpus(), farms);
        let q = query(
            &service,
            &[("search", "failed"), ("type", "all"), ("buildFarm", "unknown")],
        );
        let (results, _) = service
            .search_by_url_filtered(&CancellationToken::new(), &q)
            .await
            .unwrap();
        let urls: Vec<_> = results.keys().cloned().collect();
        assert_eq!(urls, vec![format!("{PREFIX}logs/job-a/1")]);
    }

    #[tokio::test]
    async fn test_search_ordered_reports_every_scanned_name() {
        let service = service(corpus(), StaticFarmLookup::default());
        let q = query(&service, &[("search", "failed"), ("type", "all")]);
        let (result, _) = service
            .search_ordered(&CancellationToken::new(), &q)
            .await
            .unwrap();

        assert_eq!(result.matches, 2);
        assert_eq!(result.jobs.len(), 2);
        assert_eq!(result.job_names.len(), 3);
        assert!(result.job_names.contains("logs/job-c/2/build-log.txt"));
    }

    #[tokio::test]
    async fn test_cancelled_search_returns_error() {
        let service = service(corpus(), StaticFarmLookup::default());
        let q = query(&service, &[("search", "failed"), ("type", "all")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = service.search_ordered(&cancel, &q).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
