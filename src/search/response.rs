//! Response bodies rendered by the search endpoints

use crate::search::aggregate::{Match, OrderedSearchResult, UrlResults};
use indexmap::IndexMap;
use serde::Serialize;

/// Matches for one pattern across every URL
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponseResult {
    pub matches: Vec<Match>,
}

/// v2 body: pattern → matches, each tagged with its owning URL
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    pub results: IndexMap<String, SearchResponseResult>,
}

impl SearchResponse {
    /// Invert URL-keyed results. Patterns and matches keep the discovery
    /// order of `results`.
    pub fn from_url_results(results: UrlResults) -> Self {
        let mut response = SearchResponse::default();
        for (url, by_pattern) in results {
            for (pattern, matches) in by_pattern {
                let entry = response.results.entry(pattern).or_default();
                entry.matches.extend(matches.into_iter().map(|mut m| {
                    m.url = Some(url.clone());
                    m
                }));
            }
        }
        response
    }

    /// Total number of matches across all patterns
    pub fn match_count(&self) -> usize {
        self.results.values().map(|r| r.matches.len()).sum()
    }
}

/// Body of the grouped and chart endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderedResponse {
    /// Canonical query string reproducing this search
    #[serde(rename = "Query")]
    pub query: String,
    #[serde(flatten)]
    pub result: OrderedSearchResult,
}
