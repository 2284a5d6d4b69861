//! Regular-expression search over CI artifacts.
//!
//! A request flows through these stages:
//!
//! ```text
//! query string ─► SearchQuery ─► ScanEngine ─► MatchEvent stream
//!                   (query)       (engine)          │
//!                                                   ▼
//!                       UrlFold / OrderedFold  (aggregate, farm)
//!                                                   │
//!                                                   ▼
//!                       v1 map / v2 SearchResponse / OrderedResponse
//!                                 (response)
//! ```
//!
//! The scan runs up to `workers` artifacts concurrently under a shared byte
//! budget and stops when its cancellation token fires. Folding happens on a
//! single consumer, so first-seen ordering in the results is well defined.
//!
//! # Example
//!
//! ```no_run
//! use ci_search::search::{
//!     FsArtifactSource, LayoutResolver, RawParams, ScanEngine, SearchMode, SearchService,
//!     StaticFarmLookup,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = ScanEngine::new(Arc::new(FsArtifactSource::new("./data/artifacts")), 8, 256);
//!     let resolver = LayoutResolver::new(
//!         "https://prow.example.com/view/gs/bucket/",
//!         "https://bugs.example.com/show_bug.cgi?id=",
//!         "https://issues.example.com/browse/",
//!     );
//!     let service = SearchService::new(
//!         engine,
//!         Arc::new(resolver),
//!         Arc::new(StaticFarmLookup::default()),
//!         Duration::from_secs(14 * 24 * 3600),
//!     );
//!
//!     let params = RawParams::from_query("search=panic%3A&type=junit&maxAge=24h");
//!     let query = service.parse_query(&params, SearchMode::Text)?;
//!     let (result, summary) = service.search_ordered(&CancellationToken::new(), &query).await?;
//!     println!("{} matches, truncated: {}", result.matches, summary.truncated);
//!
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod duration;
pub mod engine;
mod error;
pub mod farm;
pub mod filter;
pub mod metadata;
pub mod query;
pub mod response;
mod service;
pub mod source;

pub use aggregate::{
    Match, OrderedFold, OrderedSearchResult, SearchBugResult, SearchIssuesResult,
    SearchJobInstanceResult, SearchJobsResult, UrlFold, UrlResults,
};
pub use engine::{MatchEvent, ScanBudget, ScanEngine, ScanSummary};
pub use error::{SearchError, SearchResult};
pub use farm::{FarmLookup, FarmSelector, StaticFarmLookup, ALL_FARMS, UNKNOWN_FARM};
pub use filter::{NameFilter, NamePredicate};
pub use metadata::{ArtifactMetadata, FileKind, LayoutResolver, MetadataError, MetadataResolver};
pub use query::{RawParams, ResultKind, SearchMode, SearchQuery};
pub use response::{OrderedResponse, SearchResponse, SearchResponseResult};
pub use service::SearchService;
pub use source::{Artifact, ArtifactSource, FsArtifactSource, MemoryArtifactSource};
