//! Folding of scan events into result structures.
//!
//! Two folds share the same event resolution: [`UrlFold`] builds the
//! URL-keyed mapping rendered by the v1 and v2 endpoints, and
//! [`OrderedFold`] builds the identity-keyed [`OrderedSearchResult`] of bugs, issues
//! and jobs. Both run on the single consumer side of a scan, so neither needs
//! any synchronization.

use crate::search::engine::MatchEvent;
use crate::search::farm::{FarmLookup, FarmSelector};
use crate::search::filter::NameFilter;
use crate::search::metadata::{ArtifactMetadata, BugInfo, FileKind, IssueInfo, MetadataResolver};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use url::Url;

/// One pattern's matches within one artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub file_type: FileKind,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Context blocks, trailing spaces trimmed
    pub context: Vec<String>,
    pub more_lines: usize,
    /// Owning URL; only set in pattern-keyed responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bug: Option<BugInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<IssueInfo>,
}

/// URL → pattern → matches, in discovery order
pub type UrlResults = IndexMap<String, IndexMap<String, Vec<Match>>>;

fn trim_blocks(blocks: Vec<String>) -> Vec<String> {
    blocks
        .into_iter()
        .map(|mut block| {
            let trimmed = block.trim_end_matches(' ').len();
            block.truncate(trimmed);
            block
        })
        .collect()
}

/// An event whose artifact resolved to a canonical URI
struct Resolved {
    metadata: ArtifactMetadata,
    uri: Url,
}

/// Resolves event artifacts and applies the query's name filter
struct EventResolver<'a> {
    resolver: &'a dyn MetadataResolver,
    name_filter: &'a NameFilter,
}

impl<'a> EventResolver<'a> {
    /// `None` drops the event: unresolvable metadata or URI, or a job name
    /// rejected by the filter. Tracker records bypass the name filter.
    fn resolve(&self, event: &MatchEvent) -> Option<Resolved> {
        let metadata = match self.resolver.metadata_for(&event.artifact) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!(artifact = %event.artifact, error = %err, "Unable to resolve metadata");
                return None;
            }
        };
        let Some(uri) = metadata.uri.clone() else {
            tracing::warn!(artifact = %event.artifact, "Failed to compute artifact URI");
            return None;
        };
        if !metadata.file_kind.is_tracker_record() && !self.name_filter.matches(&metadata.name) {
            return None;
        }
        Some(Resolved { metadata, uri })
    }
}

/// Builds [`UrlResults`], keeping only URLs admitted by the farm selector
pub struct UrlFold<'a> {
    events: EventResolver<'a>,
    farms: &'a dyn FarmLookup,
    selector: &'a FarmSelector,
    results: UrlResults,
}

impl<'a> UrlFold<'a> {
    pub fn new(
        resolver: &'a dyn MetadataResolver,
        name_filter: &'a NameFilter,
        farms: &'a dyn FarmLookup,
        selector: &'a FarmSelector,
    ) -> Self {
        Self {
            events: EventResolver {
                resolver,
                name_filter,
            },
            farms,
            selector,
            results: UrlResults::new(),
        }
    }

    pub fn fold(&mut self, event: MatchEvent) {
        let Some(Resolved { metadata, uri }) = self.events.resolve(&event) else {
            return;
        };
        let uri = uri.to_string();
        if !self.selector.admits(self.farms.farm_for(&uri).as_deref()) {
            return;
        }

        let matches = Match {
            file_type: metadata.file_kind,
            name: metadata.name,
            context: trim_blocks(event.matches),
            more_lines: event.more_lines,
            url: None,
            last_modified: event.last_modified,
            bug: metadata.bug,
            issue: metadata.issue,
        };
        self.results
            .entry(uri)
            .or_default()
            .entry(event.pattern)
            .or_default()
            .push(matches);
    }

    pub fn into_results(self) -> UrlResults {
        self.results
    }
}

/// Remove URLs whose farm is not admitted by `selector`
pub fn retain_urls_by_farm(results: &mut UrlResults, farms: &dyn FarmLookup, selector: &FarmSelector) {
    if selector.is_all() {
        return;
    }
    results.retain(|uri, _| selector.admits(farms.farm_for(uri).as_deref()));
}

/// One run of a job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchJobInstanceResult {
    pub number: u64,
    #[serde(rename = "URI")]
    pub uri: Url,
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchJobsResult {
    pub name: String,
    pub trigger: String,
    pub instances: Vec<SearchJobInstanceResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchBugResult {
    pub name: String,
    pub number: u64,
    #[serde(rename = "URI")]
    pub uri: Option<Url>,
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchIssuesResult {
    pub name: String,
    pub number: u64,
    pub key: String,
    #[serde(rename = "URI")]
    pub uri: Option<Url>,
    pub matches: Vec<Match>,
}

/// Identity-keyed, insertion-ordered collections of matches.
///
/// Each collection is a vector plus an index from identity key to position;
/// entries are only ever reached through the index, never held by reference
/// across insertions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderedSearchResult {
    /// Total matches folded in
    pub matches: usize,
    pub bugs: Vec<SearchBugResult>,
    pub issues: Vec<SearchIssuesResult>,
    pub jobs: Vec<SearchJobsResult>,
    /// Every artifact name the scan visited, matched or not
    pub job_names: BTreeSet<String>,

    #[serde(skip)]
    bug_by_number: HashMap<u64, usize>,
    #[serde(skip)]
    issue_by_number: HashMap<u64, usize>,
    #[serde(skip)]
    job_by_name: HashMap<String, usize>,
}

impl OrderedSearchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for bug `number`, appended empty on first use
    pub fn bug_by_number(&mut self, number: u64) -> &mut SearchBugResult {
        let index = *self.bug_by_number.entry(number).or_insert_with(|| {
            self.bugs.push(SearchBugResult {
                name: String::new(),
                number,
                uri: None,
                matches: Vec::new(),
            });
            self.bugs.len() - 1
        });
        &mut self.bugs[index]
    }

    /// The entry for issue `number`, appended empty on first use
    pub fn issue_by_number(&mut self, number: u64) -> &mut SearchIssuesResult {
        let index = *self.issue_by_number.entry(number).or_insert_with(|| {
            self.issues.push(SearchIssuesResult {
                name: String::new(),
                number,
                key: String::new(),
                uri: None,
                matches: Vec::new(),
            });
            self.issues.len() - 1
        });
        &mut self.issues[index]
    }

    /// The entry for job `name`, appended empty on first use
    pub fn job_by_name(&mut self, name: &str) -> &mut SearchJobsResult {
        let index = match self.job_by_name.get(name) {
            Some(&index) => index,
            None => {
                self.jobs.push(SearchJobsResult {
                    name: name.to_string(),
                    trigger: String::new(),
                    instances: Vec::new(),
                });
                let index = self.jobs.len() - 1;
                self.job_by_name.insert(name.to_string(), index);
                index
            }
        };
        &mut self.jobs[index]
    }

    fn record(&mut self, metadata: ArtifactMetadata, uri: Url, event: MatchEvent) {
        let matches = Match {
            file_type: metadata.file_kind,
            name: String::new(),
            context: trim_blocks(event.matches),
            more_lines: event.more_lines,
            url: None,
            last_modified: event.last_modified,
            bug: None,
            issue: None,
        };

        match metadata.file_kind {
            FileKind::Bug => {
                let bug = self.bug_by_number(metadata.number);
                if bug.name.is_empty() {
                    bug.name = metadata.name;
                    bug.uri = Some(uri);
                }
                bug.matches.push(matches);
            }
            FileKind::Issue => {
                let issue = self.issue_by_number(metadata.number);
                if issue.name.is_empty() {
                    issue.name = metadata.name;
                    issue.uri = Some(uri);
                    issue.key = metadata.key;
                }
                issue.matches.push(matches);
            }
            FileKind::BuildLog | FileKind::Junit => {
                let job = self.job_by_name(&metadata.name);
                if job.trigger.is_empty() {
                    job.trigger = metadata.trigger;
                }
                let new_run = job
                    .instances
                    .last()
                    .map_or(true, |last| last.number != metadata.number);
                if new_run {
                    job.instances.push(SearchJobInstanceResult {
                        number: metadata.number,
                        uri,
                        matches: Vec::new(),
                    });
                }
                if let Some(instance) = job.instances.last_mut() {
                    instance.matches.push(matches);
                }
            }
        }
        self.matches += 1;
    }

    /// Drop job instances whose farm is not admitted by `selector`, then jobs
    /// left without instances. The match count is recomputed.
    pub fn retain_jobs_by_farm(&mut self, farms: &dyn FarmLookup, selector: &FarmSelector) {
        if selector.is_all() {
            return;
        }
        for job in &mut self.jobs {
            crate::search::farm::retain_by_farm(&mut job.instances, selector, |instance| {
                farms.farm_for(instance.uri.as_str())
            });
        }
        self.jobs.retain(|job| !job.instances.is_empty());
        self.job_by_name = self
            .jobs
            .iter()
            .enumerate()
            .map(|(index, job)| (job.name.clone(), index))
            .collect();

        let job_matches: usize = self
            .jobs
            .iter()
            .flat_map(|job| job.instances.iter())
            .map(|instance| instance.matches.len())
            .sum();
        let bug_matches: usize = self.bugs.iter().map(|b| b.matches.len()).sum();
        let issue_matches: usize = self.issues.iter().map(|i| i.matches.len()).sum();
        self.matches = job_matches + bug_matches + issue_matches;
    }
}

/// Builds an [`OrderedSearchResult`] in arrival order
pub struct OrderedFold<'a> {
    events: EventResolver<'a>,
    result: OrderedSearchResult,
}

impl<'a> OrderedFold<'a> {
    pub fn new(resolver: &'a dyn MetadataResolver, name_filter: &'a NameFilter) -> Self {
        Self {
            events: EventResolver {
                resolver,
                name_filter,
            },
            result: OrderedSearchResult::new(),
        }
    }

    pub fn fold(&mut self, event: MatchEvent) {
        if let Some(Resolved { metadata, uri }) = self.events.resolve(&event) {
            self.result.record(metadata, uri, event);
        }
    }

    pub fn finish(self, job_names: BTreeSet<String>) -> OrderedSearchResult {
        let mut result = self.result;
        result.job_names = job_names;
        result
    }
}
