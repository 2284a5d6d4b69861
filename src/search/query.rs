//! Search request parsing, validation and canonical serialization

use crate::search::duration::{format_duration, parse_duration};
use crate::search::error::{SearchError, SearchResult};
use crate::search::farm::FarmSelector;
use crate::search::filter::NameFilter;
use crate::search::metadata::FileKind;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::form_urlencoded;

/// Largest accepted `maxMatches`
pub const MAX_MATCHES_LIMIT: usize = 500;
/// Largest accepted `maxBytes`
pub const MAX_BYTES_LIMIT: u64 = 100 * 1024 * 1024;
/// `maxBytes` used when the parameter is absent or zero
pub const DEFAULT_MAX_BYTES: u64 = 20 * 1024 * 1024;
/// `maxAge` used when the parameter is absent or zero, before clamping
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(2 * 24 * 3600);
/// Accepted `context` range; -1 disables context trimming
pub const MIN_CONTEXT: i32 = -1;
pub const MAX_CONTEXT: i32 = 15;

/// Default name filter for the chart view: end-to-end jobs
const CHART_DEFAULT_NAME: &str = "-e2e-";

/// Patterns shown by the chart view when none are supplied
const CHART_DEFAULT_PATTERNS: &[&str] = &[
    // CI-cluster issues
    "could not create or restart template instance.*",
    "could not (wait for|get) build.*",
    // Installer and bootstrapping issues
    "level=error.*timeout while waiting for state.*",
    "Container setup exited with code ., reason Error",
    // Cluster-under-test issues
    "no providers available to validate pod",
    "Error deleting EBS volume .* since volume is currently attached",
    "clusteroperator/.* changed Degraded to True: .*",
    "Cluster operator .* is still updating.*",
    "Pod .* is not healthy",
    "failed: \\(.*",
];

/// Which page the request is rendered for; changes parameter defaults
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SearchMode {
    Text,
    Chart,
}

/// The `type` parameter: which artifact kinds are scanned
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::EnumString, strum::AsRefStr,
)]
pub enum ResultKind {
    #[strum(serialize = "bug")]
    #[serde(rename = "bug")]
    Bug,
    #[strum(serialize = "issue")]
    #[serde(rename = "issue")]
    Issue,
    #[strum(serialize = "build-log")]
    #[serde(rename = "build-log")]
    BuildLog,
    #[strum(serialize = "junit")]
    #[serde(rename = "junit")]
    Junit,
    #[strum(serialize = "bug+issue")]
    #[serde(rename = "bug+issue")]
    BugIssue,
    #[strum(serialize = "bug+junit")]
    #[serde(rename = "bug+junit")]
    BugJunit,
    #[strum(serialize = "bug+issue+junit")]
    #[serde(rename = "bug+issue+junit")]
    BugIssueJunit,
    #[strum(serialize = "all")]
    #[serde(rename = "all")]
    All,
}

impl ResultKind {
    fn default_for(mode: SearchMode) -> Self {
        match mode {
            SearchMode::Chart => ResultKind::All,
            SearchMode::Text => ResultKind::BugIssueJunit,
        }
    }

    /// Whether artifacts of `kind` are scanned for this result kind
    pub fn admits(self, kind: FileKind) -> bool {
        match self {
            ResultKind::All => true,
            ResultKind::Bug => kind == FileKind::Bug,
            ResultKind::Issue => kind == FileKind::Issue,
            ResultKind::BuildLog => kind == FileKind::BuildLog,
            ResultKind::Junit => kind == FileKind::Junit,
            ResultKind::BugIssue => matches!(kind, FileKind::Bug | FileKind::Issue),
            ResultKind::BugJunit => matches!(kind, FileKind::Bug | FileKind::Junit),
            ResultKind::BugIssueJunit => {
                matches!(kind, FileKind::Bug | FileKind::Issue | FileKind::Junit)
            }
        }
    }
}

/// Decoded query-string parameters, preserving repeated keys in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParams {
    pairs: Vec<(String, String)>,
}

impl RawParams {
    /// Decode an `application/x-www-form-urlencoded` query string
    pub fn from_query(query: &str) -> Self {
        Self {
            pairs: form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            pairs: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// First value for `key`, or the empty string when absent
    pub fn first(&self, key: &str) -> &str {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    /// Every value for `key`, in request order
    pub fn all(&self, key: &str) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// A validated, immutable search request
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    mode: SearchMode,
    patterns: Vec<String>,
    result_kind: ResultKind,
    name_filter: NameFilter,
    max_age: Duration,
    max_matches: usize,
    max_bytes: u64,
    context_lines: i32,
    wrap_lines: bool,
    group_by_job: bool,
    build_farm: FarmSelector,
}

fn invalid(message: impl Into<String>) -> SearchError {
    SearchError::InvalidQuery(message.into())
}

fn compile_name(field: &str, value: &str) -> SearchResult<Regex> {
    Regex::new(value)
        .map_err(|err| invalid(format!("{field} is an invalid regular expression: {err}")))
}

impl SearchQuery {
    /// Parse and validate request parameters.
    ///
    /// `server_max_age` is the configured ceiling; larger `maxAge` values are
    /// clamped to it silently.
    pub fn parse(
        params: &RawParams,
        mode: SearchMode,
        server_max_age: Duration,
    ) -> SearchResult<Self> {
        let mut patterns = params.all("search");
        if patterns.is_empty() && mode == SearchMode::Chart {
            patterns = CHART_DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect();
        }

        let result_kind = match params.first("type") {
            "" => ResultKind::default_for(mode),
            value => ResultKind::from_str(value).map_err(|_| {
                invalid(
                    "search type must be 'bug', 'issue', 'junit', 'build-log', 'bug+issue', \
                     'bug+junit', 'bug+issue+junit', or 'all'",
                )
            })?,
        };

        let include = match params.first("name") {
            "" if mode == SearchMode::Chart => Some(compile_name("name", CHART_DEFAULT_NAME)?),
            "" => None,
            value => Some(compile_name("name", value)?),
        };
        let exclude = match params.first("excludeName") {
            "" => None,
            value => Some(compile_name("excludeName", value)?),
        };
        let name_filter = NameFilter::include_and_not_exclude(include, exclude);

        let max_matches = match params.first("maxMatches") {
            "" => 0,
            value => value
                .parse::<usize>()
                .ok()
                .filter(|n| *n <= MAX_MATCHES_LIMIT)
                .ok_or_else(|| {
                    invalid(format!(
                        "maxMatches must be a number between 0 and {MAX_MATCHES_LIMIT}"
                    ))
                })?,
        };

        let max_bytes = match params.first("maxBytes") {
            "" => 0,
            value => value
                .parse::<u64>()
                .ok()
                .filter(|n| *n <= MAX_BYTES_LIMIT)
                .ok_or_else(|| invalid("maxBytes must be a number between 0 and 100M"))?,
        };

        let max_age = match params.first("maxAge") {
            "" => Duration::ZERO,
            value => parse_duration(value)
                .map_err(|err| invalid(format!("maxAge is an invalid duration: {err}")))?,
        };
        let max_age = if max_age.is_zero() {
            DEFAULT_MAX_AGE
        } else {
            max_age
        };

        let context_lines = match params.first("context") {
            "" if mode == SearchMode::Text => 1,
            "" => 0,
            value => value
                .parse::<i32>()
                .ok()
                .filter(|n| (MIN_CONTEXT..=MAX_CONTEXT).contains(n))
                .ok_or_else(|| {
                    invalid(format!(
                        "context must be a number between {MIN_CONTEXT} and {MAX_CONTEXT}"
                    ))
                })?,
        };

        Ok(Self {
            mode,
            patterns,
            result_kind,
            name_filter,
            max_age: max_age.min(server_max_age),
            max_matches: max_matches.max(1),
            max_bytes: if max_bytes == 0 {
                DEFAULT_MAX_BYTES
            } else {
                max_bytes
            },
            context_lines,
            wrap_lines: !params.first("wrap").is_empty(),
            group_by_job: params.first("groupBy") != "none",
            build_farm: FarmSelector::parse(params.first("buildFarm")),
        })
    }

    /// Canonical parameters that parse back into an equal query
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .patterns
            .iter()
            .map(|p| ("search".to_string(), p.clone()))
            .collect();
        params.push(("mode".into(), self.mode.to_string()));
        params.push(("type".into(), self.result_kind.to_string()));
        params.push(("maxAge".into(), format_duration(self.max_age)));
        params.push(("name".into(), self.name_filter.include_source().to_string()));
        params.push((
            "excludeName".into(),
            self.name_filter.exclude_source().to_string(),
        ));
        params.push(("maxMatches".into(), self.max_matches.to_string()));
        params.push(("maxBytes".into(), self.max_bytes.to_string()));
        params.push(("context".into(), self.context_lines.to_string()));
        if self.wrap_lines {
            params.push(("wrap".into(), "true".into()));
        }
        params.push((
            "groupBy".into(),
            if self.group_by_job { "job" } else { "none" }.into(),
        ));
        if !self.build_farm.is_all() {
            params.push(("buildFarm".into(), self.build_farm.to_string()));
        }
        params
    }

    /// Canonical URL-encoded query string, suitable for permalinks
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.to_params())
            .finish()
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn result_kind(&self) -> ResultKind {
        self.result_kind
    }

    pub fn name_filter(&self) -> &NameFilter {
        &self.name_filter
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Per-artifact match cap; always at least 1
    pub fn max_matches(&self) -> usize {
        self.max_matches
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Lines of context around each match; -1 keeps every line
    pub fn context_lines(&self) -> i32 {
        self.context_lines
    }

    pub fn wrap_lines(&self) -> bool {
        self.wrap_lines
    }

    pub fn group_by_job(&self) -> bool {
        self.group_by_job
    }

    pub fn build_farm(&self) -> &FarmSelector {
        &self.build_farm
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Mode={} Search={:?} SearchType={}",
            self.mode, self.patterns, self.result_kind
        )?;
        if !self.name_filter.include_source().is_empty() {
            write!(f, " Include={}", self.name_filter.include_source())?;
        }
        if !self.name_filter.exclude_source().is_empty() {
            write!(f, " Exclude={}", self.name_filter.exclude_source())?;
        }
        f.write_str("}")
    }
}
