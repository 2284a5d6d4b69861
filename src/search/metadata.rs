//! Artifact metadata: what kind of file an artifact is, which job run or
//! tracker record it belongs to, and where its canonical page lives.

use serde::{Deserialize, Serialize};
use url::Url;

/// The kind of file a match was found in
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FileKind {
    Bug,
    Issue,
    BuildLog,
    Junit,
}

impl FileKind {
    /// Bugs and issues are tracker records rather than named CI job output
    pub fn is_tracker_record(self) -> bool {
        matches!(self, FileKind::Bug | FileKind::Issue)
    }
}

/// Bug linkage attached to a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugInfo {
    pub number: u64,
    pub name: String,
}

/// Issue linkage attached to a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInfo {
    pub number: u64,
    pub key: String,
    pub name: String,
}

/// Resolved description of one artifact
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactMetadata {
    /// Job detail page, bug page or issue page
    pub uri: Option<Url>,
    pub file_kind: FileKind,
    /// Job name for job output, display title for tracker records
    pub name: String,
    /// Run number for job output, bug or issue number for tracker records
    pub number: u64,
    /// `build` or `pull` for job output, empty otherwise
    pub trigger: String,
    pub bug: Option<BugInfo>,
    pub issue: Option<IssueInfo>,
    /// Tracker key of an issue, empty otherwise
    pub key: String,
}

/// Errors produced while resolving an artifact name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("artifact {0:?} does not follow a known layout")]
    UnknownLayout(String),

    #[error("artifact {0:?} is not a searchable file")]
    UnsupportedFile(String),

    #[error("artifact {name:?} has an invalid number {value:?}")]
    InvalidNumber { name: String, value: String },
}

/// Resolves artifact names to metadata
pub trait MetadataResolver: Send + Sync {
    fn metadata_for(&self, name: &str) -> Result<ArtifactMetadata, MetadataError>;
}

/// Where an artifact sits in the corpus layout
#[derive(Debug, Clone, PartialEq, Eq)]
enum Layout<'a> {
    Bug {
        number: u64,
    },
    Issue {
        key: &'a str,
        number: u64,
    },
    Run {
        trigger: &'static str,
        job: &'a str,
        run: u64,
        run_dir: String,
        kind: FileKind,
    },
}

fn parse_number(name: &str, value: &str) -> Result<u64, MetadataError> {
    value.parse().map_err(|_| MetadataError::InvalidNumber {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn run_file_kind(name: &str, file: &[&str]) -> Result<FileKind, MetadataError> {
    match file.last() {
        Some(&"build-log.txt") => Ok(FileKind::BuildLog),
        Some(&"junit.failures") => Ok(FileKind::Junit),
        Some(last) if last.ends_with(".xml") => Ok(FileKind::Junit),
        _ => Err(MetadataError::UnsupportedFile(name.to_string())),
    }
}

fn parse_layout(name: &str) -> Result<Layout<'_>, MetadataError> {
    let segments: Vec<&str> = name.trim_start_matches('/').split('/').collect();
    match segments.as_slice() {
        ["bugs", number] => Ok(Layout::Bug {
            number: parse_number(name, number)?,
        }),
        ["issues", key] => {
            let digits = key
                .rsplit(|c: char| !c.is_ascii_digit())
                .next()
                .unwrap_or("");
            Ok(Layout::Issue {
                key: *key,
                number: parse_number(name, digits)?,
            })
        }
        ["logs", job, run, file @ ..] if !file.is_empty() => Ok(Layout::Run {
            trigger: "build",
            job: *job,
            run: parse_number(name, run)?,
            run_dir: format!("logs/{job}/{run}"),
            kind: run_file_kind(name, file)?,
        }),
        ["pr-logs", "pull", org_repo, pr, job, run, file @ ..] if !file.is_empty() => {
            Ok(Layout::Run {
                trigger: "pull",
                job: *job,
                run: parse_number(name, run)?,
                run_dir: format!("pr-logs/pull/{org_repo}/{pr}/{job}/{run}"),
                kind: run_file_kind(name, file)?,
            })
        }
        _ => Err(MetadataError::UnknownLayout(name.to_string())),
    }
}

/// File kind of an artifact name, if it follows the corpus layout
pub fn classify(name: &str) -> Option<FileKind> {
    match parse_layout(name).ok()? {
        Layout::Bug { .. } => Some(FileKind::Bug),
        Layout::Issue { .. } => Some(FileKind::Issue),
        Layout::Run { kind, .. } => Some(kind),
    }
}

/// Resolver for the on-disk corpus layout:
///
/// ```text
/// logs/<job>/<run>/build-log.txt
/// pr-logs/pull/<org_repo>/<pr>/<job>/<run>/junit.failures
/// bugs/<number>
/// issues/<KEY-123>
/// ```
#[derive(Debug, Clone)]
pub struct LayoutResolver {
    job_uri_prefix: String,
    bug_uri_prefix: String,
    issue_uri_prefix: String,
}

impl LayoutResolver {
    pub fn new(
        job_uri_prefix: impl Into<String>,
        bug_uri_prefix: impl Into<String>,
        issue_uri_prefix: impl Into<String>,
    ) -> Self {
        Self {
            job_uri_prefix: job_uri_prefix.into(),
            bug_uri_prefix: bug_uri_prefix.into(),
            issue_uri_prefix: issue_uri_prefix.into(),
        }
    }

    fn uri(prefix: &str, tail: &str) -> Option<Url> {
        let raw = format!("{prefix}{tail}");
        match Url::parse(&raw) {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::debug!(uri = %raw, error = %err, "Unable to build artifact URI");
                None
            }
        }
    }
}

impl MetadataResolver for LayoutResolver {
    fn metadata_for(&self, name: &str) -> Result<ArtifactMetadata, MetadataError> {
        let metadata = match parse_layout(name)? {
            Layout::Bug { number } => {
                let title = format!("Bug {number}");
                ArtifactMetadata {
                    uri: Self::uri(&self.bug_uri_prefix, &number.to_string()),
                    file_kind: FileKind::Bug,
                    name: title.clone(),
                    number,
                    trigger: String::new(),
                    bug: Some(BugInfo {
                        number,
                        name: title,
                    }),
                    issue: None,
                    key: String::new(),
                }
            }
            Layout::Issue { key, number } => ArtifactMetadata {
                uri: Self::uri(&self.issue_uri_prefix, key),
                file_kind: FileKind::Issue,
                name: key.to_string(),
                number,
                trigger: String::new(),
                bug: None,
                issue: Some(IssueInfo {
                    number,
                    key: key.to_string(),
                    name: key.to_string(),
                }),
                key: key.to_string(),
            },
            Layout::Run {
                trigger,
                job,
                run,
                run_dir,
                kind,
            } => ArtifactMetadata {
                uri: Self::uri(&self.job_uri_prefix, &run_dir),
                file_kind: kind,
                name: job.to_string(),
                number: run,
                trigger: trigger.to_string(),
                bug: None,
                issue: None,
                key: String::new(),
            },
        };
        Ok(metadata)
    }
}
