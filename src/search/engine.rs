//! Concurrent, budgeted multi-pattern scan over the artifact corpus.
//!
//! Artifacts are read and matched by up to `workers` concurrent tasks. Each
//! task sends the complete set of events for its artifact over a bounded
//! channel; the caller's `on_match` runs only on the consuming side, so the
//! aggregation state it mutates has a single owner and never needs a lock.
//!
//! ```text
//!  list() ──► [worker]──┐
//!             [worker]──┼──► bounded mpsc ──► on_match (single owner)
//!             [worker]──┘
//! ```

use crate::metrics;
use crate::search::error::{SearchError, SearchResult};
use crate::search::query::SearchQuery;
use crate::search::source::{Artifact, ArtifactSource};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// All matches of one pattern within one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    /// Artifact name as listed by the source
    pub artifact: String,
    /// Pattern source text
    pub pattern: String,
    /// One block per emitted match: the matching line with its context
    pub matches: Vec<String>,
    /// Matching lines beyond the per-artifact cap or the byte budget
    pub more_lines: usize,
    pub last_modified: DateTime<Utc>,
}

/// Outcome of a completed (possibly truncated) scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Artifacts whose content was matched
    pub artifacts_scanned: usize,
    /// Events delivered to the callback
    pub events: usize,
    /// Bytes of match blocks accepted by the budget
    pub bytes_matched: u64,
    /// Matches or artifacts were dropped because the byte budget ran out
    pub truncated: bool,
}

/// Cumulative matched-byte budget shared by every worker of one scan
#[derive(Debug)]
pub struct ScanBudget {
    limit: u64,
    used: AtomicU64,
    truncated: AtomicBool,
}

impl ScanBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
            truncated: AtomicBool::new(false),
        }
    }

    /// Reserve `bytes`. Succeeds until the running total exceeds the limit,
    /// so the final total exceeds the limit by at most one block. A refused
    /// reservation marks the scan truncated.
    pub fn try_consume(&self, bytes: u64) -> bool {
        let reserved = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used <= self.limit).then(|| used.saturating_add(bytes))
            })
            .is_ok();
        if !reserved {
            self.mark_truncated();
        }
        reserved
    }

    /// The limit has been exceeded; no further reservation will succeed.
    pub fn is_exhausted(&self) -> bool {
        self.used.load(Ordering::Acquire) > self.limit
    }

    /// Record that content was left unscanned because of the budget
    pub fn mark_truncated(&self) {
        self.truncated.store(true, Ordering::Release);
    }

    /// Whether any match or artifact was dropped because of the budget
    pub fn is_truncated(&self) -> bool {
        self.truncated.load(Ordering::Acquire)
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }
}

/// Everything one worker found in one artifact
struct ArtifactScan {
    name: String,
    events: Vec<MatchEvent>,
}

#[derive(Debug, Clone, Copy)]
struct MatchLimits {
    max_matches: usize,
    context_lines: i32,
}

/// Runs scans against an artifact source
#[derive(Clone)]
pub struct ScanEngine {
    source: Arc<dyn ArtifactSource>,
    workers: usize,
    queue_depth: usize,
}

impl ScanEngine {
    pub fn new(source: Arc<dyn ArtifactSource>, workers: usize, queue_depth: usize) -> Self {
        Self {
            source,
            workers: workers.max(1),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Scan every candidate artifact for every pattern of `query`.
    ///
    /// `on_match` is called once per (artifact, pattern) pair with at least
    /// one match; within an artifact, events follow the query's pattern
    /// order. When `names` is given, every scanned artifact name is inserted
    /// whether or not it matched.
    ///
    /// Cancelling `cancel` stops the scan promptly and returns
    /// [`SearchError::Cancelled`]; exhausting the byte budget is not an error
    /// and is reported through [`ScanSummary::truncated`].
    pub async fn scan<F>(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
        mut names: Option<&mut BTreeSet<String>>,
        mut on_match: F,
    ) -> SearchResult<ScanSummary>
    where
        F: FnMut(MatchEvent) -> SearchResult<()>,
    {
        let patterns = Arc::new(compile_patterns(query.patterns())?);

        let listed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SearchError::Cancelled),
            listed = self.source.list() => listed?,
        };
        let candidates = candidates(listed, query, Utc::now());
        tracing::debug!(
            candidates = candidates.len(),
            patterns = patterns.len(),
            workers = self.workers,
            "Starting scan"
        );

        // Stops outstanding workers however this function returns.
        let workers_cancel = cancel.child_token();
        let _stop_workers = workers_cancel.clone().drop_guard();

        let budget = Arc::new(ScanBudget::new(query.max_bytes()));
        let limits = MatchLimits {
            max_matches: query.max_matches(),
            context_lines: query.context_lines(),
        };
        let (tx, mut rx) = mpsc::channel::<ArtifactScan>(self.queue_depth);

        let producer = tokio::spawn(drive_workers(
            self.source.clone(),
            candidates,
            patterns,
            limits,
            budget.clone(),
            workers_cancel,
            tx,
            self.workers,
        ));

        let mut summary = ScanSummary::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SearchError::Cancelled),
                next = rx.recv() => next,
            };
            let Some(scan) = next else { break };

            if let Some(names) = names.as_deref_mut() {
                names.insert(scan.name);
            }
            for event in scan.events {
                summary.events += 1;
                on_match(event)?;
            }
        }

        summary.artifacts_scanned = producer.await??;
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        summary.bytes_matched = budget.used();
        summary.truncated = budget.is_truncated();

        metrics::SCAN_ARTIFACTS_TOTAL.inc_by(summary.artifacts_scanned as u64);
        metrics::SCAN_MATCHED_BYTES_TOTAL.inc_by(summary.bytes_matched);
        if summary.truncated {
            metrics::SCAN_TRUNCATED_TOTAL.inc();
            tracing::warn!(
                max_bytes = query.max_bytes(),
                bytes_matched = summary.bytes_matched,
                "Search truncated: matched byte budget exhausted"
            );
        }

        Ok(summary)
    }
}

fn compile_patterns(patterns: &[String]) -> SearchResult<Vec<(String, Regex)>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern)
                .map(|re| (pattern.clone(), re))
                .map_err(|err| SearchError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })
        })
        .collect()
}

/// Artifacts admitted by the query's result kind and age ceiling
fn candidates(listed: Vec<Artifact>, query: &SearchQuery, now: DateTime<Utc>) -> Vec<Artifact> {
    let cutoff = chrono::Duration::from_std(query.max_age())
        .ok()
        .and_then(|age| now.checked_sub_signed(age));
    listed
        .into_iter()
        .filter(|artifact| query.result_kind().admits(artifact.kind))
        .filter(|artifact| match cutoff {
            Some(cutoff) => artifact.ignores_age() || artifact.last_modified >= cutoff,
            None => true,
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
async fn drive_workers(
    source: Arc<dyn ArtifactSource>,
    candidates: Vec<Artifact>,
    patterns: Arc<Vec<(String, Regex)>>,
    limits: MatchLimits,
    budget: Arc<ScanBudget>,
    cancel: CancellationToken,
    tx: mpsc::Sender<ArtifactScan>,
    workers: usize,
) -> SearchResult<usize> {
    stream::iter(candidates)
        .map(|artifact| {
            scan_artifact(
                source.clone(),
                artifact,
                patterns.clone(),
                limits,
                budget.clone(),
                cancel.clone(),
                tx.clone(),
            )
        })
        .buffer_unordered(workers)
        .try_fold(0usize, |scanned, done| async move {
            Ok(scanned + usize::from(done))
        })
        .await
}

/// Send one artifact's outcome to the consumer
async fn deliver(tx: &mpsc::Sender<ArtifactScan>, scan: ArtifactScan) -> SearchResult<()> {
    // A closed channel means the consumer has stopped.
    tx.send(scan).await.map_err(|_| SearchError::Cancelled)
}

/// Returns whether the artifact was scanned. Every artifact not abandoned to
/// cancellation is delivered, with no events when it was skipped or
/// unreadable, so the name sink sees it.
async fn scan_artifact(
    source: Arc<dyn ArtifactSource>,
    artifact: Artifact,
    patterns: Arc<Vec<(String, Regex)>>,
    limits: MatchLimits,
    budget: Arc<ScanBudget>,
    cancel: CancellationToken,
    tx: mpsc::Sender<ArtifactScan>,
) -> SearchResult<bool> {
    if cancel.is_cancelled() {
        return Ok(false);
    }
    let name = artifact.name.clone();
    if budget.is_exhausted() {
        budget.mark_truncated();
        deliver(&tx, ArtifactScan { name, events: Vec::new() }).await?;
        return Ok(false);
    }

    let read = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(false),
        read = source.read(&artifact) => read,
    };
    let content = match read {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(artifact = %name, error = %err, "Skipping unreadable artifact");
            deliver(&tx, ArtifactScan { name, events: Vec::new() }).await?;
            return Ok(false);
        }
    };

    let events = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            match_artifact(&artifact, &content, &patterns, limits, &budget, &cancel)
        })
        .await?
    };

    deliver(&tx, ArtifactScan { name, events }).await?;
    Ok(true)
}

/// Context windows around `hits` (ascending line indexes). Windows that
/// overlap or touch are joined; each carries the number of hits it covers.
fn context_windows(
    hits: &[usize],
    context: usize,
    line_count: usize,
) -> Vec<(usize, usize, usize)> {
    let mut windows: Vec<(usize, usize, usize)> = Vec::new();
    for &hit in hits {
        let start = hit.saturating_sub(context);
        let end = (hit + context).min(line_count - 1);
        match windows.last_mut() {
            Some((_, last_end, covered)) if start <= *last_end + 1 => {
                *last_end = end;
                *covered += 1;
            }
            _ => windows.push((start, end, 1)),
        }
    }
    windows
}

fn match_artifact(
    artifact: &Artifact,
    content: &str,
    patterns: &[(String, Regex)],
    limits: MatchLimits,
    budget: &ScanBudget,
    cancel: &CancellationToken,
) -> Vec<MatchEvent> {
    let lines: Vec<&str> = content.lines().collect();
    let mut events = Vec::new();

    for (source, re) in patterns {
        if cancel.is_cancelled() {
            break;
        }
        if budget.is_exhausted() {
            budget.mark_truncated();
            break;
        }

        let hits: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| re.is_match(line))
            .map(|(index, _)| index)
            .collect();
        if hits.is_empty() {
            continue;
        }

        // (block text, hits it covers)
        let (blocks, mut more_lines) = if limits.context_lines < 0 {
            (vec![(lines.join("\n"), hits.len())], 0)
        } else {
            let shown = hits.len().min(limits.max_matches);
            let context = limits.context_lines as usize;
            let blocks = context_windows(&hits[..shown], context, lines.len())
                .into_iter()
                .map(|(start, end, covered)| (lines[start..=end].join("\n"), covered))
                .collect::<Vec<_>>();
            (blocks, hits.len() - shown)
        };

        let mut accepted = Vec::with_capacity(blocks.len());
        let mut blocks = blocks.into_iter();
        for (block, covered) in blocks.by_ref() {
            if !budget.try_consume(block.len() as u64) {
                more_lines += covered;
                break;
            }
            accepted.push(block);
        }
        more_lines += blocks.map(|(_, covered)| covered).sum::<usize>();
        if accepted.is_empty() {
            continue;
        }

        events.push(MatchEvent {
            artifact: artifact.name.clone(),
            pattern: source.clone(),
            matches: accepted,
            more_lines,
            last_modified: artifact.last_modified,
        });
    }

    events
}
