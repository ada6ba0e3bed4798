//! Parallel metadata/subtitle fetch orchestration
//!
//! Startup latency is a design goal: everything a title needs before playback
//! (episode lists, subtitle tracks) is fetched in one concurrent scatter, and
//! gathered behind a single deadline. Every task's fetch passes through the
//! same connection governor as the proxy, so metadata fetching and playback
//! compete fairly for the same bounded upstream capacity.
//!
//! Deadline policy: tasks still pending when the deadline elapses are marked
//! timed out and their in-flight work is aborted. Late results are discarded,
//! never absorbed, so an abandoned fetch can't keep holding a governor slot
//! against playback traffic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::models::{Episode, Season, SubtitleTrack, TitleBundle};
use crate::proxy::fetch::Fetcher;
use crate::proxy::governor::Governor;
use crate::proxy::token::ProxyToken;
use crate::stream::subtitles;

/// What a scatter task is fetching, used when assembling a title bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Episode list for one season; payload is the season number.
    EpisodeList(u32),
    /// One subtitle track; identified by its language code in the task id.
    SubtitleTrack,
    /// Anything else the caller wants gathered verbatim.
    Raw,
}

/// One scatter unit: identity plus the upstream request to make
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub id: String,
    pub kind: TaskKind,
    pub request: ProxyToken,
}

impl FetchTask {
    pub fn new(id: impl Into<String>, kind: TaskKind, request: ProxyToken) -> Self {
        Self {
            id: id.into(),
            kind,
            request,
        }
    }
}

/// Terminal outcome of one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Body text of a successful fetch.
    Success(String),
    /// Failure reason (upstream error, governor timeout, ...).
    Failed(String),
    /// Still pending when the gather deadline elapsed.
    TimedOut,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TaskOutcome::Success(body) => Some(body),
            _ => None,
        }
    }

    /// Failure reason for non-success outcomes
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            TaskOutcome::Success(_) => None,
            TaskOutcome::Failed(reason) => Some(reason.clone()),
            TaskOutcome::TimedOut => Some("timed out".to_string()),
        }
    }
}

/// Mapping from task identity to its outcome, produced once all tasks have
/// settled or the deadline elapsed
#[derive(Debug, Default)]
pub struct AggregateResult {
    outcomes: HashMap<String, TaskOutcome>,
}

impl AggregateResult {
    pub fn outcome(&self, id: &str) -> Option<&TaskOutcome> {
        self.outcomes.get(id)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn timed_out_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, TaskOutcome::TimedOut))
            .count()
    }

    /// The aggregate as a whole is failed only when every task failed
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.success_count() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskOutcome)> {
        self.outcomes.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn insert(&mut self, id: String, outcome: TaskOutcome) {
        self.outcomes.insert(id, outcome);
    }
}

/// Scatter/gather fetch orchestrator sharing the proxy's governor
pub struct Orchestrator {
    fetcher: Arc<Fetcher>,
    governor: Arc<Governor>,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<Fetcher>, governor: Arc<Governor>) -> Self {
        Self { fetcher, governor }
    }

    /// Dispatch all tasks concurrently and wait for every terminal outcome or
    /// the deadline, whichever comes first.
    ///
    /// Per-task failures land in the aggregate; this function itself never
    /// fails and never blocks past the deadline.
    pub async fn gather(&self, tasks: Vec<FetchTask>, deadline: Duration) -> AggregateResult {
        let deadline = tokio::time::Instant::now() + deadline;
        let mut remaining: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let mut aggregate = AggregateResult::default();

        let mut set = JoinSet::new();
        for task in tasks {
            let fetcher = Arc::clone(&self.fetcher);
            let governor = Arc::clone(&self.governor);
            set.spawn(async move {
                let outcome = run_task(&fetcher, &governor, &task).await;
                (task.id, outcome)
            });
        }

        while !set.is_empty() {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((id, outcome)))) => {
                    debug!(task = %id, success = outcome.is_success(), "task settled");
                    remaining.remove(&id);
                    aggregate.insert(id, outcome);
                }
                Ok(Some(Err(join_err))) => {
                    // A panicked task loses its identity; it is accounted for
                    // below as an aborted leftover.
                    warn!("orchestrator task panicked: {join_err}");
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    set.abort_all();
                    for id in remaining.drain() {
                        aggregate.insert(id, TaskOutcome::TimedOut);
                    }
                    break;
                }
            }
        }
        for id in remaining.drain() {
            aggregate.insert(id, TaskOutcome::Failed("task aborted".to_string()));
        }
        aggregate
    }

    /// Open a title: scatter its season and subtitle fetches, gather, and
    /// assemble whatever arrived. Missing subtitle tracks or seasons show up
    /// in `failures` rather than blocking playback.
    pub async fn open_title(&self, request: TitleRequest, deadline: Duration) -> TitleBundle {
        let mut tasks = Vec::new();
        for (number, url) in &request.season_urls {
            tasks.push(FetchTask::new(
                format!("season:{number}"),
                TaskKind::EpisodeList(*number),
                request.context.rebase(url.clone()),
            ));
        }
        for (language, url) in &request.subtitle_urls {
            tasks.push(FetchTask::new(
                format!("subtitle:{language}"),
                TaskKind::SubtitleTrack,
                request.context.rebase(url.clone()),
            ));
        }

        let kinds: HashMap<String, TaskKind> = tasks
            .iter()
            .map(|t| (t.id.clone(), t.kind))
            .collect();
        let aggregate = self.gather(tasks, deadline).await;

        let mut bundle = TitleBundle {
            title: request.title,
            ..TitleBundle::default()
        };
        for (id, outcome) in aggregate.iter() {
            let kind = kinds.get(id).copied().unwrap_or(TaskKind::Raw);
            match (kind, outcome) {
                (TaskKind::EpisodeList(number), TaskOutcome::Success(body)) => {
                    match parse_episode_list(number, body) {
                        Ok(season) => bundle.seasons.push(season),
                        Err(e) => bundle.failures.push((id.to_string(), e.to_string())),
                    }
                }
                (TaskKind::SubtitleTrack, TaskOutcome::Success(body)) => {
                    let language = id.strip_prefix("subtitle:").unwrap_or(id).to_string();
                    bundle.subtitles.push(SubtitleTrack {
                        label: subtitles::lang_code_to_name(&language),
                        language,
                        body: subtitles::normalize_to_vtt(body),
                    });
                }
                (_, outcome) => {
                    if let Some(reason) = outcome.failure_reason() {
                        bundle.failures.push((id.to_string(), reason));
                    }
                }
            }
        }
        bundle.seasons.sort_by_key(|s| s.number);
        bundle.subtitles.sort_by(|a, b| a.language.cmp(&b.language));
        bundle.failures.sort();
        bundle
    }
}

/// Inbound request to open a title: where its metadata and subtitles live
#[derive(Debug, Clone)]
pub struct TitleRequest {
    pub title: String,
    /// Header context (referer/cookie) inherited by every task.
    pub context: ProxyToken,
    /// (season number, episode-list URL) pairs.
    pub season_urls: Vec<(u32, String)>,
    /// (language code, track URL) pairs.
    pub subtitle_urls: Vec<(String, String)>,
}

async fn run_task(fetcher: &Fetcher, governor: &Governor, task: &FetchTask) -> TaskOutcome {
    let host = task.request.host().unwrap_or_else(|| "unknown".to_string());
    let _slot = match governor.acquire(&host).await {
        Ok(slot) => slot,
        Err(e) => return TaskOutcome::Failed(e.to_string()),
    };
    match fetcher.fetch(&task.request).await {
        Ok((body, _content_type)) => {
            TaskOutcome::Success(String::from_utf8_lossy(&body).into_owned())
        }
        Err(e) => TaskOutcome::Failed(e.to_string()),
    }
}

// =============================================================================
// Episode list wire format (internal deserialization)
// =============================================================================

#[derive(Debug, Deserialize)]
struct EpisodeListPayload {
    episodes: Vec<EpisodeRaw>,
}

#[derive(Debug, Deserialize)]
struct EpisodeRaw {
    number: u32,
    #[serde(alias = "name")]
    title: String,
    #[serde(default, alias = "description")]
    overview: String,
}

fn parse_episode_list(season: u32, body: &str) -> Result<Season, serde_json::Error> {
    let payload: EpisodeListPayload = serde_json::from_str(body)?;
    Ok(Season {
        number: season,
        episodes: payload
            .episodes
            .into_iter()
            .map(|e| Episode {
                season,
                number: e.number,
                title: e.title,
                overview: e.overview,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_episode_list() {
        let body = r#"{"episodes":[
            {"number":1,"title":"Pilot","overview":"First one"},
            {"number":2,"name":"Second","description":"Alias fields"}
        ]}"#;
        let season = parse_episode_list(3, body).unwrap();
        assert_eq!(season.number, 3);
        assert_eq!(season.episodes.len(), 2);
        assert_eq!(season.episodes[0].title, "Pilot");
        assert_eq!(season.episodes[1].title, "Second");
        assert_eq!(season.episodes[1].overview, "Alias fields");
        assert_eq!(season.episodes[1].season, 3);
    }

    #[test]
    fn test_parse_episode_list_rejects_garbage() {
        assert!(parse_episode_list(1, "<html>").is_err());
    }

    #[test]
    fn test_aggregate_all_failed() {
        let mut aggregate = AggregateResult::default();
        assert!(!aggregate.all_failed()); // empty is not "all failed"
        aggregate.insert("a".into(), TaskOutcome::Failed("boom".into()));
        aggregate.insert("b".into(), TaskOutcome::TimedOut);
        assert!(aggregate.all_failed());
        aggregate.insert("c".into(), TaskOutcome::Success("ok".into()));
        assert!(!aggregate.all_failed());
    }
}
