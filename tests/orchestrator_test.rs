//! Fetch orchestrator tests
//!
//! Scatter/gather with a deadline: partial success, timed-out task marking,
//! late-result discarding, and title bundle assembly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tvproxy::orchestrate::{FetchTask, Orchestrator, TaskKind, TaskOutcome, TitleRequest};
use tvproxy::proxy::{Fetcher, Governor, ProxyToken};

fn orchestrator() -> Orchestrator {
    // Fetch timeout deliberately longer than any gather deadline used here,
    // so a stalled upstream is seen as TimedOut, not a fetch failure.
    let fetcher = Arc::new(Fetcher::new(Duration::from_secs(30)));
    let governor = Arc::new(Governor::new(6, Duration::from_secs(30)));
    Orchestrator::new(fetcher, governor)
}

/// An upstream that accepts connections and never answers
async fn stalling_upstream() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_gather_marks_stalled_task_timed_out_without_blocking() {
    let mut upstream = mockito::Server::new_async().await;
    for i in [1, 2, 4, 5] {
        upstream
            .mock("GET", format!("/meta/{i}.json").as_str())
            .with_status(200)
            .with_body(format!("payload-{i}"))
            .create_async()
            .await;
    }
    let stalled = stalling_upstream().await;

    let mut tasks: Vec<FetchTask> = [1, 2, 4, 5]
        .iter()
        .map(|i| {
            FetchTask::new(
                format!("task:{i}"),
                TaskKind::Raw,
                ProxyToken::new(format!("{}/meta/{i}.json", upstream.url())),
            )
        })
        .collect();
    tasks.insert(
        2,
        FetchTask::new(
            "task:3",
            TaskKind::Raw,
            ProxyToken::new(format!("http://{stalled}/meta/3.json")),
        ),
    );

    let started = Instant::now();
    let aggregate = orchestrator()
        .gather(tasks, Duration::from_millis(500))
        .await;

    // Returned at the deadline, not when the stalled task gives up.
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(aggregate.len(), 5);
    assert_eq!(aggregate.success_count(), 4);
    assert_eq!(
        aggregate.outcome("task:3"),
        Some(&TaskOutcome::TimedOut)
    );
    assert_eq!(
        aggregate.outcome("task:1").and_then(|o| o.as_text()),
        Some("payload-1")
    );
}

#[tokio::test]
async fn test_gather_discards_work_finishing_after_deadline() {
    // The stalled upstream *would* eventually answer, but the deadline aborts
    // the task; its result is discarded, never absorbed late.
    let stalled = stalling_upstream().await;
    let tasks = vec![FetchTask::new(
        "late",
        TaskKind::Raw,
        ProxyToken::new(format!("http://{stalled}/slow.json")),
    )];

    let aggregate = orchestrator()
        .gather(tasks, Duration::from_millis(200))
        .await;
    assert_eq!(aggregate.outcome("late"), Some(&TaskOutcome::TimedOut));
    assert_eq!(aggregate.success_count(), 0);
}

#[tokio::test]
async fn test_gather_records_per_task_failures() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("GET", "/ok.json")
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;
    upstream
        .mock("GET", "/missing.json")
        .with_status(404)
        .create_async()
        .await;

    let tasks = vec![
        FetchTask::new(
            "good",
            TaskKind::Raw,
            ProxyToken::new(format!("{}/ok.json", upstream.url())),
        ),
        FetchTask::new(
            "bad",
            TaskKind::Raw,
            ProxyToken::new(format!("{}/missing.json", upstream.url())),
        ),
    ];

    let aggregate = orchestrator().gather(tasks, Duration::from_secs(5)).await;
    assert_eq!(aggregate.success_count(), 1);
    assert!(!aggregate.all_failed());
    assert!(matches!(
        aggregate.outcome("bad"),
        Some(TaskOutcome::Failed(reason)) if reason.contains("404")
    ));
}

#[tokio::test]
async fn test_gather_all_failed_marks_aggregate_failed() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("GET", "/a.json")
        .with_status(500)
        .create_async()
        .await;
    upstream
        .mock("GET", "/b.json")
        .with_status(502)
        .create_async()
        .await;

    let tasks = vec![
        FetchTask::new(
            "a",
            TaskKind::Raw,
            ProxyToken::new(format!("{}/a.json", upstream.url())),
        ),
        FetchTask::new(
            "b",
            TaskKind::Raw,
            ProxyToken::new(format!("{}/b.json", upstream.url())),
        ),
    ];

    let aggregate = orchestrator().gather(tasks, Duration::from_secs(5)).await;
    assert!(aggregate.all_failed());
}

#[tokio::test]
async fn test_open_title_assembles_partial_bundle() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("GET", "/seasons/1.json")
        .with_status(200)
        .with_body(r#"{"episodes":[{"number":1,"title":"Pilot"},{"number":2,"title":"Two"}]}"#)
        .create_async()
        .await;
    upstream
        .mock("GET", "/seasons/2.json")
        .with_status(404)
        .create_async()
        .await;
    upstream
        .mock("GET", "/subs/eng.srt")
        .with_status(200)
        .with_body("1\n00:00:01,000 --> 00:00:02,000\nHello\n")
        .create_async()
        .await;

    let request = TitleRequest {
        title: "Example Show".to_string(),
        context: ProxyToken::new(format!("{}/title", upstream.url())),
        season_urls: vec![
            (1, format!("{}/seasons/1.json", upstream.url())),
            (2, format!("{}/seasons/2.json", upstream.url())),
        ],
        subtitle_urls: vec![("eng".to_string(), format!("{}/subs/eng.srt", upstream.url()))],
    };

    let bundle = orchestrator()
        .open_title(request, Duration::from_secs(5))
        .await;

    assert_eq!(bundle.title, "Example Show");

    // Season 1 arrived and parsed; season 2 is a recorded failure.
    assert_eq!(bundle.seasons.len(), 1);
    assert_eq!(bundle.seasons[0].number, 1);
    assert_eq!(bundle.seasons[0].episodes.len(), 2);
    assert_eq!(bundle.seasons[0].episodes[0].title, "Pilot");
    assert!(bundle
        .failures
        .iter()
        .any(|(id, reason)| id == "season:2" && reason.contains("404")));

    // Subtitle fetched and normalized to WebVTT.
    assert_eq!(bundle.subtitles.len(), 1);
    assert_eq!(bundle.subtitles[0].language, "eng");
    assert_eq!(bundle.subtitles[0].label, "English");
    assert!(bundle.subtitles[0].body.starts_with("WEBVTT"));
    assert!(bundle.subtitles[0]
        .body
        .contains("00:00:01.000 --> 00:00:02.000"));
}

#[tokio::test]
async fn test_gather_shares_the_governor_with_playback() {
    // Capacity 1 and a slot already held: every task must report the
    // governor timeout instead of bypassing the bound.
    let fetcher = Arc::new(Fetcher::new(Duration::from_secs(30)));
    let governor = Arc::new(Governor::new(1, Duration::from_millis(100)));
    let orchestrator = Orchestrator::new(fetcher, Arc::clone(&governor));

    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("GET", "/meta.json")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let _held = governor.acquire("127.0.0.1").await.unwrap();
    let tasks = vec![FetchTask::new(
        "blocked",
        TaskKind::Raw,
        ProxyToken::new(format!("{}/meta.json", upstream.url())),
    )];

    let aggregate = orchestrator.gather(tasks, Duration::from_secs(5)).await;
    assert!(matches!(
        aggregate.outcome("blocked"),
        Some(TaskOutcome::Failed(reason)) if reason.contains("slot")
    ));
}
