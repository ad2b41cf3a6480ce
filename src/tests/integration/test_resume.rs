use super::test_crawl_pipeline::{mount_paper, mount_project, output, read_csv};
use crate::checkpoint::{Checkpoint, load_checkpoint};
use crate::config::OutputFormat;
use crate::crawl::{CrawlOptions, CrawlReport, CrawlState, Crawler, Flusher, join_flusher};
use crate::scrapers::{EcosystemsSource, MentionsSource};
use crate::sink::build_sink;
use crate::test_utilities::fast_client;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn run(
    dir: &TempDir,
    checkpoint: &Path,
    seeds: &[String],
    resume: bool,
) -> Result<CrawlReport, Box<dyn std::error::Error>> {
    let state = Arc::new(CrawlState::default());
    let previous: Option<Checkpoint> = if resume {
        load_checkpoint(checkpoint)?
    } else {
        None
    };
    if let Some(cp) = &previous {
        cp.restore_into(&state);
    }

    let producer = state.producer();
    let flusher = Flusher::new(
        Arc::clone(&state),
        build_sink(&output(dir, vec![OutputFormat::Csv]), resume)?,
        Duration::from_millis(5),
    )
    .with_checkpoint(checkpoint.to_path_buf(), seeds.to_vec(), previous.as_ref())
    .spawn();

    let source: Arc<dyn MentionsSource> = Arc::new(EcosystemsSource::new(fast_client(), 50));
    let crawler = Crawler::new(source, state, CrawlOptions::default(), CancellationToken::new());
    let report = crawler.process_all(seeds).await;
    drop(producer);
    join_flusher(flusher).await?;
    Ok(report)
}

async fn project_requests(server: &MockServer, project_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == project_path)
        .count()
}

/// Test that a resumed run does not refetch a completed project or rewrite
/// its rows.
#[tokio::test]
async fn test_resume_skips_completed_projects() -> Result<(), Box<dyn std::error::Error>> {
    let server = MockServer::start().await;
    mount_project(&server, "pypi", "keras", &["1", "2"]).await;
    mount_paper(&server, "1", &[]).await;
    mount_paper(&server, "2", &[]).await;

    let dir = TempDir::new()?;
    let checkpoint = dir.path().join("checkpoints").join("run.json");
    let seeds = vec![format!("{}/api/v1/projects/pypi/keras", server.uri())];

    let first = run(&dir, &checkpoint, &seeds, false).await?;
    assert_eq!(first.papers_ok, 2);
    let cp = load_checkpoint(&checkpoint)?.unwrap();
    assert_eq!(cp.completed_projects, seeds);

    let second = run(&dir, &checkpoint, &seeds, true).await?;
    assert_eq!(second.projects_skipped, 1);
    assert_eq!(project_requests(&server, "/api/v1/projects/pypi/keras").await, 1);

    let rows = read_csv(&dir.path().join("run.csv"));
    assert_eq!(rows.len(), 9);
    Ok(())
}

/// Test resuming after a paper failed: only the missing paper is fetched and
/// the project is completed.
#[tokio::test]
async fn test_resume_finishes_an_interrupted_project() -> Result<(), Box<dyn std::error::Error>> {
    let server = MockServer::start().await;
    mount_project(&server, "pypi", "keras", &["1", "2"]).await;
    mount_paper(&server, "1", &[]).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/papers/2"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new()?;
    let checkpoint = dir.path().join("run.json");
    let seeds = vec![format!("{}/api/v1/projects/pypi/keras", server.uri())];

    let first = run(&dir, &checkpoint, &seeds, false).await?;
    assert_eq!(first.papers_failed, 1);
    let cp = load_checkpoint(&checkpoint)?.unwrap();
    assert!(cp.completed_projects.is_empty());
    assert_eq!(cp.written_count(), 7);

    server.reset().await;
    mount_project(&server, "pypi", "keras", &["1", "2"]).await;
    mount_paper(&server, "1", &[]).await;
    mount_paper(&server, "2", &[]).await;

    let second = run(&dir, &checkpoint, &seeds, true).await?;
    assert_eq!(second.projects_ok, 1);
    assert_eq!(second.papers_ok, 1);
    assert_eq!(second.papers_skipped, 1);

    let rows = read_csv(&dir.path().join("run.csv"));
    let ids: HashSet<(String, String)> = rows
        .iter()
        .map(|r| (r.label.clone(), r.id.clone()))
        .collect();
    assert_eq!(ids.len(), rows.len());
    assert_eq!(rows.len(), 9);
    assert!(ids.contains(&("Paper".to_string(), "https://openalex.org/W2".to_string())));
    assert_eq!(load_checkpoint(&checkpoint)?.unwrap().completed_projects, seeds);
    Ok(())
}
