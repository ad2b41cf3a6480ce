use crate::config::{OutputConfig, OutputFormat};
use crate::crawl::model::{EntityGroups, EntityKind};
use crate::crawl::{CrawlOptions, CrawlState, Crawler, Flusher, ScopeEstimator, join_flusher};
use crate::scrapers::{EcosystemsSource, MentionsSource};
use crate::sink::{EntityRow, build_sink};
use crate::test_utilities::{
    fast_client, paper_json, paper_mentions_json, project_json, project_mentions_json,
};
use serde_json::json;
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(super) async fn mount_project(server: &MockServer, ecosystem: &str, name: &str, papers: &[&str]) {
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/projects/{}/{}", ecosystem, name)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(project_json(&base, ecosystem, name, name)),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/projects/{}/{}/mentions", ecosystem, name)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(paper_mentions_json(&base, papers))
                .insert_header("total-count", papers.len().to_string().as_str()),
        )
        .mount(server)
        .await;
}

pub(super) async fn mount_paper(server: &MockServer, key: &str, projects: &[(&str, &str)]) {
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/papers/{}", key)))
        .respond_with(ResponseTemplate::new(200).set_body_json(paper_json(&base, key)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/papers/{}/mentions", key)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(project_mentions_json(&base, projects)),
        )
        .mount(server)
        .await;
}

pub(super) fn output(dir: &TempDir, formats: Vec<OutputFormat>) -> OutputConfig {
    OutputConfig {
        directory: dir.path().to_path_buf(),
        file_stem: "run".into(),
        formats,
    }
}

pub(super) fn read_csv(path: &std::path::Path) -> Vec<EntityRow> {
    csv::Reader::from_path(path)
        .unwrap()
        .deserialize()
        .map(|r| r.unwrap())
        .collect()
}

/// Test a crawl of ten projects where one always answers 500; the other
/// nine are written.
#[tokio::test]
async fn test_one_failing_project_out_of_ten() -> Result<(), Box<dyn std::error::Error>> {
    let server = MockServer::start().await;
    let mut seeds = Vec::new();
    for i in 0..10 {
        let name = format!("p{}", i);
        let key = i.to_string();
        if i == 5 {
            Mock::given(method("GET"))
                .and(path("/api/v1/projects/pypi/p5"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&server)
                .await;
        } else {
            mount_project(&server, "pypi", &name, &[&key]).await;
            mount_paper(&server, &key, &[]).await;
        }
        seeds.push(format!("{}/api/v1/projects/pypi/{}", server.uri(), name));
    }

    let dir = TempDir::new()?;
    let state = Arc::new(CrawlState::default());
    let producer = state.producer();
    let flusher = Flusher::new(
        Arc::clone(&state),
        build_sink(&output(&dir, vec![OutputFormat::Csv]), false)?,
        Duration::from_millis(5),
    )
    .spawn();

    let source: Arc<dyn MentionsSource> = Arc::new(EcosystemsSource::new(fast_client(), 50));
    let crawler = Crawler::new(source, Arc::clone(&state), CrawlOptions::default(), CancellationToken::new());
    let report = crawler.process_all(&seeds).await;
    drop(producer);
    let summary = join_flusher(flusher).await?;

    assert_eq!(report.projects_ok, 9);
    assert_eq!(report.projects_failed, 1);
    assert_eq!(summary.written[&EntityKind::Project], 9);
    assert_eq!(summary.written[&EntityKind::Paper], 9);

    let rows = read_csv(&dir.path().join("run.csv"));
    let projects: HashSet<String> = rows
        .iter()
        .filter(|r| r.label == "Project")
        .filter_map(|r| r.name.clone())
        .collect();
    assert_eq!(projects.len(), 9);
    assert!(!projects.contains("pypi:p5"));
    assert!(projects.contains("pypi:p9"));
    Ok(())
}

/// Test a two-round recursive crawl written to CSV and JSON with no
/// duplicate rows.
#[tokio::test]
async fn test_recursive_crawl_to_csv_and_json() -> Result<(), Box<dyn std::error::Error>> {
    let server = MockServer::start().await;
    mount_project(&server, "pypi", "keras", &["1", "2"]).await;
    mount_project(&server, "cran", "OpenML", &["2", "3"]).await;
    mount_paper(&server, "1", &[("pypi", "keras")]).await;
    mount_paper(&server, "2", &[("pypi", "keras"), ("cran", "OpenML")]).await;
    mount_paper(&server, "3", &[("cran", "OpenML")]).await;
    // Listed as co-mentioned but gone.
    Mock::given(method("GET"))
        .and(path("/api/v1/papers/3/mentions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "project_url": format!("{}/api/v1/projects/cran/OpenML", server.uri()) },
            { "project_url": format!("{}/api/v1/projects/npm/gone", server.uri()) }
        ])))
        .with_priority(1)
        .mount(&server)
        .await;

    let dir = TempDir::new()?;
    let state = Arc::new(CrawlState::default());
    let producer = state.producer();
    let flusher = Flusher::new(
        Arc::clone(&state),
        build_sink(&output(&dir, vec![OutputFormat::Csv, OutputFormat::Json]), false)?,
        Duration::from_millis(5),
    )
    .spawn();

    let source: Arc<dyn MentionsSource> = Arc::new(EcosystemsSource::new(fast_client(), 50));
    let options = CrawlOptions {
        worker_count: 3,
        recurse_into_mentions: true,
    };
    let crawler = Crawler::new(Arc::clone(&source), Arc::clone(&state), options, CancellationToken::new());
    let seed = format!("{}/api/v1/projects/pypi/keras", server.uri());
    let first = crawler.process_all(&[seed]).await;
    assert_eq!(first.papers_ok, 2);

    let openml = format!("{}/api/v1/projects/cran/OpenML", server.uri());
    assert_eq!(state.frontier().snapshot(), vec![openml]);
    let estimate = ScopeEstimator::new(Arc::clone(&source), Arc::clone(&state))
        .estimate(&state.frontier().snapshot())
        .await?;
    assert_eq!(estimate.total_estimate, 2);

    let second = crawler.crawl_frontier().await;
    assert_eq!(second.papers_ok, 1);
    assert_eq!(second.papers_skipped, 1);
    drop(producer);
    let summary = join_flusher(flusher).await?;
    assert_eq!(summary.files.len(), 2);

    let rows = read_csv(&dir.path().join("run.csv"));
    let ids: Vec<(String, String)> = rows
        .iter()
        .map(|r| (r.label.clone(), r.id.clone()))
        .collect();
    let unique: HashSet<&(String, String)> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
    // 2 projects, 3 papers, 3 persons, 1 institution, concept, domain and SDG.
    assert_eq!(rows.len(), 12);

    let paper2 = rows
        .iter()
        .find(|r| r.id == "https://openalex.org/W2")
        .unwrap();
    assert_eq!(
        paper2.cited_projects.as_deref(),
        Some("pypi:keras; cran:OpenML")
    );
    assert_eq!(paper2.authors.as_deref(), Some("Author 2"));

    let groups: EntityGroups =
        serde_json::from_str(&fs::read_to_string(dir.path().join("run.json"))?)?;
    assert_eq!(groups.len(), 12);
    assert_eq!(groups.papers.len(), 3);
    assert_eq!(groups.projects.len(), 2);
    let paper3 = groups
        .papers
        .iter()
        .find(|p| p.id == "https://openalex.org/W3")
        .unwrap();
    assert_eq!(paper3.cited_projects.len(), 1);
    assert_eq!(paper3.cited_projects[0].name, "cran:OpenML");
    Ok(())
}
