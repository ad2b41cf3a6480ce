//! Shared helpers for tests: fast clients, canned ecosyste.ms payloads and
//! an in-memory mentions source.

use crate::config::HttpConfig;
use crate::crawl::model::{
    Concept, Domain, Entity, EntityRef, Institution, Paper, Person, Project, Sdg,
};
use crate::error::{CrawlError, Result};
use crate::http::{RateLimitedClient, RetryPolicy};
use crate::scrapers::{MentionList, MentionsSource, PaperRecord, ProjectRecord};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Client with the production attempt budget but millisecond delays.
pub(crate) fn fast_client() -> RateLimitedClient {
    fast_client_with_token(CancellationToken::new())
}

pub(crate) fn fast_client_with_token(cancel: CancellationToken) -> RateLimitedClient {
    let config = HttpConfig {
        timeout_s: 5,
        ..HttpConfig::default()
    };
    RateLimitedClient::new(&config, None, cancel)
        .unwrap()
        .with_policy(RetryPolicy {
            max_attempts: 3,
            retry_delay: Duration::from_millis(5),
            rate_limit_margin: Duration::from_millis(5),
        })
}

/// ecosyste.ms project document.
pub(crate) fn project_json(base: &str, ecosystem: &str, name: &str, czi_id: &str) -> Value {
    json!({
        "czi_id": czi_id,
        "ecosystem": ecosystem,
        "name": name,
        "package": {
            "homepage": format!("https://{}.example.org", name),
            "repository_url": format!("https://github.com/example/{}", name),
        },
        "mentions_url": format!("{}/api/v1/projects/{}/{}/mentions", base, ecosystem, name),
    })
}

/// ecosyste.ms paper document with one author, one institution and one of
/// each tag kind.
pub(crate) fn paper_json(base: &str, key: &str) -> Value {
    json!({
        "openalex_id": format!("https://openalex.org/W{}", key),
        "title": format!("Paper {}", key),
        "doi": format!("10.1000/{}", key),
        "mentions_url": format!("{}/api/v1/papers/{}/mentions", base, key),
        "openalex_data": {
            "authorships": [{
                "author": {
                    "id": format!("https://openalex.org/A{}", key),
                    "display_name": format!("Author {}", key),
                    "orcid": null
                },
                "institutions": [{
                    "id": "https://openalex.org/I1",
                    "display_name": "Example University",
                    "ror": "https://ror.org/000001"
                }]
            }],
            "concepts": [{
                "id": "https://openalex.org/C41008148",
                "display_name": "Computer science",
                "wikidata": "https://www.wikidata.org/wiki/Q21198",
                "level": 0,
                "score": 0.42
            }],
            "mesh": [{
                "descriptor_ui": "D000465",
                "descriptor_name": "Algorithms",
                "is_major_topic": true
            }],
            "sustainable_development_goals": [{
                "id": "https://metadata.un.org/sdg/4",
                "display_name": "Quality education",
                "score": 0.31
            }]
        }
    })
}

pub(crate) fn paper_mentions_json(base: &str, keys: &[&str]) -> Value {
    Value::Array(
        keys.iter()
            .map(|k| json!({ "paper_url": format!("{}/api/v1/papers/{}", base, k) }))
            .collect(),
    )
}

pub(crate) fn project_mentions_json(base: &str, projects: &[(&str, &str)]) -> Value {
    Value::Array(
        projects
            .iter()
            .map(|(eco, name)| {
                json!({ "project_url": format!("{}/api/v1/projects/{}/{}", base, eco, name) })
            })
            .collect(),
    )
}

/// One entity of every kind, cross-referenced the way a crawl would emit them.
pub(crate) fn sample_entities() -> Vec<Entity> {
    let institution = EntityRef::new("https://openalex.org/I1", "Example University");
    let author = EntityRef::new("https://openalex.org/A1", "Ada Lovelace");
    let project = EntityRef::new("7", "pypi:keras");
    let concept = EntityRef::new("https://openalex.org/C41008148", "Computer science");
    let domain = EntityRef::new("D000465", "Algorithms");
    let sdg = EntityRef::new("https://metadata.un.org/sdg/4", "Quality education");

    vec![
        Entity::Institution(Institution {
            id: institution.id.clone(),
            display_name: institution.name.clone(),
            ror: Some("https://ror.org/000001".into()),
        }),
        Entity::Person(Person {
            id: author.id.clone(),
            display_name: author.name.clone(),
            orcid: Some("https://orcid.org/0000-0001-2345-6789".into()),
            affiliated_institutions: vec![institution],
        }),
        Entity::Sdg(Sdg {
            id: sdg.id.clone(),
            display_name: sdg.name.clone(),
            score: Some(0.31),
        }),
        Entity::Concept(Concept {
            id: concept.id.clone(),
            display_name: concept.name.clone(),
            wikidata: Some("https://www.wikidata.org/wiki/Q21198".into()),
            level: Some(0),
            score: Some(0.42),
        }),
        Entity::Domain(Domain {
            id: domain.id.clone(),
            display_name: domain.name.clone(),
            is_major_topic: Some(true),
        }),
        Entity::Project(Project {
            id: project.id.clone(),
            ecosystem: "pypi".into(),
            name: "keras".into(),
            homepage: Some("https://keras.io".into()),
            repository_url: None,
        }),
        Entity::Paper(Paper {
            id: "https://openalex.org/W1".into(),
            title: Some("Deep learning, with commas; and semicolons".into()),
            doi: Some("10.1000/1".into()),
            authors: vec![author],
            cited_projects: vec![project],
            concepts: vec![concept],
            domains: vec![domain],
            sdgs: vec![sdg],
        }),
    ]
}

/// In-memory [`MentionsSource`] with call counting, optional per-call delay
/// and URLs that always fail.
#[derive(Default)]
pub(crate) struct StaticSource {
    projects: HashMap<String, ProjectRecord>,
    papers: HashMap<String, PaperRecord>,
    mentions: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    interrupted: HashSet<String>,
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StaticSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a project at `url` whose mentions list holds `papers`.
    pub(crate) fn with_project(mut self, url: &str, ecosystem: &str, name: &str, papers: &[&str]) -> Self {
        let mentions_url = format!("{}/mentions", url);
        self.mentions.insert(
            mentions_url.clone(),
            papers.iter().map(|p| p.to_string()).collect(),
        );
        self.projects.insert(
            url.to_string(),
            ProjectRecord {
                project: Project {
                    id: format!("{}:{}", ecosystem, name),
                    ecosystem: ecosystem.to_string(),
                    name: name.to_string(),
                    homepage: None,
                    repository_url: None,
                },
                mentions_url: Some(mentions_url),
            },
        );
        self
    }

    /// Register a paper at `url` mentioning the projects in `projects`.
    /// Every paper shares one institution, concept, domain and SDG.
    pub(crate) fn with_paper(mut self, url: &str, key: &str, projects: &[&str]) -> Self {
        let mentions_url = format!("{}/mentions", url);
        self.mentions.insert(
            mentions_url.clone(),
            projects.iter().map(|p| p.to_string()).collect(),
        );
        let institution = Institution {
            id: "https://openalex.org/I1".into(),
            display_name: "Example University".into(),
            ror: None,
        };
        let person = Person {
            id: format!("https://openalex.org/A{}", key),
            display_name: format!("Author {}", key),
            orcid: None,
            affiliated_institutions: vec![EntityRef::new(&institution.id, &institution.display_name)],
        };
        let concept = Concept {
            id: "https://openalex.org/C1".into(),
            display_name: "Computer science".into(),
            wikidata: None,
            level: Some(0),
            score: Some(0.5),
        };
        let domain = Domain {
            id: "D000465".into(),
            display_name: "Algorithms".into(),
            is_major_topic: Some(false),
        };
        let sdg = Sdg {
            id: "https://metadata.un.org/sdg/4".into(),
            display_name: "Quality education".into(),
            score: Some(0.3),
        };
        let paper = Paper {
            id: format!("https://openalex.org/W{}", key),
            title: Some(format!("Paper {}", key)),
            doi: None,
            authors: vec![EntityRef::new(&person.id, &person.display_name)],
            cited_projects: Vec::new(),
            concepts: vec![EntityRef::new(&concept.id, &concept.display_name)],
            domains: vec![EntityRef::new(&domain.id, &domain.display_name)],
            sdgs: vec![EntityRef::new(&sdg.id, &sdg.display_name)],
        };
        self.papers.insert(
            url.to_string(),
            PaperRecord {
                paper,
                persons: vec![person],
                institutions: vec![institution],
                concepts: vec![concept],
                domains: vec![domain],
                sdgs: vec![sdg],
                mentions_url: Some(mentions_url),
            },
        );
        self
    }

    /// Every request for `url` answers 500.
    pub(crate) fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Every request for `url` reports the crawl as cancelled, like a
    /// client whose token fired mid-request.
    pub(crate) fn interrupted(mut self, url: &str) -> Self {
        self.interrupted.insert(url.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of concurrent `fetch_paper` calls observed.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, url: &str) -> Result<()> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.interrupted.contains(url) {
            return Err(CrawlError::Cancelled);
        }
        if self.failing.contains(url) {
            return Err(CrawlError::Http {
                url: url.to_string(),
                status: 500,
                reason: "Internal Server Error".into(),
            });
        }
        Ok(())
    }

    fn not_found(url: &str) -> CrawlError {
        CrawlError::Http {
            url: url.to_string(),
            status: 404,
            reason: "Not Found".into(),
        }
    }

    fn list(&self, mentions_url: &str) -> Result<MentionList> {
        let urls = self
            .mentions
            .get(mentions_url)
            .cloned()
            .ok_or_else(|| Self::not_found(mentions_url))?;
        Ok(MentionList {
            total_count: Some(urls.len() as u64),
            total_pages: Some(1),
            urls,
            partial: false,
        })
    }
}

#[async_trait]
impl MentionsSource for StaticSource {
    async fn fetch_project(&self, url: &str) -> Result<ProjectRecord> {
        self.enter(url).await?;
        self.projects
            .get(url)
            .cloned()
            .ok_or_else(|| Self::not_found(url))
    }

    async fn fetch_paper(&self, url: &str) -> Result<PaperRecord> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.enter(url).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result?;
        self.papers
            .get(url)
            .cloned()
            .ok_or_else(|| Self::not_found(url))
    }

    async fn paper_urls(&self, mentions_url: &str) -> Result<MentionList> {
        self.enter(mentions_url).await?;
        self.list(mentions_url)
    }

    async fn project_urls(&self, mentions_url: &str) -> Result<MentionList> {
        self.enter(mentions_url).await?;
        self.list(mentions_url)
    }

    async fn mention_count(&self, mentions_url: &str) -> Result<u64> {
        self.enter(mentions_url).await?;
        Ok(self.list(mentions_url)?.urls.len() as u64)
    }
}
