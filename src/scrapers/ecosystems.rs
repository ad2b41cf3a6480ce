//! ecosyste.ms papers API (project lookup, paper lookup, mention lists).
//!
//! Papers carry their OpenAlex record, from which persons, institutions,
//! concepts, MeSH domains and SDGs are extracted.

use crate::crawl::model::{Paper, Project};
use crate::error::{CrawlError, Result};
use crate::http::pagination::TOTAL_COUNT;
use crate::http::{PageWalker, PaginationStyle, RateLimitedClient};
use crate::logger;
use crate::scrapers::openalex::OpenAlexData;
use crate::scrapers::scraper::{MentionList, MentionsSource, PaperRecord, ProjectRecord};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Turn a seed into a project URL. Accepts a full URL or `ecosystem:name`.
pub fn project_url(api_base: &str, seed: &str) -> Result<String> {
    let seed = seed.trim();
    if seed.starts_with("http://") || seed.starts_with("https://") {
        return Ok(seed.to_string());
    }
    match seed.split_once(':') {
        Some((ecosystem, name)) if !ecosystem.is_empty() && !name.is_empty() => Ok(format!(
            "{}/api/v1/projects/{}/{}",
            api_base.trim_end_matches('/'),
            ecosystem,
            name
        )),
        _ => Err(CrawlError::Config(format!(
            "seed must be a project URL or ecosystem:name, got {:?}",
            seed
        ))),
    }
}

/// czi ids arrive as either strings or integers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(i64),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            IdValue::Text(s) => s,
            IdValue::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    czi_id: Option<IdValue>,
    id: Option<IdValue>,
    ecosystem: String,
    name: String,
    package: Option<PackageResponse>,
    mentions_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PackageResponse {
    homepage: Option<String>,
    repository_url: Option<String>,
}

impl From<ProjectResponse> for ProjectRecord {
    fn from(resp: ProjectResponse) -> Self {
        let id = resp
            .czi_id
            .or(resp.id)
            .map(IdValue::into_string)
            .unwrap_or_else(|| format!("{}:{}", resp.ecosystem, resp.name));
        let (homepage, repository_url) = match resp.package {
            Some(p) => (p.homepage, p.repository_url),
            None => (None, None),
        };
        ProjectRecord {
            project: Project {
                id,
                ecosystem: resp.ecosystem,
                name: resp.name,
                homepage,
                repository_url,
            },
            mentions_url: resp.mentions_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaperResponse {
    openalex_id: Option<String>,
    title: Option<String>,
    doi: Option<String>,
    openalex_data: Option<OpenAlexData>,
    mentions_url: Option<String>,
}

impl PaperResponse {
    fn into_record(self, url: &str) -> Result<PaperRecord> {
        let id = self
            .openalex_id
            .or_else(|| self.doi.clone())
            .ok_or_else(|| CrawlError::Parse(format!("paper at {} has no identifier", url)))?;
        let paper = Paper {
            id,
            title: self.title,
            doi: self.doi,
            ..Paper::default()
        };
        Ok(self
            .openalex_data
            .unwrap_or_default()
            .into_record(paper, self.mentions_url))
    }
}

#[derive(Debug, Deserialize)]
struct PaperMention {
    paper_url: String,
}

#[derive(Debug, Deserialize)]
struct ProjectMention {
    project_url: String,
}

/// [`MentionsSource`] backed by the ecosyste.ms papers API.
#[derive(Clone)]
pub struct EcosystemsSource {
    client: RateLimitedClient,
    per_page: u32,
}

impl EcosystemsSource {
    pub fn new(client: RateLimitedClient, per_page: u32) -> Self {
        Self {
            client,
            per_page: per_page.max(1),
        }
    }

    /// Walk every page, keeping what was gathered if a later page fails.
    /// A failure before any URL was gathered is an error for the caller.
    async fn walk<T, F>(&self, mentions_url: &str, url_of: F) -> Result<MentionList>
    where
        T: DeserializeOwned + Send,
        F: Fn(T) -> String + Send,
    {
        let mut walker: PageWalker<T> = PageWalker::new(
            self.client.clone(),
            mentions_url,
            PaginationStyle::PageNumber {
                per_page: self.per_page,
            },
        );
        let mut list = MentionList::default();
        loop {
            match walker.next_page().await {
                Ok(Some(items)) => list.urls.extend(items.into_iter().map(&url_of)),
                Ok(None) => break,
                Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
                Err(e) if list.urls.is_empty() => return Err(e),
                Err(e) => {
                    logger::warn(&format!(
                        "Mentions walk of {} stopped after {} pages: {}",
                        mentions_url,
                        walker.pages_fetched(),
                        e
                    ));
                    list.partial = true;
                    break;
                }
            }
        }
        list.total_count = walker.total_count();
        list.total_pages = walker.total_pages();
        Ok(list)
    }
}

#[async_trait]
impl MentionsSource for EcosystemsSource {
    async fn fetch_project(&self, url: &str) -> Result<ProjectRecord> {
        let resp: ProjectResponse = self.client.fetch(url, &[]).await?.json()?;
        Ok(resp.into())
    }

    async fn fetch_paper(&self, url: &str) -> Result<PaperRecord> {
        let resp: PaperResponse = self.client.fetch(url, &[]).await?.json()?;
        resp.into_record(url)
    }

    async fn paper_urls(&self, mentions_url: &str) -> Result<MentionList> {
        self.walk(mentions_url, |m: PaperMention| m.paper_url).await
    }

    async fn project_urls(&self, mentions_url: &str) -> Result<MentionList> {
        self.walk(mentions_url, |m: ProjectMention| m.project_url)
            .await
    }

    async fn mention_count(&self, mentions_url: &str) -> Result<u64> {
        let resp = self
            .client
            .fetch(mentions_url, &[("page", "1"), ("per_page", "1")])
            .await?;
        match resp.header_u64(TOTAL_COUNT) {
            Some(count) => Ok(count),
            None => match resp.body.as_array() {
                Some(items) if items.is_empty() => Ok(0),
                _ => Err(CrawlError::Parse(format!(
                    "no {} header from {}",
                    TOTAL_COUNT, mentions_url
                ))),
            },
        }
    }
}
