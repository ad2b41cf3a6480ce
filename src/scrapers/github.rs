//! GitHub repository harvester.
//!
//! One repository becomes a Project. The people around it become Persons:
//! contributors, plus everyone who opened or commented on an issue, named
//! from their public profile where one is set. When the README, a
//! `CITATION.cff` or the description carries a DOI, the paper behind it is
//! fetched from OpenAlex and emitted as citing the repository.
//!
//! Requires a token; unauthenticated GitHub quotas are too small for issue
//! and profile walks.

use crate::config::GithubConfig;
use crate::crawl::model::{Entity, EntityRef, Person, Project};
use crate::crawl::state::{CrawlState, ProjectLookup};
use crate::error::{CrawlError, Result};
use crate::http::{PageWalker, PaginationStyle, RateLimitedClient};
use crate::logger;
use crate::scrapers::openalex::OpenAlexWork;
use crate::scrapers::scraper::PaperRecord;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::LazyLock;
use tokio::task::JoinSet;

pub const GITHUB_ECOSYSTEM: &str = "github";

static DOI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(10\.\d{4,9}/[-._;()/:A-Z0-9]+)").expect("valid DOI pattern")
});

/// First DOI in `text`, without trailing sentence punctuation.
pub fn find_doi(text: &str) -> Option<String> {
    DOI_RE
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':']).to_string())
}

#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    id: u64,
    full_name: String,
    html_url: String,
    homepage: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRef {
    login: String,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContributorResponse {
    login: String,
    html_url: Option<String>,
    #[serde(default)]
    contributions: u64,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    user: Option<UserRef>,
    #[serde(default)]
    comments: u64,
    comments_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    user: Option<UserRef>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    name: Option<String>,
}

/// A file from the contents API; `content` is base64 with line breaks.
#[derive(Debug, Deserialize)]
struct FileResponse {
    content: Option<String>,
}

impl FileResponse {
    fn text(&self) -> Option<String> {
        let packed: String = self
            .content
            .as_deref()?
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = STANDARD.decode(packed).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    name: String,
    url: String,
}

/// Counts from one repository harvest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub project_emitted: bool,
    /// Contributor records read, repeats included.
    pub contributors_seen: usize,
    /// Issue authors and commenters who are not also contributors.
    pub participants_seen: usize,
    /// People whose profile carried a real name.
    pub profiles_resolved: usize,
    pub persons_emitted: usize,
    pub doi: Option<String>,
    pub paper_emitted: bool,
    /// A contributor, issue or comment walk stopped early on an error.
    pub partial: bool,
}

struct Member {
    login: String,
    html_url: Option<String>,
}

/// Everyone seen around the repository, first sighting first.
#[derive(Default)]
struct People {
    members: Vec<Member>,
    logins: HashSet<String>,
}

impl People {
    fn add(&mut self, login: String, html_url: Option<String>) -> bool {
        if !self.logins.insert(login.clone()) {
            return false;
        }
        self.members.push(Member { login, html_url });
        true
    }
}

pub struct GithubHarvester {
    client: RateLimitedClient,
    openalex: RateLimitedClient,
    base_url: String,
    openalex_url: String,
    per_page: u32,
}

impl GithubHarvester {
    /// `client` must carry the token; see [`GithubConfig::require_token`].
    /// `openalex` must not, since the token is for GitHub only.
    pub fn new(client: RateLimitedClient, openalex: RateLimitedClient, config: &GithubConfig) -> Self {
        Self {
            client,
            openalex,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            openalex_url: config.openalex_url.trim_end_matches('/').to_string(),
            per_page: config.per_page.clamp(1, 100),
        }
    }

    /// Split `owner/name`.
    pub fn parse_repo(repo: &str) -> Result<(&str, &str)> {
        match repo.trim().split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok((owner, name))
            }
            _ => Err(CrawlError::Config(format!(
                "repository must be owner/name, got {:?}",
                repo
            ))),
        }
    }

    pub async fn harvest_repository(
        &self,
        owner: &str,
        repo: &str,
        state: &CrawlState,
    ) -> Result<HarvestSummary> {
        let repo_url = format!("{}/repos/{}/{}", self.base_url, owner, repo);
        let resp: RepositoryResponse = self.client.fetch(&repo_url, &[]).await?.json()?;

        let project = Project {
            id: format!("{}:{}", GITHUB_ECOSYSTEM, resp.id),
            ecosystem: GITHUB_ECOSYSTEM.to_string(),
            name: resp.full_name,
            homepage: resp.homepage.filter(|h| !h.is_empty()),
            repository_url: Some(resp.html_url),
        };
        let project_ref = project.to_ref();
        state.cache_project(
            &repo_url,
            ProjectLookup {
                project: project_ref.clone(),
                mentions_url: None,
            },
        );

        let mut summary = HarvestSummary {
            project_emitted: state.emit(Entity::Project(project)).await?,
            ..HarvestSummary::default()
        };

        let mut people = People::default();
        self.collect_contributors(&repo_url, &mut people, &mut summary)
            .await?;
        self.collect_participants(&repo_url, &mut people, &mut summary)
            .await?;
        self.emit_people(people, state, &mut summary).await?;

        summary.doi = self
            .discover_doi(&repo_url, resp.description.as_deref())
            .await?;
        if let Some(doi) = &summary.doi {
            summary.paper_emitted = self.emit_paper(doi, &project_ref, state).await?;
        }

        logger::info(&format!(
            "Harvested {}/{}: {} contributors, {} other participants, DOI {}",
            owner,
            repo,
            summary.contributors_seen,
            summary.participants_seen,
            summary.doi.as_deref().unwrap_or("none")
        ));
        Ok(summary)
    }

    /// Walk a `Link`-paginated list, handing every item to `visit`.
    /// Returns `false` when a page failed and the walk stopped early.
    async fn walk<T, F>(&self, url: String, what: &str, mut visit: F) -> Result<bool>
    where
        T: DeserializeOwned,
        F: FnMut(T),
    {
        let mut walker: PageWalker<T> =
            PageWalker::new(self.client.clone(), url, PaginationStyle::LinkHeader);
        loop {
            match walker.next_page().await {
                Ok(Some(page)) => page.into_iter().for_each(&mut visit),
                Ok(None) => return Ok(true),
                Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
                Err(e) => {
                    logger::warn(&format!(
                        "{} stopped after {} pages: {}",
                        what,
                        walker.pages_fetched(),
                        e
                    ));
                    return Ok(false);
                }
            }
        }
    }

    async fn collect_contributors(
        &self,
        repo_url: &str,
        people: &mut People,
        summary: &mut HarvestSummary,
    ) -> Result<()> {
        let url = format!("{}/contributors?per_page={}", repo_url, self.per_page);
        let what = format!("Contributors of {}", repo_url);
        let complete = self
            .walk(url, &what, |contributor: ContributorResponse| {
                summary.contributors_seen += 1;
                logger::debug(&format!(
                    "{} has {} contributions",
                    contributor.login, contributor.contributions
                ));
                people.add(contributor.login, contributor.html_url);
            })
            .await?;
        summary.partial |= !complete;
        Ok(())
    }

    /// Issue authors and commenters. Pull requests come back from the
    /// issues endpoint too and are treated the same.
    async fn collect_participants(
        &self,
        repo_url: &str,
        people: &mut People,
        summary: &mut HarvestSummary,
    ) -> Result<()> {
        let url = format!("{}/issues?state=all&per_page={}", repo_url, self.per_page);
        let what = format!("Issues of {}", repo_url);
        let mut comment_urls = Vec::new();
        let complete = self
            .walk(url, &what, |issue: IssueResponse| {
                if let Some(user) = issue.user
                    && people.add(user.login, user.html_url)
                {
                    summary.participants_seen += 1;
                }
                if issue.comments > 0
                    && let Some(comments_url) = issue.comments_url
                {
                    comment_urls.push(comments_url);
                }
            })
            .await?;
        summary.partial |= !complete;

        for comments_url in comment_urls {
            let url = format!("{}?per_page={}", comments_url, self.per_page);
            let what = format!("Comments at {}", comments_url);
            let complete = self
                .walk(url, &what, |comment: CommentResponse| {
                    if let Some(user) = comment.user
                        && people.add(user.login, user.html_url)
                    {
                        summary.participants_seen += 1;
                    }
                })
                .await?;
            summary.partial |= !complete;
        }
        Ok(())
    }

    /// Look up every profile concurrently, then emit one Person per login.
    /// A missing profile only costs the real name.
    async fn emit_people(
        &self,
        people: People,
        state: &CrawlState,
        summary: &mut HarvestSummary,
    ) -> Result<()> {
        let mut lookups = JoinSet::new();
        for (index, member) in people.members.iter().enumerate() {
            let client = self.client.clone();
            let url = format!("{}/users/{}", self.base_url, member.login);
            lookups.spawn(async move {
                let profile = client
                    .fetch(&url, &[])
                    .await
                    .and_then(|resp| resp.json::<ProfileResponse>());
                (index, profile)
            });
        }

        let mut names: Vec<Option<String>> = vec![None; people.members.len()];
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((index, Ok(profile))) => {
                    names[index] = profile.name.filter(|n| !n.trim().is_empty());
                    if names[index].is_some() {
                        summary.profiles_resolved += 1;
                    }
                }
                Ok((_, Err(CrawlError::Cancelled))) => return Err(CrawlError::Cancelled),
                Ok((index, Err(e))) => logger::warn(&format!(
                    "No profile for {}: {}",
                    people.members[index].login, e
                )),
                Err(e) => logger::error(&format!("Profile lookup panicked: {}", e)),
            }
        }

        for (member, name) in people.members.into_iter().zip(names) {
            let person = Person {
                id: member
                    .html_url
                    .unwrap_or_else(|| format!("https://github.com/{}", member.login)),
                display_name: name.unwrap_or(member.login),
                orcid: None,
                affiliated_institutions: Vec::new(),
            };
            if state.emit(Entity::Person(person)).await? {
                summary.persons_emitted += 1;
            }
        }
        Ok(())
    }

    /// DOI from the README, then `CITATION.cff` (any capitalisation) at the
    /// repository root, then the description.
    async fn discover_doi(&self, repo_url: &str, description: Option<&str>) -> Result<Option<String>> {
        if let Some(doi) = self.doi_in_file(&format!("{}/readme", repo_url), "README").await? {
            return Ok(Some(doi));
        }

        let listing = self
            .client
            .fetch(&format!("{}/contents", repo_url), &[])
            .await
            .and_then(|resp| resp.json::<Vec<DirectoryEntry>>());
        match listing {
            Ok(entries) => {
                if let Some(entry) = entries
                    .iter()
                    .find(|e| e.name.eq_ignore_ascii_case("citation.cff"))
                    && let Some(doi) = self.doi_in_file(&entry.url, &entry.name).await?
                {
                    return Ok(Some(doi));
                }
            }
            Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
            Err(e) => logger::debug(&format!("Cannot list {}: {}", repo_url, e)),
        }

        let doi = description.and_then(find_doi);
        if let Some(doi) = &doi {
            logger::info(&format!("DOI {} found in the description", doi));
        }
        Ok(doi)
    }

    async fn doi_in_file(&self, url: &str, label: &str) -> Result<Option<String>> {
        let file = match self
            .client
            .fetch(url, &[])
            .await
            .and_then(|resp| resp.json::<FileResponse>())
        {
            Ok(file) => file,
            Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
            Err(e) => {
                logger::debug(&format!("No {} at {}: {}", label, url, e));
                return Ok(None);
            }
        };
        let doi = file.text().as_deref().and_then(find_doi);
        if let Some(doi) = &doi {
            logger::info(&format!("DOI {} found in {}", doi, label));
        }
        Ok(doi)
    }

    /// Resolve `doi` on OpenAlex and emit the paper, its authors and their
    /// institutions, citing `project`. An unknown DOI is logged, not an error.
    async fn emit_paper(&self, doi: &str, project: &EntityRef, state: &CrawlState) -> Result<bool> {
        let url = format!("{}/works/doi:{}", self.openalex_url, doi.to_lowercase());
        let work = match self
            .openalex
            .fetch(&url, &[])
            .await
            .and_then(|resp| resp.json::<OpenAlexWork>())
        {
            Ok(work) => work,
            Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
            Err(e) => {
                logger::warn(&format!("Cannot resolve DOI {} on OpenAlex: {}", doi, e));
                return Ok(false);
            }
        };

        let PaperRecord {
            mut paper,
            persons,
            institutions,
            concepts,
            domains,
            sdgs,
            ..
        } = work.into_record();
        paper.cited_projects.push(project.clone());

        for institution in institutions {
            state.emit(Entity::Institution(institution)).await?;
        }
        for person in persons {
            state.emit(Entity::Person(person)).await?;
        }
        for sdg in sdgs {
            state.emit(Entity::Sdg(sdg)).await?;
        }
        for concept in concepts {
            state.emit(Entity::Concept(concept)).await?;
        }
        for domain in domains {
            state.emit(Entity::Domain(domain)).await?;
        }
        state.emit(Entity::Paper(paper)).await
    }
}
