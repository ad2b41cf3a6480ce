use crate::crawl::model::{Concept, Domain, Institution, Paper, Person, Project, Sdg};
use crate::error::Result;
use async_trait::async_trait;

/// A project as returned by a project-lookup endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectRecord {
    pub project: Project,
    /// Paginated list of papers mentioning the project.
    pub mentions_url: Option<String>,
}

/// A paper together with every sub-entity parsed from the same response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaperRecord {
    pub paper: Paper,
    pub persons: Vec<Person>,
    pub institutions: Vec<Institution>,
    pub concepts: Vec<Concept>,
    pub domains: Vec<Domain>,
    pub sdgs: Vec<Sdg>,
    /// Paginated list of projects the paper mentions.
    pub mentions_url: Option<String>,
}

/// URLs gathered from a mentions walk, with the provider's totals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MentionList {
    pub urls: Vec<String>,
    pub total_count: Option<u64>,
    pub total_pages: Option<u64>,
    /// The walk stopped early on an error; `urls` is a prefix.
    pub partial: bool,
}

/// Remote collaborator the scheduler and scope estimator crawl through.
#[async_trait]
pub trait MentionsSource: Send + Sync {
    async fn fetch_project(&self, url: &str) -> Result<ProjectRecord>;

    async fn fetch_paper(&self, url: &str) -> Result<PaperRecord>;

    /// Paper URLs from a project's mentions list.
    async fn paper_urls(&self, mentions_url: &str) -> Result<MentionList>;

    /// Project URLs from a paper's mentions list.
    async fn project_urls(&self, mentions_url: &str) -> Result<MentionList>;

    /// Size of a mentions list, without fetching its items.
    async fn mention_count(&self, mentions_url: &str) -> Result<u64>;
}
