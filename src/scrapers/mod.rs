//! Remote sources the crawler harvests from.
//!
//! - ecosyste.ms: projects, the papers mentioning them, and the projects
//!   those papers mention in turn
//! - GitHub: a repository, the people around it and the paper its DOI
//!   points to
//! - OpenAlex: work records, shared by both
//!
//! The scheduler only sees the [`scraper::MentionsSource`] trait, so tests
//! and alternative providers can stand in for ecosyste.ms.

pub mod ecosystems;
pub mod github;
pub mod openalex;
pub mod scraper;

pub use ecosystems::EcosystemsSource;
pub use github::GithubHarvester;
pub use scraper::{MentionList, MentionsSource, PaperRecord, ProjectRecord};
