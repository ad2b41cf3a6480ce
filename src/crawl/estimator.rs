//! Scope estimate for the co-mentioned frontier.
//!
//! Before a recursive round the operator is shown how many papers it would
//! touch: the summed mention counts of the frontier projects that could be
//! counted, alongside their average.

use crate::crawl::state::CrawlState;
use crate::error::{CrawlError, Result};
use crate::logger;
use crate::scrapers::MentionsSource;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScopeEstimate {
    pub co_mentioned_count: usize,
    /// Frontier projects whose mention count could be read.
    pub counted: usize,
    pub average_mentions_per_project: f64,
    pub total_estimate: u64,
}

impl ScopeEstimate {
    pub fn from_counts(co_mentioned_count: usize, counts: &[u64]) -> Self {
        if counts.is_empty() {
            return Self {
                co_mentioned_count,
                ..Self::default()
            };
        }
        let sum: u64 = counts.iter().sum();
        let average = sum as f64 / counts.len() as f64;
        Self {
            co_mentioned_count,
            counted: counts.len(),
            average_mentions_per_project: average,
            total_estimate: sum,
        }
    }
}

pub struct ScopeEstimator {
    source: Arc<dyn MentionsSource>,
    state: Arc<CrawlState>,
}

impl ScopeEstimator {
    pub fn new(source: Arc<dyn MentionsSource>, state: Arc<CrawlState>) -> Self {
        Self { source, state }
    }

    /// Count the mentions of every project in `urls`.
    ///
    /// Projects that cannot be counted are logged and left out of the
    /// average. Nothing is emitted or cached.
    pub async fn estimate(&self, urls: &[String]) -> Result<ScopeEstimate> {
        let mut tasks = JoinSet::new();
        for url in urls {
            let source = Arc::clone(&self.source);
            let cached = self.state.cached_project(url);
            let url = url.clone();
            tasks.spawn(async move {
                let mentions_url = match cached.and_then(|lookup| lookup.mentions_url) {
                    Some(m) => m,
                    None => source.fetch_project(&url).await?.mentions_url.ok_or_else(|| {
                        CrawlError::Parse(format!("project {} has no mentions_url", url))
                    })?,
                };
                let count = source.mention_count(&mentions_url).await?;
                Ok::<_, CrawlError>((url, count))
            });
        }

        let mut counts = Vec::with_capacity(urls.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((url, count))) => {
                    logger::debug(&format!("{} is mentioned {} times", url, count));
                    counts.push(count);
                }
                Ok(Err(CrawlError::Cancelled)) => return Err(CrawlError::Cancelled),
                Ok(Err(e)) => logger::warn(&format!("Cannot count mentions: {}", e)),
                Err(e) => logger::error(&format!("Estimate task panicked: {}", e)),
            }
        }

        let estimate = ScopeEstimate::from_counts(urls.len(), &counts);
        logger::info(&format!(
            "{} co-mentioned projects, {:.1} mentions each on average, about {} papers",
            estimate.co_mentioned_count,
            estimate.average_mentions_per_project,
            estimate.total_estimate
        ));
        Ok(estimate)
    }
}
