//! Fan-out over projects and the papers that mention them.
//!
//! Every unit of work (one project, one paper) is a tokio task. Units share
//! a single worker semaphore sized by `worker_count`; a project unit gives
//! its permit back before waiting on its papers, so nesting can never
//! starve the pool. Outbound requests are capped separately by the HTTP
//! client.
//!
//! A failing unit is logged, counted and skipped. It never aborts its
//! siblings or the run.

use crate::config::CrawlConfig;
use crate::crawl::estimator::{ScopeEstimate, ScopeEstimator};
use crate::crawl::model::{Entity, EntityKind, EntityRef};
use crate::crawl::state::{CrawlState, ProjectLookup};
use crate::error::{CrawlError, Result};
use crate::logger;
use crate::scrapers::{MentionsSource, PaperRecord};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrawlOptions {
    pub worker_count: usize,
    /// Walk each paper's own mentions to discover co-mentioned projects.
    pub recurse_into_mentions: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from(&CrawlConfig::default())
    }
}

impl From<&CrawlConfig> for CrawlOptions {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            recurse_into_mentions: config.recurse_into_mentions,
        }
    }
}

/// Outcome counts for one `process_all` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub projects_ok: usize,
    pub projects_failed: usize,
    /// Already completed by an earlier (resumed) run.
    pub projects_skipped: usize,
    pub papers_ok: usize,
    pub papers_failed: usize,
    /// Already processed via another project's mentions.
    pub papers_skipped: usize,
    pub cancelled: bool,
}

impl CrawlReport {
    pub fn merge(&mut self, other: &CrawlReport) {
        self.projects_ok += other.projects_ok;
        self.projects_failed += other.projects_failed;
        self.projects_skipped += other.projects_skipped;
        self.papers_ok += other.papers_ok;
        self.papers_failed += other.papers_failed;
        self.papers_skipped += other.papers_skipped;
        self.cancelled |= other.cancelled;
    }
}

#[derive(Default)]
struct Counters {
    projects_ok: AtomicUsize,
    projects_failed: AtomicUsize,
    projects_skipped: AtomicUsize,
    papers_ok: AtomicUsize,
    papers_failed: AtomicUsize,
    papers_skipped: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self, cancelled: bool) -> CrawlReport {
        CrawlReport {
            projects_ok: self.projects_ok.load(Ordering::Relaxed),
            projects_failed: self.projects_failed.load(Ordering::Relaxed),
            projects_skipped: self.projects_skipped.load(Ordering::Relaxed),
            papers_ok: self.papers_ok.load(Ordering::Relaxed),
            papers_failed: self.papers_failed.load(Ordering::Relaxed),
            papers_skipped: self.papers_skipped.load(Ordering::Relaxed),
            cancelled,
        }
    }
}

struct Shared {
    source: Arc<dyn MentionsSource>,
    state: Arc<CrawlState>,
    options: CrawlOptions,
    workers: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Shared {
    async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CrawlError::Cancelled),
            permit = Arc::clone(&self.workers).acquire_owned() => {
                permit.map_err(|_| CrawlError::Cancelled)
            }
        }
    }

    /// Cached lookup, or fetch the project, cache it and emit it.
    async fn resolve_project(&self, url: &str) -> Result<ProjectLookup> {
        if let Some(lookup) = self.state.cached_project(url) {
            return Ok(lookup);
        }
        let record = self.source.fetch_project(url).await?;
        let lookup = ProjectLookup {
            project: record.project.to_ref(),
            mentions_url: record.mentions_url,
        };
        self.state.cache_project(url, lookup.clone());
        self.state.emit(Entity::Project(record.project)).await?;
        Ok(lookup)
    }
}

enum PaperOutcome {
    Emitted,
    Duplicate,
}

/// Runs project and paper units against a shared [`CrawlState`].
pub struct Crawler {
    shared: Arc<Shared>,
}

impl Crawler {
    pub fn new(
        source: Arc<dyn MentionsSource>,
        state: Arc<CrawlState>,
        options: CrawlOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                state,
                workers: Arc::new(Semaphore::new(options.worker_count.max(1))),
                options,
                cancel,
            }),
        }
    }

    pub fn state(&self) -> &Arc<CrawlState> {
        &self.shared.state
    }

    pub fn options(&self) -> CrawlOptions {
        self.shared.options
    }

    /// Crawl every project URL in `seeds` and all papers mentioning them.
    ///
    /// Returns once every unit has finished, failed or been cancelled.
    pub async fn process_all(&self, seeds: &[String]) -> CrawlReport {
        let counters = Arc::new(Counters::default());
        let state = &self.shared.state;
        let mut seen = HashSet::new();
        let mut projects = JoinSet::new();

        for url in seeds {
            if self.shared.cancel.is_cancelled() {
                break;
            }
            if !seen.insert(url.as_str()) {
                continue;
            }
            if state.is_completed(url) {
                logger::info(&format!("Skipping {}: completed in an earlier run", url));
                Counters::bump(&counters.projects_skipped);
                continue;
            }
            state.frontier().mark_crawled(url);
            projects.spawn(process_project(
                Arc::clone(&self.shared),
                Arc::clone(&counters),
                url.clone(),
            ));
        }

        while let Some(joined) = projects.join_next().await {
            if let Err(e) = joined {
                logger::error(&format!("Project task panicked: {}", e));
                Counters::bump(&counters.projects_failed);
            }
        }

        counters.report(self.shared.cancel.is_cancelled())
    }

    /// Crawl every URL currently pending in the frontier.
    pub async fn crawl_frontier(&self) -> CrawlReport {
        let pending = self.shared.state.frontier().take_pending();
        logger::info(&format!("Crawling {} co-mentioned projects", pending.len()));
        self.process_all(&pending).await
    }

    /// Follow the frontier for up to `rounds` rounds.
    ///
    /// Each round's scope estimate goes to `approve` first; a `false` answer
    /// ends the rounds. An interrupt during an estimate ends them as well and
    /// is reported through `cancelled`, not as an error.
    pub async fn crawl_rounds<F, Fut>(&self, rounds: usize, mut approve: F) -> Result<CrawlReport>
    where
        F: FnMut(usize, ScopeEstimate) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let estimator =
            ScopeEstimator::new(Arc::clone(&self.shared.source), Arc::clone(&self.shared.state));
        let mut report = CrawlReport::default();
        for round in 1..=rounds {
            let frontier = self.shared.state.frontier().snapshot();
            if self.shared.cancel.is_cancelled() || frontier.is_empty() {
                break;
            }
            let estimate = match estimator.estimate(&frontier).await {
                Ok(estimate) => estimate,
                Err(CrawlError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            if !approve(round, estimate).await? {
                break;
            }
            report.merge(&self.crawl_frontier().await);
        }
        report.cancelled |= self.shared.cancel.is_cancelled();
        Ok(report)
    }
}

async fn process_project(shared: Arc<Shared>, counters: Arc<Counters>, url: String) {
    match run_project(&shared, &counters, &url).await {
        Ok(complete) => {
            Counters::bump(&counters.projects_ok);
            if complete {
                shared.state.mark_completed(&url);
            }
        }
        Err(CrawlError::Cancelled) => {
            logger::debug(&format!("Project {} cancelled", url));
        }
        Err(e) => {
            Counters::bump(&counters.projects_failed);
            logger::error(&format!("Skipping project {}: {}", url, e));
        }
    }
}

/// `Ok(true)` when every paper of the project was handled.
async fn run_project(shared: &Arc<Shared>, counters: &Arc<Counters>, url: &str) -> Result<bool> {
    let permit = shared.acquire().await?;
    let lookup = shared.resolve_project(url).await?;
    let name = lookup.project.name;
    let mentions_url = lookup
        .mentions_url
        .ok_or_else(|| CrawlError::Parse(format!("project {} has no mentions_url", url)))?;

    let mentions = shared.source.paper_urls(&mentions_url).await?;
    logger::info(&format!(
        "There are {} pages of mentions for {} ({} papers)",
        mentions.total_pages.unwrap_or(1),
        name,
        mentions.total_count.unwrap_or(mentions.urls.len() as u64)
    ));
    drop(permit);

    let total = mentions.urls.len();
    let mut papers = JoinSet::new();
    for paper_url in mentions.urls {
        if shared.cancel.is_cancelled() {
            break;
        }
        papers.spawn(process_paper(
            Arc::clone(shared),
            Arc::clone(counters),
            paper_url,
        ));
    }

    let mut done = 0;
    let mut all_ok = !mentions.partial;
    while let Some(joined) = papers.join_next().await {
        done += 1;
        match joined {
            Ok(ok) => all_ok &= ok,
            Err(e) => {
                all_ok = false;
                Counters::bump(&counters.papers_failed);
                logger::error(&format!("Paper task for {} panicked: {}", name, e));
            }
        }
        logger::info(&format!("Processed paper {} of {} for {}", done, total, name));
    }

    if shared.cancel.is_cancelled() {
        return Err(CrawlError::Cancelled);
    }
    Ok(all_ok)
}

/// `true` unless the paper failed or was cancelled.
async fn process_paper(shared: Arc<Shared>, counters: Arc<Counters>, url: String) -> bool {
    if !shared.state.claim_paper_url(&url) {
        Counters::bump(&counters.papers_skipped);
        return true;
    }
    match run_paper(&shared, &url).await {
        Ok(PaperOutcome::Emitted) => {
            Counters::bump(&counters.papers_ok);
            true
        }
        Ok(PaperOutcome::Duplicate) => {
            Counters::bump(&counters.papers_skipped);
            true
        }
        Err(CrawlError::Cancelled) => {
            shared.state.release_paper_url(&url);
            false
        }
        Err(e) => {
            shared.state.release_paper_url(&url);
            Counters::bump(&counters.papers_failed);
            logger::warn(&format!("Skipping paper {}: {}", url, e));
            false
        }
    }
}

async fn run_paper(shared: &Shared, url: &str) -> Result<PaperOutcome> {
    let _permit = shared.acquire().await?;
    let record = shared.source.fetch_paper(url).await?;
    let state = &shared.state;
    if state.dedup().contains(EntityKind::Paper, &record.paper.id) {
        return Ok(PaperOutcome::Duplicate);
    }

    let PaperRecord {
        mut paper,
        persons,
        institutions,
        concepts,
        domains,
        sdgs,
        mentions_url,
    } = record;

    // Sub-entities go first so a written paper implies its references were queued.
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

    if shared.options.recurse_into_mentions
        && let Some(mentions_url) = mentions_url
    {
        paper.cited_projects = co_mentioned_projects(shared, url, &mentions_url).await?;
    }

    if state.emit(Entity::Paper(paper)).await? {
        Ok(PaperOutcome::Emitted)
    } else {
        Ok(PaperOutcome::Duplicate)
    }
}

/// Resolve the projects a paper mentions and add them to the frontier.
///
/// Unreachable projects are left out; only cancellation is an error.
async fn co_mentioned_projects(
    shared: &Shared,
    paper_url: &str,
    mentions_url: &str,
) -> Result<Vec<EntityRef>> {
    let list = match shared.source.project_urls(mentions_url).await {
        Ok(list) => list,
        Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
        Err(e) => {
            logger::warn(&format!(
                "No co-mentioned projects for {}: {}",
                paper_url, e
            ));
            return Ok(Vec::new());
        }
    };

    let mut cited = Vec::with_capacity(list.urls.len());
    for project_url in list.urls {
        match shared.resolve_project(&project_url).await {
            Ok(lookup) => {
                shared.state.frontier().discover(&project_url);
                cited.push(lookup.project);
            }
            Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
            Err(e) => logger::warn(&format!(
                "Skipping co-mentioned project {}: {}",
                project_url, e
            )),
        }
    }
    Ok(cited)
}
