//! Shared, explicitly owned state of one crawl.
//!
//! A single `Arc<CrawlState>` is handed to every project and paper unit.
//! Each collection sits behind its own lock; there is no cross-collection
//! atomicity.

use crate::crawl::dedup::Deduplicator;
use crate::crawl::frontier::Frontier;
use crate::crawl::model::{Entity, EntityRef};
use crate::error::Result;
use crate::utilities::thread_safe_queue::{QueueConfig, QueueProducer, ThreadSafeQueue};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// What the crawl remembers about a project it has already fetched.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectLookup {
    pub project: EntityRef,
    pub mentions_url: Option<String>,
}

pub struct CrawlState {
    dedup: Deduplicator,
    frontier: Frontier,
    accumulator: ThreadSafeQueue<Entity>,
    projects: Mutex<HashMap<String, ProjectLookup>>,
    paper_urls: Mutex<HashSet<String>>,
    completed: Mutex<BTreeSet<String>>,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl CrawlState {
    pub fn new(queue: QueueConfig) -> Self {
        Self {
            dedup: Deduplicator::new(),
            frontier: Frontier::new(),
            accumulator: ThreadSafeQueue::new(queue),
            projects: Mutex::new(HashMap::new()),
            paper_urls: Mutex::new(HashSet::new()),
            completed: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn accumulator(&self) -> &ThreadSafeQueue<Entity> {
        &self.accumulator
    }

    /// Register a producer on the accumulator. The flusher keeps running
    /// until every handle returned here has been dropped.
    pub fn producer(&self) -> QueueProducer<Entity> {
        self.accumulator.create_producer()
    }

    /// Queue `entity` unless an entity of the same kind and id was already
    /// emitted. Returns whether it was queued.
    ///
    /// Waits without holding a runtime thread while the accumulator is full.
    pub async fn emit(&self, entity: Entity) -> Result<bool> {
        if !self.dedup.should_emit(entity.kind(), entity.id()) {
            return Ok(false);
        }
        self.accumulator.enqueue_async(entity).await?;
        Ok(true)
    }

    /// [`CrawlState::emit`] for plain threads; blocks while the accumulator
    /// is full.
    pub fn emit_blocking(&self, entity: Entity) -> Result<bool> {
        if !self.dedup.should_emit(entity.kind(), entity.id()) {
            return Ok(false);
        }
        self.accumulator.enqueue(entity)?;
        Ok(true)
    }

    pub fn cache_project(&self, url: &str, lookup: ProjectLookup) {
        relock(&self.projects).insert(url.to_string(), lookup);
    }

    pub fn cached_project(&self, url: &str) -> Option<ProjectLookup> {
        relock(&self.projects).get(url).cloned()
    }

    /// Claim a paper URL for processing; `false` if another unit has it.
    pub fn claim_paper_url(&self, url: &str) -> bool {
        relock(&self.paper_urls).insert(url.to_string())
    }

    /// Give up a claim so a later mention of the same paper can retry it.
    pub fn release_paper_url(&self, url: &str) {
        relock(&self.paper_urls).remove(url);
    }

    /// Record that every paper of the project at `url` has been processed.
    pub fn mark_completed(&self, url: &str) {
        relock(&self.completed).insert(url.to_string());
    }

    pub fn is_completed(&self, url: &str) -> bool {
        relock(&self.completed).contains(url)
    }

    pub fn completed(&self) -> Vec<String> {
        relock(&self.completed).iter().cloned().collect()
    }
}
