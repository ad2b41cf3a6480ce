//! Background consumer of the accumulator.
//!
//! The flusher drains whatever entities the workers have queued every
//! polling interval, hands them to the sink and, when checkpointing is on,
//! persists the ids that reached the sink. It stops once every producer
//! has been dropped and the queue is empty.

use crate::checkpoint::{Checkpoint, save_checkpoint};
use crate::crawl::model::EntityKind;
use crate::crawl::state::CrawlState;
use crate::error::{CrawlError, Result};
use crate::logger;
use crate::sink::Sink;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What a finished flusher wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub written: BTreeMap<EntityKind, usize>,
    pub files: Vec<PathBuf>,
}

impl FlushSummary {
    pub fn total(&self) -> usize {
        self.written.values().sum()
    }
}

struct CheckpointTarget {
    path: PathBuf,
    seeds: Vec<String>,
}

pub struct Flusher {
    state: Arc<CrawlState>,
    sink: Box<dyn Sink>,
    polling_interval: Duration,
    checkpoint: Option<CheckpointTarget>,
    written: BTreeMap<EntityKind, BTreeSet<String>>,
    batches: usize,
    saved_completed: usize,
}

impl Flusher {
    pub fn new(state: Arc<CrawlState>, sink: Box<dyn Sink>, polling_interval: Duration) -> Self {
        Self {
            state,
            sink,
            polling_interval,
            checkpoint: None,
            written: BTreeMap::new(),
            batches: 0,
            saved_completed: 0,
        }
    }

    /// Save a checkpoint to `path` after every batch. Ids already recorded
    /// in `previous` are carried over.
    pub fn with_checkpoint(
        mut self,
        path: PathBuf,
        seeds: Vec<String>,
        previous: Option<&Checkpoint>,
    ) -> Self {
        if let Some(previous) = previous {
            for (kind, ids) in &previous.written {
                self.written
                    .entry(*kind)
                    .or_default()
                    .extend(ids.iter().cloned());
            }
        }
        self.checkpoint = Some(CheckpointTarget { path, seeds });
        self
    }

    /// Write everything currently queued. Returns the batch size.
    ///
    /// The checkpoint is saved when something was written or another
    /// project completed since the last save.
    pub fn flush_once(&mut self) -> Result<usize> {
        // Snapshot progress before draining: anything a completed project
        // emitted is then guaranteed to be in this batch or an earlier one.
        let completed = self.state.completed();
        let mut frontier: BTreeSet<String> = self.state.frontier().snapshot().into_iter().collect();

        let batch = self.state.accumulator().drain();
        if !batch.is_empty() {
            self.sink.write_batch(&batch)?;
            for entity in &batch {
                self.written
                    .entry(entity.kind())
                    .or_default()
                    .insert(entity.id().to_string());
            }
            self.batches += 1;
            logger::debug(&format!(
                "Flushed batch {} ({} entities)",
                self.batches,
                batch.len()
            ));
        } else if completed.len() == self.saved_completed {
            return Ok(0);
        }

        if let Some(target) = &self.checkpoint {
            // Frontier URLs taken for crawling but not finished must be retried.
            frontier.extend(
                self.state
                    .frontier()
                    .crawled()
                    .into_iter()
                    .filter(|url| !completed.contains(url) && !target.seeds.contains(url)),
            );
            self.saved_completed = completed.len();
            let checkpoint = Checkpoint {
                seeds: target.seeds.clone(),
                written: self
                    .written
                    .iter()
                    .map(|(kind, ids)| (*kind, ids.iter().cloned().collect()))
                    .collect(),
                completed_projects: completed,
                frontier: frontier.into_iter().collect(),
                saved_at: None,
            };
            save_checkpoint(&target.path, &checkpoint)?;
        }
        Ok(batch.len())
    }

    /// Poll until every producer is gone and the queue is empty, then
    /// finish the sink.
    ///
    /// Blocks the calling thread; use [`Flusher::spawn`] from async code.
    /// A sink or checkpoint failure closes the accumulator so producers stop
    /// blocking on a queue nobody drains.
    pub fn run(mut self) -> Result<FlushSummary> {
        loop {
            let finished = self.state.accumulator().producers_finished();
            let flushed = match self.flush_once() {
                Ok(n) => n,
                Err(e) => {
                    logger::error(&format!("Output failed, stopping crawl: {}", e));
                    self.state.accumulator().close();
                    return Err(e);
                }
            };
            if finished && self.state.accumulator().queue_size() == 0 {
                break;
            }
            if flushed == 0 {
                std::thread::sleep(self.polling_interval);
            }
        }

        let files = self.sink.finish()?;
        let summary = FlushSummary {
            written: self
                .written
                .iter()
                .map(|(kind, ids)| (*kind, ids.len()))
                .collect(),
            files,
        };
        logger::info(&format!(
            "Wrote {} entities in {} batches",
            summary.total(),
            self.batches
        ));
        Ok(summary)
    }

    /// Run on the blocking pool; the sinks do synchronous file I/O.
    pub fn spawn(self) -> JoinHandle<Result<FlushSummary>> {
        tokio::task::spawn_blocking(move || self.run())
    }
}

/// Await a spawned flusher, folding a panic into an output error.
pub async fn join_flusher(handle: JoinHandle<Result<FlushSummary>>) -> Result<FlushSummary> {
    handle
        .await
        .map_err(|e| CrawlError::Output(format!("flusher task failed: {}", e)))?
}
