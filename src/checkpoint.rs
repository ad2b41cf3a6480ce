//! Crawl progress persisted between runs.
//!
//! A checkpoint records which entities have already been written to the
//! output, which seed/frontier projects were fully processed and which
//! frontier URLs were still pending. Only ids that reached the sink are
//! recorded, so a resumed run may redo some work but never drops an entity.

use crate::crawl::model::EntityKind;
use crate::crawl::state::CrawlState;
use crate::error::Result;
use crate::utilities::fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_DIR: &str = "checkpoints";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub seeds: Vec<String>,
    /// Ids already written to the output, per kind.
    #[serde(default)]
    pub written: BTreeMap<EntityKind, Vec<String>>,
    /// Project URLs whose papers were all processed and written.
    #[serde(default)]
    pub completed_projects: Vec<String>,
    /// Discovered project URLs not yet crawled.
    #[serde(default)]
    pub frontier: Vec<String>,
    pub saved_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(seeds: Vec<String>) -> Self {
        Self {
            seeds,
            ..Self::default()
        }
    }

    pub fn written_count(&self) -> usize {
        self.written.values().map(Vec::len).sum()
    }

    /// Seed a fresh `state` so the resumed crawl skips finished work.
    pub fn restore_into(&self, state: &CrawlState) {
        for (kind, ids) in &self.written {
            state.dedup().seed(*kind, ids.iter().cloned());
        }
        for url in &self.completed_projects {
            state.frontier().mark_crawled(url);
            state.mark_completed(url);
        }
        for url in &self.frontier {
            state.frontier().discover(url);
        }
    }
}

/// `checkpoints/<fingerprint of the seed set>.json`.
pub fn default_checkpoint_path(seeds: &[String]) -> PathBuf {
    Path::new(CHECKPOINT_DIR).join(format!("{}.json", fingerprint(seeds)))
}

/// Read a checkpoint; `None` if the file does not exist.
pub fn load_checkpoint(path: &Path) -> Result<Option<Checkpoint>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Write `checkpoint` to `path`, replacing any previous one.
///
/// The file is written next to its destination and renamed into place, so
/// a crash mid-write leaves the previous checkpoint intact.
pub fn save_checkpoint(path: &Path, checkpoint: &Checkpoint) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut stamped = checkpoint.clone();
    stamped.saved_at = Some(Utc::now());

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(&stamped)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
