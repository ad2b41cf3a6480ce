//! Project URLs discovered through mention expansion but not yet crawled.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct FrontierSets {
    pending: BTreeSet<String>,
    crawled: BTreeSet<String>,
}

#[derive(Default)]
pub struct Frontier {
    inner: Mutex<FrontierSets>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn sets(&self) -> MutexGuard<'_, FrontierSets> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a URL unless it is pending or already crawled. Returns whether
    /// the frontier grew.
    pub fn discover(&self, url: &str) -> bool {
        let mut sets = self.sets();
        if sets.crawled.contains(url) {
            return false;
        }
        sets.pending.insert(url.to_string())
    }

    /// Record `url` as crawled, removing it from the pending set.
    pub fn mark_crawled(&self, url: &str) {
        let mut sets = self.sets();
        sets.pending.remove(url);
        sets.crawled.insert(url.to_string());
    }

    pub fn is_crawled(&self, url: &str) -> bool {
        self.sets().crawled.contains(url)
    }

    /// Remove and return every pending URL, in sorted order.
    pub fn take_pending(&self) -> Vec<String> {
        std::mem::take(&mut self.sets().pending).into_iter().collect()
    }

    /// Pending URLs without consuming them.
    pub fn snapshot(&self) -> Vec<String> {
        self.sets().pending.iter().cloned().collect()
    }

    pub fn crawled(&self) -> Vec<String> {
        self.sets().crawled.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sets().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
