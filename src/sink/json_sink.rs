use crate::crawl::model::{Entity, EntityGroups};
use crate::error::Result;
use crate::sink::Sink;
use std::fs;
use std::path::PathBuf;

/// A single JSON document grouped by kind.
///
/// The document is rewritten whole after every batch and swapped into place,
/// so the file on disk always holds every entity accepted so far. When
/// resuming, the existing document is loaded first and new entities are
/// added to it.
pub struct JsonSink {
    path: PathBuf,
    groups: EntityGroups,
}

impl JsonSink {
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            groups: EntityGroups::default(),
        }
    }

    /// Continue the document at `path`, if there is one.
    pub fn append(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let groups = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            EntityGroups::default()
        };
        Ok(Self { path, groups })
    }

    pub fn buffered(&self) -> usize {
        self.groups.len()
    }

    fn persist(&self) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.groups)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Sink for JsonSink {
    fn write_batch(&mut self, batch: &[Entity]) -> Result<()> {
        for entity in batch {
            self.groups.push(entity.clone());
        }
        self.persist()
    }

    fn finish(&mut self) -> Result<Vec<PathBuf>> {
        self.persist()?;
        Ok(vec![self.path.clone()])
    }
}
