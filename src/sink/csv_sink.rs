use crate::crawl::model::Entity;
use crate::error::Result;
use crate::sink::Sink;
use crate::sink::row::EntityRow;
use csv::{Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// One CSV file holding every kind, written batch by batch.
pub struct CsvSink {
    path: PathBuf,
    writer: Writer<File>,
    rows: usize,
}

impl CsvSink {
    /// Create (or truncate) `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(path.into(), false)
    }

    /// Append to `path`, writing the header only if the file is new or empty.
    pub fn append(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(path.into(), true)
    }

    fn open(path: PathBuf, append: bool) -> Result<Self> {
        let has_content = append && file_has_content(&path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)?;
        let writer = WriterBuilder::new()
            .has_headers(!has_content)
            .from_writer(file);
        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written by this sink (not counting rows already in an appended file).
    pub fn rows_written(&self) -> usize {
        self.rows
    }
}

fn file_has_content(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

impl Sink for CsvSink {
    fn write_batch(&mut self, batch: &[Entity]) -> Result<()> {
        for entity in batch {
            self.writer.serialize(EntityRow::from(entity))?;
        }
        self.writer.flush()?;
        self.rows += batch.len();
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<PathBuf>> {
        self.writer.flush()?;
        Ok(vec![self.path.clone()])
    }
}
