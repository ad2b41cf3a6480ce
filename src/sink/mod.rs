//! Output writers for harvested entities.
//!
//! The flusher hands each drained batch to a [`Sink`]; `finish` is called
//! once at the end of the run and reports the files produced.
//!
//! - CSV: one file, fixed superset of columns, kind in `Label`
//! - JSON: one document grouped by kind
//! - Parquet: one file per kind, rewritten after each batch

pub mod csv_sink;
pub mod json_sink;
pub mod parquet_sink;
pub mod row;

pub use csv_sink::CsvSink;
pub use json_sink::JsonSink;
pub use parquet_sink::ParquetSink;
pub use row::{EntityRow, LIST_SEPARATOR};

use crate::config::{OutputConfig, OutputFormat};
use crate::crawl::model::Entity;
use crate::error::Result;
use std::fs;
use std::path::PathBuf;

pub trait Sink: Send {
    /// Write `batch`. Once this returns `Ok`, the entities are on disk: the
    /// flusher records their ids in the checkpoint right after.
    fn write_batch(&mut self, batch: &[Entity]) -> Result<()>;

    /// Finalize output; returns the paths written.
    fn finish(&mut self) -> Result<Vec<PathBuf>>;
}

/// Writes every batch to each inner sink in turn.
pub struct MultiSink {
    sinks: Vec<Box<dyn Sink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self { sinks }
    }
}

impl Sink for MultiSink {
    fn write_batch(&mut self, batch: &[Entity]) -> Result<()> {
        for sink in &mut self.sinks {
            sink.write_batch(batch)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for sink in &mut self.sinks {
            paths.extend(sink.finish()?);
        }
        Ok(paths)
    }
}

/// Build the sink for every configured format under `config.directory`.
///
/// With `resume`, earlier output is extended rather than replaced.
pub fn build_sink(config: &OutputConfig, resume: bool) -> Result<Box<dyn Sink>> {
    fs::create_dir_all(&config.directory)?;
    let mut formats: Vec<OutputFormat> = Vec::with_capacity(config.formats.len());
    for format in &config.formats {
        if !formats.contains(format) {
            formats.push(*format);
        }
    }

    let mut sinks: Vec<Box<dyn Sink>> = Vec::with_capacity(formats.len());
    for format in formats {
        let sink: Box<dyn Sink> = match format {
            OutputFormat::Csv => {
                let path = config.directory.join(format!("{}.csv", config.file_stem));
                if resume {
                    Box::new(CsvSink::append(path)?)
                } else {
                    Box::new(CsvSink::create(path)?)
                }
            }
            OutputFormat::Json => {
                let path = config.directory.join(format!("{}.json", config.file_stem));
                if resume {
                    Box::new(JsonSink::append(path)?)
                } else {
                    Box::new(JsonSink::create(path))
                }
            }
            OutputFormat::Parquet => {
                let sink = ParquetSink::new(&config.directory, config.file_stem.clone());
                if resume {
                    Box::new(sink.keep_existing())
                } else {
                    Box::new(sink)
                }
            }
        };
        sinks.push(sink);
    }

    Ok(if sinks.len() == 1 {
        sinks.remove(0)
    } else {
        Box::new(MultiSink::new(sinks))
    })
}
