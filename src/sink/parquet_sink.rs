use crate::crawl::model::{Entity, EntityKind};
use crate::error::Result;
use crate::sink::Sink;
use crate::sink::row::{EntityRow, kind_fields};
use parquet::basic::{LogicalType, Repetition, Type as PhysicalType};
use parquet::data_type::{ByteArray, ByteArrayType};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::Type;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One Parquet file per kind, each with only that kind's columns.
///
/// A Parquet footer is only written on close, so every batch rewrites the
/// files of the kinds it touched as a single row group and renames them
/// into place. Every column is an optional UTF-8 string.
pub struct ParquetSink {
    directory: PathBuf,
    file_stem: String,
    keep_existing: bool,
    rows: BTreeMap<EntityKind, Vec<EntityRow>>,
    paths: BTreeMap<EntityKind, PathBuf>,
}

impl ParquetSink {
    pub fn new(directory: impl Into<PathBuf>, file_stem: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_stem: file_stem.into(),
            keep_existing: false,
            rows: BTreeMap::new(),
            paths: BTreeMap::new(),
        }
    }

    /// Never overwrite files from an earlier run; pick the next free
    /// `<stem>_<kind>.<n>.parquet` instead.
    pub fn keep_existing(mut self) -> Self {
        self.keep_existing = true;
        self
    }

    /// The file for `kind`, chosen on its first batch and kept for the run.
    fn path_for(&mut self, kind: EntityKind) -> PathBuf {
        if let Some(path) = self.paths.get(&kind) {
            return path.clone();
        }
        let path = self.free_path(kind);
        self.paths.insert(kind, path.clone());
        path
    }

    fn free_path(&self, kind: EntityKind) -> PathBuf {
        let base = format!("{}_{}", self.file_stem, kind.plural());
        let first = self.directory.join(format!("{}.parquet", base));
        if !self.keep_existing || !first.exists() {
            return first;
        }
        (1..)
            .map(|n| self.directory.join(format!("{}.{}.parquet", base, n)))
            .find(|p| !p.exists())
            .unwrap_or(first)
    }
}

fn schema_for(kind: EntityKind) -> Result<Arc<Type>> {
    let fields = kind_fields(kind)
        .iter()
        .map(|field| {
            Type::primitive_type_builder(field.column_name(), PhysicalType::BYTE_ARRAY)
                .with_repetition(Repetition::OPTIONAL)
                .with_logical_type(Some(LogicalType::String))
                .build()
                .map(Arc::new)
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Arc::new(
        Type::group_type_builder(kind.plural())
            .with_fields(fields)
            .build()?,
    ))
}

/// Write `rows` of `kind` to `path`, replacing it atomically.
pub fn write_kind(path: &Path, kind: EntityKind, rows: &[EntityRow]) -> Result<()> {
    let tmp = path.with_extension("parquet.tmp");
    write_rows(&tmp, kind, rows)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_rows(path: &Path, kind: EntityKind, rows: &[EntityRow]) -> Result<()> {
    let schema = schema_for(kind)?;
    let props = Arc::new(WriterProperties::builder().build());
    let mut writer = SerializedFileWriter::new(File::create(path)?, schema, props)?;

    let mut row_group = writer.next_row_group()?;
    let mut fields = kind_fields(kind).iter();
    while let Some(mut column) = row_group.next_column()? {
        let Some(field) = fields.next() else {
            break;
        };
        let mut values = Vec::with_capacity(rows.len());
        let mut def_levels = Vec::with_capacity(rows.len());
        for row in rows {
            match row.get(*field) {
                Some(v) => {
                    values.push(ByteArray::from(v));
                    def_levels.push(1);
                }
                None => def_levels.push(0),
            }
        }
        column
            .typed::<ByteArrayType>()
            .write_batch(&values, Some(def_levels.as_slice()), None)?;
        column.close()?;
    }
    row_group.close()?;
    writer.close()?;
    Ok(())
}

impl Sink for ParquetSink {
    fn write_batch(&mut self, batch: &[Entity]) -> Result<()> {
        let mut touched = BTreeSet::new();
        for entity in batch {
            self.rows
                .entry(entity.kind())
                .or_default()
                .push(EntityRow::from(entity));
            touched.insert(entity.kind());
        }
        for kind in touched {
            let path = self.path_for(kind);
            if let Some(rows) = self.rows.get(&kind) {
                write_kind(&path, kind, rows)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<PathBuf>> {
        Ok(self.paths.values().cloned().collect())
    }
}
