//! In-memory corpus of tabular records.
//!
//! A `Corpus` is loaded once and held read-only. Record ids are row
//! positions, so an index is only meaningful against the same (or an
//! identically ordered) corpus; `fingerprint` lets callers check that
//! pairing.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;
use xxhash_rust::xxh3::Xxh3;

use crate::models::{CorpusConfig, DocumentId, FieldValue, Record, SearchHit};

/// Ordered, immutable sequence of records sharing one column schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    columns: Vec<String>,
    records: Vec<Record>,
}

/// Column positions resolved once against a corpus schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelection {
    names: Vec<String>,
    positions: Vec<usize>,
}

impl FieldSelection {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Corpus {
    /// Build a corpus from column names and raw rows.
    ///
    /// Rows shorter than the header are padded with empty strings; rows
    /// longer than the header are rejected.
    pub fn from_rows<I, R, S>(columns: Vec<String>, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut records = Vec::new();

        for (idx, row) in rows.into_iter().enumerate() {
            let mut values: Vec<String> = row.into_iter().map(Into::into).collect();
            if values.len() > columns.len() {
                bail!(
                    "row {} has {} fields but the header declares {}",
                    idx,
                    values.len(),
                    columns.len()
                );
            }
            values.resize(columns.len(), String::new());
            records.push(Record {
                id: DocumentId::from(idx),
                values,
            });
        }

        Ok(Self { columns, records })
    }

    /// Load a delimited file with a header row.
    pub fn load_csv(config: &CorpusConfig) -> Result<Self> {
        let file = File::open(&config.path)
            .with_context(|| format!("failed to open corpus at {}", config.path.display()))?;
        let corpus = Self::read_csv(file, config.delimiter)
            .with_context(|| format!("failed to read corpus at {}", config.path.display()))?;

        info!(
            path = %config.path.display(),
            records = corpus.len(),
            columns = corpus.columns.len(),
            "loaded corpus"
        );

        Ok(corpus)
    }

    /// Parse delimited text with a header row from any reader.
    pub fn read_csv<R: Read>(reader: R, delimiter: char) -> Result<Self> {
        if !delimiter.is_ascii() {
            bail!("corpus delimiter must be a single ASCII character; got {delimiter:?}");
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = reader
            .headers()
            .context("failed to read corpus header row")?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for row in reader.records() {
            let row = row?;
            rows.push(row.iter().map(str::to_string).collect::<Vec<_>>());
        }

        Self::from_rows(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: DocumentId) -> Option<&Record> {
        self.records.get(id.as_usize())
    }

    /// Resolve column names to positions, failing on the first unknown
    /// name.
    pub fn select_fields(&self, names: &[String]) -> Result<FieldSelection> {
        let mut positions = Vec::with_capacity(names.len());
        for name in names {
            let Some(pos) = self.columns.iter().position(|c| c == name) else {
                bail!(
                    "corpus has no column named {:?}; available columns: {}",
                    name,
                    self.columns.join(", ")
                );
            };
            positions.push(pos);
        }

        Ok(FieldSelection {
            names: names.to_vec(),
            positions,
        })
    }

    /// Concatenation of the selected fields of `record`, in selection
    /// order.
    pub fn searchable_text(&self, record: &Record, fields: &FieldSelection) -> String {
        let mut text = String::new();
        for &pos in &fields.positions {
            if let Some(value) = record.values.get(pos) {
                text.push_str(value);
            }
        }
        text
    }

    /// Project `record` onto the selected display fields.
    pub fn to_hit(&self, record: &Record, fields: &FieldSelection) -> SearchHit {
        let fields = fields
            .names
            .iter()
            .zip(&fields.positions)
            .map(|(name, &pos)| FieldValue {
                name: name.clone(),
                value: record.values.get(pos).cloned().unwrap_or_default(),
            })
            .collect();

        SearchHit {
            id: record.id,
            fields,
        }
    }

    /// Content hash over the schema and every cell.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for column in &self.columns {
            hasher.update(column.as_bytes());
            hasher.update(&[0x1f]);
        }
        hasher.update(&[0x1e]);
        for record in &self.records {
            for value in &record.values {
                hasher.update(value.as_bytes());
                hasher.update(&[0x1f]);
            }
            hasher.update(&[0x1e]);
        }
        hasher.digest()
    }
}

/// Check that `path` exists before handing it to the CSV reader, so the
/// error names the corpus rather than a generic I/O failure.
pub fn ensure_corpus_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("corpus file does not exist: {}", path.display());
    }
    if !path.is_file() {
        bail!("corpus path is not a file: {}", path.display());
    }
    Ok(())
}
