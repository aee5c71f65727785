//! File-based index backend.
//!
//! This backend stores index data under a directory (`.addrgram/` by
//! default):
//! - `meta.json`
//! - `postings.json`
//!
//! `postings.json` is a pretty-printed UTF-8 JSON object mapping each
//! n-gram to its list of document ids. Keys and id lists are written in
//! sorted order so the file is byte-stable for a given index. Both files
//! are written to a temporary path and renamed into place; a failed write
//! removes its temporary file.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::ser::{Serialize, Serializer};
use tracing::info;

use crate::index::backend::IndexBackend;
use crate::index::error::IndexError;
use crate::index::inverted::InvertedIndex;
use crate::index::models::{IndexMeta, INDEX_SCHEMA_VERSION};
use crate::models::{DocumentId, IndexBackendKind};

/// File-backed implementation of `IndexBackend`.
pub struct FileIndexBackend {
    root: PathBuf,
}

/// Sorted postings serialized as a JSON object in key order.
struct SortedPostings<'a>(Vec<(&'a str, Vec<DocumentId>)>);

impl Serialize for SortedPostings<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(ngram, ids)| (*ngram, ids)))
    }
}

impl FileIndexBackend {
    /// Open (or create) a file-based index at the given directory.
    pub fn open(index_path: &Path) -> Result<Self> {
        fs::create_dir_all(index_path).map_err(|e| IndexError::io(index_path, e))?;
        Ok(Self {
            root: index_path.to_path_buf(),
        })
    }

    /// Open an index directory that must already exist.
    pub fn open_existing(index_path: &Path) -> Result<Self> {
        if !index_path.exists() {
            return Err(IndexError::NotFound(index_path.to_path_buf()).into());
        }
        if !index_path.is_dir() {
            anyhow::bail!(
                "file backend requires index_path to be a directory; got {}",
                index_path.display()
            );
        }
        Ok(Self {
            root: index_path.to_path_buf(),
        })
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join("meta.json")
    }

    fn postings_path(&self) -> PathBuf {
        self.root.join("postings.json")
    }

    fn write_atomically<F>(&self, path: &Path, write: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<()>,
    {
        let tmp_path = path.with_extension("json.tmp");

        let written = write_then_rename(&tmp_path, path, write);
        if written.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        written
    }
}

fn write_then_rename<F>(tmp_path: &Path, path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let file = File::create(tmp_path).map_err(|e| IndexError::io(tmp_path, e))?;
    let mut writer = BufWriter::new(file);
    write(&mut writer)?;
    writer.flush().map_err(|e| IndexError::io(tmp_path, e))?;
    drop(writer);

    fs::rename(tmp_path, path).map_err(|e| IndexError::io(path, e))?;
    Ok(())
}

impl IndexBackend for FileIndexBackend {
    fn kind(&self) -> IndexBackendKind {
        IndexBackendKind::File
    }

    fn index_path(&self) -> &Path {
        &self.root
    }

    fn load_meta(&self) -> Result<IndexMeta> {
        let path = self.meta_path();
        let contents = fs::read(&path).map_err(|e| IndexError::io(&path, e))?;
        let meta: IndexMeta =
            serde_json::from_slice(&contents).map_err(|e| IndexError::parse(&path, e))?;

        if meta.schema_version != INDEX_SCHEMA_VERSION {
            return Err(IndexError::UnsupportedSchema {
                found: meta.schema_version,
                expected: INDEX_SCHEMA_VERSION.to_string(),
            }
            .into());
        }

        Ok(meta)
    }

    fn load_index(&self, meta: &IndexMeta) -> Result<InvertedIndex> {
        let path = self.postings_path();
        let contents = fs::read(&path).map_err(|e| IndexError::io(&path, e))?;
        let raw: HashMap<String, Vec<DocumentId>> =
            serde_json::from_slice(&contents).map_err(|e| IndexError::parse(&path, e))?;

        let mut postings = HashMap::with_capacity(raw.len());
        for (ngram, ids) in raw {
            if ngram.chars().count() != meta.ngram_size {
                return Err(IndexError::parse(
                    &path,
                    format!("key {ngram:?} is not a {}-gram", meta.ngram_size),
                )
                .into());
            }
            if let Some(bad) = ids.iter().find(|id| id.0 >= meta.document_count) {
                return Err(IndexError::parse(
                    &path,
                    format!(
                        "document id {bad} under {ngram:?} is out of range for {} documents",
                        meta.document_count
                    ),
                )
                .into());
            }
            postings.insert(ngram, ids.into_iter().collect::<HashSet<_>>());
        }

        let index = InvertedIndex::from_postings(meta.ngram_size, meta.document_count, postings);
        info!(path = %path.display(), ngrams = index.len(), "loaded file index");
        Ok(index)
    }

    /// Writes `postings.json` before `meta.json`. The two renames are not
    /// one atomic step: a reader between them sees new postings with the
    /// previous metadata. The n-gram width, id range and corpus fingerprint
    /// checks on load reject such a pair unless only the searched fields
    /// changed.
    fn save(&mut self, index: &InvertedIndex, meta: &IndexMeta) -> Result<()> {
        let postings_path = self.postings_path();
        let postings = SortedPostings(index.sorted_postings());
        self.write_atomically(&postings_path, |writer| {
            serde_json::to_writer_pretty(&mut *writer, &postings)?;
            writer
                .write_all(b"\n")
                .map_err(|e| IndexError::io(&postings_path, e))?;
            Ok(())
        })?;

        let meta_path = self.meta_path();
        self.write_atomically(&meta_path, |writer| {
            serde_json::to_writer_pretty(&mut *writer, meta)?;
            Ok(())
        })?;

        info!(
            path = %self.root.display(),
            ngrams = index.len(),
            "saved file index"
        );
        Ok(())
    }
}
