//! SQLite-based index backend.
//!
//! This backend stores the index in a single SQLite database file with
//! the following schema:
//!
//! - `meta(key TEXT PRIMARY KEY, value TEXT NOT NULL)`
//! - `postings(ngram TEXT, doc_id INTEGER, PRIMARY KEY(ngram, doc_id))`
//!
//! A save replaces every row inside one write transaction, so readers
//! never observe a half-written index. The connection is configured
//! with:
//!
//! - `journal_mode = WAL` for concurrent readers and a single writer.
//! - `synchronous = NORMAL` as a balance between safety and speed.
//! - `busy_timeout` to avoid transient `database is locked` errors.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use rusqlite::{params, Connection, OpenFlags};
use tracing::info;

use crate::index::backend::IndexBackend;
use crate::index::error::IndexError;
use crate::index::inverted::InvertedIndex;
use crate::index::models::{IndexMeta, INDEX_SCHEMA_VERSION};
use crate::models::{DocumentId, IndexBackendKind};

/// SQLite-backed implementation of `IndexBackend`.
pub struct SqliteIndexBackend {
    path: PathBuf,
    conn: Connection,
}

impl SqliteIndexBackend {
    /// Open (or create) a SQLite index at the given path.
    pub fn open(index_path: &Path) -> Result<Self> {
        if let Some(parent) = index_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = Connection::open_with_flags(index_path, flags)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(5000))?;

        Self::initialize_schema(&conn)?;

        Ok(Self {
            path: index_path.to_path_buf(),
            conn,
        })
    }

    /// Open an existing SQLite index without creating one.
    pub fn open_existing(index_path: &Path) -> Result<Self> {
        if !index_path.exists() {
            return Err(IndexError::NotFound(index_path.to_path_buf()).into());
        }
        if !index_path.is_file() {
            anyhow::bail!(
                "sqlite backend requires index_path to be a file; got {}",
                index_path.display()
            );
        }

        // No SQLITE_OPEN_CREATE: a vanished file must not be recreated empty.
        let conn = Connection::open_with_flags(index_path, OpenFlags::SQLITE_OPEN_READ_WRITE)
            .map_err(|e| IndexError::parse(index_path, e))?;
        conn.busy_timeout(std::time::Duration::from_millis(5000))?;

        Ok(Self {
            path: index_path.to_path_buf(),
            conn,
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS postings (
                ngram  TEXT NOT NULL,
                doc_id INTEGER NOT NULL,
                PRIMARY KEY (ngram, doc_id)
            ) WITHOUT ROWID;
        "#,
        )?;

        Ok(())
    }

    fn corrupt(&self, err: impl ToString) -> IndexError {
        IndexError::parse(&self.path, err)
    }

    fn read_meta_map(&self) -> Result<HashMap<String, String>, IndexError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM meta")
            .map_err(|e| self.corrupt(e))?;
        let rows = stmt
            .query_map([], |row| {
                let key: String = row.get(0)?;
                let value: String = row.get(1)?;
                Ok((key, value))
            })
            .map_err(|e| self.corrupt(e))?;

        let mut map = HashMap::new();
        for row in rows {
            let (key, value) = row.map_err(|e| self.corrupt(e))?;
            map.insert(key, value);
        }
        Ok(map)
    }

    fn required<'m>(
        &self,
        map: &'m HashMap<String, String>,
        key: &str,
    ) -> Result<&'m str, IndexError> {
        map.get(key)
            .map(String::as_str)
            .ok_or_else(|| self.corrupt(format!("meta is missing {key}")))
    }

    fn required_number<T: std::str::FromStr>(
        &self,
        map: &HashMap<String, String>,
        key: &str,
    ) -> Result<T, IndexError> {
        let raw = self.required(map, key)?;
        raw.parse::<T>()
            .map_err(|_| self.corrupt(format!("meta {key} is not a number: {raw:?}")))
    }
}

impl IndexBackend for SqliteIndexBackend {
    fn kind(&self) -> IndexBackendKind {
        IndexBackendKind::Sqlite
    }

    fn index_path(&self) -> &Path {
        &self.path
    }

    fn load_meta(&self) -> Result<IndexMeta> {
        let map = self.read_meta_map()?;

        if map.is_empty() {
            return Err(IndexError::NotFound(self.path.clone()).into());
        }

        let schema_version = self.required(&map, "schema_version")?.to_string();
        if schema_version != INDEX_SCHEMA_VERSION {
            return Err(IndexError::UnsupportedSchema {
                found: schema_version,
                expected: INDEX_SCHEMA_VERSION.to_string(),
            }
            .into());
        }

        let fields: Vec<String> = serde_json::from_str(self.required(&map, "fields")?)
            .map_err(|e| self.corrupt(format!("meta fields: {e}")))?;

        Ok(IndexMeta {
            schema_version,
            tool_version: map
                .get("tool_version")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            ngram_size: self.required_number(&map, "ngram_size")?,
            fields,
            document_count: self.required_number(&map, "document_count")?,
            corpus_fingerprint: self.required_number(&map, "corpus_fingerprint")?,
            corpus_path: map.get("corpus_path").cloned().unwrap_or_default(),
            created_at: self.required_number(&map, "created_at")?,
            updated_at: self.required_number(&map, "updated_at")?,
        })
    }

    fn load_index(&self, meta: &IndexMeta) -> Result<InvertedIndex> {
        let mut stmt = self
            .conn
            .prepare("SELECT ngram, doc_id FROM postings")
            .map_err(|e| self.corrupt(e))?;
        let rows = stmt
            .query_map([], |row| {
                let ngram: String = row.get(0)?;
                let doc_id: i64 = row.get(1)?;
                Ok((ngram, doc_id))
            })
            .map_err(|e| self.corrupt(e))?;

        let mut postings: HashMap<String, HashSet<DocumentId>> = HashMap::new();
        for row in rows {
            let (ngram, doc_id) = row.map_err(|e| self.corrupt(e))?;
            if doc_id < 0 || doc_id as u64 >= meta.document_count {
                return Err(self
                    .corrupt(format!(
                        "document id {doc_id} under {ngram:?} is out of range for {} documents",
                        meta.document_count
                    ))
                    .into());
            }
            if ngram.chars().count() != meta.ngram_size {
                return Err(self
                    .corrupt(format!("key {ngram:?} is not a {}-gram", meta.ngram_size))
                    .into());
            }

            let id = DocumentId(doc_id as u64);
            match postings.get_mut(&ngram) {
                Some(set) => {
                    set.insert(id);
                }
                None => {
                    postings.insert(ngram, HashSet::from([id]));
                }
            }
        }

        let index = InvertedIndex::from_postings(meta.ngram_size, meta.document_count, postings);
        info!(path = %self.path.display(), ngrams = index.len(), "loaded sqlite index");
        Ok(index)
    }

    fn save(&mut self, index: &InvertedIndex, meta: &IndexMeta) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM meta", [])?;
        tx.execute("DELETE FROM postings", [])?;

        {
            let mut stmt = tx.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;

            let fields = serde_json::to_string(&meta.fields)?;
            let rows = [
                ("schema_version", meta.schema_version.clone()),
                ("tool_version", meta.tool_version.clone()),
                ("ngram_size", meta.ngram_size.to_string()),
                ("fields", fields),
                ("document_count", meta.document_count.to_string()),
                ("corpus_fingerprint", meta.corpus_fingerprint.to_string()),
                ("corpus_path", meta.corpus_path.clone()),
                ("created_at", meta.created_at.to_string()),
                ("updated_at", meta.updated_at.to_string()),
            ];

            for (key, value) in rows {
                stmt.execute(params![key, value])?;
            }
        }

        {
            let mut stmt = tx.prepare("INSERT INTO postings (ngram, doc_id) VALUES (?1, ?2)")?;
            for (ngram, ids) in index.sorted_postings() {
                for id in ids {
                    stmt.execute(params![ngram, id.0 as i64])?;
                }
            }
        }

        tx.commit()?;

        info!(
            path = %self.path.display(),
            ngrams = index.len(),
            postings = index.posting_count(),
            "saved sqlite index"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_index() -> InvertedIndex {
        let mut index = InvertedIndex::new(2, 3);
        index.insert("大阪", DocumentId(0));
        index.insert("大阪", DocumentId(2));
        index.insert("阪市", DocumentId(2));
        index.insert("xy", DocumentId(1));
        index
    }

    fn sample_meta(index: &InvertedIndex) -> IndexMeta {
        IndexMeta {
            schema_version: INDEX_SCHEMA_VERSION.to_string(),
            tool_version: "0.0.0".to_string(),
            ngram_size: index.ngram_size(),
            fields: vec!["都道府県".to_string(), "市区町村".to_string()],
            document_count: index.document_count(),
            corpus_fingerprint: u64::MAX,
            corpus_path: "zenkoku.csv".to_string(),
            created_at: 1_700_000_000,
            updated_at: 1_700_000_100,
        }
    }

    #[test]
    fn sqlite_backend_round_trips_postings_and_meta() {
        let dir = tempdir().expect("tempdir");
        let db_path = dir.path().join(".addrgram").join("index.sqlite");
        let index = sample_index();
        let meta = sample_meta(&index);

        let mut backend = SqliteIndexBackend::open(&db_path).expect("backend");
        backend.save(&index, &meta).expect("save");
        drop(backend);

        let reopened = SqliteIndexBackend::open_existing(&db_path).expect("reopen");
        let loaded_meta = reopened.load_meta().expect("meta");
        let loaded = reopened.load_index(&loaded_meta).expect("index");

        assert_eq!(loaded_meta, meta);
        assert_eq!(loaded, index);
    }

    #[test]
    fn save_replaces_previous_postings() {
        let dir = tempdir().expect("tempdir");
        let db_path = dir.path().join("index.sqlite");
        let index = sample_index();
        let meta = sample_meta(&index);

        let mut backend = SqliteIndexBackend::open(&db_path).expect("backend");
        backend.save(&index, &meta).expect("save");

        let mut smaller = InvertedIndex::new(2, 1);
        smaller.insert("ab", DocumentId(0));
        let smaller_meta = sample_meta(&smaller);
        backend.save(&smaller, &smaller_meta).expect("save again");

        let loaded = backend.load_index(&smaller_meta).expect("index");
        assert_eq!(loaded, smaller);
    }

    #[test]
    fn open_existing_reports_missing_file() {
        let dir = tempdir().expect("tempdir");
        let err = match SqliteIndexBackend::open_existing(&dir.path().join("none.sqlite")) {
            Ok(_) => panic!("expected missing index error"),
            Err(err) => err,
        };
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::NotFound(_))
        ));
    }

    #[test]
    fn non_database_file_is_a_parse_error() {
        let dir = tempdir().expect("tempdir");
        let db_path = dir.path().join("index.sqlite");
        fs::write(&db_path, "this is not a sqlite database, just some text padding it out")
            .expect("write");

        let backend = SqliteIndexBackend::open_existing(&db_path);
        let err = match backend {
            Ok(backend) => backend.load_meta().expect_err("garbage file"),
            Err(err) => err,
        };
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::Parse { .. })
        ));
    }

    #[test]
    fn empty_database_has_no_meta() {
        let dir = tempdir().expect("tempdir");
        let db_path = dir.path().join("index.sqlite");
        let backend = SqliteIndexBackend::open(&db_path).expect("backend");

        let err = backend.load_meta().expect_err("empty");
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::NotFound(_))
        ));
    }
}
