//! Typed failures for persisted indexes and corpus pairing.
//!
//! Everything else in the crate reports errors through `anyhow`; these
//! variants are kept distinct so callers (notably the HTTP server) can
//! tell a missing index from a corrupt one or a mismatched corpus via
//! `anyhow::Error::downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to access index data at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed index data at {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("unsupported index schema version {found}; expected {expected}")]
    UnsupportedSchema { found: String, expected: String },

    #[error(
        "index was built from a different corpus: index covers {index_documents} records \
         (fingerprint {index_fingerprint:016x}), corpus has {corpus_documents} records \
         (fingerprint {corpus_fingerprint:016x})"
    )]
    CorpusMismatch {
        index_documents: u64,
        index_fingerprint: u64,
        corpus_documents: u64,
        corpus_fingerprint: u64,
    },
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            IndexError::NotFound(path)
        } else {
            IndexError::Io { path, source }
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        IndexError::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_io_errors_become_not_found() {
        let err = IndexError::io(
            "/tmp/nowhere/postings.json",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(err, IndexError::NotFound(_)));
        assert!(err.to_string().starts_with("index not found at "));
    }

    #[test]
    fn other_io_errors_keep_their_source() {
        let err = IndexError::io(
            "/tmp/postings.json",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, IndexError::Io { .. }));
    }
}
