//! Core search entry points.
//!
//! Candidate computation (n-gram AND-intersection) is kept separate
//! from resolution (id → record) so each step can be used and tested on
//! its own. These functions provide the "search as a function" API used
//! by the CLI and the daemon.

use std::collections::{BTreeSet, HashSet};

use anyhow::Result;
use tracing::debug;

use crate::index::{ngram_slices, InvertedIndex};
use crate::models::{
    DocumentId, EmptyKeywordPolicy, QueryOptions, SearchConfig, SearchHit, SearchResult,
    SearchSummary, SEARCH_RESULT_VERSION,
};
use crate::search::snapshot::SearchSnapshot;

/// Documents that contain every n-gram of a keyword.
///
/// This is a superset of the documents containing the keyword as a
/// contiguous substring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    pub ids: BTreeSet<DocumentId>,
    /// Number of n-grams the keyword produced.
    pub ngrams: usize,
    /// Number of n-grams looked up in the index.
    pub probed: usize,
    /// True if a missing n-gram ended the lookup early.
    pub short_circuited: bool,
}

/// Intersect the postings of every n-gram of `keyword`.
///
/// A keyword shorter than the index n-gram width has no n-grams; `policy`
/// decides whether that matches nothing or every document. An n-gram
/// missing from the index ends the lookup with no candidates.
pub fn candidates(keyword: &str, index: &InvertedIndex, policy: EmptyKeywordPolicy) -> Candidates {
    let grams = ngram_slices(keyword, index.ngram_size());
    let ngrams = grams.len();

    if ngrams == 0 {
        let ids = match policy {
            EmptyKeywordPolicy::MatchNone => BTreeSet::new(),
            EmptyKeywordPolicy::MatchAll => (0..index.document_count()).map(DocumentId).collect(),
        };
        return Candidates {
            ids,
            ..Candidates::default()
        };
    }

    let mut lists: Vec<&HashSet<DocumentId>> = Vec::with_capacity(ngrams);
    let mut probed = 0;

    for gram in grams {
        probed += 1;
        let Some(postings) = index.postings(gram) else {
            debug!(ngram = gram, probed, ngrams, "n-gram absent from index");
            return Candidates {
                ids: BTreeSet::new(),
                ngrams,
                probed,
                short_circuited: true,
            };
        };
        lists.push(postings);
    }

    // Only the smallest posting list is copied; the others filter it.
    lists.sort_by_key(|postings| postings.len());
    let Some((smallest, rest)) = lists.split_first() else {
        return Candidates {
            ngrams,
            probed,
            ..Candidates::default()
        };
    };
    let mut acc = (*smallest).clone();
    for postings in rest {
        acc.retain(|id| postings.contains(id));
    }

    Candidates {
        ids: acc.into_iter().collect(),
        ngrams,
        probed,
        short_circuited: false,
    }
}

/// Answer `keyword` from a loaded snapshot.
///
/// Hits are returned in ascending document id order. With
/// `options.verify` set, candidates whose searchable text does not
/// contain the keyword literally are dropped before resolution.
pub fn search_snapshot(
    snapshot: &SearchSnapshot,
    keyword: &str,
    options: &QueryOptions,
) -> SearchResult {
    let corpus = snapshot.corpus();
    let found = candidates(keyword, snapshot.index(), options.empty_keyword);

    let mut rejected_by_verify: u64 = 0;
    let records = found.ids.iter().filter_map(|&id| corpus.get(id));
    let matching: Vec<_> = if options.verify {
        records
            .filter(|record| {
                let keep = corpus
                    .searchable_text(record, snapshot.fields())
                    .contains(keyword);
                if !keep {
                    rejected_by_verify += 1;
                }
                keep
            })
            .collect()
    } else {
        records.collect()
    };

    let total_matches = matching.len();
    let limit = options.limit.unwrap_or(usize::MAX);
    let hits: Vec<SearchHit> = matching
        .into_iter()
        .take(limit)
        .map(|record| corpus.to_hit(record, snapshot.display_fields()))
        .collect();

    debug!(
        keyword,
        candidates = found.ids.len(),
        rejected_by_verify,
        hits = hits.len(),
        "search finished"
    );

    SearchResult {
        version: SEARCH_RESULT_VERSION.to_string(),
        query: keyword.to_string(),
        summary: SearchSummary {
            ngrams: found.ngrams as u64,
            ngrams_probed: found.probed as u64,
            short_circuited: found.short_circuited,
            total_matches: total_matches as u64,
            rejected_by_verify,
            truncated: hits.len() < total_matches,
        },
        hits,
    }
}

/// Execute a search based on the provided configuration.
///
/// Loads the persisted index and its corpus, checks that they belong
/// together, and runs the query.
pub fn run_search(config: SearchConfig) -> Result<SearchResult> {
    let snapshot = SearchSnapshot::load(&config.index)?;
    Ok(search_snapshot(&snapshot, &config.keyword, &config.options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::corpus::Corpus;
    use crate::index::{build, run_index, IndexError, IndexMeta, INDEX_SCHEMA_VERSION};
    use crate::models::{CorpusConfig, IndexBackendKind, IndexConfig};

    fn corpus_of(texts: &[&str]) -> Corpus {
        Corpus::from_rows(
            vec!["text".to_string()],
            texts.iter().map(|t| vec![t.to_string()]),
        )
        .expect("corpus")
    }

    fn index_of(corpus: &Corpus) -> InvertedIndex {
        let fields = corpus.select_fields(&["text".to_string()]).expect("fields");
        build(corpus, &fields, 2)
    }

    fn snapshot_of(texts: &[&str]) -> SearchSnapshot {
        let corpus = corpus_of(texts);
        let index = index_of(&corpus);
        let meta = IndexMeta {
            schema_version: INDEX_SCHEMA_VERSION.to_string(),
            tool_version: "0.0.0".to_string(),
            ngram_size: 2,
            fields: vec!["text".to_string()],
            document_count: corpus.len() as u64,
            corpus_fingerprint: corpus.fingerprint(),
            corpus_path: String::new(),
            created_at: 0,
            updated_at: 0,
        };
        SearchSnapshot::new(Arc::new(corpus), Arc::new(index), meta, &[]).expect("snapshot")
    }

    fn ids(result: &SearchResult) -> Vec<u64> {
        result.hits.iter().map(|hit| hit.id.0).collect()
    }

    #[test]
    fn bigram_intersection_admits_non_contiguous_match() {
        let corpus = corpus_of(&["aaXab"]);
        let index = index_of(&corpus);

        let found = candidates("aab", &index, EmptyKeywordPolicy::MatchNone);
        assert_eq!(found.ids, BTreeSet::from([DocumentId(0)]));
        assert_eq!(found.probed, 2);
        assert!(!found.short_circuited);
    }

    #[test]
    fn verification_rejects_non_contiguous_match() {
        let snapshot = snapshot_of(&["aaXab", "xaabx"]);
        let options = QueryOptions {
            verify: true,
            ..QueryOptions::default()
        };

        let result = search_snapshot(&snapshot, "aab", &options);
        assert_eq!(ids(&result), vec![1]);
        assert_eq!(result.summary.rejected_by_verify, 1);
        assert_eq!(result.summary.total_matches, 1);

        let unverified = search_snapshot(&snapshot, "aab", &QueryOptions::default());
        assert_eq!(ids(&unverified), vec![0, 1]);
    }

    #[test]
    fn contained_keyword_is_found() {
        let snapshot = snapshot_of(&["TokyoShibuya", "OsakaUmeda"]);
        let result = search_snapshot(&snapshot, "Shibuya", &QueryOptions::default());

        assert_eq!(ids(&result), vec![0]);
        assert_eq!(result.hits[0].fields[0].value, "TokyoShibuya");
        assert_eq!(result.summary.ngrams, 6);
        assert_eq!(result.version, SEARCH_RESULT_VERSION);
    }

    #[test]
    fn intersection_leaves_index_postings_untouched() {
        let corpus = corpus_of(&[
            "東京都渋谷",
            "東京都新宿",
            "東京都中野",
            "大阪府",
        ]);
        let index = index_of(&corpus);

        let found = candidates("東京都渋谷", &index, EmptyKeywordPolicy::MatchNone);
        assert_eq!(found.ids, BTreeSet::from([DocumentId(0)]));
        assert_eq!(found.probed, 4);

        let tokyo = index.postings("東京").expect("postings");
        assert_eq!(tokyo.len(), 3);
    }

    #[test]
    fn missing_ngram_short_circuits() {
        let corpus = corpus_of(&["TokyoShibuya", "OsakaUmeda"]);
        let index = index_of(&corpus);

        let found = candidates("zzShibuya", &index, EmptyKeywordPolicy::MatchNone);
        assert!(found.ids.is_empty());
        assert!(found.short_circuited);
        assert_eq!(found.probed, 1);
        assert_eq!(found.ngrams, 8);
    }

    #[test]
    fn empty_corpus_matches_nothing() {
        let snapshot = snapshot_of(&[]);
        assert!(snapshot.index().is_empty());

        for keyword in ["", "a", "ab", "東京都"] {
            for policy in [EmptyKeywordPolicy::MatchNone, EmptyKeywordPolicy::MatchAll] {
                let options = QueryOptions {
                    empty_keyword: policy,
                    ..QueryOptions::default()
                };
                let result = search_snapshot(&snapshot, keyword, &options);
                assert!(result.hits.is_empty(), "{keyword:?} under {policy:?}");
            }
        }
    }

    #[test]
    fn short_keyword_follows_policy() {
        let snapshot = snapshot_of(&["東京都", "大阪府", "京都府"]);

        let none = search_snapshot(&snapshot, "京", &QueryOptions::default());
        assert!(none.hits.is_empty());
        assert_eq!(none.summary.ngrams, 0);
        assert!(!none.summary.short_circuited);

        let all = search_snapshot(
            &snapshot,
            "京",
            &QueryOptions {
                empty_keyword: EmptyKeywordPolicy::MatchAll,
                ..QueryOptions::default()
            },
        );
        assert_eq!(ids(&all), vec![0, 1, 2]);
    }

    #[test]
    fn multibyte_keyword_intersects_by_character() {
        let snapshot = snapshot_of(&[
            "東京都渋谷区",
            "大阪府大阪市",
            "京都府京都市",
        ]);

        let result = search_snapshot(&snapshot, "京都", &QueryOptions::default());
        assert_eq!(ids(&result), vec![0, 2]);

        let result = search_snapshot(&snapshot, "渋谷区", &QueryOptions::default());
        assert_eq!(ids(&result), vec![0]);
    }

    #[test]
    fn limit_truncates_in_id_order() {
        let snapshot = snapshot_of(&["abc", "xabc", "abcx", "zzz"]);
        let options = QueryOptions {
            limit: Some(2),
            ..QueryOptions::default()
        };

        let result = search_snapshot(&snapshot, "abc", &options);
        assert_eq!(ids(&result), vec![0, 1]);
        assert_eq!(result.summary.total_matches, 3);
        assert!(result.summary.truncated);
    }

    fn write_index(dir: &Path, csv: &str) -> IndexConfig {
        let corpus_path = dir.join("corpus.csv");
        fs::write(&corpus_path, csv).expect("write corpus");
        let config = IndexConfig {
            corpus: CorpusConfig {
                path: corpus_path,
                fields: vec!["city".to_string(), "town".to_string()],
                display_fields: vec!["zip".to_string(), "town".to_string()],
                delimiter: ',',
            },
            backend: IndexBackendKind::File,
            index_path: dir.join(".addrgram"),
            ngram_size: 2,
            parallel: true,
        };
        run_index(config.clone()).expect("index");
        config
    }

    #[test]
    fn run_search_resolves_display_fields_from_persisted_index() {
        let dir = tempdir().expect("tempdir");
        let index = write_index(
            dir.path(),
            "zip,city,town\n150-0002,渋谷区,渋谷\n530-0001,大阪市北区,梅田\n",
        );

        let result = run_search(SearchConfig {
            keyword: "渋谷".to_string(),
            index,
            options: QueryOptions::default(),
        })
        .expect("search");

        assert_eq!(ids(&result), vec![0]);
        let fields: Vec<_> = result.hits[0]
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.value.as_str()))
            .collect();
        assert_eq!(fields, vec![("zip", "150-0002"), ("town", "渋谷")]);
    }

    #[test]
    fn run_search_fails_fast_on_changed_corpus() {
        let dir = tempdir().expect("tempdir");
        let index = write_index(dir.path(), "zip,city,town\n150-0002,渋谷区,渋谷\n");
        fs::write(&index.corpus.path, "zip,city,town\n530-0001,大阪市北区,梅田\n")
            .expect("rewrite corpus");

        let err = run_search(SearchConfig {
            keyword: "梅田".to_string(),
            index,
            options: QueryOptions::default(),
        })
        .expect_err("mismatch");

        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::CorpusMismatch { .. })
        ));
    }
}
