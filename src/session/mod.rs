//! Search session management.
//!
//! A session owns the index readers, the composed searcher, the
//! facet-value-universe cache, and the result-set registry. Reader
//! refresh is throttled: within the minimum interval the current
//! searcher is returned unconditionally, even if stale, to bound
//! file-handle and memory churn under load. Past the interval, stale
//! readers are reopened with the new reader installed before the old
//! one is dropped, so the session is never left without a searcher.

pub mod registry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::cql;
use crate::error::{Result, XystonError};
use crate::facets::{
    FacetCalculator, FacetRequest, FacetResult, FacetValueSource, sorted_values_for_facet,
};
use crate::fields::FieldConfiguration;
use crate::index::{Hits, IndexReader, SearchBackend, Searcher};
use crate::query::{NativeSort, translate, translate_sort_key_list};

pub use registry::ResultSetRegistry;

use ahash::AHashMap;

/// Tuning knobs for a [`SearchSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Minimum time between reader currency checks.
    pub min_refresh_interval: Duration,
    /// How long a registered result set stays resolvable.
    pub result_set_ttl: Duration,
    /// Maximum number of fields whose facet value universe is cached.
    pub facet_cache_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            min_refresh_interval: Duration::from_secs(60),
            result_set_ttl: Duration::from_secs(300),
            facet_cache_capacity: 16,
        }
    }
}

/// An executed search. Holds the hits together with the searcher that
/// produced them, so facet computation runs against the same snapshot.
pub struct SearchHandle {
    id: String,
    cql: String,
    native_query: String,
    hits: Box<dyn Hits>,
    searcher: Arc<dyn Searcher>,
}

impl SearchHandle {
    /// The id this search was registered under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The original CQL query.
    pub fn cql(&self) -> &str {
        &self.cql
    }

    /// The translated native query.
    pub fn native_query(&self) -> &str {
        &self.native_query
    }

    pub fn hits(&self) -> &dyn Hits {
        self.hits.as_ref()
    }
}

/// One term from a scan response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTerm {
    pub value: String,
    /// Number of documents carrying this term.
    pub count: u64,
    /// The term is the first in the whole enumeration.
    pub first: bool,
    /// The term is the last in the whole enumeration.
    pub last: bool,
}

struct ReaderState {
    readers: Vec<Arc<dyn IndexReader>>,
    last_refresh: Instant,
}

/// An open search session over a set of index readers.
pub struct SearchSession {
    config: SessionConfig,
    field_config: FieldConfiguration,
    backend: Arc<dyn SearchBackend>,
    // Refresh critical section. Ordinary reads never take this lock.
    state: Mutex<ReaderState>,
    searcher: RwLock<Arc<dyn Searcher>>,
    facet_values: RwLock<AHashMap<String, Arc<Vec<String>>>>,
    result_sets: ResultSetRegistry,
}

impl SearchSession {
    /// Open a session, building the composed searcher eagerly.
    pub fn open(
        readers: Vec<Arc<dyn IndexReader>>,
        backend: Arc<dyn SearchBackend>,
        field_config: FieldConfiguration,
        config: SessionConfig,
    ) -> Result<Self> {
        let searcher = backend.searcher(&readers)?;
        let result_sets = ResultSetRegistry::new(config.result_set_ttl);
        info!("opened search session over {} reader(s)", readers.len());
        Ok(SearchSession {
            config,
            field_config,
            backend,
            state: Mutex::new(ReaderState {
                readers,
                last_refresh: Instant::now(),
            }),
            searcher: RwLock::new(searcher),
            facet_values: RwLock::new(AHashMap::new()),
            result_sets,
        })
    }

    pub fn field_config(&self) -> &FieldConfiguration {
        &self.field_config
    }

    pub fn result_sets(&self) -> &ResultSetRegistry {
        &self.result_sets
    }

    /// Get the current searcher, refreshing stale readers first if the
    /// minimum refresh interval has elapsed.
    pub fn searcher(&self) -> Arc<dyn Searcher> {
        self.refresh_if_stale();
        Arc::clone(&self.searcher.read())
    }

    /// Check reader currency and reopen any stale readers, rebuilding the
    /// composed searcher and clearing the facet value cache if something
    /// changed. Within the minimum interval this is a no-op and the
    /// current searcher keeps serving, stale or not. A reader that fails
    /// to reopen stays in place; availability wins over freshness.
    pub fn refresh_if_stale(&self) {
        let mut state = self.state.lock();
        if state.last_refresh.elapsed() < self.config.min_refresh_interval {
            return;
        }
        state.last_refresh = Instant::now();

        let mut changed = false;
        for reader in state.readers.iter_mut() {
            match reader.is_current() {
                Ok(true) => {}
                Ok(false) => match reader.reopen() {
                    Ok(fresh) => {
                        // The fresh reader is installed before the stale
                        // Arc is dropped.
                        *reader = fresh;
                        changed = true;
                    }
                    Err(err) => {
                        warn!("unable to reopen a stale index reader, keeping the old one: {err}");
                    }
                },
                Err(err) => {
                    warn!("unable to check index reader currency: {err}");
                }
            }
        }
        if !changed {
            return;
        }

        match self.backend.searcher(&state.readers) {
            Ok(fresh) => {
                *self.searcher.write() = fresh;
                self.facet_values.write().clear();
                debug!("rebuilt the composed searcher after a reader refresh");
            }
            Err(err) => {
                error!("unable to rebuild the searcher after refresh, keeping the old one: {err}");
            }
        }
    }

    /// Parse and translate a CQL query, execute it with the given sort
    /// keys, and register the result set.
    pub fn search(&self, cql_query: &str, sort_keys: &str) -> Result<SearchHandle> {
        let node = cql::parse(cql_query)?;
        let native_query = translate(&node, &self.field_config, &self.result_sets)?;
        let sort = translate_sort_key_list(sort_keys, &self.field_config)?;
        debug!("translated \"{cql_query}\" to \"{native_query}\"");

        let searcher = self.searcher();
        let hits = searcher.search(&native_query, &sort)?;
        let id = self.result_sets.register(native_query.clone());
        info!("query \"{cql_query}\" matched {} document(s)", hits.len());
        Ok(SearchHandle {
            id,
            cql: cql_query.to_string(),
            native_query,
            hits,
            searcher,
        })
    }

    /// Execute an already-translated native query without registering a
    /// result set.
    pub fn search_native(&self, native_query: &str, sort: &NativeSort) -> Result<Box<dyn Hits>> {
        self.searcher().search(native_query, sort)
    }

    /// Compute facet breakdowns for an executed search. Value universes
    /// are cached per field until the next refresh that changes a reader.
    pub fn facets(&self, handle: &SearchHandle, requests: &[FacetRequest]) -> Vec<FacetResult> {
        let universe = SessionFacetValues { session: self };
        FacetCalculator::new(&self.field_config).calculate(
            handle.searcher.as_ref(),
            &handle.native_query,
            handle.hits.as_ref(),
            requests,
            &universe,
        )
    }

    /// Walk the term dictionary of `alias` starting at the first term that
    /// sorts at or after `start_term`, case-insensitively. `position`
    /// shifts the window: negative backs up that many terms, positive
    /// skips forward. Terms carry their document counts and the first and
    /// last terms of the whole enumeration are flagged.
    ///
    /// Scanning is only supported over exactly one resolved field and
    /// exactly one underlying reader.
    pub fn scan(
        &self,
        alias: &str,
        start_term: &str,
        position: i64,
        max_terms: usize,
    ) -> Result<Vec<ScanTerm>> {
        let fields = self.field_config.resolve_fields(alias)?;
        if fields.len() != 1 {
            return Err(XystonError::scan(format!(
                "scan on \"{alias}\" is unsupported: it resolves to {} fields",
                fields.len()
            )));
        }
        let facet_field = self.field_config.facet_name(&fields[0]);

        self.refresh_if_stale();
        let reader = {
            let state = self.state.lock();
            if state.readers.len() != 1 {
                return Err(XystonError::scan(format!(
                    "scan is unsupported over {} readers",
                    state.readers.len()
                )));
            }
            Arc::clone(&state.readers[0])
        };

        // Walk the whole dictionary so terms preceding the start term are
        // available for negative positions. Only the last `back` of them
        // are kept.
        let back = if position < 0 { position.unsigned_abs() as usize } else { 0 };
        let mut preceding: std::collections::VecDeque<String> =
            std::collections::VecDeque::with_capacity(back + 1);
        let mut skipped_before = 0usize;
        let start_lower = start_term.to_lowercase();
        let mut iter = reader.terms(&facet_field, "")?;
        let mut boundary = None;
        while let Some(term) = iter.next_term() {
            if term.to_lowercase() >= start_lower {
                boundary = Some(term);
                break;
            }
            if back > 0 {
                if preceding.len() == back {
                    preceding.pop_front();
                    skipped_before += 1;
                }
                preceding.push_back(term);
            } else {
                skipped_before += 1;
            }
        }

        let mut values: Vec<String> = Vec::new();
        let mut exhausted = false;
        if position > 0 {
            // Skip forward past the boundary term itself.
            let mut to_skip = position as usize;
            if boundary.take().is_some() {
                to_skip -= 1;
                skipped_before += 1;
            }
            while to_skip > 0 {
                match iter.next_term() {
                    Some(_) => {
                        to_skip -= 1;
                        skipped_before += 1;
                    }
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }
        }
        values.extend(preceding.drain(..));
        if let Some(term) = boundary {
            values.push(term);
        }
        while !exhausted && values.len() < max_terms {
            match iter.next_term() {
                Some(term) => values.push(term),
                None => exhausted = true,
            }
        }
        let truncated = values.len() > max_terms;
        values.truncate(max_terms);
        if truncated {
            exhausted = false;
        } else if !exhausted && iter.next_term().is_none() {
            exhausted = true;
        }

        let first_index = skipped_before == 0;
        let count = values.len();
        let mut terms = Vec::with_capacity(count);
        for (i, value) in values.into_iter().enumerate() {
            let doc_count = reader.doc_freq(&facet_field, &value)?;
            terms.push(ScanTerm {
                count: doc_count,
                first: first_index && i == 0,
                last: exhausted && i + 1 == count,
                value,
            });
        }
        Ok(terms)
    }
}

/// Lazy, race-tolerant facet value universe cache. Concurrent misses for
/// the same field may compute redundantly; the computation is idempotent
/// so the last writer wins harmlessly.
struct SessionFacetValues<'a> {
    session: &'a SearchSession,
}

impl FacetValueSource for SessionFacetValues<'_> {
    fn values(&self, field: &str) -> Result<Arc<Vec<String>>> {
        if let Some(values) = self.session.facet_values.read().get(field) {
            return Ok(Arc::clone(values));
        }
        let readers = {
            let state = self.session.state.lock();
            state.readers.clone()
        };
        let values = Arc::new(sorted_values_for_facet(
            field,
            &self.session.field_config,
            &readers,
        )?);
        let mut cache = self.session.facet_values.write();
        if cache.len() >= self.session.config.facet_cache_capacity {
            // Capacity-bounded; an arbitrary entry makes room.
            if let Some(evicted) = cache.keys().next().cloned() {
                cache.remove(&evicted);
            }
        }
        cache.insert(field.to_string(), Arc::clone(&values));
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facets::FacetValue;
    use crate::index::memory::{MemoryBackend, MemoryIndex};
    use crate::index::StoredDocument;

    fn config() -> FieldConfiguration {
        FieldConfiguration::builder()
            .field("dc_title")
            .field("mods_title")
            .field("subject")
            .alias("title", ["dc_title", "mods_title"])
            .exact_suffix("_exact")
            .sort_suffix("_sort")
            .presence_suffix("_present")
            .facet_suffix("_facet")
            .build()
            .unwrap()
    }

    fn populated_index() -> MemoryIndex {
        let index = MemoryIndex::new();
        index.add_document(
            StoredDocument::new()
                .add_value("dc_title", "cat")
                .add_value("subject_facet", "animals"),
        );
        index.add_document(
            StoredDocument::new()
                .add_value("mods_title", "cat chronicles")
                .add_value("subject_facet", "animals")
                .add_value("subject_facet", "books"),
        );
        index.add_document(StoredDocument::new().add_value("dc_title", "dog"));
        index
    }

    fn open_session(index: &MemoryIndex, session_config: SessionConfig) -> SearchSession {
        SearchSession::open(
            vec![index.reader()],
            Arc::new(MemoryBackend),
            config(),
            session_config,
        )
        .unwrap()
    }

    #[test]
    fn test_search_translates_and_executes() {
        let index = populated_index();
        let session = open_session(&index, SessionConfig::default());

        let handle = session.search("title = cat", "").unwrap();
        assert_eq!(handle.native_query(), "(dc_title:cat OR mods_title:cat)");
        assert_eq!(handle.hits().len(), 2);
        assert_eq!(handle.cql(), "title = cat");
    }

    #[test]
    fn test_result_set_round_trip() {
        let index = populated_index();
        let session = open_session(&index, SessionConfig::default());

        let first = session.search("title = cat", "").unwrap();
        let query = format!("cql.resultSetId = {}", first.id());
        let second = session.search(&query, "").unwrap();
        // Substitution splices the registered query verbatim.
        assert_eq!(
            second.native_query(),
            format!("({})", first.native_query())
        );
        assert_eq!(second.hits().len(), first.hits().len());
    }

    #[test]
    fn test_expired_result_set_is_an_error() {
        let index = populated_index();
        let session = open_session(
            &index,
            SessionConfig {
                result_set_ttl: Duration::ZERO,
                ..SessionConfig::default()
            },
        );

        let first = session.search("title = cat", "").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let query = format!("cql.resultSetId = {}", first.id());
        assert!(matches!(
            session.search(&query, ""),
            Err(XystonError::ResultSetNotFound(_))
        ));
    }

    #[test]
    fn test_refresh_is_throttled_within_interval() {
        let index = populated_index();
        let session = open_session(&index, SessionConfig::default());

        let before = session.searcher();
        index.add_document(StoredDocument::new().add_value("dc_title", "newt"));
        let after = session.searcher();
        // Inside the interval the identical searcher keeps serving.
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(
            session
                .search_native("*:*", &NativeSort::Relevance)
                .unwrap()
                .len(),
            3
        );
    }

    #[test]
    fn test_refresh_detects_changes_past_interval() {
        let index = populated_index();
        let session = open_session(
            &index,
            SessionConfig {
                min_refresh_interval: Duration::ZERO,
                ..SessionConfig::default()
            },
        );

        let before = session.searcher();
        index.add_document(StoredDocument::new().add_value("dc_title", "newt"));
        let after = session.searcher();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(
            session
                .search_native("*:*", &NativeSort::Relevance)
                .unwrap()
                .len(),
            4
        );
    }

    #[test]
    fn test_refresh_clears_facet_cache() {
        let index = populated_index();
        let session = open_session(
            &index,
            SessionConfig {
                min_refresh_interval: Duration::ZERO,
                ..SessionConfig::default()
            },
        );

        let universe = SessionFacetValues { session: &session };
        let before = universe.values("subject").unwrap();
        assert_eq!(**before, ["animals", "books"]);

        index.add_document(StoredDocument::new().add_value("subject_facet", "zebras"));
        session.refresh_if_stale();
        let after = universe.values("subject").unwrap();
        assert_eq!(**after, ["animals", "books", "zebras"]);
    }

    #[test]
    fn test_facets_over_search() {
        let index = populated_index();
        let session = open_session(&index, SessionConfig::default());

        let handle = session.search("cql.allRecords = 1", "").unwrap();
        let results = session.facets(&handle, &[FacetRequest::new("subject")]);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].values,
            vec![FacetValue::new("animals", 2), FacetValue::new("books", 1)]
        );
    }

    #[test]
    fn test_search_with_sort_keys() {
        let index = MemoryIndex::new();
        index.add_document(
            StoredDocument::new()
                .add_value("dc_title", "banana")
                .add_value("dc_title_present", "1")
                .add_value("dc_title_sort", "banana"),
        );
        index.add_document(
            StoredDocument::new()
                .add_value("dc_title", "apple")
                .add_value("dc_title_present", "1")
                .add_value("dc_title_sort", "apple"),
        );
        let session = open_session(&index, SessionConfig::default());

        let handle = session.search("cql.allRecords = 1", "dc_title,,1,,lowValue").unwrap();
        assert_eq!(handle.hits().doc(0).unwrap().first_value("dc_title"), Some("apple"));
        assert_eq!(handle.hits().doc(1).unwrap().first_value("dc_title"), Some("banana"));
    }

    fn scan_index() -> MemoryIndex {
        let index = MemoryIndex::new();
        for subject in ["apples", "Boats", "cars", "dogs", "eels"] {
            index.add_document(StoredDocument::new().add_value("subject_facet", subject));
        }
        index
    }

    #[test]
    fn test_scan_starts_at_term() {
        let index = scan_index();
        let session = open_session(&index, SessionConfig::default());

        let terms = session.scan("subject", "boats", 0, 2).unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].value, "Boats");
        assert_eq!(terms[0].count, 1);
        assert!(!terms[0].first);
        assert_eq!(terms[1].value, "cars");
        assert!(!terms[1].last);
    }

    #[test]
    fn test_scan_negative_position_backs_up() {
        let index = scan_index();
        let session = open_session(&index, SessionConfig::default());

        let terms = session.scan("subject", "cars", -2, 5).unwrap();
        let values: Vec<&str> = terms.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, ["apples", "Boats", "cars", "dogs", "eels"]);
        // Backing up two terms reached the start of the enumeration.
        assert!(terms[0].first);
        assert!(terms[4].last);
    }

    #[test]
    fn test_scan_underrun_flags_first() {
        let index = scan_index();
        let session = open_session(&index, SessionConfig::default());

        let terms = session.scan("subject", "boats", -5, 3).unwrap();
        let values: Vec<&str> = terms.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, ["apples", "Boats", "cars"]);
        assert!(terms[0].first);
        assert!(!terms[2].last);
    }

    #[test]
    fn test_scan_positive_position_skips_forward() {
        let index = scan_index();
        let session = open_session(&index, SessionConfig::default());

        let terms = session.scan("subject", "boats", 2, 10).unwrap();
        let values: Vec<&str> = terms.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, ["dogs", "eels"]);
        assert!(terms[1].last);
    }

    #[test]
    fn test_scan_rejects_multi_field_alias() {
        let index = scan_index();
        let session = open_session(&index, SessionConfig::default());

        assert!(matches!(
            session.scan("title", "a", 0, 5),
            Err(XystonError::Scan(_))
        ));
    }

    #[test]
    fn test_scan_rejects_multiple_readers() {
        let first = scan_index();
        let second = scan_index();
        let session = SearchSession::open(
            vec![first.reader(), second.reader()],
            Arc::new(MemoryBackend),
            config(),
            SessionConfig::default(),
        )
        .unwrap();

        assert!(matches!(
            session.scan("subject", "a", 0, 5),
            Err(XystonError::Scan(_))
        ));
    }
}
