//! Facet computation strategies.
//!
//! Two interchangeable strategies produce the same output shape. Small
//! result sets are traversed hit by hit; large ones are counted by running
//! a per-value term restriction against a cached filter for the base
//! query. The crossover point is where both cost about the same.

use std::sync::Arc;
use std::time::Instant;

use ahash::{AHashMap, AHashSet};
use log::{debug, error, info};

use crate::error::Result;
use crate::facets::{FacetRequest, FacetResult, FacetValue};
use crate::fields::FieldConfiguration;
use crate::index::{Hits, IndexReader, Searcher};

/// Maximum result-set size for the hit-traversal strategy. Above this the
/// search-based strategy is used instead.
pub const MAX_HITS_TO_TRAVERSE: u64 = 500;

/// Provides the universe of known values for a facet field. Backed by a
/// cached term enumeration that the session invalidates on refresh.
pub trait FacetValueSource {
    fn values(&self, field: &str) -> Result<Arc<Vec<String>>>;
}

/// Computes facet breakdowns over an executed search.
pub struct FacetCalculator<'a> {
    config: &'a FieldConfiguration,
}

impl<'a> FacetCalculator<'a> {
    pub fn new(config: &'a FieldConfiguration) -> Self {
        FacetCalculator { config }
    }

    /// Compute the requested facets over `hits`, choosing the strategy by
    /// result-set size. `native_query` is the query that produced `hits`;
    /// the search-based strategy re-executes it as a cached filter. Errors
    /// computing one facet are isolated: that facet contributes an empty
    /// value list and the others are unaffected.
    pub fn calculate(
        &self,
        searcher: &dyn Searcher,
        native_query: &str,
        hits: &dyn Hits,
        requests: &[FacetRequest],
        universe: &dyn FacetValueSource,
    ) -> Vec<FacetResult> {
        if hits.len() > MAX_HITS_TO_TRAVERSE {
            self.facets_by_searching(searcher, native_query, requests, universe)
        } else {
            self.facets_by_hit_traversal(hits, requests)
        }
    }

    /// Traverses every hit and counts the stored facet-field values it
    /// carries. A value repeated within the same hit counts once, since
    /// counts represent documents rather than term occurrences.
    fn facets_by_hit_traversal(
        &self,
        hits: &dyn Hits,
        requests: &[FacetRequest],
    ) -> Vec<FacetResult> {
        let start = Instant::now();

        let mut counts: Vec<AHashMap<String, u64>> =
            requests.iter().map(|_| AHashMap::new()).collect();
        let facet_fields: Vec<String> = requests
            .iter()
            .map(|request| self.config.facet_name(&request.field))
            .collect();

        let traversed = hits.len().min(MAX_HITS_TO_TRAVERSE);
        for hit_index in 0..traversed {
            let doc = match hits.doc(hit_index) {
                Ok(doc) => doc,
                Err(err) => {
                    error!("error retrieving hit {hit_index} while calculating facets: {err}");
                    continue;
                }
            };
            for (request_index, facet_field) in facet_fields.iter().enumerate() {
                let mut seen = AHashSet::new();
                for value in doc.values(facet_field) {
                    if seen.insert(value.as_str()) {
                        *counts[request_index].entry(value.clone()).or_insert(0) += 1;
                    }
                }
            }
        }

        let results = requests
            .iter()
            .zip(counts)
            .map(|(request, value_counts)| {
                let mut values: Vec<String> = value_counts.keys().cloned().collect();
                values.sort();
                let facet_values = window(&values, request)
                    .map(|value| FacetValue::new(value.clone(), value_counts[value]))
                    .collect();
                FacetResult {
                    field: request.field.clone(),
                    label: request.field.clone(),
                    values: facet_values,
                }
            })
            .collect();

        info!(
            target: "performance",
            "calculated facet information for {} categories by traversing {} results in {:?}",
            requests.len(),
            hits.len(),
            start.elapsed()
        );
        results
    }

    /// Counts each known value of the facet fields against a cached filter
    /// for the base query, recording nonzero counts only.
    fn facets_by_searching(
        &self,
        searcher: &dyn Searcher,
        native_query: &str,
        requests: &[FacetRequest],
        universe: &dyn FacetValueSource,
    ) -> Vec<FacetResult> {
        let start = Instant::now();

        let filter = match searcher.filter(native_query) {
            Ok(filter) => filter,
            Err(err) => {
                error!("unable to build the base query filter for facets: {err}");
                return requests
                    .iter()
                    .map(|request| FacetResult {
                        field: request.field.clone(),
                        label: request.field.clone(),
                        values: Vec::new(),
                    })
                    .collect();
            }
        };

        let mut search_count = 0u64;
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let facet_field = self.config.facet_name(&request.field);
            let mut facet_values = Vec::new();
            match universe.values(&request.field) {
                Ok(values) => {
                    for value in values.iter().skip(request.offset) {
                        if let Some(max) = request.count {
                            if facet_values.len() >= max {
                                break;
                            }
                        }
                        match filter.count_term(&facet_field, value) {
                            Ok(0) => {}
                            Ok(count) => {
                                facet_values.push(FacetValue::new(value.clone(), count));
                            }
                            Err(err) => {
                                error!(
                                    "error counting \"{value}\" for facet \"{}\": {err}",
                                    request.field
                                );
                            }
                        }
                        search_count += 1;
                    }
                }
                Err(err) => {
                    error!(
                        "no value universe available for facet \"{}\": {err}",
                        request.field
                    );
                }
            }
            results.push(FacetResult {
                field: request.field.clone(),
                label: request.field.clone(),
                values: facet_values,
            });
        }

        info!(
            target: "performance",
            "calculated facet information for {} categories by performing {} additional searches in {:?}",
            requests.len(),
            search_count,
            start.elapsed()
        );
        results
    }
}

fn window<'v>(
    values: &'v [String],
    request: &FacetRequest,
) -> impl Iterator<Item = &'v String> {
    let limit = request.count.unwrap_or(usize::MAX);
    values.iter().skip(request.offset).take(limit)
}

/// Enumerate every value of `field`'s facet variant across all readers,
/// deduplicated and sorted. Relatively slow; callers should cache the
/// result and recompute only after an index refresh.
pub fn sorted_values_for_facet(
    field: &str,
    config: &FieldConfiguration,
    readers: &[Arc<dyn IndexReader>],
) -> Result<Vec<String>> {
    let start = Instant::now();
    let facet_field = config.facet_name(field);
    let mut values = AHashSet::new();
    for reader in readers {
        let mut terms = reader.terms(&facet_field, "")?;
        while let Some(term) = terms.next_term() {
            values.insert(term);
        }
    }
    let mut sorted: Vec<String> = values.into_iter().collect();
    sorted.sort();
    debug!(
        target: "performance",
        "calculated and sorted {} facet field values for \"{facet_field}\" in {:?}",
        sorted.len(),
        start.elapsed()
    );
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::{MemoryBackend, MemoryIndex};
    use crate::index::{SearchBackend, StoredDocument};
    use crate::query::NativeSort;

    fn config() -> FieldConfiguration {
        FieldConfiguration::builder()
            .field("subject")
            .facet_suffix("_facet")
            .build()
            .unwrap()
    }

    fn universe_of(values: &[&str]) -> StaticUniverse {
        StaticUniverse {
            values: Arc::new(values.iter().map(|v| v.to_string()).collect()),
        }
    }

    struct StaticUniverse {
        values: Arc<Vec<String>>,
    }

    impl FacetValueSource for StaticUniverse {
        fn values(&self, _field: &str) -> Result<Arc<Vec<String>>> {
            Ok(Arc::clone(&self.values))
        }
    }

    struct FailingUniverse;

    impl FacetValueSource for FailingUniverse {
        fn values(&self, field: &str) -> Result<Arc<Vec<String>>> {
            Err(crate::error::XystonError::facet(format!(
                "no universe for {field}"
            )))
        }
    }

    fn small_index() -> MemoryIndex {
        let index = MemoryIndex::new();
        index.add_document(
            StoredDocument::new()
                .add_value("dc_title", "one")
                .add_value("subject_facet", "animals")
                .add_value("subject_facet", "boats"),
        );
        index.add_document(
            StoredDocument::new()
                .add_value("dc_title", "two")
                .add_value("subject_facet", "animals")
                // Repeated within the same document; counts once.
                .add_value("subject_facet", "animals"),
        );
        index.add_document(StoredDocument::new().add_value("dc_title", "three"));
        index
    }

    #[test]
    fn test_traversal_counts_and_dedup() {
        let index = small_index();
        let searcher = MemoryBackend.searcher(&[index.reader()]).unwrap();
        let hits = searcher.search("*:*", &NativeSort::Relevance).unwrap();
        let config = config();
        let calculator = FacetCalculator::new(&config);

        let results = calculator.calculate(
            searcher.as_ref(),
            "*:*",
            hits.as_ref(),
            &[FacetRequest::new("subject")],
            &universe_of(&[]),
        );
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].values,
            vec![FacetValue::new("animals", 2), FacetValue::new("boats", 1)]
        );
    }

    #[test]
    fn test_traversal_windowing() {
        let index = small_index();
        let searcher = MemoryBackend.searcher(&[index.reader()]).unwrap();
        let hits = searcher.search("*:*", &NativeSort::Relevance).unwrap();
        let config = config();
        let calculator = FacetCalculator::new(&config);

        let request = FacetRequest {
            field: "subject".to_string(),
            count: Some(1),
            offset: 1,
        };
        let results = calculator.calculate(
            searcher.as_ref(),
            "*:*",
            hits.as_ref(),
            &[request],
            &universe_of(&[]),
        );
        assert_eq!(results[0].values, vec![FacetValue::new("boats", 1)]);
    }

    #[test]
    fn test_searching_counts_nonzero_only() {
        let index = small_index();
        let searcher = MemoryBackend.searcher(&[index.reader()]).unwrap();
        let hits = searcher.search("*:*", &NativeSort::Relevance).unwrap();
        let config = config();
        let calculator = FacetCalculator::new(&config);

        // Force the search-based path directly.
        let results = calculator.facets_by_searching(
            searcher.as_ref(),
            "*:*",
            &[FacetRequest::new("subject")],
            &universe_of(&["animals", "boats", "trains"]),
        );
        assert_eq!(
            results[0].values,
            vec![FacetValue::new("animals", 2), FacetValue::new("boats", 1)]
        );
    }

    #[test]
    fn test_searching_respects_base_query() {
        let index = small_index();
        let searcher = MemoryBackend.searcher(&[index.reader()]).unwrap();
        let config = config();
        let calculator = FacetCalculator::new(&config);

        let results = calculator.facets_by_searching(
            searcher.as_ref(),
            "dc_title:one",
            &[FacetRequest::new("subject")],
            &universe_of(&["animals", "boats"]),
        );
        assert_eq!(
            results[0].values,
            vec![FacetValue::new("animals", 1), FacetValue::new("boats", 1)]
        );
    }

    #[test]
    fn test_searching_limit_counts_collected_values() {
        let index = small_index();
        let searcher = MemoryBackend.searcher(&[index.reader()]).unwrap();
        let config = config();
        let calculator = FacetCalculator::new(&config);

        // "absent" yields zero hits and must not consume the limit.
        let request = FacetRequest {
            field: "subject".to_string(),
            count: Some(2),
            offset: 0,
        };
        let results = calculator.facets_by_searching(
            searcher.as_ref(),
            "*:*",
            &[request],
            &universe_of(&["absent", "animals", "boats"]),
        );
        assert_eq!(
            results[0].values,
            vec![FacetValue::new("animals", 2), FacetValue::new("boats", 1)]
        );
    }

    #[test]
    fn test_failing_universe_is_isolated() {
        let index = small_index();
        let searcher = MemoryBackend.searcher(&[index.reader()]).unwrap();
        let config = config();
        let calculator = FacetCalculator::new(&config);

        let results = calculator.facets_by_searching(
            searcher.as_ref(),
            "*:*",
            &[FacetRequest::new("subject")],
            &FailingUniverse,
        );
        assert_eq!(results.len(), 1);
        assert!(results[0].values.is_empty());
    }

    #[test]
    fn test_strategy_selection_boundary() {
        // At the threshold exactly, traversal runs; counts come from stored
        // values without any universe.
        let index = MemoryIndex::new();
        for i in 0..MAX_HITS_TO_TRAVERSE {
            index.add_document(
                StoredDocument::new()
                    .add_value("dc_title", format!("doc {i}"))
                    .add_value("subject_facet", "common"),
            );
        }
        let searcher = MemoryBackend.searcher(&[index.reader()]).unwrap();
        let hits = searcher.search("*:*", &NativeSort::Relevance).unwrap();
        assert_eq!(hits.len(), MAX_HITS_TO_TRAVERSE);
        let config = config();
        let calculator = FacetCalculator::new(&config);

        // An empty universe would make the search-based path return nothing,
        // so a populated result proves traversal ran.
        let results = calculator.calculate(
            searcher.as_ref(),
            "*:*",
            hits.as_ref(),
            &[FacetRequest::new("subject")],
            &universe_of(&[]),
        );
        assert_eq!(
            results[0].values,
            vec![FacetValue::new("common", MAX_HITS_TO_TRAVERSE)]
        );
    }

    #[test]
    fn test_strategies_agree_above_threshold() {
        let index = MemoryIndex::new();
        for i in 0..(MAX_HITS_TO_TRAVERSE + 1) {
            let subject = if i % 2 == 0 { "even" } else { "odd" };
            index.add_document(
                StoredDocument::new()
                    .add_value("dc_title", format!("doc {i}"))
                    .add_value("subject_facet", subject),
            );
        }
        let searcher = MemoryBackend.searcher(&[index.reader()]).unwrap();
        let hits = searcher.search("*:*", &NativeSort::Relevance).unwrap();
        let config = config();
        let calculator = FacetCalculator::new(&config);
        let universe = universe_of(&["even", "odd"]);

        let results = calculator.calculate(
            searcher.as_ref(),
            "*:*",
            hits.as_ref(),
            &[FacetRequest::new("subject")],
            &universe,
        );
        assert_eq!(
            results[0].values,
            vec![
                FacetValue::new("even", MAX_HITS_TO_TRAVERSE / 2 + 1),
                FacetValue::new("odd", MAX_HITS_TO_TRAVERSE / 2),
            ]
        );
    }

    #[test]
    fn test_sorted_values_for_facet() {
        let index = small_index();
        let other = MemoryIndex::new();
        other.add_document(StoredDocument::new().add_value("subject_facet", "rivers"));
        let readers = vec![index.reader(), other.reader()];

        let config = config();
        let values = sorted_values_for_facet("subject", &config, &readers).unwrap();
        assert_eq!(values, ["animals", "boats", "rivers"]);
    }
}
