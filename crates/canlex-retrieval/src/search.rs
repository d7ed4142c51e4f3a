//! Hybrid retrieval over the embedding store.
//!
//! A query is embedded with the same model as the stored vectors, the ANN
//! candidates are blended with a lexical term-overlap score over stored
//! content, and exact duplicates collapse on `(sourceType, sourceId,
//! chunkIndex)` — never across different source types.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use canlex_ai::{EmbeddingProvider, normalize_for_embedding, validate_embedding};
use canlex_core::types::Language;
use canlex_store::LanceStore;

use crate::RetrievalError;

/// Weight of the vector score in the blend; the remainder is lexical.
const VECTOR_WEIGHT: f32 = 0.7;

/// Candidate multiplier: fetch more ANN hits than requested so the lexical
/// blend has something to reorder.
const CANDIDATE_FACTOR: usize = 4;

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub content: String,
    pub metadata: Value,
    pub similarity: f32,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: usize,
    pub language: Option<Language>,
    /// Extra SQL predicate pushed down to the store (metadata columns).
    pub filter: Option<String>,
}

/// Hybrid vector+lexical search, best first.
pub async fn execute_vector_search(
    lance: &LanceStore,
    provider: &mut dyn EmbeddingProvider,
    query: &str,
    source_type: Option<&str>,
    options: &SearchOptions,
) -> Result<Vec<SearchResult>, RetrievalError> {
    let limit = if options.limit == 0 { 10 } else { options.limit };

    let normalized = normalize_for_embedding(query);
    let embeddings = provider.embed_batch(&[normalized.as_str()])?;
    let query_vector = embeddings
        .first()
        .ok_or_else(|| RetrievalError::Other("embedder returned no vector".into()))?;
    validate_embedding(query_vector, provider.dimensions())?;

    let filter = build_filter(source_type, options);
    let hits = lance
        .search(query_vector, limit * CANDIDATE_FACTOR, filter.as_deref())
        .await?;
    debug!(candidates = hits.len(), "vector candidates fetched");

    let query_terms = terms(&normalized);
    let mut results: Vec<SearchResult> = hits
        .into_iter()
        .filter_map(|hit| {
            let metadata: Value = serde_json::from_str(&hit.metadata).ok()?;
            // Cosine distance ∈ [0, 2]; map to a [0, 1] similarity.
            let vector_score = (1.0 - hit.distance.unwrap_or(1.0)).clamp(0.0, 1.0);
            let lexical_score = lexical_overlap(&query_terms, &hit.content);
            Some(SearchResult {
                content: hit.content,
                metadata,
                similarity: VECTOR_WEIGHT * vector_score + (1.0 - VECTOR_WEIGHT) * lexical_score,
            })
        })
        .collect();

    results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    results.truncate(limit);
    Ok(results)
}

fn build_filter(source_type: Option<&str>, options: &SearchOptions) -> Option<String> {
    let mut predicates = Vec::new();
    if let Some(st) = source_type {
        predicates.push(format!("source_type = '{}'", st.replace('\'', "''")));
    }
    if let Some(lang) = options.language {
        predicates.push(format!("language = '{lang}'"));
    }
    if let Some(extra) = &options.filter {
        predicates.push(extra.clone());
    }
    if predicates.is_empty() {
        None
    } else {
        Some(predicates.join(" AND "))
    }
}

/// Lowercased alphanumeric terms of length ≥ 2.
fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}

/// Fraction of query terms present in the content.
fn lexical_overlap(query_terms: &HashSet<String>, content: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let content_terms = terms(content);
    let matched = query_terms.intersection(&content_terms).count();
    matched as f32 / query_terms.len() as f32
}

/// Collapse results whose `(sourceType, sourceId, chunkIndex)` all match.
/// The first (highest-scored) occurrence wins; results with the same
/// `sourceId` but different `sourceType` are distinct.
pub fn deduplicate_results(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashSet<(String, String, u64)> = HashSet::new();
    let mut out = Vec::with_capacity(results.len());
    for result in results {
        let key = dedup_key(&result.metadata);
        if seen.insert(key) {
            out.push(result);
        }
    }
    out
}

/// String and numeric `sourceId` compare as-is: `"123"` and `123` are
/// different keys. A missing `chunkIndex` is chunk 0.
fn dedup_key(metadata: &Value) -> (String, String, u64) {
    let source_type = metadata["sourceType"].as_str().unwrap_or("").to_string();
    let source_id = match &metadata["sourceId"] {
        Value::String(s) => format!("s:{s}"),
        Value::Number(n) => format!("n:{n}"),
        other => format!("v:{other}"),
    };
    let chunk_index = metadata["chunkIndex"].as_u64().unwrap_or(0);
    (source_type, source_id, chunk_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(source_type: &str, source_id: Value, chunk_index: Option<u64>) -> SearchResult {
        let mut metadata = json!({
            "sourceType": source_type,
            "sourceId": source_id,
        });
        if let Some(ci) = chunk_index {
            metadata["chunkIndex"] = json!(ci);
        }
        SearchResult {
            content: String::new(),
            metadata,
            similarity: 0.5,
        }
    }

    #[test]
    fn same_id_different_source_type_distinct() {
        let results = vec![
            result("bill", json!(123), Some(0)),
            result("party", json!(123), Some(0)),
        ];
        assert_eq!(deduplicate_results(results).len(), 2);
    }

    #[test]
    fn exact_triple_collapses() {
        // The bill entries (implicit chunk 0 and explicit chunk 0) collapse;
        // the party entry survives.
        let results = vec![
            result("bill", json!(123), None),
            result("party", json!(123), None),
            result("bill", json!(123), Some(0)),
        ];
        let deduped = deduplicate_results(results);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].metadata["sourceType"], "bill");
        assert_eq!(deduped[1].metadata["sourceType"], "party");
    }

    #[test]
    fn different_chunk_index_distinct() {
        let results = vec![
            result("act_section", json!("C-46/s2"), Some(0)),
            result("act_section", json!("C-46/s2"), Some(1)),
        ];
        assert_eq!(deduplicate_results(results).len(), 2);
    }

    #[test]
    fn string_and_numeric_ids_compare_as_is() {
        let results = vec![
            result("bill", json!(123), Some(0)),
            result("bill", json!("123"), Some(0)),
        ];
        assert_eq!(deduplicate_results(results).len(), 2);
    }

    #[test]
    fn lexical_overlap_fraction() {
        let q = terms("fishing zones of canada");
        assert!(lexical_overlap(&q, "The fishing zones described in the schedule") > 0.4);
        assert_eq!(lexical_overlap(&q, "entirely unrelated text"), 0.0);
        assert_eq!(lexical_overlap(&HashSet::new(), "whatever"), 0.0);
    }

    #[test]
    fn terms_drop_punctuation_and_short_tokens() {
        let t = terms("s. 91(2)(a) of the Act");
        assert!(t.contains("91"));
        assert!(t.contains("act"));
        assert!(t.contains("the"));
        assert!(!t.contains("s"));
        assert!(!t.contains("a"));
    }

    #[test]
    fn filter_composition() {
        let options = SearchOptions {
            limit: 5,
            language: Some(Language::En),
            filter: Some("status = 'in-force'".into()),
        };
        let filter = build_filter(Some("act_section"), &options).unwrap();
        assert_eq!(
            filter,
            "source_type = 'act_section' AND language = 'en' AND status = 'in-force'"
        );
        assert_eq!(build_filter(None, &SearchOptions::default()), None);
    }
}
