//! `search`: hybrid retrieval with citation slots and hydrated previews.

use std::path::Path;

use canlex_ai::Embedder;
use canlex_core::schema::leg::DEFAULT_EMBEDDING_MODEL;
use canlex_core::types::Language;
use canlex_retrieval::{
    SearchOptions, allocate_citation_slots, build_citations, deduplicate_results,
    execute_vector_search, get_slot_config, hydrate_result,
};
use canlex_store::{DuckStore, LanceStore};

pub async fn run_search(
    duck: &DuckStore,
    data_dir: &Path,
    query: &str,
    intent: &str,
    limit: usize,
    lang: &str,
    source_type: Option<String>,
) -> anyhow::Result<i32> {
    let language: Language = lang.parse()?;
    let lance = LanceStore::open(&data_dir.join("lancedb")).await?;
    let model_dir = data_dir.join("models").join(DEFAULT_EMBEDDING_MODEL);
    let mut embedder = Embedder::load(&model_dir, DEFAULT_EMBEDDING_MODEL)?;

    let options = SearchOptions {
        limit: limit * 2,
        language: None,
        filter: None,
    };
    let results = execute_vector_search(
        &lance,
        &mut embedder,
        query,
        source_type.as_deref(),
        &options,
    )
    .await?;
    let results = deduplicate_results(results);

    let config = get_slot_config(intent);
    let chosen = allocate_citation_slots(&results, &config, limit);
    if chosen.is_empty() {
        println!("No results.");
        return Ok(0);
    }

    let citations = build_citations(&chosen);
    println!("Citations:\n");
    for (citation, result) in citations.iter().zip(&chosen) {
        let (text, url) = match language {
            Language::En => (&citation.text_en, &citation.url_en),
            Language::Fr => (&citation.text_fr, &citation.url_fr),
        };
        println!(
            "  [{}] {} (score {:.3})\n      {}",
            citation.prefixed_id, text, result.similarity, url
        );
    }

    // Hydrate the best result per source type, best-effort.
    println!("\n--- Previews ---");
    let mut seen_types: Vec<String> = Vec::new();
    for result in &chosen {
        let st = result.metadata["sourceType"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if seen_types.contains(&st) {
            continue;
        }
        seen_types.push(st);
        if let Some(hydrated) = hydrate_result(duck, &result.metadata, language) {
            println!("\n{}", hydrated.markdown);
            if let Some(note) = hydrated.note {
                println!("_{note}_");
            }
        }
    }

    Ok(0)
}
