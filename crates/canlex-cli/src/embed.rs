//! `embed-legislation` and `reembed` command wiring.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;

use canlex_ai::Embedder;
use canlex_core::schema::leg::DEFAULT_EMBEDDING_MODEL;
use canlex_core::types::SourceType;
use canlex_core::util::format_duration;
use canlex_retrieval::pipeline::{self, PipelineOptions, ReembedOptions};
use canlex_store::{DuckStore, LanceStore, ProgressTracker};

fn load_embedder(data_dir: &Path) -> anyhow::Result<Embedder> {
    let model_dir = data_dir.join("models").join(DEFAULT_EMBEDDING_MODEL);
    Embedder::load(&model_dir, DEFAULT_EMBEDDING_MODEL)
        .with_context(|| format!("loading embedding model from '{}'", model_dir.display()))
}

pub async fn run_embed(
    duck: &DuckStore,
    data_dir: &Path,
    limit: Option<usize>,
    dry_run: bool,
    skip_existing: bool,
    batch_size: Option<usize>,
    source_type: Option<String>,
) -> anyhow::Result<i32> {
    let start = Instant::now();

    let lance = LanceStore::open(&data_dir.join("lancedb")).await?;
    let mut tracker = ProgressTracker::open(&data_dir.join("embed-progress.log"))?;
    let mut embedder = load_embedder(data_dir)?;
    let counter = embedder.token_counter()?;

    let source_types = match source_type.as_deref().and_then(SourceType::parse) {
        Some(st) => vec![st],
        None => PipelineOptions::default().source_types,
    };
    let options = PipelineOptions {
        limit,
        dry_run,
        skip_existing,
        batch_size: batch_size.unwrap_or(pipeline::EMBEDDING_BATCH_SIZE),
        source_types,
        ..Default::default()
    };

    let stats = pipeline::run_embed_pipeline(
        duck,
        &lance,
        &mut embedder,
        &mut tracker,
        &counter,
        &options,
    )
    .await?;

    eprintln!(
        "Embedded {} chunks ({} skipped) across {} items in {}",
        stats.chunks_processed,
        stats.chunks_skipped,
        stats.items_processed,
        format_duration(start.elapsed().as_millis() as u64)
    );
    for error in &stats.errors {
        eprintln!("  batch error: {error}");
    }

    Ok(if stats.errors.is_empty() { 0 } else { 1 })
}

#[allow(clippy::too_many_arguments)]
pub async fn run_reembed_cmd(
    duck: &DuckStore,
    data_dir: &Path,
    from_model: Option<String>,
    null_models: bool,
    to_model: Option<String>,
    limit: Option<usize>,
    batch_size: Option<usize>,
    dry_run: bool,
    list_models: bool,
) -> anyhow::Result<i32> {
    let lance = LanceStore::open(&data_dir.join("lancedb")).await?;

    if list_models {
        let models = lance.list_models().await?;
        if models.is_empty() {
            println!("No embeddings stored.");
        }
        for (model, count) in models {
            println!(
                "{:>8}  {}",
                count,
                model.as_deref().unwrap_or("(untagged)")
            );
        }
        return Ok(0);
    }

    let from_model = if null_models { None } else { from_model };
    if from_model.is_none() && !null_models {
        anyhow::bail!("pass --from-model=M or --null-models to select rows");
    }

    let start = Instant::now();
    let mut embedder = load_embedder(data_dir)?;
    let options = ReembedOptions {
        from_model,
        to_model: to_model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
        limit,
        batch_size: batch_size.unwrap_or(pipeline::EMBEDDING_BATCH_SIZE),
        dry_run,
        ..Default::default()
    };

    let stats = pipeline::run_reembed(duck, &lance, &mut embedder, &options).await?;
    eprintln!(
        "Re-embedded {} chunks in {}",
        stats.chunks_processed,
        format_duration(start.elapsed().as_millis() as u64)
    );
    Ok(0)
}
