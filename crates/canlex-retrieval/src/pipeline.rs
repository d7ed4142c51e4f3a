//! Embedding pipeline: documents → chunks → vectors, batched and resumable.
//!
//! Documents are fetched in DB pages; sections for a page are fetched in one
//! query and grouped in memory. Chunks are filtered against the progress
//! tracker, embedded in sub-batches, and persisted; the tracker is marked only
//! after the store commit, so a crash can repeat work but never lose it.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{info, warn};

use canlex_ai::{EmbedError, EmbeddingProvider, normalize_for_embedding, validate_embedding};
use canlex_core::chunk::{ChunkOptions, chunk_section, should_skip_section};
use canlex_core::schema::leg::DEFAULT_EMBEDDING_MODEL;
use canlex_core::token::TokenCounter;
use canlex_core::types::{DefinedTerm, Language, Section, SourceType};
use canlex_store::{
    DocumentMeta, DuckStore, EmbeddedChunk, LanceStore, ProgressTracker, ResourceRow,
};

use crate::RetrievalError;

/// Documents fetched per DB page.
pub const DB_FETCH_BATCH_SIZE: usize = 100;

/// Chunks embedded per embedder call.
pub const EMBEDDING_BATCH_SIZE: usize = 64;

/// Retry ceiling for transient embedder failures.
pub const MAX_EMBED_RETRIES: u32 = 3;

/// One chunk with everything needed to persist it.
#[derive(Debug, Clone)]
pub struct ResourceChunk {
    pub resource_key: String,
    pub source_type: String,
    pub language: Language,
    pub content: String,
    pub metadata: Value,
    pub paired_resource_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Cap on documents (or terms) processed per source type.
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub skip_existing: bool,
    pub batch_size: usize,
    pub source_types: Vec<SourceType>,
    /// Backoff base for transient embedder failures.
    pub retry_base_delay: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            limit: None,
            dry_run: false,
            skip_existing: true,
            batch_size: EMBEDDING_BATCH_SIZE,
            source_types: vec![
                SourceType::Act,
                SourceType::Regulation,
                SourceType::ActSection,
                SourceType::RegulationSection,
                SourceType::DefinedTerm,
            ],
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub chunks_processed: usize,
    pub chunks_skipped: usize,
    pub items_processed: usize,
    pub errors: Vec<String>,
}

// ── Chunk building ──

/// The document metadata chunk (index 0): a bilingual summary of the act or
/// regulation used to answer "what is this document" queries.
pub fn build_document_chunk(meta: &DocumentMeta) -> ResourceChunk {
    let source_type = if meta.is_act {
        SourceType::Act
    } else {
        SourceType::Regulation
    };
    let content = match meta.language {
        Language::En => document_summary_en(meta),
        Language::Fr => document_summary_fr(meta),
    };

    let mut metadata = json!({
        "sourceType": source_type.as_str(),
        "sourceId": meta.document_id,
        "language": meta.language.as_str(),
        "title": meta.title,
        "status": meta.status,
        "chunkIndex": 0,
        "totalChunks": 1,
    });
    let obj = metadata.as_object_mut().expect("object metadata");
    if meta.is_act {
        obj.insert("actId".into(), json!(meta.document_id));
    } else {
        obj.insert("regulationId".into(), json!(meta.document_id));
    }
    insert_opt(obj, "longTitle", &meta.long_title);
    insert_opt(obj, "inForceDate", &meta.in_force_date);
    insert_opt(obj, "enactedDate", &meta.enacted_date);
    insert_opt(obj, "lastAmendedDate", &meta.last_amended_date);
    insert_opt(obj, "consolidationDate", &meta.consolidation_date);
    insert_opt(obj, "billOrigin", &meta.bill_origin);
    insert_opt(obj, "instrumentNumber", &meta.instrument_number);
    insert_opt(obj, "regulationType", &meta.regulation_type);
    insert_opt(obj, "enablingActId", &meta.enabling_act_id);
    if let Some(year) = meta.annual_statute_year {
        obj.insert("annualStatuteYear".into(), json!(year));
    }
    insert_opt(obj, "annualStatuteChapter", &meta.annual_statute_chapter);

    ResourceChunk {
        resource_key: format!(
            "{}:{}:{}:0",
            source_type.as_str(),
            meta.document_id,
            meta.language
        ),
        source_type: source_type.as_str().to_string(),
        language: meta.language,
        content,
        metadata,
        paired_resource_key: Some(format!(
            "{}:{}:{}:0",
            source_type.as_str(),
            meta.document_id,
            meta.language.other()
        )),
    }
}

fn document_summary_en(meta: &DocumentMeta) -> String {
    let mut lines = vec![meta.title.clone()];
    if let Some(long) = &meta.long_title {
        lines.push(long.clone());
    }
    let kind = if meta.is_act { "Act" } else { "Regulation" };
    let mut facts = vec![format!("{kind} {}", meta.document_id)];
    facts.push(format!("Status: {}", meta.status));
    if let Some(instrument) = &meta.instrument_number {
        facts.push(format!("Instrument number: {instrument}"));
    }
    if let Some(enabling) = &meta.enabling_act_id {
        facts.push(format!("Made under: {enabling}"));
    }
    if let Some(origin) = &meta.bill_origin {
        let chamber = if origin == "senate" {
            "Senate"
        } else {
            "House of Commons"
        };
        facts.push(format!("Originated in the {chamber}"));
    }
    if let Some(date) = &meta.enacted_date {
        facts.push(format!("Enacted: {date}"));
    }
    if let Some(date) = &meta.last_amended_date {
        facts.push(format!("Last amended: {date}"));
    }
    if let Some(date) = &meta.consolidation_date {
        facts.push(format!("Consolidated to: {date}"));
    }
    lines.push(facts.join(". "));
    lines.join("\n")
}

fn document_summary_fr(meta: &DocumentMeta) -> String {
    let mut lines = vec![meta.title.clone()];
    if let Some(long) = &meta.long_title {
        lines.push(long.clone());
    }
    let kind = if meta.is_act { "Loi" } else { "Règlement" };
    let mut facts = vec![format!("{kind} {}", meta.document_id)];
    facts.push(format!("Statut : {}", meta.status));
    if let Some(instrument) = &meta.instrument_number {
        facts.push(format!("Numéro d'enregistrement : {instrument}"));
    }
    if let Some(enabling) = &meta.enabling_act_id {
        facts.push(format!("Pris en vertu de : {enabling}"));
    }
    if let Some(origin) = &meta.bill_origin {
        let chamber = if origin == "senate" {
            "Sénat"
        } else {
            "les Communes"
        };
        facts.push(format!("Déposé au {chamber}"));
    }
    if let Some(date) = &meta.enacted_date {
        facts.push(format!("Édicté : {date}"));
    }
    if let Some(date) = &meta.last_amended_date {
        facts.push(format!("Dernière modification : {date}"));
    }
    if let Some(date) = &meta.consolidation_date {
        facts.push(format!("À jour au : {date}"));
    }
    lines.push(facts.join(". "));
    lines.join("\n")
}

/// Section chunks via the legal-boundary chunker, one resource per chunk.
pub fn build_section_chunks<C: TokenCounter>(
    section: &Section,
    document_title: &str,
    counter: &C,
) -> Vec<ResourceChunk> {
    let options = ChunkOptions {
        language: section.language,
        historical_notes: section.historical_notes.clone(),
    };
    let source_type = section.source_type();
    let source_id = format!("{}/s{}", section.document_id(), section.section_label);

    chunk_section(section, document_title, &options, counter)
        .into_iter()
        .map(|chunk| {
            let mut metadata = json!({
                "sourceType": source_type.as_str(),
                "sourceId": source_id,
                "language": section.language.as_str(),
                "sectionLabel": section.section_label,
                "sectionType": section.section_type.as_str(),
                "status": section.status.as_str(),
                "title": document_title,
                "chunkIndex": chunk.chunk_index,
                "totalChunks": chunk.total_chunks,
            });
            let obj = metadata.as_object_mut().expect("object metadata");
            if let Some(act_id) = &section.act_id {
                obj.insert("actId".into(), json!(act_id));
            }
            if let Some(regulation_id) = &section.regulation_id {
                obj.insert("regulationId".into(), json!(regulation_id));
            }
            insert_opt(obj, "marginalNote", &section.marginal_note);
            insert_opt(obj, "scheduleId", &section.schedule_id);
            insert_opt(obj, "inForceStartDate", &section.in_force_start_date);
            insert_opt(obj, "lastAmendedDate", &section.last_amended_date);
            if !section.hierarchy_path.is_empty() {
                obj.insert("hierarchyPath".into(), json!(section.hierarchy_path));
            }

            let paired = format!(
                "{}:{}:{}:{}",
                source_type.as_str(),
                source_id,
                section.language.other(),
                chunk.chunk_index
            );
            ResourceChunk {
                resource_key: chunk.resource_key,
                source_type: source_type.as_str().to_string(),
                language: section.language,
                content: chunk.content,
                metadata,
                paired_resource_key: Some(paired),
            }
        })
        .collect()
}

/// One chunk per defined term: a bilingual gloss naming the term, its home
/// document and section, and the other-language pairing.
pub fn build_defined_term_chunk(term: &DefinedTerm, document_title: &str) -> ResourceChunk {
    let doc_id = term
        .act_id
        .as_deref()
        .or(term.regulation_id.as_deref())
        .unwrap_or("unknown");
    let slug: String = term
        .term
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let source_id = format!("{doc_id}/{slug}");

    let section_part = term.section_label.as_deref().unwrap_or("?");
    let content = match term.language {
        Language::En => {
            let mut s = format!(
                "\u{201c}{}\u{201d} — defined term in {document_title}, section {section_part}.",
                term.term
            );
            if let Some(paired) = &term.paired_term {
                s.push_str(&format!(" French equivalent: \u{201c}{paired}\u{201d}."));
            }
            s
        }
        Language::Fr => {
            let mut s = format!(
                "\u{ab} {} \u{bb} — terme défini dans {document_title}, article {section_part}.",
                term.term
            );
            if let Some(paired) = &term.paired_term {
                s.push_str(&format!(" Équivalent anglais : \u{ab} {paired} \u{bb}."));
            }
            s
        }
    };

    let mut metadata = json!({
        "sourceType": SourceType::DefinedTerm.as_str(),
        "sourceId": source_id,
        "language": term.language.as_str(),
        "term": term.term,
        "title": document_title,
        "scopeType": format!("{:?}", term.scope_type).to_lowercase(),
        "chunkIndex": 0,
        "totalChunks": 1,
    });
    let obj = metadata.as_object_mut().expect("object metadata");
    if let Some(act_id) = &term.act_id {
        obj.insert("actId".into(), json!(act_id));
    }
    if let Some(regulation_id) = &term.regulation_id {
        obj.insert("regulationId".into(), json!(regulation_id));
    }
    insert_opt(obj, "sectionLabel", &term.section_label);
    insert_opt(obj, "pairedTerm", &term.paired_term);

    ResourceChunk {
        resource_key: format!(
            "{}:{}:{}:0",
            SourceType::DefinedTerm.as_str(),
            source_id,
            term.language
        ),
        source_type: SourceType::DefinedTerm.as_str().to_string(),
        language: term.language,
        content,
        metadata,
        paired_resource_key: Some(format!(
            "{}:{}:{}:0",
            SourceType::DefinedTerm.as_str(),
            source_id,
            term.language.other()
        )),
    }
}

fn insert_opt(obj: &mut serde_json::Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        obj.insert(key.to_string(), json!(v));
    }
}

/// Partition chunks into those needing embedding and those already tracked.
pub fn filter_new_chunks(
    chunks: Vec<ResourceChunk>,
    tracker: &ProgressTracker,
    skip_existing: bool,
) -> (Vec<ResourceChunk>, usize) {
    if !skip_existing {
        return (chunks, 0);
    }
    let keys: Vec<String> = chunks.iter().map(|c| c.resource_key.clone()).collect();
    let seen = tracker.has_many(&keys);
    let mut fresh = Vec::with_capacity(chunks.len());
    let mut skipped = 0usize;
    for (chunk, seen) in chunks.into_iter().zip(seen) {
        if seen {
            skipped += 1;
        } else {
            fresh.push(chunk);
        }
    }
    (fresh, skipped)
}

/// Embed texts with exponential backoff on transient failures and validate
/// every returned vector.
pub async fn generate_embeddings_with_retry(
    provider: &mut dyn EmbeddingProvider,
    texts: &[&str],
    max_retries: u32,
    base_delay: Duration,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let dimensions = provider.dimensions();
    let mut attempt = 0u32;
    loop {
        match provider.embed_batch(texts) {
            Ok(embeddings) => {
                if embeddings.len() != texts.len() {
                    return Err(EmbedError::InvalidEmbedding(format!(
                        "expected {} embeddings, got {}",
                        texts.len(),
                        embeddings.len()
                    )));
                }
                for embedding in &embeddings {
                    validate_embedding(embedding, dimensions)?;
                }
                return Ok(embeddings);
            }
            Err(EmbedError::Transient(reason)) if attempt < max_retries => {
                let delay = base_delay * 2u32.pow(attempt);
                warn!(attempt, %reason, delay_ms = delay.as_millis() as u64, "transient embed failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

// ── Pipeline driver ──

/// Produce or refresh embeddings for every chunk of every document.
pub async fn run_embed_pipeline<C: TokenCounter>(
    duck: &DuckStore,
    lance: &LanceStore,
    provider: &mut dyn EmbeddingProvider,
    tracker: &mut ProgressTracker,
    counter: &C,
    options: &PipelineOptions,
) -> Result<PipelineStats, RetrievalError> {
    let mut stats = PipelineStats::default();

    let want_documents = |is_act: bool| {
        let (doc, section) = if is_act {
            (SourceType::Act, SourceType::ActSection)
        } else {
            (SourceType::Regulation, SourceType::RegulationSection)
        };
        let types = &options.source_types;
        (types.contains(&doc), types.contains(&section))
    };

    for is_act in [true, false] {
        let (want_doc, want_sections) = want_documents(is_act);
        if !want_doc && !want_sections {
            continue;
        }
        process_documents(
            duck, lance, provider, tracker, counter, options, is_act, want_doc, want_sections,
            &mut stats,
        )
        .await?;
    }

    if options.source_types.contains(&SourceType::DefinedTerm) {
        process_defined_terms(duck, lance, provider, tracker, options, &mut stats).await?;
    }

    info!(
        chunks_processed = stats.chunks_processed,
        chunks_skipped = stats.chunks_skipped,
        items_processed = stats.items_processed,
        errors = stats.errors.len(),
        "embed pipeline complete"
    );
    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
async fn process_documents<C: TokenCounter>(
    duck: &DuckStore,
    lance: &LanceStore,
    provider: &mut dyn EmbeddingProvider,
    tracker: &mut ProgressTracker,
    counter: &C,
    options: &PipelineOptions,
    is_act: bool,
    want_doc: bool,
    want_sections: bool,
    stats: &mut PipelineStats,
) -> Result<(), RetrievalError> {
    let mut offset = 0usize;
    let mut processed = 0usize;

    loop {
        let page_size = match options.limit {
            Some(limit) => DB_FETCH_BATCH_SIZE.min(limit.saturating_sub(processed)),
            None => DB_FETCH_BATCH_SIZE,
        };
        if page_size == 0 {
            break;
        }
        let metas = duck.fetch_document_metas(is_act, page_size, offset)?;
        if metas.is_empty() {
            break;
        }
        offset += metas.len();
        processed += metas.len();

        // One section query for the whole page, grouped in memory.
        let mut sections_by_doc: HashMap<(String, Language), Vec<Section>> = HashMap::new();
        if want_sections {
            let ids: Vec<String> = metas.iter().map(|m| m.document_id.clone()).collect();
            for section in duck.fetch_sections_for(&ids, is_act)? {
                sections_by_doc
                    .entry((section.document_id().to_string(), section.language))
                    .or_default()
                    .push(section);
            }
        }

        let mut chunks: Vec<ResourceChunk> = Vec::new();
        for meta in &metas {
            if want_doc {
                chunks.push(build_document_chunk(meta));
            }
            if want_sections
                && let Some(sections) =
                    sections_by_doc.get(&(meta.document_id.clone(), meta.language))
            {
                for section in sections {
                    if should_skip_section(section) {
                        continue;
                    }
                    chunks.extend(build_section_chunks(section, &meta.title, counter));
                }
            }
            stats.items_processed += 1;
        }

        if let Err(e) = embed_and_persist(
            duck, lance, provider, tracker, options, chunks, stats,
        )
        .await
        {
            // One failed batch aborts that batch only; the run continues.
            stats.errors.push(e.to_string());
            warn!(error = %e, "batch failed, continuing with next page");
        }
    }
    Ok(())
}

async fn process_defined_terms(
    duck: &DuckStore,
    lance: &LanceStore,
    provider: &mut dyn EmbeddingProvider,
    tracker: &mut ProgressTracker,
    options: &PipelineOptions,
    stats: &mut PipelineStats,
) -> Result<(), RetrievalError> {
    let mut offset = 0usize;
    let mut processed = 0usize;

    loop {
        let page_size = match options.limit {
            Some(limit) => DB_FETCH_BATCH_SIZE.min(limit.saturating_sub(processed)),
            None => DB_FETCH_BATCH_SIZE,
        };
        if page_size == 0 {
            break;
        }
        let terms = duck.fetch_defined_terms(page_size, offset)?;
        if terms.is_empty() {
            break;
        }
        offset += terms.len();
        processed += terms.len();

        let mut chunks = Vec::with_capacity(terms.len());
        for term in &terms {
            let doc_id = term
                .act_id
                .as_deref()
                .or(term.regulation_id.as_deref())
                .unwrap_or_default();
            let title = duck
                .get_document_meta(doc_id, term.language)?
                .map(|m| m.title)
                .unwrap_or_else(|| doc_id.to_string());
            chunks.push(build_defined_term_chunk(term, &title));
            stats.items_processed += 1;
        }

        if let Err(e) =
            embed_and_persist(duck, lance, provider, tracker, options, chunks, stats).await
        {
            stats.errors.push(e.to_string());
            warn!(error = %e, "defined-term batch failed, continuing");
        }
    }
    Ok(())
}

/// Embed a page of chunks in sub-batches and persist transactionally.
///
/// Order of effects per sub-batch: embeddings written, resource rows
/// committed, then the tracker marked. A crash between commit and mark
/// repeats work on the next run but never loses embeddings.
async fn embed_and_persist(
    duck: &DuckStore,
    lance: &LanceStore,
    provider: &mut dyn EmbeddingProvider,
    tracker: &mut ProgressTracker,
    options: &PipelineOptions,
    chunks: Vec<ResourceChunk>,
    stats: &mut PipelineStats,
) -> Result<(), RetrievalError> {
    let (fresh, skipped) = filter_new_chunks(chunks, tracker, options.skip_existing);
    stats.chunks_skipped += skipped;

    if options.dry_run {
        stats.chunks_processed += fresh.len();
        return Ok(());
    }

    for batch in fresh.chunks(options.batch_size.max(1)) {
        let normalized: Vec<String> = batch
            .iter()
            .map(|c| normalize_for_embedding(&c.content))
            .collect();
        let texts: Vec<&str> = normalized.iter().map(String::as_str).collect();
        let embeddings = generate_embeddings_with_retry(
            provider,
            &texts,
            MAX_EMBED_RETRIES,
            options.retry_base_delay,
        )
        .await?;

        let embedded: Vec<EmbeddedChunk> = batch
            .iter()
            .zip(&embeddings)
            .map(|(chunk, embedding)| EmbeddedChunk {
                resource_key: chunk.resource_key.clone(),
                source_type: chunk.source_type.clone(),
                language: chunk.language,
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                embedding: embedding.clone(),
                embedding_model: provider.model_name().to_string(),
            })
            .collect();
        let resources: Vec<ResourceRow> = batch
            .iter()
            .map(|chunk| ResourceRow {
                resource_key: chunk.resource_key.clone(),
                source_type: chunk.source_type.clone(),
                language: chunk.language,
                metadata: chunk.metadata.clone(),
                paired_resource_key: chunk.paired_resource_key.clone(),
            })
            .collect();

        lance.upsert_embeddings(&embedded).await?;

        duck.begin()?;
        match duck.upsert_resources(&resources) {
            Ok(()) => duck.commit()?,
            Err(e) => {
                let _ = duck.rollback();
                return Err(e.into());
            }
        }

        let keys: Vec<String> = batch.iter().map(|c| c.resource_key.clone()).collect();
        tracker.mark_many(&keys)?;
        stats.chunks_processed += batch.len();
    }
    Ok(())
}

// ── Re-embedding migration ──

#[derive(Debug, Clone)]
pub struct ReembedOptions {
    /// Rows to select: `Some(model)` or `None` for legacy untagged rows.
    pub from_model: Option<String>,
    pub to_model: String,
    pub limit: Option<usize>,
    pub batch_size: usize,
    pub dry_run: bool,
    pub retry_base_delay: Duration,
}

impl Default for ReembedOptions {
    fn default() -> Self {
        Self {
            from_model: None,
            to_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            limit: None,
            batch_size: EMBEDDING_BATCH_SIZE,
            dry_run: false,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Re-embed rows currently tagged `from_model`, updating vector and model tag
/// in place (same `resource_key`), and rewrite `embeddingModelVersion` in the
/// resource metadata.
pub async fn run_reembed(
    duck: &DuckStore,
    lance: &LanceStore,
    provider: &mut dyn EmbeddingProvider,
    options: &ReembedOptions,
) -> Result<PipelineStats, RetrievalError> {
    let mut stats = PipelineStats::default();
    let total = lance.count_by_model(options.from_model.as_deref()).await?;
    let target = options.limit.map_or(total, |l| l.min(total));

    if options.from_model.as_deref() == Some(options.to_model.as_str()) {
        return Err(RetrievalError::Other(
            "from-model and to-model are identical".into(),
        ));
    }

    while stats.chunks_processed < target {
        let remaining = target - stats.chunks_processed;
        let rows = lance
            .fetch_by_model(
                options.from_model.as_deref(),
                options.batch_size.min(remaining),
            )
            .await?;
        if rows.is_empty() {
            break;
        }

        if options.dry_run {
            stats.chunks_processed += rows.len();
            continue;
        }

        let normalized: Vec<String> = rows
            .iter()
            .map(|r| normalize_for_embedding(&r.content))
            .collect();
        let texts: Vec<&str> = normalized.iter().map(String::as_str).collect();
        let embeddings = generate_embeddings_with_retry(
            provider,
            &texts,
            MAX_EMBED_RETRIES,
            options.retry_base_delay,
        )
        .await?;

        let embedded: Vec<EmbeddedChunk> = rows
            .iter()
            .zip(&embeddings)
            .map(|(row, embedding)| {
                Ok(EmbeddedChunk {
                    resource_key: row.resource_key.clone(),
                    source_type: row.source_type.clone(),
                    language: row
                        .language
                        .parse()
                        .map_err(|_| RetrievalError::Other(format!(
                            "invalid language '{}' on {}",
                            row.language, row.resource_key
                        )))?,
                    content: row.content.clone(),
                    metadata: serde_json::from_str(&row.metadata)?,
                    embedding: embedding.clone(),
                    embedding_model: options.to_model.clone(),
                })
            })
            .collect::<Result<_, RetrievalError>>()?;

        lance.upsert_embeddings(&embedded).await?;

        let keys: Vec<String> = rows.iter().map(|r| r.resource_key.clone()).collect();
        duck.begin()?;
        match duck.update_resource_model(&keys, &options.to_model) {
            Ok(_) => duck.commit()?,
            Err(e) => {
                let _ = duck.rollback();
                return Err(e.into());
            }
        }
        stats.chunks_processed += rows.len();
        info!(
            processed = stats.chunks_processed,
            target, "re-embed progress"
        );
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canlex_core::token::HeuristicTokenCounter;
    use canlex_core::types::{
        Act, DefinedTerm, Document, DocumentStatus, ParsedDocument, ScopeType, Section,
    };
    use tempfile::TempDir;

    /// Deterministic provider: vector derived from text bytes. Optionally
    /// fails transiently the first `fail_times` calls.
    struct StubProvider {
        fail_times: u32,
        calls: u32,
        dims: usize,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                fail_times: 0,
                calls: 0,
                dims: 1024,
            }
        }
    }

    impl EmbeddingProvider for StubProvider {
        fn model_name(&self) -> &str {
            "stub-model"
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.calls += 1;
            if self.calls <= self.fail_times {
                return Err(EmbedError::Transient("stub outage".into()));
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; self.dims];
                    for (i, b) in t.bytes().take(64).enumerate() {
                        v[i] = b as f32 / 255.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn meta_en() -> DocumentMeta {
        DocumentMeta {
            document_id: "C-46".into(),
            language: Language::En,
            is_act: true,
            title: "Criminal Code".into(),
            long_title: Some("An Act respecting the Criminal Law".into()),
            status: "in-force".into(),
            in_force_date: None,
            enacted_date: Some("1985-12-12".into()),
            last_amended_date: Some("2023-06-22".into()),
            consolidation_date: None,
            bill_origin: Some("senate".into()),
            instrument_number: None,
            regulation_type: None,
            enabling_act_id: None,
            annual_statute_year: None,
            annual_statute_chapter: None,
        }
    }

    #[test]
    fn document_chunk_english_template() {
        let chunk = build_document_chunk(&meta_en());
        assert_eq!(chunk.resource_key, "act:C-46:en:0");
        assert_eq!(chunk.paired_resource_key.as_deref(), Some("act:C-46:fr:0"));
        assert!(chunk.content.contains("Criminal Code"));
        assert!(chunk.content.contains("Status: in-force"));
        assert!(chunk.content.contains("Originated in the Senate"));
        assert_eq!(chunk.metadata["sourceType"], "act");
        assert_eq!(chunk.metadata["actId"], "C-46");
    }

    #[test]
    fn document_chunk_french_senate_localization() {
        let mut meta = meta_en();
        meta.language = Language::Fr;
        meta.title = "Code criminel".into();
        let chunk = build_document_chunk(&meta);
        assert_eq!(chunk.resource_key, "act:C-46:fr:0");
        assert!(chunk.content.contains("Déposé au Sénat"));
        assert!(chunk.content.contains("Statut : in-force"));
    }

    #[test]
    fn section_chunks_resource_keys() {
        let section = Section {
            act_id: Some("C-46".into()),
            language: Language::En,
            section_label: "91".into(),
            content: "Every person who contravenes subsection (1) is guilty of an offence."
                .into(),
            ..Default::default()
        };
        let chunks = build_section_chunks(&section, "Criminal Code", &HeuristicTokenCounter);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].resource_key, "act_section:C-46/s91:en:0");
        assert_eq!(
            chunks[0].paired_resource_key.as_deref(),
            Some("act_section:C-46/s91:fr:0")
        );
        assert_eq!(chunks[0].metadata["sectionLabel"], "91");
        assert_eq!(chunks[0].metadata["totalChunks"], 1);
    }

    #[test]
    fn defined_term_chunk_bilingual() {
        let term = DefinedTerm {
            language: Language::En,
            term: "Minister".into(),
            act_id: Some("C-46".into()),
            regulation_id: None,
            section_label: Some("2".into()),
            scope_type: ScopeType::Act,
            scope_sections: vec![],
            paired_term: Some("ministre".into()),
        };
        let chunk = build_defined_term_chunk(&term, "Criminal Code");
        assert_eq!(chunk.resource_key, "defined_term:C-46/minister:en:0");
        assert!(chunk.content.contains("\u{201c}Minister\u{201d}"));
        assert!(chunk.content.contains("ministre"));
        assert_eq!(chunk.metadata["pairedTerm"], "ministre");
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let mut provider = StubProvider {
            fail_times: 2,
            ..StubProvider::new()
        };
        let result = generate_embeddings_with_retry(
            &mut provider,
            &["hello"],
            3,
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(provider.calls, 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max() {
        let mut provider = StubProvider {
            fail_times: 10,
            ..StubProvider::new()
        };
        let err = generate_embeddings_with_retry(
            &mut provider,
            &["hello"],
            2,
            Duration::from_millis(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EmbedError::Transient(_)));
        assert_eq!(provider.calls, 3);
    }

    #[tokio::test]
    async fn retry_rejects_wrong_dimensions() {
        /// Declares 1024 dimensions but returns 10-wide vectors.
        struct ShortProvider;
        impl EmbeddingProvider for ShortProvider {
            fn model_name(&self) -> &str {
                "short"
            }
            fn dimensions(&self) -> usize {
                1024
            }
            fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
                Ok(texts.iter().map(|_| vec![0.5f32; 10]).collect())
            }
        }
        let err = generate_embeddings_with_retry(
            &mut ShortProvider,
            &["hello"],
            0,
            Duration::from_millis(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EmbedError::InvalidEmbedding(_)));
    }

    fn seed_store() -> DuckStore {
        let duck = DuckStore::open().unwrap();
        let act = Act {
            act_id: "C-46".into(),
            language: Language::En,
            title: "Criminal Code".into(),
            status: DocumentStatus::InForce,
            ..Default::default()
        };
        let sections = vec![
            Section {
                act_id: Some("C-46".into()),
                language: Language::En,
                section_label: "1".into(),
                section_order: 0,
                content: "This Act may be cited as the Criminal Code.".into(),
                ..Default::default()
            },
            Section {
                act_id: Some("C-46".into()),
                language: Language::En,
                section_label: "2".into(),
                section_order: 1,
                // Whitespace-only: the skip policy must drop it.
                content: "   ".into(),
                ..Default::default()
            },
        ];
        let terms = vec![DefinedTerm {
            language: Language::En,
            term: "Minister".into(),
            act_id: Some("C-46".into()),
            regulation_id: None,
            section_label: Some("2".into()),
            scope_type: ScopeType::Act,
            scope_sections: vec![],
            paired_term: Some("ministre".into()),
        }];
        duck.replace_document(&ParsedDocument {
            document: Document::Act(act),
            sections,
            defined_terms: terms,
            cross_references: vec![],
        })
        .unwrap();
        duck
    }

    #[tokio::test]
    async fn pipeline_end_to_end_idempotent() {
        let tmp = TempDir::new().unwrap();
        let duck = seed_store();
        let lance = LanceStore::open(&tmp.path().join("lance")).await.unwrap();
        let mut tracker = ProgressTracker::open(&tmp.path().join("progress.log")).unwrap();
        let mut provider = StubProvider::new();
        let options = PipelineOptions {
            retry_base_delay: Duration::from_millis(1),
            ..Default::default()
        };

        let stats = run_embed_pipeline(
            &duck,
            &lance,
            &mut provider,
            &mut tracker,
            &HeuristicTokenCounter,
            &options,
        )
        .await
        .unwrap();

        // 1 doc chunk + 1 section chunk (one skipped as blank) + 1 term chunk.
        assert_eq!(stats.chunks_processed, 3);
        assert_eq!(stats.chunks_skipped, 0);
        assert!(stats.errors.is_empty());
        assert_eq!(lance.embeddings_count().await.unwrap(), 3);
        assert_eq!(duck.resources_count().unwrap(), 3);
        assert!(tracker.has("act:C-46:en:0"));
        assert!(tracker.has("act_section:C-46/s1:en:0"));

        // Second run skips everything.
        let stats = run_embed_pipeline(
            &duck,
            &lance,
            &mut provider,
            &mut tracker,
            &HeuristicTokenCounter,
            &options,
        )
        .await
        .unwrap();
        assert_eq!(stats.chunks_processed, 0);
        assert_eq!(stats.chunks_skipped, 3);
        assert_eq!(lance.embeddings_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn dry_run_persists_nothing() {
        let tmp = TempDir::new().unwrap();
        let duck = seed_store();
        let lance = LanceStore::open(&tmp.path().join("lance")).await.unwrap();
        let mut tracker = ProgressTracker::open(&tmp.path().join("progress.log")).unwrap();
        let mut provider = StubProvider::new();
        let options = PipelineOptions {
            dry_run: true,
            ..Default::default()
        };

        let stats = run_embed_pipeline(
            &duck,
            &lance,
            &mut provider,
            &mut tracker,
            &HeuristicTokenCounter,
            &options,
        )
        .await
        .unwrap();
        assert_eq!(stats.chunks_processed, 3);
        assert_eq!(lance.embeddings_count().await.unwrap(), 0);
        assert_eq!(duck.resources_count().unwrap(), 0);
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn reembed_updates_model_tags() {
        let tmp = TempDir::new().unwrap();
        let duck = seed_store();
        let lance = LanceStore::open(&tmp.path().join("lance")).await.unwrap();
        let mut tracker = ProgressTracker::open(&tmp.path().join("progress.log")).unwrap();
        let mut provider = StubProvider::new();
        run_embed_pipeline(
            &duck,
            &lance,
            &mut provider,
            &mut tracker,
            &HeuristicTokenCounter,
            &PipelineOptions::default(),
        )
        .await
        .unwrap();

        let options = ReembedOptions {
            from_model: Some("stub-model".into()),
            to_model: "stub-model-v2".into(),
            retry_base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        struct V2(StubProvider);
        impl EmbeddingProvider for V2 {
            fn model_name(&self) -> &str {
                "stub-model-v2"
            }
            fn dimensions(&self) -> usize {
                self.0.dimensions()
            }
            fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
                self.0.embed_batch(texts)
            }
        }
        let mut v2 = V2(StubProvider::new());
        let stats = run_reembed(&duck, &lance, &mut v2, &options).await.unwrap();
        assert_eq!(stats.chunks_processed, 3);
        assert_eq!(lance.count_by_model(Some("stub-model")).await.unwrap(), 0);
        assert_eq!(
            lance.count_by_model(Some("stub-model-v2")).await.unwrap(),
            3
        );

        let batches = duck
            .query_arrow("SELECT metadata FROM leg_resources LIMIT 1")
            .unwrap();
        assert!(!batches.is_empty());
    }

    #[tokio::test]
    async fn reembed_same_model_rejected() {
        let tmp = TempDir::new().unwrap();
        let duck = DuckStore::open().unwrap();
        let lance = LanceStore::open(&tmp.path().join("lance")).await.unwrap();
        let mut provider = StubProvider::new();
        let options = ReembedOptions {
            from_model: Some("stub-model".into()),
            to_model: "stub-model".into(),
            ..Default::default()
        };
        assert!(run_reembed(&duck, &lance, &mut provider, &options)
            .await
            .is_err());
    }
}
