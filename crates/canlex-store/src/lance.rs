//! LanceDB storage for chunk embeddings.
//!
//! One table, `leg_embeddings`, holds every embedded chunk with its
//! `resource_key`, content, metadata JSON, vector, and model tag. Writes are
//! idempotent: rows are keyed by `resource_key` and replaced on re-embed.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListBuilder, Float32Builder, RecordBatchIterator, StringBuilder,
};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::DistanceType;
use lancedb::query::{ExecutableQuery, QueryBase};
use tracing::info;

use canlex_core::schema::leg;
use canlex_core::types::Language;

use crate::StoreError;

const LEG_EMBEDDINGS_TABLE: &str = "leg_embeddings";

/// One embedded chunk, ready to persist.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub resource_key: String,
    pub source_type: String,
    pub language: Language,
    pub content: String,
    pub metadata: serde_json::Value,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
}

/// A stored row returned by queries; `distance` is set on vector searches.
#[derive(Debug, Clone)]
pub struct EmbeddingRow {
    pub resource_key: String,
    pub source_type: String,
    pub language: String,
    pub content: String,
    pub metadata: String,
    pub embedding_model: Option<String>,
    pub distance: Option<f32>,
}

/// LanceDB store for the embedding path.
pub struct LanceStore {
    db: lancedb::Connection,
}

impl LanceStore {
    /// Connect to (or create) a LanceDB database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let uri = path
            .to_str()
            .ok_or_else(|| StoreError::Other("non-UTF8 database path".into()))?;
        let db = lancedb::connect(uri).execute().await?;
        Ok(Self { db })
    }

    pub async fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let names = self.db.table_names().execute().await?;
        Ok(names)
    }

    async fn table_exists(&self) -> Result<bool, StoreError> {
        Ok(self
            .table_names()
            .await?
            .contains(&LEG_EMBEDDINGS_TABLE.to_string()))
    }

    async fn table(&self) -> Result<lancedb::Table, StoreError> {
        let table = self.db.open_table(LEG_EMBEDDINGS_TABLE).execute().await?;
        Ok(table)
    }

    pub async fn embeddings_count(&self) -> Result<usize, StoreError> {
        if !self.table_exists().await? {
            return Ok(0);
        }
        let count = self.table().await?.count_rows(None).await?;
        Ok(count)
    }

    /// Rows carrying the given model tag (`None` counts legacy rows with no
    /// tag). Backs the re-embed migration's selection.
    pub async fn count_by_model(&self, model: Option<&str>) -> Result<usize, StoreError> {
        if !self.table_exists().await? {
            return Ok(0);
        }
        let filter = model_filter(model);
        let count = self.table().await?.count_rows(Some(filter)).await?;
        Ok(count)
    }

    /// Distinct model tags currently stored, for `reembed --list-models`.
    pub async fn list_models(&self) -> Result<Vec<(Option<String>, usize)>, StoreError> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }
        let table = self.table().await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .select(lancedb::query::Select::Columns(vec![
                "embedding_model".to_string(),
            ]))
            .execute()
            .await?
            .try_collect()
            .await?;
        let mut counts: std::collections::BTreeMap<Option<String>, usize> = Default::default();
        for batch in &batches {
            for value in opt_string_col(batch, "embedding_model") {
                *counts.entry(value).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    /// Idempotent write: delete any rows with these resource keys, then
    /// append the new rows. Creates the table on first write.
    pub async fn upsert_embeddings(&self, chunks: &[EmbeddedChunk]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let batch = embeddings_batch(chunks)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new([Ok(batch)], schema);

        if self.table_exists().await? {
            let table = self.table().await?;
            let keys = chunks
                .iter()
                .map(|c| format!("'{}'", c.resource_key.replace('\'', "''")))
                .collect::<Vec<_>>()
                .join(", ");
            table
                .delete(&format!("resource_key IN ({keys})"))
                .await?;
            table.add(Box::new(reader)).execute().await?;
        } else {
            self.db
                .create_table(LEG_EMBEDDINGS_TABLE, Box::new(reader))
                .execute()
                .await?;
        }

        info!(rows = chunks.len(), "persisted embeddings");
        Ok(())
    }

    /// Nearest-neighbour search by cosine distance, optionally filtered
    /// (`source_type = 'act_section'`, model tags, metadata predicates).
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<EmbeddingRow>, StoreError> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }
        let table = self.table().await?;
        let mut query = table
            .vector_search(query_vector)?
            .distance_type(DistanceType::Cosine)
            .limit(limit);
        if let Some(filter) = filter {
            query = query.only_if(filter);
        }
        let batches: Vec<RecordBatch> = query.execute().await?.try_collect().await?;
        Ok(rows_from_batches(&batches, true))
    }

    /// Fetch a page of stored rows selected by model tag, for re-embedding.
    pub async fn fetch_by_model(
        &self,
        model: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EmbeddingRow>, StoreError> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }
        let table = self.table().await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(model_filter(model))
            .limit(limit)
            .execute()
            .await?
            .try_collect()
            .await?;
        Ok(rows_from_batches(&batches, false))
    }
}

fn model_filter(model: Option<&str>) -> String {
    match model {
        Some(m) => format!("embedding_model = '{}'", m.replace('\'', "''")),
        None => "embedding_model IS NULL".to_string(),
    }
}

/// Build the Arrow batch for a set of embedded chunks.
fn embeddings_batch(chunks: &[EmbeddedChunk]) -> Result<RecordBatch, StoreError> {
    let mut resource_key = StringBuilder::new();
    let mut source_type = StringBuilder::new();
    let mut language = StringBuilder::new();
    let mut content = StringBuilder::new();
    let mut metadata = StringBuilder::new();
    let mut embedding =
        FixedSizeListBuilder::new(Float32Builder::new(), leg::EMBEDDING_DIMENSIONS);
    let mut embedding_model = StringBuilder::new();

    for chunk in chunks {
        if chunk.embedding.len() != leg::EMBEDDING_DIMENSIONS as usize {
            return Err(StoreError::Other(format!(
                "embedding for {} has {} dimensions, expected {}",
                chunk.resource_key,
                chunk.embedding.len(),
                leg::EMBEDDING_DIMENSIONS
            )));
        }
        resource_key.append_value(&chunk.resource_key);
        source_type.append_value(&chunk.source_type);
        language.append_value(chunk.language.as_str());
        content.append_value(&chunk.content);
        metadata.append_value(serde_json::to_string(&chunk.metadata)?);
        for &v in &chunk.embedding {
            embedding.values().append_value(v);
        }
        embedding.append(true);
        embedding_model.append_value(&chunk.embedding_model);
    }

    let batch = RecordBatch::try_new(
        Arc::new(leg::leg_embeddings_schema()),
        vec![
            Arc::new(resource_key.finish()),
            Arc::new(source_type.finish()),
            Arc::new(language.finish()),
            Arc::new(content.finish()),
            Arc::new(metadata.finish()),
            Arc::new(embedding.finish()),
            Arc::new(embedding_model.finish()),
        ],
    )?;
    Ok(batch)
}

fn rows_from_batches(batches: &[RecordBatch], with_distance: bool) -> Vec<EmbeddingRow> {
    let mut out = Vec::new();
    for batch in batches {
        let resource_key = string_col(batch, "resource_key");
        let source_type = string_col(batch, "source_type");
        let language = string_col(batch, "language");
        let content = string_col(batch, "content");
        let metadata = string_col(batch, "metadata");
        let model = opt_string_col(batch, "embedding_model");
        let distance: Option<Vec<f32>> = if with_distance {
            batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<arrow::array::Float32Array>())
                .map(|arr| (0..arr.len()).map(|i| arr.value(i)).collect())
        } else {
            None
        };
        for i in 0..batch.num_rows() {
            out.push(EmbeddingRow {
                resource_key: resource_key[i].clone(),
                source_type: source_type[i].clone(),
                language: language[i].clone(),
                content: content[i].clone(),
                metadata: metadata[i].clone(),
                embedding_model: model[i].clone(),
                distance: distance.as_ref().map(|d| d[i]),
            });
        }
    }
    out
}

fn string_col(batch: &RecordBatch, name: &str) -> Vec<String> {
    let col = batch.column_by_name(name).expect(name);
    if let Some(arr) = col.as_any().downcast_ref::<arrow::array::StringArray>() {
        (0..arr.len()).map(|i| arr.value(i).to_string()).collect()
    } else if let Some(arr) = col
        .as_any()
        .downcast_ref::<arrow::array::LargeStringArray>()
    {
        (0..arr.len()).map(|i| arr.value(i).to_string()).collect()
    } else {
        panic!("column {name} is not a string type");
    }
}

fn opt_string_col(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
    let col = batch.column_by_name(name).expect(name);
    if let Some(arr) = col.as_any().downcast_ref::<arrow::array::StringArray>() {
        (0..arr.len())
            .map(|i| (!arr.is_null(i)).then(|| arr.value(i).to_string()))
            .collect()
    } else if let Some(arr) = col
        .as_any()
        .downcast_ref::<arrow::array::LargeStringArray>()
    {
        (0..arr.len())
            .map(|i| (!arr.is_null(i)).then(|| arr.value(i).to_string()))
            .collect()
    } else {
        panic!("column {name} is not a string type");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(key: &str, seed: f32) -> EmbeddedChunk {
        let mut embedding = vec![0.0f32; leg::EMBEDDING_DIMENSIONS as usize];
        embedding[0] = seed;
        embedding[1] = 1.0 - seed;
        EmbeddedChunk {
            resource_key: key.to_string(),
            source_type: "act_section".to_string(),
            language: Language::En,
            content: format!("content for {key}"),
            metadata: serde_json::json!({"actId": "C-46"}),
            embedding,
            embedding_model: "bge-m3".to_string(),
        }
    }

    #[tokio::test]
    async fn open_creates_database() {
        let tmp = TempDir::new().unwrap();
        let store = LanceStore::open(&tmp.path().join("lance")).await.unwrap();
        assert!(store.table_names().await.unwrap().is_empty());
        assert_eq!(store.embeddings_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_creates_then_replaces() {
        let tmp = TempDir::new().unwrap();
        let store = LanceStore::open(&tmp.path().join("lance")).await.unwrap();

        store
            .upsert_embeddings(&[chunk("act:C-46:en:0", 1.0), chunk("act:C-46:en:1", 0.5)])
            .await
            .unwrap();
        assert_eq!(store.embeddings_count().await.unwrap(), 2);

        // Re-embedding the same key must not duplicate.
        store
            .upsert_embeddings(&[chunk("act:C-46:en:0", 0.9)])
            .await
            .unwrap();
        assert_eq!(store.embeddings_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn wrong_dimension_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = LanceStore::open(&tmp.path().join("lance")).await.unwrap();
        let mut bad = chunk("act:X:en:0", 1.0);
        bad.embedding.truncate(10);
        assert!(store.upsert_embeddings(&[bad]).await.is_err());
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let tmp = TempDir::new().unwrap();
        let store = LanceStore::open(&tmp.path().join("lance")).await.unwrap();
        store
            .upsert_embeddings(&[chunk("near", 1.0), chunk("far", 0.0)])
            .await
            .unwrap();

        let mut query = vec![0.0f32; leg::EMBEDDING_DIMENSIONS as usize];
        query[0] = 1.0;
        let hits = store.search(&query, 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].resource_key, "near");
        assert!(hits[0].distance.unwrap() <= hits[1].distance.unwrap());
    }

    #[tokio::test]
    async fn search_with_filter() {
        let tmp = TempDir::new().unwrap();
        let store = LanceStore::open(&tmp.path().join("lance")).await.unwrap();
        let mut other = chunk("other", 1.0);
        other.source_type = "defined_term".to_string();
        store
            .upsert_embeddings(&[chunk("near", 1.0), other])
            .await
            .unwrap();

        let mut query = vec![0.0f32; leg::EMBEDDING_DIMENSIONS as usize];
        query[0] = 1.0;
        let hits = store
            .search(&query, 10, Some("source_type = 'defined_term'"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].resource_key, "other");
    }

    #[tokio::test]
    async fn model_selection_for_reembed() {
        let tmp = TempDir::new().unwrap();
        let store = LanceStore::open(&tmp.path().join("lance")).await.unwrap();
        store
            .upsert_embeddings(&[chunk("a", 1.0), chunk("b", 0.2)])
            .await
            .unwrap();

        assert_eq!(store.count_by_model(Some("bge-m3")).await.unwrap(), 2);
        assert_eq!(store.count_by_model(Some("other")).await.unwrap(), 0);

        let rows = store.fetch_by_model(Some("bge-m3"), 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].distance.is_none());

        let models = store.list_models().await.unwrap();
        assert_eq!(models, vec![(Some("bge-m3".to_string()), 2)]);
    }
}
