//! DuckDB storage for the legislation row family.
//!
//! One database holds `acts`, `regulations`, `sections`, `defined_terms`,
//! `cross_references`, and `leg_resources`. Documents are never mutated in
//! place: re-ingest replaces a document's whole row family inside one
//! transaction. Bulk section inserts go through Arrow RecordBatches written
//! to a temp Parquet file and loaded with DuckDB's native `read_parquet()`.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, BooleanBuilder, Int64Builder, StringBuilder, UInt32Builder,
};
use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use tracing::info;

use canlex_core::schema::leg;
use canlex_core::types::{
    ContentFlags, CrossReference, DefinedTerm, Document, Language, ParsedDocument, Section,
};

use crate::StoreError;

/// Per-chunk resource row mirrored into `leg_resources` when embeddings are
/// persisted. `resource_key` is the idempotency key; `metadata` carries every
/// field the retriever may filter on.
#[derive(Debug, Clone)]
pub struct ResourceRow {
    pub resource_key: String,
    pub source_type: String,
    pub language: Language,
    pub metadata: serde_json::Value,
    pub paired_resource_key: Option<String>,
}

/// Slim document view used by the embedding pipeline and hydration.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub document_id: String,
    pub language: Language,
    pub is_act: bool,
    pub title: String,
    pub long_title: Option<String>,
    pub status: String,
    pub in_force_date: Option<String>,
    pub enacted_date: Option<String>,
    pub last_amended_date: Option<String>,
    pub consolidation_date: Option<String>,
    pub bill_origin: Option<String>,
    pub instrument_number: Option<String>,
    pub regulation_type: Option<String>,
    pub enabling_act_id: Option<String>,
    pub annual_statute_year: Option<i32>,
    pub annual_statute_chapter: Option<String>,
}

/// DuckDB store for the legislation corpus.
///
/// Supports in-memory (tests) and persistent (file-backed) modes, following
/// an explicit lifecycle: the CLI opens it once and closes it on exit.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open an in-memory database with the schema created.
    pub fn open() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open or create a persistent database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS acts (
                act_id VARCHAR NOT NULL,
                language VARCHAR NOT NULL,
                title VARCHAR NOT NULL,
                long_title VARCHAR,
                running_head VARCHAR,
                short_title_status VARCHAR,
                status VARCHAR NOT NULL,
                in_force_date VARCHAR,
                enacted_date VARCHAR,
                last_amended_date VARCHAR,
                consolidation_date VARCHAR,
                bill_origin VARCHAR,
                bill_type VARCHAR,
                consolidated_number VARCHAR,
                consolidated_number_official VARCHAR,
                annual_statute_year INTEGER,
                annual_statute_chapter VARCHAR,
                bill_history VARCHAR,
                recent_amendments VARCHAR,
                preamble VARCHAR,
                related_provisions VARCHAR,
                signature_blocks VARCHAR,
                table_of_provisions VARCHAR,
                has_previous_version BOOLEAN,
                PRIMARY KEY (act_id, language)
            );
            CREATE TABLE IF NOT EXISTS regulations (
                regulation_id VARCHAR NOT NULL,
                language VARCHAR NOT NULL,
                instrument_number VARCHAR NOT NULL,
                regulation_type VARCHAR,
                gazette_part VARCHAR,
                title VARCHAR NOT NULL,
                long_title VARCHAR,
                enabling_authorities VARCHAR,
                enabling_act_id VARCHAR,
                enabling_act_title VARCHAR,
                status VARCHAR NOT NULL,
                registration_date VARCHAR,
                consolidation_date VARCHAR,
                last_amended_date VARCHAR,
                regulation_maker_order VARCHAR,
                recent_amendments VARCHAR,
                related_provisions VARCHAR,
                has_previous_version BOOLEAN,
                PRIMARY KEY (regulation_id, language)
            );
            CREATE TABLE IF NOT EXISTS sections (
                id BIGINT NOT NULL,
                act_id VARCHAR,
                regulation_id VARCHAR,
                language VARCHAR NOT NULL,
                section_label VARCHAR NOT NULL,
                section_order BIGINT NOT NULL,
                section_type VARCHAR NOT NULL,
                hierarchy_path VARCHAR,
                marginal_note VARCHAR,
                content VARCHAR NOT NULL,
                content_html VARCHAR,
                status VARCHAR NOT NULL,
                xml_type VARCHAR,
                xml_target VARCHAR,
                change_type VARCHAR,
                in_force_start_date VARCHAR,
                last_amended_date VARCHAR,
                historical_notes VARCHAR,
                footnotes VARCHAR,
                schedule_id VARCHAR,
                schedule_bilingual BOOLEAN,
                content_flags UINTEGER NOT NULL,
                formatting_attributes VARCHAR,
                provision_heading VARCHAR,
                internal_references VARCHAR
            );
            CREATE TABLE IF NOT EXISTS defined_terms (
                language VARCHAR NOT NULL,
                term VARCHAR NOT NULL,
                act_id VARCHAR,
                regulation_id VARCHAR,
                section_label VARCHAR,
                scope_type VARCHAR NOT NULL,
                scope_sections VARCHAR,
                paired_term VARCHAR
            );
            CREATE TABLE IF NOT EXISTS cross_references (
                source_act_id VARCHAR,
                source_regulation_id VARCHAR,
                source_section_label VARCHAR NOT NULL,
                language VARCHAR NOT NULL,
                target_type VARCHAR NOT NULL,
                target_ref VARCHAR NOT NULL,
                reference_text VARCHAR NOT NULL
            );
            CREATE TABLE IF NOT EXISTS leg_resources (
                resource_key VARCHAR NOT NULL UNIQUE,
                source_type VARCHAR NOT NULL,
                language VARCHAR NOT NULL,
                metadata VARCHAR NOT NULL,
                paired_resource_key VARCHAR
            );",
        )?;
        Ok(())
    }

    // ── Transactions ──

    pub fn begin(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    pub fn commit(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    // ── Ingestion ──

    /// True iff the document already has a row for this language.
    pub fn has_document(&self, document_id: &str, language: Language, is_act: bool) -> bool {
        let (table, key) = if is_act {
            ("acts", "act_id")
        } else {
            ("regulations", "regulation_id")
        };
        let sql = format!(
            "SELECT count(*) FROM {table} WHERE {key} = '{}' AND language = '{}'",
            sql_escape(document_id),
            language
        );
        self.query_i64(&sql).map(|n| n > 0).unwrap_or(false)
    }

    /// Replace a document's entire row family (document, sections, terms,
    /// references) in one transaction.
    pub fn replace_document(&self, parsed: &ParsedDocument) -> Result<(), StoreError> {
        for section in &parsed.sections {
            if section.act_id.is_some() == section.regulation_id.is_some() {
                return Err(StoreError::Other(format!(
                    "section '{}' must have exactly one owner",
                    section.section_label
                )));
            }
        }

        self.begin()?;
        match self.replace_document_inner(parsed) {
            Ok(()) => {
                self.commit()?;
                Ok(())
            }
            Err(e) => {
                let _ = self.rollback();
                Err(StoreError::Transaction(e.to_string()))
            }
        }
    }

    fn replace_document_inner(&self, parsed: &ParsedDocument) -> Result<(), StoreError> {
        let document_id = parsed.document.document_id().to_string();
        let language = parsed.document.language();
        let is_act = matches!(parsed.document, Document::Act(_));

        self.delete_document_rows(&document_id, language, is_act)?;
        match &parsed.document {
            Document::Act(act) => self.insert_act(act)?,
            Document::Regulation(reg) => self.insert_regulation(reg)?,
        }

        if !parsed.sections.is_empty() {
            let first_id = self.query_i64("SELECT coalesce(max(id), 0) FROM sections")? + 1;
            let batch = sections_batch(&parsed.sections, first_id)?;
            self.insert_batch("sections", &batch)?;
        }
        self.insert_defined_terms(&parsed.defined_terms)?;
        self.insert_cross_references(&parsed.cross_references)?;

        info!(
            document = %document_id,
            language = %language,
            sections = parsed.sections.len(),
            terms = parsed.defined_terms.len(),
            references = parsed.cross_references.len(),
            "replaced document row family"
        );
        Ok(())
    }

    fn delete_document_rows(
        &self,
        document_id: &str,
        language: Language,
        is_act: bool,
    ) -> Result<(), StoreError> {
        let id = sql_escape(document_id);
        let owner = if is_act { "act_id" } else { "regulation_id" };
        let (doc_table, doc_key) = if is_act {
            ("acts", "act_id")
        } else {
            ("regulations", "regulation_id")
        };
        self.conn.execute_batch(&format!(
            "DELETE FROM sections WHERE {owner} = '{id}' AND language = '{language}';
             DELETE FROM defined_terms WHERE {owner} = '{id}' AND language = '{language}';
             DELETE FROM cross_references WHERE source_{owner} = '{id}' AND language = '{language}';
             DELETE FROM {doc_table} WHERE {doc_key} = '{id}' AND language = '{language}';"
        ))?;
        Ok(())
    }

    fn insert_act(&self, act: &canlex_core::types::Act) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO acts VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
            quoted(&act.act_id),
            quoted(act.language.as_str()),
            quoted(&act.title),
            opt(&act.long_title),
            opt(&act.running_head),
            opt(&act.short_title_status),
            quoted(act.status.as_str()),
            opt(&act.in_force_date),
            opt(&act.enacted_date),
            opt(&act.last_amended_date),
            opt(&act.consolidation_date),
            opt(&act.bill_origin.map(|o| match o {
                canlex_core::types::BillOrigin::Commons => "commons".to_string(),
                canlex_core::types::BillOrigin::Senate => "senate".to_string(),
            })),
            opt(&act.bill_type),
            opt(&act.consolidated_number),
            opt(&act.consolidated_number_official),
            act.annual_statute_year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "NULL".into()),
            opt(&act.annual_statute_chapter),
            opt(&act.bill_history),
            quoted(&serde_json::to_string(&act.recent_amendments)?),
            opt(&act.preamble),
            quoted(&serde_json::to_string(&act.related_provisions)?),
            opt(&act.signature_blocks),
            opt(&act.table_of_provisions),
            act.has_previous_version
                .map(|b| b.to_string())
                .unwrap_or_else(|| "NULL".into()),
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    fn insert_regulation(&self, reg: &canlex_core::types::Regulation) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO regulations VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
            quoted(&reg.regulation_id),
            quoted(reg.language.as_str()),
            quoted(&reg.instrument_number),
            opt(&reg.regulation_type),
            opt(&reg.gazette_part),
            quoted(&reg.title),
            opt(&reg.long_title),
            quoted(&serde_json::to_string(&reg.enabling_authorities)?),
            opt(&reg.enabling_act_id),
            opt(&reg.enabling_act_title),
            quoted(reg.status.as_str()),
            opt(&reg.registration_date),
            opt(&reg.consolidation_date),
            opt(&reg.last_amended_date),
            opt(&reg.regulation_maker_order),
            quoted(&serde_json::to_string(&reg.recent_amendments)?),
            quoted(&serde_json::to_string(&reg.related_provisions)?),
            reg.has_previous_version
                .map(|b| b.to_string())
                .unwrap_or_else(|| "NULL".into()),
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    fn insert_defined_terms(&self, terms: &[DefinedTerm]) -> Result<(), StoreError> {
        for chunk in terms.chunks(500) {
            let rows: Vec<String> = chunk
                .iter()
                .map(|t| {
                    Ok(format!(
                        "({}, {}, {}, {}, {}, {}, {}, {})",
                        quoted(t.language.as_str()),
                        quoted(&t.term),
                        opt(&t.act_id),
                        opt(&t.regulation_id),
                        opt(&t.section_label),
                        quoted(&format!("{:?}", t.scope_type).to_lowercase()),
                        quoted(&serde_json::to_string(&t.scope_sections)?),
                        opt(&t.paired_term),
                    ))
                })
                .collect::<Result<_, StoreError>>()?;
            if !rows.is_empty() {
                self.conn.execute_batch(&format!(
                    "INSERT INTO defined_terms VALUES {}",
                    rows.join(", ")
                ))?;
            }
        }
        Ok(())
    }

    fn insert_cross_references(&self, references: &[CrossReference]) -> Result<(), StoreError> {
        for chunk in references.chunks(500) {
            let rows: Vec<String> = chunk
                .iter()
                .map(|r| {
                    format!(
                        "({}, {}, {}, {}, {}, {}, {})",
                        opt(&r.source_act_id),
                        opt(&r.source_regulation_id),
                        quoted(&r.source_section_label),
                        quoted(r.language.as_str()),
                        quoted(r.target_type.as_str()),
                        quoted(&r.target_ref),
                        quoted(&r.reference_text),
                    )
                })
                .collect();
            if !rows.is_empty() {
                self.conn.execute_batch(&format!(
                    "INSERT INTO cross_references VALUES {}",
                    rows.join(", ")
                ))?;
            }
        }
        Ok(())
    }

    /// Remove every row from every table. Backs the CLI `--truncate` flag.
    pub fn truncate_all(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "DELETE FROM sections; DELETE FROM defined_terms; DELETE FROM cross_references;
             DELETE FROM acts; DELETE FROM regulations; DELETE FROM leg_resources;",
        )?;
        Ok(())
    }

    // ── Resources ──

    /// Idempotent upsert of resource rows keyed by `resource_key`. Callers
    /// wrap this in `begin`/`commit` together with the embedding write.
    pub fn upsert_resources(&self, rows: &[ResourceRow]) -> Result<(), StoreError> {
        for chunk in rows.chunks(500) {
            let values: Vec<String> = chunk
                .iter()
                .map(|r| {
                    Ok(format!(
                        "({}, {}, {}, {}, {})",
                        quoted(&r.resource_key),
                        quoted(&r.source_type),
                        quoted(r.language.as_str()),
                        quoted(&serde_json::to_string(&r.metadata)?),
                        opt(&r.paired_resource_key),
                    ))
                })
                .collect::<Result<_, StoreError>>()?;
            if !values.is_empty() {
                self.conn.execute_batch(&format!(
                    "INSERT OR REPLACE INTO leg_resources VALUES {}",
                    values.join(", ")
                ))?;
            }
        }
        Ok(())
    }

    /// Rewrite `embeddingModelVersion` in resource metadata for the given
    /// keys. Used by the re-embed migration after vectors are updated.
    pub fn update_resource_model(
        &self,
        resource_keys: &[String],
        model: &str,
    ) -> Result<usize, StoreError> {
        let mut updated = 0usize;
        for chunk in resource_keys.chunks(200) {
            let keys = chunk
                .iter()
                .map(|k| quoted(k))
                .collect::<Vec<_>>()
                .join(", ");
            let batches = self.query_arrow(&format!(
                "SELECT resource_key, metadata FROM leg_resources WHERE resource_key IN ({keys})"
            ))?;
            for batch in &batches {
                let key_col = string_col(batch, "resource_key");
                let meta_col = string_col(batch, "metadata");
                for i in 0..batch.num_rows() {
                    let mut metadata: serde_json::Value = serde_json::from_str(&meta_col[i])?;
                    if let Some(obj) = metadata.as_object_mut() {
                        obj.insert(
                            "embeddingModelVersion".to_string(),
                            serde_json::Value::String(model.to_string()),
                        );
                    }
                    self.conn.execute_batch(&format!(
                        "UPDATE leg_resources SET metadata = {} WHERE resource_key = {}",
                        quoted(&serde_json::to_string(&metadata)?),
                        quoted(&key_col[i]),
                    ))?;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    // ── Fetch (pipeline) ──

    /// Fetch a page of document metadata for the embedding pipeline, ordered
    /// by id then language so pagination is stable.
    pub fn fetch_document_metas(
        &self,
        is_act: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentMeta>, StoreError> {
        self.fetch_metas(is_act, "TRUE", limit, offset)
    }

    fn fetch_metas(
        &self,
        is_act: bool,
        where_clause: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentMeta>, StoreError> {
        let sql = if is_act {
            format!(
                "SELECT act_id AS document_id, language, title, long_title, status,
                        in_force_date, enacted_date, last_amended_date, consolidation_date,
                        bill_origin, NULL::VARCHAR AS instrument_number,
                        NULL::VARCHAR AS regulation_type, NULL::VARCHAR AS enabling_act_id,
                        annual_statute_year, annual_statute_chapter
                 FROM acts WHERE {where_clause}
                 ORDER BY act_id, language LIMIT {limit} OFFSET {offset}"
            )
        } else {
            format!(
                "SELECT regulation_id AS document_id, language, title, long_title, status,
                        NULL::VARCHAR AS in_force_date, NULL::VARCHAR AS enacted_date,
                        last_amended_date, consolidation_date, NULL::VARCHAR AS bill_origin,
                        instrument_number, regulation_type, enabling_act_id,
                        NULL::INTEGER AS annual_statute_year,
                        NULL::VARCHAR AS annual_statute_chapter
                 FROM regulations WHERE {where_clause}
                 ORDER BY regulation_id, language LIMIT {limit} OFFSET {offset}"
            )
        };
        let batches = self.query_arrow(&sql)?;
        let mut out = Vec::new();
        for batch in &batches {
            let document_id = string_col(batch, "document_id");
            let language = string_col(batch, "language");
            let title = string_col(batch, "title");
            let long_title = opt_string_col(batch, "long_title");
            let status = string_col(batch, "status");
            let in_force = opt_string_col(batch, "in_force_date");
            let enacted = opt_string_col(batch, "enacted_date");
            let amended = opt_string_col(batch, "last_amended_date");
            let consolidated = opt_string_col(batch, "consolidation_date");
            let origin = opt_string_col(batch, "bill_origin");
            let instrument = opt_string_col(batch, "instrument_number");
            let reg_type = opt_string_col(batch, "regulation_type");
            let enabling = opt_string_col(batch, "enabling_act_id");
            let year = opt_i32_col(batch, "annual_statute_year");
            let chapter = opt_string_col(batch, "annual_statute_chapter");
            for i in 0..batch.num_rows() {
                out.push(DocumentMeta {
                    document_id: document_id[i].clone(),
                    language: parse_language(&language[i])?,
                    is_act,
                    title: title[i].clone(),
                    long_title: long_title[i].clone(),
                    status: status[i].clone(),
                    in_force_date: in_force[i].clone(),
                    enacted_date: enacted[i].clone(),
                    last_amended_date: amended[i].clone(),
                    consolidation_date: consolidated[i].clone(),
                    bill_origin: origin[i].clone(),
                    instrument_number: instrument[i].clone(),
                    regulation_type: reg_type[i].clone(),
                    enabling_act_id: enabling[i].clone(),
                    annual_statute_year: year[i],
                    annual_statute_chapter: chapter[i].clone(),
                });
            }
        }
        Ok(out)
    }

    /// Fetch every section of the given documents in one query, all
    /// languages, ordered by document then `section_order`. Callers group in
    /// memory by `(document_id, language)`.
    pub fn fetch_sections_for(
        &self,
        document_ids: &[String],
        is_act: bool,
    ) -> Result<Vec<Section>, StoreError> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }
        let owner = if is_act { "act_id" } else { "regulation_id" };
        let ids = document_ids
            .iter()
            .map(|id| quoted(id))
            .collect::<Vec<_>>()
            .join(", ");
        let batches = self.query_arrow(&format!(
            "SELECT * FROM sections WHERE {owner} IN ({ids})
             ORDER BY {owner}, language, section_order"
        ))?;
        sections_from_batches(&batches)
    }

    /// Fetch one section by natural key.
    pub fn get_section(
        &self,
        document_id: &str,
        language: Language,
        section_label: &str,
    ) -> Result<Option<Section>, StoreError> {
        let id = sql_escape(document_id);
        let label = sql_escape(section_label);
        let batches = self.query_arrow(&format!(
            "SELECT * FROM sections
             WHERE (act_id = '{id}' OR regulation_id = '{id}')
               AND language = '{language}' AND section_label = '{label}'
             LIMIT 1"
        ))?;
        Ok(sections_from_batches(&batches)?.into_iter().next())
    }

    /// Fetch one document's metadata row, acts first.
    pub fn get_document_meta(
        &self,
        document_id: &str,
        language: Language,
    ) -> Result<Option<DocumentMeta>, StoreError> {
        let id = sql_escape(document_id);
        for is_act in [true, false] {
            let key = if is_act { "act_id" } else { "regulation_id" };
            let clause = format!("{key} = '{id}' AND language = '{language}'");
            if let Some(meta) = self.fetch_metas(is_act, &clause, 1, 0)?.into_iter().next() {
                return Ok(Some(meta));
            }
        }
        Ok(None)
    }

    /// Fetch a page of defined terms for embedding.
    pub fn fetch_defined_terms(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DefinedTerm>, StoreError> {
        let batches = self.query_arrow(&format!(
            "SELECT * FROM defined_terms ORDER BY term, language LIMIT {limit} OFFSET {offset}"
        ))?;
        let mut out = Vec::new();
        for batch in &batches {
            let language = string_col(batch, "language");
            let term = string_col(batch, "term");
            let act_id = opt_string_col(batch, "act_id");
            let regulation_id = opt_string_col(batch, "regulation_id");
            let section_label = opt_string_col(batch, "section_label");
            let scope_type = string_col(batch, "scope_type");
            let scope_sections = opt_string_col(batch, "scope_sections");
            let paired = opt_string_col(batch, "paired_term");
            for i in 0..batch.num_rows() {
                out.push(DefinedTerm {
                    language: parse_language(&language[i])?,
                    term: term[i].clone(),
                    act_id: act_id[i].clone(),
                    regulation_id: regulation_id[i].clone(),
                    section_label: section_label[i].clone(),
                    scope_type: parse_scope(&scope_type[i]),
                    scope_sections: scope_sections[i]
                        .as_deref()
                        .and_then(|s| serde_json::from_str(s).ok())
                        .unwrap_or_default(),
                    paired_term: paired[i].clone(),
                });
            }
        }
        Ok(out)
    }

    // ── Counts and escape hatch ──

    pub fn acts_count(&self) -> Result<usize, StoreError> {
        self.count_table("acts")
    }

    pub fn regulations_count(&self) -> Result<usize, StoreError> {
        self.count_table("regulations")
    }

    pub fn sections_count(&self) -> Result<usize, StoreError> {
        self.count_table("sections")
    }

    pub fn defined_terms_count(&self) -> Result<usize, StoreError> {
        self.count_table("defined_terms")
    }

    pub fn cross_references_count(&self) -> Result<usize, StoreError> {
        self.count_table("cross_references")
    }

    pub fn resources_count(&self) -> Result<usize, StoreError> {
        self.count_table("leg_resources")
    }

    fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        Ok(self.query_i64(&format!("SELECT count(*) FROM {table}"))? as usize)
    }

    fn query_i64(&self, sql: &str) -> Result<i64, StoreError> {
        let batches = self.query_arrow(sql)?;
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("expected i64 column".into()))?;
        Ok(col.value(0))
    }

    /// Execute a DDL/DML statement that returns no result set.
    pub fn execute(&self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    /// Insert an Arrow RecordBatch into the named table via a temp Parquet
    /// file and DuckDB's native `read_parquet()`.
    pub fn insert_batch(&self, table: &str, batch: &RecordBatch) -> Result<(), StoreError> {
        if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::Other(format!("invalid table name: {table}")));
        }

        let tmp = tempfile::Builder::new().suffix(".parquet").tempfile()?;
        {
            let mut writer = parquet::arrow::ArrowWriter::try_new(
                tmp.as_file().try_clone()?,
                batch.schema(),
                None,
            )?;
            writer.write(batch)?;
            writer.close()?;
        }
        let sql = format!(
            "INSERT INTO {table} SELECT * FROM read_parquet('{}')",
            tmp.path().display()
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }
}

// ── Row/batch conversion ──

/// Build the `sections` RecordBatch for one document, ids assigned from
/// `first_id` upward.
fn sections_batch(sections: &[Section], first_id: i64) -> Result<RecordBatch, StoreError> {
    let mut id = Int64Builder::new();
    let mut act_id = StringBuilder::new();
    let mut regulation_id = StringBuilder::new();
    let mut language = StringBuilder::new();
    let mut section_label = StringBuilder::new();
    let mut section_order = Int64Builder::new();
    let mut section_type = StringBuilder::new();
    let mut hierarchy_path = StringBuilder::new();
    let mut marginal_note = StringBuilder::new();
    let mut content = StringBuilder::new();
    let mut content_html = StringBuilder::new();
    let mut status = StringBuilder::new();
    let mut xml_type = StringBuilder::new();
    let mut xml_target = StringBuilder::new();
    let mut change_type = StringBuilder::new();
    let mut in_force = StringBuilder::new();
    let mut last_amended = StringBuilder::new();
    let mut historical_notes = StringBuilder::new();
    let mut footnotes = StringBuilder::new();
    let mut schedule_id = StringBuilder::new();
    let mut schedule_bilingual = BooleanBuilder::new();
    let mut content_flags = UInt32Builder::new();
    let mut formatting = StringBuilder::new();
    let mut provision_heading = StringBuilder::new();
    let mut internal_references = StringBuilder::new();

    for (i, s) in sections.iter().enumerate() {
        id.append_value(first_id + i as i64);
        act_id.append_option(s.act_id.as_deref());
        regulation_id.append_option(s.regulation_id.as_deref());
        language.append_value(s.language.as_str());
        section_label.append_value(&s.section_label);
        section_order.append_value(s.section_order);
        section_type.append_value(s.section_type.as_str());
        hierarchy_path.append_value(serde_json::to_string(&s.hierarchy_path)?);
        marginal_note.append_option(s.marginal_note.as_deref());
        content.append_value(&s.content);
        content_html.append_option(s.content_html.as_deref());
        status.append_value(s.status.as_str());
        xml_type.append_option(s.xml_type.as_deref());
        xml_target.append_option(s.xml_target.as_deref());
        change_type.append_option(s.change_type.as_deref());
        in_force.append_option(s.in_force_start_date.as_deref());
        last_amended.append_option(s.last_amended_date.as_deref());
        historical_notes.append_value(serde_json::to_string(&s.historical_notes)?);
        footnotes.append_value(serde_json::to_string(&s.footnotes)?);
        schedule_id.append_option(s.schedule_id.as_deref());
        schedule_bilingual.append_option(s.schedule_bilingual);
        content_flags.append_value(s.content_flags.0);
        formatting.append_option(
            s.formatting_attributes
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        );
        provision_heading.append_option(
            s.provision_heading
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        );
        internal_references.append_value(serde_json::to_string(&s.internal_references)?);
    }

    let batch = RecordBatch::try_new(
        Arc::new(leg::sections_schema()),
        vec![
            Arc::new(id.finish()),
            Arc::new(act_id.finish()),
            Arc::new(regulation_id.finish()),
            Arc::new(language.finish()),
            Arc::new(section_label.finish()),
            Arc::new(section_order.finish()),
            Arc::new(section_type.finish()),
            Arc::new(hierarchy_path.finish()),
            Arc::new(marginal_note.finish()),
            Arc::new(content.finish()),
            Arc::new(content_html.finish()),
            Arc::new(status.finish()),
            Arc::new(xml_type.finish()),
            Arc::new(xml_target.finish()),
            Arc::new(change_type.finish()),
            Arc::new(in_force.finish()),
            Arc::new(last_amended.finish()),
            Arc::new(historical_notes.finish()),
            Arc::new(footnotes.finish()),
            Arc::new(schedule_id.finish()),
            Arc::new(schedule_bilingual.finish()),
            Arc::new(content_flags.finish()),
            Arc::new(formatting.finish()),
            Arc::new(provision_heading.finish()),
            Arc::new(internal_references.finish()),
        ],
    )?;
    Ok(batch)
}

/// Rehydrate `Section` rows from query batches.
fn sections_from_batches(batches: &[RecordBatch]) -> Result<Vec<Section>, StoreError> {
    let mut out = Vec::new();
    for batch in batches {
        let act_id = opt_string_col(batch, "act_id");
        let regulation_id = opt_string_col(batch, "regulation_id");
        let language = string_col(batch, "language");
        let section_label = string_col(batch, "section_label");
        let section_order = i64_col(batch, "section_order");
        let section_type = string_col(batch, "section_type");
        let hierarchy_path = opt_string_col(batch, "hierarchy_path");
        let marginal_note = opt_string_col(batch, "marginal_note");
        let content = string_col(batch, "content");
        let content_html = opt_string_col(batch, "content_html");
        let status = string_col(batch, "status");
        let xml_type = opt_string_col(batch, "xml_type");
        let xml_target = opt_string_col(batch, "xml_target");
        let change_type = opt_string_col(batch, "change_type");
        let in_force = opt_string_col(batch, "in_force_start_date");
        let last_amended = opt_string_col(batch, "last_amended_date");
        let historical_notes = opt_string_col(batch, "historical_notes");
        let footnotes = opt_string_col(batch, "footnotes");
        let schedule_id = opt_string_col(batch, "schedule_id");
        let schedule_bilingual = opt_bool_col(batch, "schedule_bilingual");
        let content_flags = u32_col(batch, "content_flags");
        let formatting = opt_string_col(batch, "formatting_attributes");
        let provision_heading = opt_string_col(batch, "provision_heading");
        let internal_references = opt_string_col(batch, "internal_references");

        for i in 0..batch.num_rows() {
            out.push(Section {
                act_id: act_id[i].clone(),
                regulation_id: regulation_id[i].clone(),
                language: parse_language(&language[i])?,
                section_label: section_label[i].clone(),
                section_order: section_order[i],
                section_type: parse_section_type(&section_type[i]),
                hierarchy_path: json_or_default(&hierarchy_path[i]),
                marginal_note: marginal_note[i].clone(),
                content: content[i].clone(),
                content_html: content_html[i].clone(),
                status: parse_status(&status[i]),
                xml_type: xml_type[i].clone(),
                xml_target: xml_target[i].clone(),
                change_type: change_type[i].clone(),
                in_force_start_date: in_force[i].clone(),
                last_amended_date: last_amended[i].clone(),
                historical_notes: json_or_default(&historical_notes[i]),
                footnotes: json_or_default(&footnotes[i]),
                schedule_id: schedule_id[i].clone(),
                schedule_bilingual: schedule_bilingual[i],
                content_flags: ContentFlags(content_flags[i]),
                formatting_attributes: formatting[i]
                    .as_deref()
                    .and_then(|s| serde_json::from_str(s).ok()),
                provision_heading: provision_heading[i]
                    .as_deref()
                    .and_then(|s| serde_json::from_str(s).ok()),
                internal_references: json_or_default(&internal_references[i]),
            });
        }
    }
    Ok(out)
}

fn json_or_default<T: serde::de::DeserializeOwned + Default>(value: &Option<String>) -> T {
    value
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

fn parse_language(s: &str) -> Result<Language, StoreError> {
    s.parse()
        .map_err(|_| StoreError::Other(format!("invalid language in store: {s}")))
}

fn parse_status(s: &str) -> canlex_core::types::DocumentStatus {
    match s {
        "repealed" => canlex_core::types::DocumentStatus::Repealed,
        "not-in-force" => canlex_core::types::DocumentStatus::NotInForce,
        _ => canlex_core::types::DocumentStatus::InForce,
    }
}

fn parse_section_type(s: &str) -> canlex_core::types::SectionType {
    match s {
        "schedule" => canlex_core::types::SectionType::Schedule,
        "amending" => canlex_core::types::SectionType::Amending,
        _ => canlex_core::types::SectionType::Section,
    }
}

fn parse_scope(s: &str) -> canlex_core::types::ScopeType {
    match s {
        "act" => canlex_core::types::ScopeType::Act,
        "part" => canlex_core::types::ScopeType::Part,
        _ => canlex_core::types::ScopeType::Section,
    }
}

// ── SQL literal helpers ──

/// Escape single quotes for safe SQL interpolation.
fn sql_escape(s: &str) -> String {
    s.replace('\'', "''")
}

fn quoted(s: &str) -> String {
    format!("'{}'", sql_escape(s))
}

fn opt(value: &Option<String>) -> String {
    match value {
        Some(v) => quoted(v),
        None => "NULL".to_string(),
    }
}

// ── Arrow column extraction ──

/// Extract a non-nullable VARCHAR column as a Vec of Strings.
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

/// Extract a nullable VARCHAR column as a Vec of Option<String>.
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
    } else if col.as_any().downcast_ref::<arrow::array::NullArray>().is_some() {
        vec![None; col.len()]
    } else {
        panic!("column {name} is not a string type");
    }
}

fn i64_col(batch: &RecordBatch, name: &str) -> Vec<i64> {
    let col = batch.column_by_name(name).expect(name);
    let arr = col
        .as_any()
        .downcast_ref::<arrow::array::Int64Array>()
        .unwrap_or_else(|| panic!("column {name} is not Int64"));
    (0..arr.len()).map(|i| arr.value(i)).collect()
}

fn u32_col(batch: &RecordBatch, name: &str) -> Vec<u32> {
    let col = batch.column_by_name(name).expect(name);
    let arr = col
        .as_any()
        .downcast_ref::<arrow::array::UInt32Array>()
        .unwrap_or_else(|| panic!("column {name} is not UInt32"));
    (0..arr.len()).map(|i| arr.value(i)).collect()
}

fn opt_i32_col(batch: &RecordBatch, name: &str) -> Vec<Option<i32>> {
    let col = batch.column_by_name(name).expect(name);
    if let Some(arr) = col.as_any().downcast_ref::<arrow::array::Int32Array>() {
        (0..arr.len())
            .map(|i| (!arr.is_null(i)).then(|| arr.value(i)))
            .collect()
    } else if col.as_any().downcast_ref::<arrow::array::NullArray>().is_some() {
        vec![None; col.len()]
    } else {
        panic!("column {name} is not Int32");
    }
}

fn opt_bool_col(batch: &RecordBatch, name: &str) -> Vec<Option<bool>> {
    let col = batch.column_by_name(name).expect(name);
    let arr = col
        .as_any()
        .downcast_ref::<arrow::array::BooleanArray>()
        .unwrap_or_else(|| panic!("column {name} is not Boolean"));
    (0..arr.len())
        .map(|i| (!arr.is_null(i)).then(|| arr.value(i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use canlex_core::types::{Act, DocumentStatus, ScopeType, SectionType};

    fn sample_act() -> ParsedDocument {
        let act = Act {
            act_id: "C-46".into(),
            language: Language::En,
            title: "Criminal Code".into(),
            long_title: Some("An Act respecting the Criminal Law".into()),
            status: DocumentStatus::InForce,
            last_amended_date: Some("2023-06-22".into()),
            ..Default::default()
        };
        let sections = vec![
            Section {
                act_id: Some("C-46".into()),
                language: Language::En,
                section_label: "1".into(),
                section_order: 0,
                content: "This Act may be cited as the Criminal Code.".into(),
                hierarchy_path: vec!["Part I".into()],
                ..Default::default()
            },
            Section {
                act_id: Some("C-46".into()),
                language: Language::En,
                section_label: "2".into(),
                section_order: 1,
                content: "In this Act, Attorney General means...".into(),
                marginal_note: Some("Definitions".into()),
                status: DocumentStatus::InForce,
                ..Default::default()
            },
        ];
        let defined_terms = vec![DefinedTerm {
            language: Language::En,
            term: "Attorney General".into(),
            act_id: Some("C-46".into()),
            regulation_id: None,
            section_label: Some("2".into()),
            scope_type: ScopeType::Act,
            scope_sections: vec![],
            paired_term: Some("procureur général".into()),
        }];
        let cross_references = vec![];
        ParsedDocument {
            document: Document::Act(act),
            sections,
            defined_terms,
            cross_references,
        }
    }

    #[test]
    fn open_in_memory_creates_tables() {
        let store = DuckStore::open().unwrap();
        assert_eq!(store.acts_count().unwrap(), 0);
        assert_eq!(store.sections_count().unwrap(), 0);
        assert_eq!(store.resources_count().unwrap(), 0);
    }

    #[test]
    fn replace_document_roundtrip() {
        let store = DuckStore::open().unwrap();
        store.replace_document(&sample_act()).unwrap();
        assert_eq!(store.acts_count().unwrap(), 1);
        assert_eq!(store.sections_count().unwrap(), 2);
        assert_eq!(store.defined_terms_count().unwrap(), 1);
        assert!(store.has_document("C-46", Language::En, true));
        assert!(!store.has_document("C-46", Language::Fr, true));
    }

    #[test]
    fn reingest_replaces_not_duplicates() {
        let store = DuckStore::open().unwrap();
        store.replace_document(&sample_act()).unwrap();
        store.replace_document(&sample_act()).unwrap();
        assert_eq!(store.acts_count().unwrap(), 1);
        assert_eq!(store.sections_count().unwrap(), 2);
        assert_eq!(store.defined_terms_count().unwrap(), 1);
    }

    #[test]
    fn languages_are_parallel_rows() {
        let store = DuckStore::open().unwrap();
        store.replace_document(&sample_act()).unwrap();
        let mut fr = sample_act();
        if let Document::Act(a) = &mut fr.document {
            a.language = Language::Fr;
            a.title = "Code criminel".into();
        }
        for s in &mut fr.sections {
            s.language = Language::Fr;
        }
        for t in &mut fr.defined_terms {
            t.language = Language::Fr;
        }
        store.replace_document(&fr).unwrap();
        assert_eq!(store.acts_count().unwrap(), 2);
        assert_eq!(store.sections_count().unwrap(), 4);
    }

    #[test]
    fn section_owner_invariant_enforced() {
        let store = DuckStore::open().unwrap();
        let mut bad = sample_act();
        bad.sections[0].regulation_id = Some("SOR-1".into());
        assert!(store.replace_document(&bad).is_err());
        // Transaction rolled back: nothing persisted.
        assert_eq!(store.acts_count().unwrap(), 0);
    }

    #[test]
    fn sections_roundtrip_fields() {
        let store = DuckStore::open().unwrap();
        store.replace_document(&sample_act()).unwrap();
        let sections = store
            .fetch_sections_for(&["C-46".to_string()], true)
            .unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].section_label, "1");
        assert_eq!(sections[0].hierarchy_path, vec!["Part I".to_string()]);
        assert_eq!(sections[1].marginal_note.as_deref(), Some("Definitions"));
        assert!(sections[0].section_order < sections[1].section_order);
        assert_eq!(sections[0].section_type, SectionType::Section);
    }

    #[test]
    fn get_section_by_natural_key() {
        let store = DuckStore::open().unwrap();
        store.replace_document(&sample_act()).unwrap();
        let section = store.get_section("C-46", Language::En, "2").unwrap().unwrap();
        assert!(section.content.contains("Attorney General"));
        assert!(store.get_section("C-46", Language::Fr, "2").unwrap().is_none());
    }

    #[test]
    fn fetch_document_metas_paged() {
        let store = DuckStore::open().unwrap();
        store.replace_document(&sample_act()).unwrap();
        let metas = store.fetch_document_metas(true, 10, 0).unwrap();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].document_id, "C-46");
        assert_eq!(metas[0].title, "Criminal Code");
        assert!(metas[0].is_act);
        assert_eq!(metas[0].last_amended_date.as_deref(), Some("2023-06-22"));
        assert!(store.fetch_document_metas(true, 10, 1).unwrap().is_empty());
        assert!(store.fetch_document_metas(false, 10, 0).unwrap().is_empty());
    }

    #[test]
    fn fetch_defined_terms_roundtrip() {
        let store = DuckStore::open().unwrap();
        store.replace_document(&sample_act()).unwrap();
        let terms = store.fetch_defined_terms(10, 0).unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].term, "Attorney General");
        assert_eq!(terms[0].scope_type, ScopeType::Act);
        assert_eq!(terms[0].paired_term.as_deref(), Some("procureur général"));
    }

    #[test]
    fn resources_upsert_idempotent() {
        let store = DuckStore::open().unwrap();
        let row = ResourceRow {
            resource_key: "act_section:C-46/s2:en:0".into(),
            source_type: "act_section".into(),
            language: Language::En,
            metadata: serde_json::json!({"actId": "C-46", "sectionLabel": "2"}),
            paired_resource_key: Some("act_section:C-46/s2:fr:0".into()),
        };
        store.upsert_resources(&[row.clone()]).unwrap();
        store.upsert_resources(&[row]).unwrap();
        assert_eq!(store.resources_count().unwrap(), 1);
    }

    #[test]
    fn update_resource_model_rewrites_metadata() {
        let store = DuckStore::open().unwrap();
        let row = ResourceRow {
            resource_key: "act:C-46:en:0".into(),
            source_type: "act".into(),
            language: Language::En,
            metadata: serde_json::json!({"actId": "C-46"}),
            paired_resource_key: None,
        };
        store.upsert_resources(&[row]).unwrap();
        let updated = store
            .update_resource_model(&["act:C-46:en:0".to_string()], "bge-m3")
            .unwrap();
        assert_eq!(updated, 1);
        let batches = store
            .query_arrow("SELECT metadata FROM leg_resources")
            .unwrap();
        let metadata = string_col(&batches[0], "metadata");
        assert!(metadata[0].contains("\"embeddingModelVersion\":\"bge-m3\""));
    }

    #[test]
    fn truncate_all_clears_everything() {
        let store = DuckStore::open().unwrap();
        store.replace_document(&sample_act()).unwrap();
        store.truncate_all().unwrap();
        assert_eq!(store.acts_count().unwrap(), 0);
        assert_eq!(store.sections_count().unwrap(), 0);
        assert_eq!(store.defined_terms_count().unwrap(), 0);
    }

    #[test]
    fn persistent_survives_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("test.duckdb");
        {
            let store = DuckStore::open_persistent(&db_path).unwrap();
            store.replace_document(&sample_act()).unwrap();
        }
        let store = DuckStore::open_persistent(&db_path).unwrap();
        assert_eq!(store.acts_count().unwrap(), 1);
        assert_eq!(store.sections_count().unwrap(), 2);
    }

    #[test]
    fn sql_escaping_quotes() {
        let store = DuckStore::open().unwrap();
        let mut doc = sample_act();
        if let Document::Act(a) = &mut doc.document {
            a.title = "An Act about the Queen's Printer".into();
        }
        doc.sections[0].content = "the person's property".into();
        store.replace_document(&doc).unwrap();
        assert_eq!(store.acts_count().unwrap(), 1);
    }
}
