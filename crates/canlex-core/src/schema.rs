//! Arrow schema definitions for the legislation corpus tables.

pub mod leg {
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    /// Number of dimensions in stored embedding vectors.
    pub const EMBEDDING_DIMENSIONS: i32 = 1024;

    /// Model tag written alongside every embedding.
    pub const DEFAULT_EMBEDDING_MODEL: &str = "bge-m3";

    /// Schema for the `acts` table. One row per `(act_id, language)`.
    pub fn acts_schema() -> Schema {
        Schema::new(vec![
            // Identity
            Field::new("act_id", DataType::Utf8, false),
            Field::new("language", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("long_title", DataType::Utf8, true),
            Field::new("running_head", DataType::Utf8, true),
            Field::new("short_title_status", DataType::Utf8, true),
            // Status and dates
            Field::new("status", DataType::Utf8, false),
            Field::new("in_force_date", DataType::Utf8, true),
            Field::new("enacted_date", DataType::Utf8, true),
            Field::new("last_amended_date", DataType::Utf8, true),
            Field::new("consolidation_date", DataType::Utf8, true),
            // Bill provenance
            Field::new("bill_origin", DataType::Utf8, true),
            Field::new("bill_type", DataType::Utf8, true),
            Field::new("consolidated_number", DataType::Utf8, true),
            Field::new("consolidated_number_official", DataType::Utf8, true),
            Field::new("annual_statute_year", DataType::Int32, true),
            Field::new("annual_statute_chapter", DataType::Utf8, true),
            Field::new("bill_history", DataType::Utf8, true),
            // Structural extras (JSON-encoded)
            Field::new("recent_amendments", DataType::Utf8, true),
            Field::new("preamble", DataType::Utf8, true),
            Field::new("related_provisions", DataType::Utf8, true),
            Field::new("signature_blocks", DataType::Utf8, true),
            Field::new("table_of_provisions", DataType::Utf8, true),
            Field::new("has_previous_version", DataType::Boolean, true),
        ])
    }

    /// Schema for the `regulations` table. One row per `(regulation_id, language)`.
    pub fn regulations_schema() -> Schema {
        Schema::new(vec![
            Field::new("regulation_id", DataType::Utf8, false),
            Field::new("language", DataType::Utf8, false),
            Field::new("instrument_number", DataType::Utf8, false),
            Field::new("regulation_type", DataType::Utf8, true),
            Field::new("gazette_part", DataType::Utf8, true),
            Field::new("title", DataType::Utf8, false),
            Field::new("long_title", DataType::Utf8, true),
            Field::new("enabling_authorities", DataType::Utf8, true),
            Field::new("enabling_act_id", DataType::Utf8, true),
            Field::new("enabling_act_title", DataType::Utf8, true),
            Field::new("status", DataType::Utf8, false),
            Field::new("registration_date", DataType::Utf8, true),
            Field::new("consolidation_date", DataType::Utf8, true),
            Field::new("last_amended_date", DataType::Utf8, true),
            Field::new("regulation_maker_order", DataType::Utf8, true),
            Field::new("recent_amendments", DataType::Utf8, true),
            Field::new("related_provisions", DataType::Utf8, true),
            Field::new("has_previous_version", DataType::Boolean, true),
        ])
    }

    /// Schema for the `sections` table.
    ///
    /// Exactly one of `act_id` / `regulation_id` is non-null per row;
    /// `section_order` is strictly increasing within a document-language pair.
    pub fn sections_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("act_id", DataType::Utf8, true),
            Field::new("regulation_id", DataType::Utf8, true),
            Field::new("language", DataType::Utf8, false),
            Field::new("section_label", DataType::Utf8, false),
            Field::new("section_order", DataType::Int64, false),
            Field::new("section_type", DataType::Utf8, false),
            Field::new("hierarchy_path", DataType::Utf8, true),
            Field::new("marginal_note", DataType::Utf8, true),
            Field::new("content", DataType::Utf8, false),
            Field::new("content_html", DataType::Utf8, true),
            Field::new("status", DataType::Utf8, false),
            Field::new("xml_type", DataType::Utf8, true),
            Field::new("xml_target", DataType::Utf8, true),
            Field::new("change_type", DataType::Utf8, true),
            Field::new("in_force_start_date", DataType::Utf8, true),
            Field::new("last_amended_date", DataType::Utf8, true),
            // JSON-encoded nested collections
            Field::new("historical_notes", DataType::Utf8, true),
            Field::new("footnotes", DataType::Utf8, true),
            Field::new("schedule_id", DataType::Utf8, true),
            Field::new("schedule_bilingual", DataType::Boolean, true),
            Field::new("content_flags", DataType::UInt32, false),
            Field::new("formatting_attributes", DataType::Utf8, true),
            Field::new("provision_heading", DataType::Utf8, true),
            Field::new("internal_references", DataType::Utf8, true),
        ])
    }

    /// Schema for the `defined_terms` table.
    pub fn defined_terms_schema() -> Schema {
        Schema::new(vec![
            Field::new("language", DataType::Utf8, false),
            Field::new("term", DataType::Utf8, false),
            Field::new("act_id", DataType::Utf8, true),
            Field::new("regulation_id", DataType::Utf8, true),
            Field::new("section_label", DataType::Utf8, true),
            Field::new("scope_type", DataType::Utf8, false),
            Field::new("scope_sections", DataType::Utf8, true),
            Field::new("paired_term", DataType::Utf8, true),
        ])
    }

    /// Schema for the `cross_references` table.
    pub fn cross_references_schema() -> Schema {
        Schema::new(vec![
            Field::new("source_act_id", DataType::Utf8, true),
            Field::new("source_regulation_id", DataType::Utf8, true),
            Field::new("source_section_label", DataType::Utf8, false),
            Field::new("language", DataType::Utf8, false),
            Field::new("target_type", DataType::Utf8, false),
            Field::new("target_ref", DataType::Utf8, false),
            Field::new("reference_text", DataType::Utf8, false),
        ])
    }

    /// Schema for the `leg_resources` table.
    ///
    /// `resource_key` is globally unique — `{sourceType}:{id}:{lang}:{chunkIndex}`
    /// — and is the idempotency key for embedding writes. `metadata` carries
    /// every field the retriever may filter on.
    pub fn leg_resources_schema() -> Schema {
        Schema::new(vec![
            Field::new("resource_key", DataType::Utf8, false),
            Field::new("source_type", DataType::Utf8, false),
            Field::new("language", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new("paired_resource_key", DataType::Utf8, true),
        ])
    }

    /// Schema for the `leg_embeddings` Lance table.
    pub fn leg_embeddings_schema() -> Schema {
        Schema::new(vec![
            Field::new("resource_key", DataType::Utf8, false),
            Field::new("source_type", DataType::Utf8, false),
            Field::new("language", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    EMBEDDING_DIMENSIONS,
                ),
                true,
            ),
            Field::new("embedding_model", DataType::Utf8, true),
        ])
    }
}
