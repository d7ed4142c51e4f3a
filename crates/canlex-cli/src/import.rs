//! `import-legislation`: XML files → DuckDB row families.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::warn;

use canlex_core::types::Language;
use canlex_core::util::format_duration;
use canlex_parser::{LookupIndex, file_safe_name, parse_legislation_xml};
use canlex_store::DuckStore;

pub struct ImportOptions {
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub doc_type: Option<String>,
    pub lang: Option<String>,
    pub ids: Vec<String>,
    pub sample: bool,
    pub skip_existing: bool,
    pub truncate: bool,
    pub verbose: bool,
}

/// One XML file slated for import.
struct ImportFile {
    path: PathBuf,
    language: Language,
    is_act: bool,
}

/// Run the import; returns the process exit code (1 when any file failed).
pub fn run_import(
    store: &DuckStore,
    data_dir: &Path,
    options: &ImportOptions,
) -> anyhow::Result<i32> {
    let start = Instant::now();
    let xml_dir = data_dir.join("xml");

    let mut files = discover_files(&xml_dir, options)?;
    if options.sample {
        files.truncate(5);
    }
    if let Some(limit) = options.limit {
        files.truncate(limit);
    }
    eprintln!("Importing {} files from {}", files.len(), xml_dir.display());

    if options.truncate && !options.dry_run {
        store.truncate_all()?;
        eprintln!("Truncated all tables");
    }

    let mut processed = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    let mut sections_inserted = 0usize;
    let mut terms_inserted = 0usize;

    for file in &files {
        let stem = file
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if options.skip_existing && store.has_document(&stem, file.language, file.is_act) {
            skipped += 1;
            if options.verbose {
                eprintln!("  skip {} (already imported)", file.path.display());
            }
            continue;
        }

        match parse_legislation_xml(&file.path, file.language) {
            Ok(parsed) => {
                if !options.dry_run
                    && let Err(e) = store.replace_document(&parsed)
                {
                    failed += 1;
                    warn!(file = %file.path.display(), error = %e, "persist failed");
                    continue;
                }
                processed += 1;
                sections_inserted += parsed.sections.len();
                terms_inserted += parsed.defined_terms.len();
                if options.verbose {
                    eprintln!(
                        "  ok   {} ({} sections, {} terms)",
                        file.path.display(),
                        parsed.sections.len(),
                        parsed.defined_terms.len()
                    );
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("  FAIL {e}");
            }
        }
    }

    eprintln!(
        "\nFiles processed {processed} / skipped {skipped} / failed {failed}; \
         rows inserted: {sections_inserted} sections, {terms_inserted} terms ({})",
        format_duration(start.elapsed().as_millis() as u64)
    );

    Ok(if failed > 0 { 1 } else { 0 })
}

/// Enumerate candidate files under `xml/{eng,fra}/{acts,regulations}`,
/// filtered by type, language, and ids.
fn discover_files(xml_dir: &Path, options: &ImportOptions) -> anyhow::Result<Vec<ImportFile>> {
    let mut wanted_ids = expand_ids(xml_dir, options)?;
    wanted_ids.sort();

    let mut files = Vec::new();
    for (lang_dir, language) in [("eng", Language::En), ("fra", Language::Fr)] {
        if options
            .lang
            .as_deref()
            .is_some_and(|l| l != language.as_str())
        {
            continue;
        }
        for (type_dir, is_act) in [("acts", true), ("regulations", false)] {
            let type_name = if is_act { "act" } else { "regulation" };
            if options.doc_type.as_deref().is_some_and(|t| t != type_name) {
                continue;
            }
            let dir = xml_dir.join(lang_dir).join(type_dir);
            if !dir.is_dir() {
                continue;
            }
            let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "xml"))
                .collect();
            entries.sort();
            for path in entries {
                if !wanted_ids.is_empty() {
                    let stem = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    if wanted_ids.binary_search(&stem).is_err() {
                        continue;
                    }
                }
                files.push(ImportFile {
                    path,
                    language,
                    is_act,
                });
            }
        }
    }
    Ok(files)
}

/// Requested ids as filename stems. When importing regulations with a
/// lookup catalog available, act ids expand to their related regulations.
fn expand_ids(xml_dir: &Path, options: &ImportOptions) -> anyhow::Result<Vec<String>> {
    if options.ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut stems: Vec<String> = options.ids.iter().map(|id| file_safe_name(id)).collect();

    let lookup_path = xml_dir.join("lookup.xml");
    if options.doc_type.as_deref() == Some("regulation") && lookup_path.is_file() {
        let index = LookupIndex::from_file(&lookup_path)?;
        let language = match options.lang.as_deref() {
            Some("fr") => Language::Fr,
            _ => Language::En,
        };
        let expanded = index.resolve_subset("ids", &options.ids, language)?;
        stems.extend(expanded);
    }
    Ok(stems)
}
