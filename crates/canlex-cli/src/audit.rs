//! `audit-xml-schema` and `check-schema-coverage` command wiring.

use std::path::{Path, PathBuf};

use canlex_parser::audit::SchemaInventory;

/// Every XML file under `xml/`, sorted so repeated runs scan the same sample.
fn xml_files(data_dir: &Path, limit: Option<usize>) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let root = data_dir.join("xml");
    collect(&root, &mut files)?;
    files.sort();
    if let Some(limit) = limit {
        files.truncate(limit);
    }
    Ok(files)
}

fn collect(dir: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "xml") {
            files.push(path);
        }
    }
    Ok(())
}

fn scan(data_dir: &Path, limit: Option<usize>) -> anyhow::Result<SchemaInventory> {
    let files = xml_files(data_dir, limit)?;
    let mut inventory = SchemaInventory::default();
    let mut failures = 0usize;
    for file in &files {
        if let Err(e) = inventory.scan_file(file) {
            failures += 1;
            eprintln!("  FAIL {e}");
        }
    }
    eprintln!(
        "Scanned {} files ({failures} failed)",
        inventory.files_scanned
    );
    Ok(inventory)
}

/// `audit-xml-schema`: print (or write) the element/attribute inventory.
pub fn run_audit(
    data_dir: &Path,
    limit: Option<usize>,
    output: Option<PathBuf>,
    verbose: bool,
) -> anyhow::Result<i32> {
    let inventory = scan(data_dir, limit)?;

    if let Some(path) = output {
        std::fs::write(&path, serde_json::to_string_pretty(&inventory)?)?;
        eprintln!("Wrote inventory to {}", path.display());
        return Ok(0);
    }

    println!("--- Elements ({}) ---", inventory.elements.len());
    for (name, count) in &inventory.elements {
        println!("{count:>8}  {name}");
    }
    if verbose {
        println!("\n--- Attributes ({}) ---", inventory.attributes.len());
        for (name, count) in &inventory.attributes {
            println!("{count:>8}  {name}");
        }
    }
    Ok(0)
}

/// `check-schema-coverage`: diff observed element names against what the
/// parser handles. Exit 1 when gaps exist so CI can gate on new schema
/// elements.
pub fn run_coverage(data_dir: &Path) -> anyhow::Result<i32> {
    let inventory = scan(data_dir, None)?;
    let unhandled = inventory.unhandled_elements();

    if unhandled.is_empty() {
        println!(
            "All {} observed element names are handled.",
            inventory.elements.len()
        );
        return Ok(0);
    }

    println!("Unhandled elements ({}):", unhandled.len());
    for name in &unhandled {
        println!("  {name} ({} occurrences)", inventory.elements[*name]);
    }
    Ok(1)
}
