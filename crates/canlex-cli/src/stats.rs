//! `stats`: corpus summary.

use arrow::util::pretty::print_batches;

use canlex_store::DuckStore;

pub fn run_stats(store: &DuckStore) -> anyhow::Result<i32> {
    println!("=== Corpus Summary ===\n");
    println!("  Acts:              {:>8} rows", store.acts_count()?);
    println!("  Regulations:       {:>8} rows", store.regulations_count()?);
    println!("  Sections:          {:>8} rows", store.sections_count()?);
    println!("  Defined terms:     {:>8} rows", store.defined_terms_count()?);
    println!("  Cross-references:  {:>8} rows", store.cross_references_count()?);
    println!("  Resources:         {:>8} rows", store.resources_count()?);

    println!("\n--- Section Status ---\n");
    let batches = store.query_arrow(
        "SELECT status, count(*) AS count FROM sections GROUP BY status ORDER BY count DESC",
    )?;
    print_batches(&batches)?;

    println!("\n--- Languages ---\n");
    let batches = store.query_arrow(
        "SELECT language, count(*) AS count FROM sections GROUP BY language ORDER BY language",
    )?;
    print_batches(&batches)?;

    println!("\n--- Section Types ---\n");
    let batches = store.query_arrow(
        "SELECT section_type, count(*) AS count FROM sections GROUP BY section_type ORDER BY count DESC",
    )?;
    print_batches(&batches)?;

    println!("\n--- Cross-reference Targets ---\n");
    let batches = store.query_arrow(
        "SELECT target_type, count(*) AS count FROM cross_references GROUP BY target_type ORDER BY count DESC",
    )?;
    print_batches(&batches)?;

    Ok(0)
}
