//! `ember memory`: Memory management commands.

use ember_memory::{ExportFormat, SearchQuery};
use std::path::Path;

use super::{load_config, open_store};

pub async fn search(
    session: Option<&str>,
    query: Option<String>,
    tags: Vec<String>,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if query.as_deref().is_none_or(|q| q.trim().is_empty()) && tags.is_empty() {
        return Err("Give a query, a --tag, or both".into());
    }
    let config = load_config()?;
    let store = open_store(&config, session)?;

    let search = SearchQuery {
        text: query.filter(|q| !q.trim().is_empty()),
        tags,
        limit,
    };
    let results = store.search(&search);

    if results.is_empty() {
        println!("No memories found.");
        return Ok(());
    }
    for (i, hit) in results.hits.iter().enumerate() {
        let entry = &hit.entry;
        println!(
            "  {:>2}. [#{} score: {:.2} importance: {:.2}] {}",
            i + 1,
            entry.id,
            hit.score,
            entry.importance,
            entry.text
        );
        if !entry.tags.is_empty() {
            println!("      tags: {}", entry.tags.join(", "));
        }
    }
    if results.truncated() {
        println!("  ({} of {} matches shown)", results.len(), results.total_matches);
    }
    Ok(())
}

pub async fn add(
    session: Option<&str>,
    text: &str,
    tags: &[String],
    importance: f32,
    pinned: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let mut store = open_store(&config, session)?;
    let id = store.add(text, tags, importance, pinned)?;
    store.close()?;
    println!("Stored memory #{id}");
    Ok(())
}

pub async fn correct(
    session: Option<&str>,
    statement: &str,
    mistake: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let mut store = open_store(&config, session)?;
    let id = store.store_correction(statement, mistake)?;
    store.close()?;
    println!("Stored correction #{id}");
    Ok(())
}

pub async fn pattern(session: Option<&str>, statement: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let mut store = open_store(&config, session)?;
    let id = store.store_pattern(statement)?;
    store.close()?;
    println!("Stored pattern #{id}");
    Ok(())
}

pub async fn export(
    session: Option<&str>,
    output: &Path,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let format: ExportFormat = format.parse()?;
    let config = load_config()?;
    let store = open_store(&config, session)?;
    let bytes = store.export(output, format)?;
    println!(
        "Exported {} memories ({bytes} bytes) to {}",
        store.len(),
        output.display()
    );
    Ok(())
}

pub async fn import(session: Option<&str>, input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let mut store = open_store(&config, session)?;
    let count = store.import(input)?;
    store.close()?;
    println!("Imported {count} memories from {}", input.display());
    Ok(())
}

pub async fn archive(session: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = open_store(&config, session)?;
    let moved = store.archive_sessions()?;
    println!(
        "Archived {moved} session logs (kept '{}' active)",
        store.session_id()
    );
    Ok(())
}

pub async fn stats(session: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = open_store(&config, session)?;

    println!("Memory Statistics");
    println!("=================");
    println!("  Session:     {}", store.session_id());
    println!("  Log file:    {}", store.log_path().display());
    println!("  Entries:     {}", store.len());
    println!("  Corrections: {}", store.get_corrections(usize::MAX).len());
    println!("  Patterns:    {}", store.get_patterns(usize::MAX).len());

    let tags = store.tags();
    if !tags.is_empty() {
        println!("  Tags:");
        for (tag, count) in tags {
            println!("    {tag:<16} {count}");
        }
    }
    Ok(())
}
