//! Implementations of the `readmate` CLI subcommands.
//!
//! Document commands (`extract`, `chapters`, `digest`) run the ingestion
//! pipeline locally and never contact the provider. Query commands build a
//! [`ReaderSession`] from configuration, optionally load `--book` first so the
//! request carries its digest, and print the attributed result as JSON.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::gateway::QueryParameters;
use crate::library::Library;
use crate::models::{Language, LoadedDocument, RawDocument};
use crate::provider::create_provider;
use crate::session::ReaderSession;

/// Reads `path` and runs it through `library`.
pub async fn load_file(
    library: &Library,
    path: &Path,
    language: Language,
) -> Result<Arc<LoadedDocument>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let raw = RawDocument::from_filename(&path.to_string_lossy(), bytes)
        .context("could not load this file")?;
    let outcome = library
        .ingest(raw, language)
        .await
        .context("could not load this file")?;
    Ok(outcome.document().clone())
}

fn library_from_config(config: &Config) -> Result<Library> {
    Ok(Library::new(
        config.reader.heading_rules()?,
        config.reader.max_upload_bytes,
    ))
}

/// `readmate extract <file>`: prints the extracted plain text.
pub async fn run_extract(config: &Config, path: &Path, language: Option<Language>) -> Result<()> {
    let library = library_from_config(config)?;
    let doc = load_file(&library, path, language.unwrap_or(config.reader.language)).await?;
    println!("{}", doc.text);
    Ok(())
}

/// `readmate chapters <file>`: lists sections, or dumps them as JSON.
pub async fn run_chapters(
    config: &Config,
    path: &Path,
    language: Option<Language>,
    json: bool,
) -> Result<()> {
    let library = library_from_config(config)?;
    let doc = load_file(&library, path, language.unwrap_or(config.reader.language)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc.sections)?);
        return Ok(());
    }

    println!("{} ({}, {} sections)", doc.title, doc.format, doc.sections.len());
    for section in &doc.sections {
        println!(
            "  {:>3}. {}  [{} chars]",
            section.index,
            section.title,
            section.content.chars().count()
        );
    }
    Ok(())
}

/// `readmate digest <file>`: prints the digest sent with queries.
pub async fn run_digest(config: &Config, path: &Path, language: Option<Language>) -> Result<()> {
    let library = library_from_config(config)?;
    let doc = load_file(&library, path, language.unwrap_or(config.reader.language)).await?;
    match doc.digest() {
        Some(digest) => println!("{}", digest),
        None => println!("(no digest: document has no title)"),
    }
    Ok(())
}

/// Runs one query, optionally against `book`, and prints the result.
pub async fn run_query(
    config: &Config,
    parameters: QueryParameters,
    book: Option<&Path>,
    language: Option<Language>,
    model: Option<String>,
) -> Result<()> {
    let provider = create_provider(&config.provider)?;
    let session = ReaderSession::from_config(config, provider)?;

    if let Some(path) = book {
        load_file(session.library(), path, session.language()).await?;
    }

    let result = session
        .query(parameters, language, model)
        .await
        .with_context(|| format!("{} provider request failed", session.gateway().provider_name()))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
