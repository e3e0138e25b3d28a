//! Catalog seeding: test lists, packages and barcode stock ranges
//!
//! Catalog collections are read by the API but never written by it, so
//! they are loaded here from JSON exports.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use chc_server::db::{collections, DocumentRepo, MAX_BARCODE_DIGITS};

use super::{connect, load_config};

#[derive(Parser, Debug)]
pub struct CatalogArgs {
    /// Database URL (overrides config/environment)
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: CatalogCommands,
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommands {
    /// Import a JSON array of documents into a collection
    Import(ImportArgs),
    /// Add a barcode stock range
    AddRange(AddRangeArgs),
    /// Print the documents of a collection as JSON
    List(ListArgs),
}

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// Target collection (core_test, core_testdetails, core_package, core_barcoderange, patient_billing)
    #[arg(long, short)]
    pub collection: String,

    /// JSON file holding an array of objects
    #[arg(long, short)]
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct AddRangeArgs {
    /// First barcode of the range
    #[arg(long)]
    pub start: u64,

    /// Last barcode of the range (inclusive)
    #[arg(long)]
    pub end: u64,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Collection to print
    #[arg(long, short)]
    pub collection: String,
}

pub async fn run_catalog(args: CatalogArgs) -> Result<()> {
    // Validate arguments before touching the database
    match &args.command {
        CatalogCommands::Import(a) => known_collection(&a.collection)?,
        CatalogCommands::AddRange(a) => {
            range_document(a.start, a.end)?;
        }
        CatalogCommands::List(a) => known_collection(&a.collection)?,
    }

    let config = load_config(args.database_url)?;
    let pool = connect(&config).await?;
    let docs = DocumentRepo::new(&pool);

    match args.command {
        CatalogCommands::Import(a) => {
            let text = std::fs::read_to_string(&a.file)
                .with_context(|| format!("Failed to read {}", a.file.display()))?;
            let bodies = parse_documents(&text)?;
            let inserted = docs.insert_many(&a.collection, &bodies).await?;
            tracing::info!(collection = %a.collection, inserted, "catalog import");
            println!("Imported {} document(s) into {}", inserted, a.collection);
        }
        CatalogCommands::AddRange(a) => {
            let doc = docs
                .insert(collections::BARCODE_RANGE, &range_document(a.start, a.end)?)
                .await?;
            println!("Added barcode range {}..={} ({})", a.start, a.end, doc.id);
        }
        CatalogCommands::List(a) => {
            let items: Vec<Value> = docs
                .find_all(&a.collection)
                .await?
                .into_iter()
                .map(|d| d.into_json())
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }
    Ok(())
}

fn known_collection(name: &str) -> Result<()> {
    anyhow::ensure!(
        collections::is_known(name),
        "Unknown collection '{}'. Expected one of: {}",
        name,
        collections::ALL.join(", ")
    );
    Ok(())
}

/// Stock range document; bounds are stored as text like the legacy data.
fn range_document(start: u64, end: u64) -> Result<Value> {
    anyhow::ensure!(start <= end, "--start ({}) must not exceed --end ({})", start, end);
    anyhow::ensure!(
        end.to_string().len() <= MAX_BARCODE_DIGITS,
        "--end ({}) has more than {} digits",
        end,
        MAX_BARCODE_DIGITS
    );
    Ok(json!({
        "startbarcode": start.to_string(),
        "endbarcode": end.to_string(),
    }))
}

/// A JSON array of objects.
fn parse_documents(text: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(text).context("File is not valid JSON")?;
    let Value::Array(items) = value else {
        anyhow::bail!("Expected a JSON array of objects");
    };
    if let Some(i) = items.iter().position(|v| !v.is_object()) {
        anyhow::bail!("Entry {} is not a JSON object", i);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds_checked() {
        assert!(range_document(200, 100).is_err());
        let doc = range_document(100, 100).unwrap();
        assert_eq!(doc["startbarcode"], "100");
        assert_eq!(doc["endbarcode"], "100");
    }

    #[test]
    fn range_bounds_fit_lookup_width() {
        assert!(range_document(1, 999_999_999_999_999_999).is_ok());
        let err = range_document(1, 1_000_000_000_000_000_000).unwrap_err();
        assert!(err.to_string().contains("more than 18 digits"));
    }

    #[test]
    fn documents_must_be_objects() {
        assert_eq!(parse_documents(r#"[{"test_name": "CBC"}]"#).unwrap().len(), 1);
        assert!(parse_documents(r#"{"test_name": "CBC"}"#).is_err());
        assert!(parse_documents(r#"[{"a": 1}, 2]"#).is_err());
        assert!(parse_documents("not json").is_err());
    }

    #[test]
    fn unknown_collection_rejected() {
        assert!(known_collection("core_test").is_ok());
        assert!(known_collection("users").is_err());
    }
}
