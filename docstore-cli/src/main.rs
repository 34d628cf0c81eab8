use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docstore_core::config::Options;
use docstore_core::{Database, Verb};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docstore")]
#[command(about = "docstore CLI - command-line interface for the embedded document store")]
#[command(version)]
struct Cli {
    /// Storage directory holding one JSON file per collection.
    #[arg(long, global = true, default_value = "./storage")]
    storage: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert one or more documents (a single object or a JSON array).
    Insert {
        collection: String,
        /// Document JSON, or '-' to read from stdin.
        document: String,
    },
    /// Find documents matching a filter.
    Find {
        collection: String,
        /// Filter JSON object. Defaults to `{}` (match all).
        #[arg(default_value = "{}")]
        filter: String,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        skip: Option<usize>,
    },
    /// Count documents matching a filter.
    Count {
        collection: String,
        #[arg(default_value = "{}")]
        filter: String,
    },
    /// Update documents matching a filter.
    Update {
        collection: String,
        filter: String,
        update: String,
    },
    /// Update a single document by id.
    UpdateById {
        collection: String,
        id: String,
        update: String,
    },
    /// Delete documents matching a (non-empty) filter.
    Delete { collection: String, filter: String },
    /// Delete a single document by id.
    DeleteById { collection: String, id: String },
    /// Drop an entire collection.
    Drop { collection: String },
    /// Bulk-load `{collection: [documents...]}` from a JSON file (or stdin
    /// with '-') into the storage directory.
    Import {
        /// Path to the import file, or '-' to read from stdin.
        file: String,
    },
    /// Write every collection named (or all, if none are given) out as
    /// `{collection: [documents...]}` JSON to stdout.
    Export {
        #[arg(long = "collection")]
        collections: Vec<String>,
    },
}

fn parse_json(label: &str, raw: &str) -> Result<Value> {
    if raw == "-" {
        let stdin_text = std::io::read_to_string(std::io::stdin())
            .with_context(|| format!("reading {label} from stdin"))?;
        serde_json::from_str(&stdin_text).with_context(|| format!("parsing {label} as JSON"))
    } else {
        serde_json::from_str(raw).with_context(|| format!("parsing {label} as JSON"))
    }
}

/// Collection names backing `export` with no explicit `--collection` flags:
/// every `<name>.json` file in the storage directory. In-flight `.tmp`
/// siblings (`<name>.json.<millis>.tmp`) don't end in `.json` and are
/// skipped.
fn storage_collection_names(storage: &PathBuf) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(storage).with_context(|| format!("reading {}", storage.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn print_response(response: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.get("error").is_some() {
        anyhow::bail!("operation failed");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = cli.storage.clone();
    let db = Database::open(Options {
        storage_path: cli.storage,
        ..Options::default()
    })
    .context("opening storage directory")?;

    match cli.command {
        Commands::Insert { collection, document } => {
            let payload = parse_json("document", &document)?;
            let endpoint = format!("/collections/{collection}");
            print_response(db.execute(Verb::Post, &endpoint, payload))?;
        }
        Commands::Find { collection, filter, sort, limit, skip } => {
            let mut options = serde_json::Map::new();
            if let Some(sort) = sort {
                options.insert("sort".to_string(), parse_json("sort", &sort)?);
            }
            if let Some(limit) = limit {
                options.insert("limit".to_string(), Value::from(limit));
            }
            if let Some(skip) = skip {
                options.insert("skip".to_string(), Value::from(skip));
            }
            let payload = serde_json::json!({
                "filter": parse_json("filter", &filter)?,
                "options": Value::Object(options),
            });
            let endpoint = format!("/collections/{collection}");
            print_response(db.execute(Verb::Get, &endpoint, payload))?;
        }
        Commands::Count { collection, filter } => {
            let payload = serde_json::json!({ "filter": parse_json("filter", &filter)? });
            let endpoint = format!("/collections/{collection}/count");
            print_response(db.execute(Verb::Get, &endpoint, payload))?;
        }
        Commands::Update { collection, filter, update } => {
            let payload = serde_json::json!({
                "filter": parse_json("filter", &filter)?,
                "update": parse_json("update", &update)?,
            });
            let endpoint = format!("/collections/{collection}");
            print_response(db.execute(Verb::Patch, &endpoint, payload))?;
        }
        Commands::UpdateById { collection, id, update } => {
            let payload = serde_json::json!({ "update": parse_json("update", &update)? });
            let endpoint = format!("/collections/{collection}/{id}");
            print_response(db.execute(Verb::Patch, &endpoint, payload))?;
        }
        Commands::Delete { collection, filter } => {
            let payload = serde_json::json!({ "filter": parse_json("filter", &filter)? });
            let endpoint = format!("/collections/{collection}");
            print_response(db.execute(Verb::Delete, &endpoint, payload))?;
        }
        Commands::DeleteById { collection, id } => {
            let endpoint = format!("/collections/{collection}/{id}");
            print_response(db.execute(Verb::Delete, &endpoint, Value::Null))?;
        }
        Commands::Drop { collection } => {
            let endpoint = format!("/collections/{collection}/drop");
            print_response(db.execute(Verb::Delete, &endpoint, Value::Null))?;
        }
        Commands::Import { file } => {
            let payload = parse_json("import file", &file)?;
            let collections = payload
                .as_object()
                .context("import file must be a JSON object of {collection: [documents...]}")?;
            for (collection, documents) in collections {
                let endpoint = format!("/collections/{collection}");
                let result = db.execute(Verb::Post, &endpoint, documents.clone());
                if result.get("error").is_some() {
                    return print_response(result);
                }
            }
        }
        Commands::Export { collections } => {
            let names = if collections.is_empty() {
                storage_collection_names(&storage)?
            } else {
                collections
            };
            let mut out = serde_json::Map::new();
            for name in names {
                let endpoint = format!("/collections/{name}");
                let result = db.execute(Verb::Get, &endpoint, serde_json::json!({}));
                out.insert(name, result["data"]["documents"].clone());
            }
            println!("{}", serde_json::to_string_pretty(&Value::Object(out))?);
        }
    }

    db.flush();
    Ok(())
}
