use std::env;
use std::sync::Arc;

use crate::config::{sync_datasets, Config};
use crate::data::assets::{scan_assets, ScanOutcome};
use crate::data::crossref::{CrossRefOutcome, MediaSettings};
use crate::data::import::{import_table, ImportOutcome};
use crate::data::model::Dataset;
use crate::jobs::{JobOutcome, LocalQueue};
use crate::logging::init_logging;
use crate::query::{self, QueryError, RowQuery};
use crate::server;
use crate::store::{FileStore, Store};

const USAGE: &str = "usage: voicetable <serve|import|scan|rows|datasets|remove>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Serve,
    Import,
    Scan,
    Rows,
    Datasets,
    Remove,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("serve") => Some(Command::Serve),
        Some("import") => Some(Command::Import),
        Some("scan") => Some(Command::Scan),
        Some("rows") => Some(Command::Rows),
        Some("datasets") => Some(Command::Datasets),
        Some("remove") => Some(Command::Remove),
        _ => None,
    }
}

pub fn run_with_args(args: &[String]) -> i32 {
    let Some(command) = parse_command(args) else {
        eprintln!("{USAGE}");
        return 2;
    };
    init_logging(false);

    if let Some(usage) = missing_slug_usage(command, args) {
        eprintln!("{usage}");
        return 2;
    }

    let (config, store) = match open_store() {
        Ok(opened) => opened,
        Err(err) => {
            eprintln!("startup failed: {err}");
            return 1;
        }
    };

    match command {
        Command::Serve => handle_serve(config, store),
        Command::Import => handle_import(args, &config, store.as_ref()),
        Command::Scan => handle_scan(args, &config, store.as_ref()),
        Command::Rows => handle_rows(args, store.as_ref()),
        Command::Datasets => handle_datasets(store.as_ref()),
        Command::Remove => handle_remove(args, store.as_ref()),
    }
}

fn missing_slug_usage(command: Command, args: &[String]) -> Option<String> {
    let usage = match command {
        Command::Import => "usage: voicetable import <dataset-slug>",
        Command::Scan => "usage: voicetable scan <dataset-slug>",
        Command::Rows => "usage: voicetable rows <dataset-slug> [page] [page_size] [search]",
        Command::Remove => "usage: voicetable remove <dataset-slug>",
        Command::Serve | Command::Datasets => return None,
    };
    args.get(2).is_none().then(|| usage.to_string())
}

fn open_store() -> Result<(Config, Arc<FileStore>), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = Arc::new(FileStore::open(&config.data_dir)?);
    sync_datasets(store.as_ref(), &config)?;
    Ok((config, store))
}

fn find_dataset(store: &dyn Store, slug: &str) -> Option<Dataset> {
    match store.dataset_by_slug(slug) {
        Ok(Some(dataset)) => Some(dataset),
        Ok(None) => {
            eprintln!("dataset not found: {slug}");
            None
        }
        Err(err) => {
            eprintln!("store error: {err}");
            None
        }
    }
}

fn handle_serve(config: Config, store: Arc<FileStore>) -> i32 {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return 1;
        }
    };
    match runtime.block_on(server::run_server(config, store)) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("server error: {err}");
            1
        }
    }
}

fn handle_import(args: &[String], config: &Config, store: &dyn Store) -> i32 {
    let Some(dataset) = find_dataset(store, &args[2]) else {
        return 1;
    };

    let queue = LocalQueue::new();
    match import_table(store, &queue, dataset.id) {
        Ok(outcome) => print_import(&outcome),
        Err(err) => {
            eprintln!("import failed: {err}");
            return 1;
        }
    }

    match queue.drain(store, &config.media()) {
        Ok(done) => {
            for (_, outcome) in done {
                match outcome {
                    JobOutcome::Import(outcome) => print_import(&outcome),
                    JobOutcome::Scan(outcome) => print_scan(&outcome),
                }
            }
            0
        }
        Err(err) => {
            eprintln!("scan failed: {err}");
            1
        }
    }
}

fn handle_scan(args: &[String], config: &Config, store: &dyn Store) -> i32 {
    let Some(dataset) = find_dataset(store, &args[2]) else {
        return 1;
    };
    let media: MediaSettings = config.media();
    match scan_assets(store, dataset.id, &media) {
        Ok(outcome) => {
            print_scan(&outcome);
            0
        }
        Err(err) => {
            eprintln!("scan failed: {err}");
            1
        }
    }
}

fn handle_rows(args: &[String], store: &dyn Store) -> i32 {
    let slug = &args[2];
    let query = RowQuery {
        page: parse_usize_arg(args.get(3), "page"),
        page_size: parse_usize_arg(args.get(4), "page_size"),
        search: args.get(5).cloned(),
    };
    let caller = env::var("VOICETABLE_USER").unwrap_or_default();

    match query::list_rows(store, &caller, slug, &query) {
        Ok(page) => match serde_json::to_string_pretty(&page) {
            Ok(payload) => {
                println!("{payload}");
                0
            }
            Err(err) => {
                eprintln!("failed to serialize rows: {err}");
                1
            }
        },
        Err(QueryError::NotFound) => {
            eprintln!("dataset not found: {slug}");
            1
        }
        Err(err) => {
            eprintln!("query failed: {err}");
            1
        }
    }
}

fn handle_datasets(store: &dyn Store) -> i32 {
    let datasets = match store.datasets() {
        Ok(datasets) => datasets,
        Err(err) => {
            eprintln!("store error: {err}");
            return 1;
        }
    };
    let mut listing = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        let generations = match store.generations(dataset.id) {
            Ok(generations) => generations,
            Err(err) => {
                eprintln!("store error: {err}");
                return 1;
            }
        };
        listing.push(serde_json::json!({
            "id": dataset.id,
            "slug": dataset.slug,
            "name": dataset.name,
            "source_path": dataset.source_path,
            "columns": dataset.column_order,
            "generations": generations,
        }));
    }
    match serde_json::to_string_pretty(&serde_json::json!({ "datasets": listing })) {
        Ok(payload) => {
            println!("{payload}");
            0
        }
        Err(err) => {
            eprintln!("failed to serialize datasets: {err}");
            1
        }
    }
}

fn handle_remove(args: &[String], store: &dyn Store) -> i32 {
    let Some(dataset) = find_dataset(store, &args[2]) else {
        return 1;
    };
    match store.delete_dataset(dataset.id) {
        Ok(_) => {
            println!("removed dataset '{}'", dataset.slug);
            0
        }
        Err(err) => {
            eprintln!("remove failed: {err}");
            1
        }
    }
}

fn print_import(outcome: &ImportOutcome) {
    match outcome {
        ImportOutcome::Ok { rows, columns, .. } => {
            println!(
                "import complete: status=ok, rows={rows}, columns={}",
                columns.join("|")
            );
        }
        ImportOutcome::MissingSource { path } => {
            println!("import skipped: status=missing_source, path='{path}'");
        }
    }
}

fn print_scan(outcome: &ScanOutcome) {
    let cross_reference = match &outcome.cross_reference {
        CrossRefOutcome::Ok { rows_updated, .. } => format!("ok, rows_updated={rows_updated}"),
        CrossRefOutcome::NoJoinColumn => "no_join_column".to_string(),
        CrossRefOutcome::Superseded { .. } => "superseded".to_string(),
    };
    println!(
        "scan complete: files={}, skipped=[{}], cross_reference={}",
        outcome.audio_files_indexed,
        outcome.skipped_languages.join(","),
        cross_reference
    );
}

fn parse_usize_arg(raw: Option<&String>, name: &str) -> Option<usize> {
    let value = raw?;
    match value.parse::<usize>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            eprintln!("invalid {name} '{value}', using default");
            None
        }
    }
}
