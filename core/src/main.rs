use clap::Parser;
use dicomitem_core::cli::report::{AggregateReport, ListingReport, TextReport};
use dicomitem_core::cli::{Cli, Command, OutputFormat};
use dicomitem_core::{
    AccessLevel, DicomItemApi, FsStore, ItemId, ItemReconciler, ReconcileConfig, Result,
};
use log::{error, info};
use std::path::Path;
use std::process;
use std::sync::Arc;

type Api = DicomItemApi<Arc<FsStore>, Arc<FsStore>>;

fn main() {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose);

    match run(&cli) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn setup_logging(verbose: bool) {
    if verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }
}

/// Opens the item directory as the local owner of the files
fn open_item(path: &Path, config: ReconcileConfig) -> Result<(Api, ItemId)> {
    let (store, item) = FsStore::for_item_dir(path)?;
    info!("Opened item {} in {}", item, store.root().display());
    let store = Arc::new(store);
    let reconciler = ItemReconciler::new(store.clone(), store, config);
    Ok((DicomItemApi::new(Arc::new(reconciler)), item))
}

fn run(cli: &Cli) -> Result<String> {
    let config = ReconcileConfig::from(&cli.config);

    let output = match &cli.command {
        Command::Parse { item } => {
            let (api, item) = open_item(item, config)?;
            let report = api.parse_dicom(&item, AccessLevel::Admin)?;
            match cli.format {
                OutputFormat::Text => TextReport::new(&report).to_string(),
                OutputFormat::Json => serde_json::to_string_pretty(&report)? + "\n",
            }
        }
        Command::List {
            item,
            filters,
            force,
        } => {
            let (api, item) = open_item(item, config)?;
            let listings = api.get_dicom(&item, filters.as_deref(), *force, AccessLevel::Admin)?;
            match cli.format {
                OutputFormat::Text => ListingReport::new(&listings).to_string(),
                OutputFormat::Json => serde_json::to_string_pretty(&listings)? + "\n",
            }
        }
        Command::Show { item } => {
            let (api, item) = open_item(item, config)?;
            let aggregate = api.item_aggregate(&item, AccessLevel::Admin)?;
            match cli.format {
                OutputFormat::Text => AggregateReport::new(aggregate.as_ref()).to_string(),
                OutputFormat::Json => serde_json::to_string_pretty(&aggregate)? + "\n",
            }
        }
    };
    Ok(output)
}
