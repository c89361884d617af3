use clap::Parser;
use dicomitem_core::cli::report::UploadReport;
use dicomitem_core::cli::{ConfigArgs, OutputFormat};
use dicomitem_core::{
    FileId, FsStore, ItemReconciler, ObjectStore, ReconcileConfig, Result, UploadDispatcher,
    UploadEvent, UploadHandler, UploadOutcome, HANDLER_NAME,
};
use log::{error, info, warn};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};

/// CLI tool for adding files to an item directory
#[derive(Parser, Debug)]
#[command(name = "dicomadd")]
#[command(about = "Copy files into an item and fold their DICOM metadata into it")]
#[command(version)]
struct Cli {
    /// Item directory, created if missing
    #[arg(value_name = "ITEM_DIR")]
    item: PathBuf,

    /// Files to add
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

type Reconciler = ItemReconciler<Arc<FsStore>, Arc<FsStore>>;

#[derive(Debug, Serialize)]
struct Added {
    file: FileId,
    name: String,
    #[serde(flatten)]
    outcome: UploadOutcome,
}

/// Upload handler that keeps each outcome for the final report
struct Recorder {
    reconciler: Reconciler,
    added: Mutex<Vec<Added>>,
}

impl UploadHandler for Recorder {
    fn on_upload(&self, event: &UploadEvent) -> Result<()> {
        let outcome = self.reconciler.handle_upload(&event.file)?;
        let name = self.reconciler.store().load_file(&event.file)?.name;
        self.added
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Added {
                file: event.file.clone(),
                name,
                outcome,
            });
        Ok(())
    }
}

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

fn run(cli: &Cli) -> Result<String> {
    fs::create_dir_all(&cli.item)?;
    let (store, item) = FsStore::for_item_dir(&cli.item)?;
    let store = Arc::new(store);

    let recorder = Arc::new(Recorder {
        reconciler: ItemReconciler::new(
            store.clone(),
            store.clone(),
            ReconcileConfig::from(&cli.config),
        ),
        added: Mutex::new(Vec::new()),
    });
    let dispatcher = UploadDispatcher::new();
    dispatcher.bind(HANDLER_NAME, recorder.clone());

    for (index, path) in cli.files.iter().enumerate() {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("Skipping {}: no usable file name", path.display());
            continue;
        };
        let bytes = fs::read(path)?;
        let file = store.add_file(&item, name, &bytes)?;
        info!("Added {} ({} bytes)", file.id, file.size);

        let event = UploadEvent::new(format!("{}-{}", item, index), file.id);
        dispatcher.dispatch(&event)?;
    }

    let added = recorder
        .added
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    let output: String = match cli.format {
        OutputFormat::Text => added
            .iter()
            .map(|a| format!("{}\n", UploadReport::new(&a.name, a.outcome)))
            .collect(),
        OutputFormat::Json => serde_json::to_string_pretty(&*added)? + "\n",
    };
    Ok(output)
}
