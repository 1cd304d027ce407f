use clap::Parser;
use printfarm_host::config::{self, StoreBackend};
use printfarm_host::file_storage::LocalFileStorage;
use printfarm_host::printer_api::{PrinterRegistry, SpoolPrinterAdapter};
use printfarm_host::web::api::{AppStateInner, create_router};
use printfarm_shared::{InMemoryJobStore, JobStore, JsonFileJobStore};
use std::sync::Arc;

/// Print farm host: job lifecycle and print queues behind a REST API.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(default_value = "printfarm.toml")]
    config: String,
    /// Override `server.bind`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    let config = config::load_config(&args.config).map_err(|e| {
        eprintln!("Failed to load config from '{}': {}", args.config, e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    // Initialize logging
    let level = config.logging.level.parse::<tracing::Level>()?;
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("Starting printfarm host");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded configuration from: {}", args.config);

    let store: Arc<dyn JobStore> = match (config.store.backend, config.store.path.as_ref()) {
        (StoreBackend::File, Some(path)) => {
            tracing::info!("Job store: JSON file at {}", path.display());
            Arc::new(JsonFileJobStore::open(path).await?)
        }
        (StoreBackend::File, None) | (StoreBackend::Memory, _) => {
            tracing::info!("Job store: in-memory");
            Arc::new(InMemoryJobStore::new())
        }
    };

    let registry = PrinterRegistry::new(&config.printers);
    let ids = registry.ids();
    for printer in ids.iter().filter_map(|id| registry.get(id)) {
        tracing::info!(
            "Printer: {} ({}) spooling to {}",
            printer.id,
            printer.name.as_deref().unwrap_or("unnamed"),
            printer.spool_dir().display()
        );
    }
    if ids.is_empty() {
        tracing::warn!("No printers configured; queue endpoints will answer 404");
    }

    let files = Arc::new(LocalFileStorage::new(config.files.root.clone()));
    tracing::info!("Serving print files from {}", files.root().display());
    let adapter = Arc::new(SpoolPrinterAdapter::new(&config.printers));
    let state = AppStateInner::from_parts(store, registry, files, adapter, config.queue.max_page_size);
    let app = create_router(state);

    let bind = args.bind.unwrap_or(config.server.bind);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
