/// Tuneshare Server - DAAP media catalog sharing server
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tuneshare_catalog::Library;
use tuneshare_dmap::registry;
use tokio_util::sync::CancellationToken;
use tuneshare_server::{AppState, CatalogWatcher, FileSongSource, Manifest, Server, ServerConfig};

#[derive(Parser)]
#[command(name = "tuneshare-server")]
#[command(about = "Share a music catalog with DAAP clients", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the DAAP server
    Serve {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the registered content codes
    ContentCodes,
    /// Decode a file holding one DMAP response and print its tree
    Dump {
        /// File to decode
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tuneshare_server=info,tuneshare_catalog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            serve(config.as_deref()).await?;
        }
        Commands::ContentCodes => {
            print_content_codes();
        }
        Commands::Dump { path } => {
            dump(&path).await?;
        }
    }

    Ok(())
}

async fn serve(config_path: Option<&Path>) -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::load(config_path)?;
    config.validate()?;
    tuneshare_dmap::registry::validate().context("content-code registry is inconsistent")?;

    tracing::info!("Starting Tuneshare Server");
    tracing::info!("Host: {}", config.server.host);
    tracing::info!("Port: {}", config.server.port);
    tracing::info!("Authentication: {:?}", config.auth.scheme);

    // Build the catalog
    let library = Library::new(config.catalog.library_name.clone());
    let songs = Arc::new(FileSongSource::new());
    if let Some(path) = &config.catalog.manifest {
        let manifest = Manifest::load(path)
            .await
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        manifest.apply(&library, &songs).await?;
    } else {
        tracing::warn!("No catalog manifest configured; serving an empty library");
    }

    // Later manifest edits reach the catalog through auto-commit
    let stop_watching = CancellationToken::new();
    let watcher = match &config.catalog.manifest {
        Some(path) if config.catalog.watch => {
            let watcher = CatalogWatcher::new(
                path.clone(),
                library.clone(),
                songs.clone(),
                config.auto_commit(),
            )?;
            Some(tokio::spawn(watcher.run(stop_watching.clone())))
        }
        _ => None,
    };

    let state = AppState::new(&config, library, songs);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let server = Server::bind(addr.as_str(), state).await?;
    tracing::info!("Server listening on {}", server.local_addr()?);

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    stop_watching.cancel();
    if let Some(task) = watcher {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Catalog watcher failed: {}", e),
            Err(e) => tracing::warn!("Catalog watcher task panicked: {}", e),
        }
    }

    Ok(())
}

fn print_content_codes() {
    for entry in registry().entries() {
        println!(
            "{}  {:<44} {:?}",
            entry.code, entry.name, entry.value_type
        );
    }
}

async fn dump(path: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let chunk = tuneshare_dmap::decode(&bytes)?;
    print!("{}", chunk.dump());
    Ok(())
}
