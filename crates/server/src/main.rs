//! Memecard - room session server

use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use memecard_core::{Database, LibraryFile};
use memecard_net::{Engine, Server, SyncHandle};

mod config;

use config::ServerConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting Memecard");

    if let Err(e) = run().await {
        tracing::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load()?;

    let db_path = config.database_path()?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(&db_path)?;
    tracing::info!(path = %db_path.display(), schema = db.schema_version(), "Database opened");

    if let Some(path) = &config.library {
        import_library(&db, path)?;
    }
    let deck = db.library().deck()?;
    if deck.card_count() == 0 || deck.caption_count() == 0 {
        tracing::warn!(
            cards = deck.card_count(),
            captions = deck.caption_count(),
            "Content library is empty; rounds will deal nothing"
        );
    }

    let (sync, storage_thread) = SyncHandle::spawn(db, config.game.retention())?;
    let (engine, handle, inbox) = Engine::new(config.game.clone(), Box::new(deck), sync);
    let engine_task = tokio::spawn(engine.run(inbox));

    let server = Server::start(config.bind_addr(), handle.clone()).await?;
    tracing::info!(addr = %server.addr(), "Accepting players");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    server.shutdown();
    let _ = handle.shutdown();
    match engine_task.await {
        Ok(engine) => {
            tracing::info!(rooms = engine.registry().len(), "Engine stopped");
            // Dropping the engine closes the storage queue
            drop(engine);
        }
        Err(e) => tracing::error!(error = %e, "Engine task failed"),
    }
    drop(handle);

    if storage_thread.join().is_err() {
        tracing::error!("Storage thread panicked");
    }
    tracing::info!("Bye");
    Ok(())
}

fn import_library(db: &Database, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let library = LibraryFile::from_toml(&text)?;
    db.library().import(&library)?;
    tracing::info!(
        path = %path.display(),
        cards = library.cards.len(),
        captions = library.captions.len(),
        "Content library imported"
    );
    Ok(())
}
