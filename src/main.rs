use std::sync::Arc;

use tracing::{error, info};

use rssfeed::{Config, Database, HttpFeedSource, LogNotifier, RefreshEngine, Scheduler};

#[tokio::main]
async fn main() {
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    if let Err(e) = rssfeed::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        rssfeed::logging::init_console_only(&config.logging.level);
    }

    info!("rssfeed {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> rssfeed::Result<()> {
    config.validate()?;

    let db = Arc::new(Database::open(&config.database.path).await?);
    let source = Arc::new(HttpFeedSource::new(config.fetcher.clone())?);
    let engine = RefreshEngine::new(db.clone(), source, Arc::new(LogNotifier), config.refresh)
        .with_admin_email(config.notify.admin_email);

    Scheduler::new(Arc::new(engine))
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
        })
        .await;

    db.close().await;
    Ok(())
}
