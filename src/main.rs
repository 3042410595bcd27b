use std::sync::Arc;

use chat_modules::config::ServerConfig;
use chat_modules::modules::routes::module_routes;
use chat_modules::modules::service::ModuleService;
use chat_modules::registry::seed_catalog;
use chat_modules::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;

    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    let seeded = seed_catalog(&db).await?;
    if seeded > 0 {
        tracing::info!(count = seeded, "Seeded module catalog");
    }

    let service = Arc::new(ModuleService::new(db));
    let app = module_routes(service);

    eprintln!("🧩 Chat Modules v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}/api/modules", config.bind_addr);
    eprintln!("   DB:  {}", config.db_path.display());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
