use anyhow::Context;
use bitbasis::{api, config::Config, db::init_db, LedgerService, LotRepository, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let pool = init_db(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let store: Arc<dyn LotRepository> = Arc::new(Repository::new(pool));
    let service = LedgerService::new(store);

    tracing::info!(
        default_method = %config.default_tax_method,
        include_loss_offset = config.include_loss_offset,
        "ledger service configured"
    );

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let app = api::create_router(api::AppState::new(service, config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
