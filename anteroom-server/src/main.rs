use std::sync::Arc;

use anteroom_core::AnteroomConfig;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use anteroom_server::http::{start_http_server, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "anteroom.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match AnteroomConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Connect to DB
    let pool = match anteroom_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match anteroom_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Anteroom DB health check passed");
        return Ok(());
    }

    if let Err(e) = anteroom_core::db::init_schema(&pool).await {
        eprintln!("Failed to initialize database schema: {}", e);
        std::process::exit(1);
    }

    if config.access.code.is_empty() {
        tracing::warn!("ACCESS_CODE is not set — the access gate will reject every submission");
    }

    let identity = match anteroom_core::identity::create_provider(&config.auth) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Failed to create identity provider: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(provider = identity.name(), "identity provider ready");

    let completions = match anteroom_core::completions::create_backend(&config.completion) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("Failed to create completion backend: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(backend = completions.name(), "completion backend ready");

    // Shutdown signal
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = Arc::new(AppState {
        pool,
        config,
        identity: Arc::from(identity),
        completions: Arc::from(completions),
    });

    start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
