//! Astro API server binary.
//!
//! Reads configuration from the environment (and `.env`), runs migrations,
//! then serves the HTTP API until Ctrl-C.

use std::net::SocketAddr;

use astro_api::config::ApiConfig;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI arguments. Flags override the environment-derived configuration.
#[derive(Parser, Debug)]
#[command(name = "astro_api_server", about = "Astro API server")]
struct Args {
    /// Port to listen on. Overrides the port in `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,
}

fn bind_addr(configured: &str, port: Option<u16>) -> String {
    match port {
        None => configured.to_string(),
        Some(port) => {
            let host = configured
                .rsplit_once(':')
                .map_or(configured, |(host, _)| host);
            format!("{host}:{port}")
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,astro_api=debug,astro_core=debug")),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(url) = args.database_url {
        config.pg_connection_url = url;
    }
    config.bind_addr = bind_addr(&config.bind_addr, args.port);

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        "starting astro_api_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    astro_api::migrate(&pool).await?;

    let bind = config.bind_addr.clone();
    let state = astro_api::AppState::new(pool, config)?;
    let app = astro_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped");
    Ok(())
}
