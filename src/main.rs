use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use solace::billing::{BillingOracle, MockBillingOracle, StripeOracle};
use solace::email::MailerService;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions};

/// solace - trial and subscription access control backend
#[derive(Parser)]
#[command(name = "solace")]
#[command(about = "Magic-link auth, trials and subscription gating", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Server host address (overrides config file)
        #[arg(long)]
        host: Option<String>,

        /// Server port (overrides config file)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run database migrations
    Migrate,
    /// Drop database if exists and recreate with migrations
    Reset,
    /// Delete expired sessions and stale magic links, then exit
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = solace::config::Config::load(cli.config.clone())?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    solace::observability::init_observability("solace", &config.observability.log_level)?;

    match cli.command {
        Commands::Serve { host, port } => serve_command(config, host, port).await,
        Commands::Migrate => migrate_command(config).await,
        Commands::Reset => reset_command(config).await,
        Commands::Sweep => sweep_command(config).await,
    }
}

#[tracing::instrument(skip(config))]
async fn serve_command(
    config: solace::config::Config,
    host_override: Option<String>,
    port_override: Option<u16>,
) -> Result<()> {
    tracing::info!("Starting solace server...");

    let host = host_override.unwrap_or_else(|| config.server.host.clone());
    let port = port_override.unwrap_or(config.server.port);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let mailer = MailerService::new(&config.email)?;

    let oracle: Arc<dyn BillingOracle> = if config.stripe.secret_key.is_empty() {
        tracing::warn!("stripe.secret_key not set, billing runs against the mock oracle");
        Arc::new(MockBillingOracle::reporting(None))
    } else {
        Arc::new(StripeOracle::new(
            config.stripe.clone(),
            config.email.base_url.clone(),
        )?)
    };

    let mut scheduler = solace::sweep::scheduler(&pool).await?;

    let app = solace::create_app(pool, config, mailer, oracle);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    scheduler.shutdown().await?;

    Ok(())
}

#[tracing::instrument(skip(config))]
async fn migrate_command(config: solace::config::Config) -> Result<()> {
    tracing::info!("Running database migrations...");

    if !sqlx::Sqlite::database_exists(&config.database.url).await? {
        tracing::info!("Database does not exist, creating: {}", config.database.url);
        sqlx::Sqlite::create_database(&config.database.url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&config.database.url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Migrations completed successfully");

    Ok(())
}

#[tracing::instrument(skip(config))]
async fn reset_command(config: solace::config::Config) -> Result<()> {
    tracing::info!("Resetting database...");

    if sqlx::Sqlite::database_exists(&config.database.url).await? {
        tracing::warn!("Dropping existing database: {}", config.database.url);
        sqlx::Sqlite::drop_database(&config.database.url).await?;
    } else {
        tracing::info!("Database does not exist, nothing to drop");
    }

    migrate_command(config).await?;

    tracing::info!("Database reset completed successfully");

    Ok(())
}

#[tracing::instrument(skip(config))]
async fn sweep_command(config: solace::config::Config) -> Result<()> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&config.database.url)
        .await?;

    let report = solace::sweep::run_sweep(&pool, solace::unix_now()).await?;
    tracing::info!(
        sessions = report.sessions_removed,
        magic_links = report.magic_links_removed,
        "Sweep finished"
    );

    Ok(())
}
