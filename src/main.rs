use std::sync::Arc;

use clap::Parser;
use payment_ledger::adapters::PostgresStorage;
use payment_ledger::cli::{self, Cli, Commands, DbCommands, MerchantCommands};
use payment_ledger::config::{Config, LogFormat};
use payment_ledger::db;
use payment_ledger::services::RetentionSweeper;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Sweep => cli::handle_sweep(&config).await,
        Commands::Merchant(MerchantCommands::Create(args)) => {
            cli::handle_merchant_create(&config, args).await
        }
        Commands::Merchant(MerchantCommands::List { active, inactive }) => {
            cli::handle_merchant_list(&config, active, inactive).await
        }
        Commands::Config => cli::handle_config_validate(&config),
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let pool = db::create_pool(config).await?;
    db::run_migrations(&pool).await?;

    let storage = Arc::new(PostgresStorage::new(pool));
    let sweeper = RetentionSweeper::new(storage, &config.retention).spawn();

    tracing::info!("Payment ledger running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutdown signal received");
    sweeper.shutdown().await?;

    Ok(())
}
