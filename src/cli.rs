use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::adapters::PostgresStorage;
use crate::config::Config;
use crate::domain::NewMerchant;
use crate::ports::Filter;
use crate::services::{MerchantService, RetentionSweeper};

#[derive(Parser)]
#[command(name = "payment-ledger")]
#[command(about = "Payment Ledger - transaction chains with merchant balances", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the retention sweeper until Ctrl-C (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Delete transactions older than the retention window once
    Sweep,

    /// Merchant management commands
    #[command(subcommand)]
    Merchant(MerchantCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum MerchantCommands {
    /// Register a new merchant
    Create(CreateMerchantArgs),

    /// List merchants
    List {
        /// Only active merchants
        #[arg(long, conflicts_with = "inactive")]
        active: bool,

        /// Only inactive merchants
        #[arg(long)]
        inactive: bool,
    },
}

#[derive(Args)]
pub struct CreateMerchantArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Create the merchant in the inactive state
    #[arg(long)]
    pub inactive: bool,
}

impl From<CreateMerchantArgs> for NewMerchant {
    fn from(args: CreateMerchantArgs) -> Self {
        NewMerchant {
            name: args.name,
            description: args.description,
            email: args.email,
            active: !args.inactive,
        }
    }
}

/// `--active` / `--inactive` as a storage filter; neither lists everything.
pub fn status_filter(active: bool, inactive: bool) -> Vec<Filter> {
    match (active, inactive) {
        (true, _) => vec![Filter::Active(true)],
        (false, true) => vec![Filter::Active(false)],
        (false, false) => Vec::new(),
    }
}

async fn connect(config: &Config) -> anyhow::Result<PostgresStorage> {
    let pool = crate::db::create_pool(config)
        .await
        .context("failed to connect to the database")?;
    Ok(PostgresStorage::new(pool))
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let storage = connect(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(storage.pool()).await?;

    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_sweep(config: &Config) -> anyhow::Result<()> {
    let storage = connect(config).await?;
    let sweeper = RetentionSweeper::new(Arc::new(storage), &config.retention);

    let deleted = sweeper.sweep_once().await.context("retention sweep failed")?;

    tracing::info!(deleted, "Manual retention sweep completed");
    println!("✓ Deleted {} transaction(s)", deleted);

    Ok(())
}

pub async fn handle_merchant_create(config: &Config, args: CreateMerchantArgs) -> anyhow::Result<()> {
    let storage = connect(config).await?;
    let service = MerchantService::new(Arc::new(storage));

    let merchant = service.create(args.into()).await?;

    println!("✓ Merchant created:");
    println!("  ID: {}", merchant.id);
    println!("  Name: {}", merchant.name);
    println!("  Email: {}", merchant.email);
    println!("  Status: {}", merchant.status);

    Ok(())
}

pub async fn handle_merchant_list(config: &Config, active: bool, inactive: bool) -> anyhow::Result<()> {
    let storage = connect(config).await?;
    let service = MerchantService::new(Arc::new(storage));

    let merchants = service.list(&status_filter(active, inactive)).await?;

    if merchants.is_empty() {
        println!("No merchants found");
        return Ok(());
    }

    println!("{:<38} {:<30} {:<10} {:>16}", "ID", "Name", "Status", "Balance");
    println!("{}", "-".repeat(97));

    for merchant in merchants {
        println!(
            "{:<38} {:<30} {:<10} {:>16}",
            merchant.id, merchant.name, merchant.status, merchant.total_transaction_sum
        );
    }

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Database Max Connections: {}", config.database_max_connections);
    println!(
        "  Keep Transactions For: {}s",
        config.retention.keep_transactions_for.as_secs()
    );
    println!("  Cleaner Interval: {}s", config.retention.interval.as_secs());
    println!("  Log Format: {:?}", config.log_format);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
