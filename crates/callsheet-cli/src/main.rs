mod run;

use callsheet_core::AppConfig;
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "callsheet-cli")]
#[command(about = "callsheet command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run one ingestion pass over every tracked account
    Ingest,
    /// Run one aggregation over the recent prediction window
    Aggregate,
    /// Find an account by handle, tracking it on first sight
    Lookup {
        /// Account handle, with or without the leading `@`
        handle: String,
    },
    /// Resolve the current USD price of a symbol through the quote chain
    Price {
        /// Ticker symbol (e.g. BTC, AAPL)
        symbol: String,
        /// Per-provider timeout in seconds
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("callsheet-cli: pass --help to list commands");
        return Ok(());
    };

    match command {
        Commands::Price {
            symbol,
            timeout_secs,
        } => run::run_price(&symbol, timeout_secs).await?,
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            let (_, pool) = connect().await?;
            callsheet_db::ping(&pool).await?;
            println!("database: ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let (_, pool) = connect().await?;
            let applied = callsheet_db::run_migrations(&pool).await?;
            println!("migrations applied: {applied}");
        }
        Commands::Ingest => {
            let (config, pool) = connect().await?;
            run::run_ingest(pool, &config).await?;
        }
        Commands::Aggregate => {
            let (config, pool) = connect().await?;
            run::run_aggregate(pool, &config).await?;
        }
        Commands::Lookup { handle } => {
            let (config, pool) = connect().await?;
            run::run_lookup(pool, &config, &handle).await?;
        }
    }

    Ok(())
}

async fn connect() -> anyhow::Result<(AppConfig, PgPool)> {
    let config = callsheet_core::load_app_config()?;
    let pool_config = callsheet_db::PoolConfig::from_app_config(&config);
    let pool = callsheet_db::connect_pool(&config.database_url, pool_config).await?;
    Ok((config, pool))
}
