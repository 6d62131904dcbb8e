//! docvault admin CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docvault::models::{AccessLevel, SearchFilters, SearchRequest, SortDirection, SortField};
use docvault::{DocVault, VaultConfig};

#[derive(Parser)]
#[command(name = "docvault", about = "Document store administration")]
struct Cli {
    /// TOML config file; DOCVAULT_* environment variables otherwise
    #[arg(long, short, env = "DOCVAULT_CONFIG")]
    config: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// Create or upgrade the schema
    Migrate,
    /// Search one owner's documents
    Search {
        #[arg(long)]
        owner: String,
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long)]
        tag: Vec<String>,
        /// Listing sort: date, title, size, views, downloads
        #[arg(long, default_value = "date")]
        sort: SortField,
        #[arg(long)]
        asc: bool,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Resolve a user's access to a document
    Resolve {
        #[arg(long)]
        document: String,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "view")]
        level: AccessLevel,
    },
    /// Inspect a share link without using it
    Link {
        #[arg(long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docvault=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => VaultConfig::from_file(path)?,
        None => VaultConfig::from_env()?,
    };

    ensure_sqlite_parent(&config.database_url)?;
    let vault = DocVault::open(config).await?;

    match cli.command {
        Command::Migrate => {
            // Connecting runs the migrations
            info!("Database migrations completed");
        }
        Command::Search {
            owner,
            query,
            tag,
            sort,
            asc,
            page,
            page_size,
        } => {
            let mut request = SearchRequest::query(query)
                .with_filters(SearchFilters {
                    tags: tag,
                    ..Default::default()
                })
                .sorted(sort, if asc { SortDirection::Asc } else { SortDirection::Desc });
            request.page = Some(page);
            request.page_size = page_size;

            let result = vault.search(&owner, &request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Resolve {
            document,
            user,
            level,
        } => {
            let verdict = vault.resolve_access(&document, &user, level).await?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Command::Link { token } => {
            let verdict = vault.inspect_link(&token).await?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
    }

    Ok(())
}

/// SQLite won't create missing directories for the database file
fn ensure_sqlite_parent(database_url: &str) -> Result<()> {
    if !database_url.starts_with("sqlite:") || database_url.contains(":memory:") {
        return Ok(());
    }
    let path = database_url.trim_start_matches("sqlite:").trim_start_matches("//");
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
