//! dk-crawler - Digi-Key parametric catalog crawler CLI
//!
//! Thin front end over the library; every command prints JSON.

use anyhow::Result;
use clap::{Parser, Subcommand};
use dk_crawler::catalog::locale::Locale;
use dk_crawler::commands::{CatalogCommand, SearchCommand};
use dk_crawler::config::Config;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dk-crawler",
    version,
    about = "Digi-Key parametric catalog crawler",
    long_about = "Browse the Digi-Key product topology, discover category search parameters, and page through filtered results."
)]
struct Cli {
    /// Storefront as a language-country tag (e.g. en-US, de-DE) or a country code
    #[arg(long, global = true, env = "DK_LOCALE")]
    locale: Option<Locale>,

    /// Storefront country code (e.g. US, DE)
    #[arg(long, global = true, env = "DK_COUNTRY")]
    country: Option<String>,

    /// Display language code (e.g. en, de)
    #[arg(long, global = true, env = "DK_LANG")]
    lang: Option<String>,

    /// Price currency code (e.g. USD, EUR)
    #[arg(long, global = true, env = "DK_CURRENCY")]
    currency: Option<String>,

    /// Proxy URL (e.g., socks5://host:port)
    #[arg(long, global = true, env = "DK_PROXY")]
    proxy: Option<String>,

    /// Delay between requests in milliseconds
    #[arg(long, default_value = "1000", global = true, env = "DK_DELAY")]
    delay: u64,

    /// Directory for topology caches
    #[arg(long, global = true, env = "DK_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List top-level product groups
    #[command(alias = "g")]
    Groups,

    /// List categories, optionally of one group
    #[command(alias = "c")]
    Categories {
        /// Group title (e.g. "Resistors")
        group: Option<String>,
    },

    /// Show the search parameters of a category
    #[command(alias = "p")]
    Params {
        /// Category path (e.g. "Resistors/Through Hole Resistors")
        path: String,
    },

    /// Search a category with filters
    #[command(alias = "s")]
    Search {
        /// Category path (e.g. "Resistors/Through Hole Resistors")
        path: String,

        /// Filter as Name=Value; repeat a name to select several values
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "25")]
        max: usize,

        /// Products per result page
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Manage the topology cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete the cache for the selected locale
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Load config with layered overrides
    let mut config = Config::load(cli.config.as_deref())?.with_env();

    // Apply CLI overrides
    config.delay_ms = cli.delay;

    if let Some(locale) = &cli.locale {
        config.set_locale(locale);
    }
    if let Some(country) = cli.country {
        config.country = country;
    }
    if let Some(lang) = cli.lang {
        config.short_lang = lang;
    }
    if let Some(currency) = cli.currency {
        config.currency = Some(currency);
    }
    if let Some(proxy) = cli.proxy {
        config.proxy = Some(proxy);
    }
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = Some(dir);
    }

    let output = match cli.command {
        Commands::Groups => CatalogCommand::new(config).groups().await?,

        Commands::Categories { group } => CatalogCommand::new(config).categories(group.as_deref()).await?,

        Commands::Params { path } => CatalogCommand::new(config).params(&path).await?,

        Commands::Search { path, filters, max, page_size } => {
            if let Some(page_size) = page_size {
                config.page_size = page_size;
            }
            SearchCommand::new(config).execute(&path, &filters, max).await?
        }

        Commands::Cache { action: CacheAction::Clear } => CatalogCommand::new(config).clear_cache()?,
    };

    println!("{}", output);
    Ok(())
}
