use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use wpstream::client::StreamClient;
use wpstream::config::Config;
use wpstream::models::SearchQuery;
use wpstream::store::SqliteStore;
use wpstream::transport::ReqwestTransport;

#[derive(Parser)]
#[command(name = "wpstream")]
#[command(about = "Configurable scraping engine for WordPress manga-stream sites")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Show the details page of a manga
    Details {
        /// Site name from the configuration
        site: String,
        /// Manga id (slug, or numeric post id where the site uses them)
        manga_id: String,
    },
    /// List the chapters of a manga
    Chapters {
        site: String,
        manga_id: String,
    },
    /// List the image URLs of a chapter
    Pages {
        site: String,
        manga_id: String,
        chapter_id: String,
    },
    /// Search by title, or filter by tags when no title is given
    Search {
        site: String,
        /// Title to search for
        title: Option<String>,
        /// Included tag, `section:value` form (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Excluded tag (repeatable, needs site support)
        #[arg(long = "exclude-tag")]
        excluded_tags: Vec<String>,
        #[arg(short, long, default_value = "1")]
        page: u32,
    },
    /// Show the site's tag taxonomy
    Tags {
        site: String,
    },
    /// Show the homepage sections
    Home {
        site: String,
    },
    /// Continue a paginated home section
    ViewMore {
        site: String,
        section_id: String,
        #[arg(short, long, default_value = "1")]
        page: u32,
    },
    /// Poll the update listing for known manga ids
    Updates {
        site: String,
        /// Known manga ids to match against
        ids: Vec<String>,
        /// How far back to look, in hours
        #[arg(long, default_value = "24")]
        since_hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    if let Commands::Init = cli.command {
        let config = Config::default();
        config.save(&cli.config)?;
        info!("✅ Wrote default configuration to {}", cli.config);
        return Ok(());
    }

    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Details { site, manga_id } => {
            let client = build_client(&config, &site).await?;
            let details = client.get_manga_details(&manga_id).await?;
            print_json(&details)?;
        }
        Commands::Chapters { site, manga_id } => {
            let client = build_client(&config, &site).await?;
            let chapters = client.get_chapters(&manga_id).await?;
            info!("📚 {} chapters found", chapters.len());
            print_json(&chapters)?;
        }
        Commands::Pages { site, manga_id, chapter_id } => {
            let client = build_client(&config, &site).await?;
            let pages = client.get_chapter_details(&manga_id, &chapter_id).await?;
            print_json(&pages)?;
        }
        Commands::Search { site, title, tags, excluded_tags, page } => {
            let client = build_client(&config, &site).await?;
            let query = SearchQuery {
                title,
                included_tags: tags,
                excluded_tags,
            };
            let results = client.get_search_results(&query, page).await?;
            print_json(&results)?;
        }
        Commands::Tags { site } => {
            let client = build_client(&config, &site).await?;
            let sections = client.get_search_tags().await?;
            print_json(&sections)?;
        }
        Commands::Home { site } => {
            let client = build_client(&config, &site).await?;
            let mut sections = Vec::new();
            client
                .get_home_page_sections(&mut |section| sections.push(section))
                .await?;
            print_json(&sections)?;
        }
        Commands::ViewMore { site, section_id, page } => {
            let client = build_client(&config, &site).await?;
            let results = client.get_view_more_items(&section_id, page).await?;
            print_json(&results)?;
        }
        Commands::Updates { site, ids, since_hours } => {
            let client = build_client(&config, &site).await?;
            let since = chrono::Utc::now() - chrono::Duration::hours(since_hours);
            info!("🔄 Polling updates since {}", since);
            let mut batches = Vec::new();
            client
                .filter_updated_manga(&mut |batch| batches.push(batch), since, &ids)
                .await?;
            print_json(&batches)?;
        }
    }

    Ok(())
}

async fn build_client(config: &Config, site_name: &str) -> Result<StreamClient> {
    let site = config
        .get_site_config(site_name)
        .cloned()
        .ok_or_else(|| wpstream::EngineError::site_not_configured(site_name))?;

    let store = SqliteStore::connect(&config.store.url).await?;
    let transport = ReqwestTransport::new(site.requests_per_second, site.request_timeout_ms);

    Ok(StreamClient::new(site, Arc::new(transport), Arc::new(store)))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(format!("wpstream={}", level))
        .with_target(false)
        .init();

    Ok(())
}
