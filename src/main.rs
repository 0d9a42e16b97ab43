use anyhow::Context;
use cinemaro::api::{self, AppState};
use cinemaro::browser::ChromiumRenderer;
use cinemaro::cache::{ResponseCache, SystemClock};
use cinemaro::config::{Cli, Command};
use cinemaro::directory::CinemaDirectory;
use cinemaro::enrich::{Enricher, TmdbCatalog};
use cinemaro::filter::ContentFilter;
use cinemaro::registry::ScraperRegistry;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = cli.scrape_settings();

    // Cookie store so the data APIs see the session cookies a browser would.
    let client = reqwest::Client::builder()
        .cookie_store(true)
        .user_agent(settings.user_agent.as_str())
        .timeout(Duration::from_secs(20))
        .build()
        .context("Failed to build HTTP client")?;

    let enricher = match cli.tmdb_api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => Enricher::new(Arc::new(TmdbCatalog::new(client.clone(), key))),
        None => {
            warn!("no TMDB API key configured, listings will not be enriched");
            Enricher::disabled()
        }
    };

    let renderer = Arc::new(ChromiumRenderer::new(cli.chrome_path.clone()));
    let state = AppState {
        directory: Arc::new(CinemaDirectory::standard()),
        scrapers: ScraperRegistry::standard(renderer, client, settings),
        enricher,
        filter: Arc::new(ContentFilter::default()),
        cache: Arc::new(ResponseCache::new(cli.cache_ttl(), Arc::new(SystemClock))),
    };

    match cli.command() {
        Command::Serve => {
            info!(
                ttl_secs = cli.cache_ttl_secs,
                sweep_secs = cli.sweep_secs,
                "starting cinemaro"
            );
            let sweeper = api::spawn_sweeper(state.cache.clone(), cli.sweep_interval());
            let served = api::serve(&cli.listen, state).await;
            sweeper.abort();
            served?;
        }
        Command::Scrape { cinema_id, date } => {
            let (scraper, location, date) = state.resolve(&cinema_id, &date)?;
            let (movies, outcome) = state.collect(scraper.as_ref(), &location, date).await;
            info!(cinema = %cinema_id, outcome, count = movies.len(), "scrape finished");
            println!("{}", serde_json::to_string_pretty(&movies)?);
        }
        Command::Cinemas => {
            println!("{}", serde_json::to_string_pretty(&state.directory.entries())?);
        }
    }

    Ok(())
}
