use crate::browser::{PageRenderer, RenderRequest, render_once};
use crate::cinema_city::CinemaCityScraper;
use crate::cineplexx::CineplexxScraper;
use crate::extract::Cascade;
use crate::happy_cinema::HappyCinemaScraper;
use crate::{ChainLocation, ChainScraper, ScrapeOutcome, ScrapeSettings};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Chain scrapers by chain key.
#[derive(Default, Clone)]
pub struct ScraperRegistry {
    scrapers: HashMap<&'static str, Arc<dyn ChainScraper>>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard(renderer: Arc<dyn PageRenderer>, client: Client, settings: ScrapeSettings) -> Self {
        Self::new()
            .with(CinemaCityScraper::new(renderer.clone(), client.clone(), settings.clone()))
            .with(CineplexxScraper::new(renderer.clone(), client, settings.clone()))
            .with(HappyCinemaScraper::new(renderer, settings))
    }

    pub fn with(mut self, scraper: impl ChainScraper + 'static) -> Self {
        self.scrapers.insert(scraper.chain_key(), Arc::new(scraper));
        self
    }

    pub fn get(&self, chain_key: &str) -> Option<Arc<dyn ChainScraper>> {
        self.scrapers.get(chain_key).cloned()
    }
}

/// Render one listing page in a fresh session and run the extraction cascade.
pub(crate) async fn scrape_page(
    location: &ChainLocation,
    renderer: &dyn PageRenderer,
    request: &RenderRequest,
    settings: &ScrapeSettings,
    cascade: &Cascade,
) -> ScrapeOutcome {
    match render_once(renderer, request, settings).await {
        Ok(html) => {
            let movies = cascade.run(&html);
            info!(
                chain = location.chain_key,
                location = location.location_id,
                url = %request.url,
                count = movies.len(),
                "listing page scraped"
            );
            ScrapeOutcome::from_movies(movies)
        }
        Err(e) => {
            warn!(
                chain = location.chain_key,
                location = location.location_id,
                url = %request.url,
                error = %e,
                "listing page could not be rendered"
            );
            ScrapeOutcome::Failed(e.to_string())
        }
    }
}
