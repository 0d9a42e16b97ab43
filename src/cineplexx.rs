use crate::browser::{PageRenderer, RenderRequest};
use crate::extract::{Cascade, SelectorProfile};
use crate::loose_json::movies_from_value;
use crate::registry::scrape_page;
use crate::{ChainLocation, ChainScraper, RawMovie, ScrapeOutcome, ScrapeSettings};
use chrono::NaiveDate;
use reqwest::{Client, Url, header};
use std::sync::Arc;
use tracing::{debug, info};

const BASE: &str = "https://www.cineplexx.ro";

/// JSON endpoints the site front-end has used; none is documented, so each
/// is tried in turn and any failure just moves on to the next.
const API_PATTERNS: [&str; 3] = [
    "/api/v1/cinemas/{id}/program?date={date}",
    "/api/v2/cinemas/{id}/sessions?date={date}&lang=ro",
    "/service/program.php?type=cinema&centerId={id}&date={date}",
];

const PROFILE: SelectorProfile = SelectorProfile {
    containers: &[".movie-list-item", ".overview-element", ".program-item", ".movie"],
    titles: &[".overview-element__title", "h2.movie-title", ".movie-title", "h2", "h3"],
    showtimes: &[".start-times a", ".time-desc", ".session-time", "time"],
    durations: &[".movie-duration", ".duration", ".overview-element__info"],
    genres: &[".movie-genre", ".genre"],
};

/// Scraper for Cineplexx Romania.
pub struct CineplexxScraper {
    renderer: Arc<dyn PageRenderer>,
    client: Client,
    settings: ScrapeSettings,
    base: String,
    cascade: Cascade,
}

impl CineplexxScraper {
    pub fn new(renderer: Arc<dyn PageRenderer>, client: Client, settings: ScrapeSettings) -> Self {
        Self {
            renderer,
            client,
            settings,
            base: BASE.to_string(),
            cascade: Cascade::standard(&PROFILE, Url::parse(BASE).ok()),
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into().trim_end_matches('/').to_string();
        self.cascade = Cascade::standard(&PROFILE, Url::parse(&self.base).ok());
        self
    }

    fn api_urls(&self, location: &ChainLocation, date: NaiveDate) -> Vec<String> {
        let date = date.format("%Y-%m-%d").to_string();
        API_PATTERNS
            .iter()
            .map(|p| {
                let path = p.replace("{id}", location.location_id).replace("{date}", &date);
                format!("{}{}", self.base, path)
            })
            .collect()
    }

    async fn fetch_endpoint(
        &self,
        url: &str,
    ) -> Result<Vec<RawMovie>, Box<dyn std::error::Error + Send + Sync>> {
        let value: serde_json::Value = self
            .client
            .get(url)
            .header(header::USER_AGENT, self.settings.user_agent.as_str())
            .header(header::ACCEPT, "application/json")
            .timeout(self.settings.nav_timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(movies_from_value(&value, Url::parse(&self.base).ok().as_ref()))
    }
}

#[async_trait::async_trait]
impl ChainScraper for CineplexxScraper {
    fn chain_key(&self) -> &'static str {
        "cineplexx"
    }

    fn listing_url(&self, location: &ChainLocation, date: NaiveDate) -> String {
        format!(
            "{}/cinema/{}?date={}",
            self.base,
            location.url_slug,
            date.format("%Y-%m-%d")
        )
    }

    async fn scrape(&self, location: &ChainLocation, date: NaiveDate) -> ScrapeOutcome {
        for url in self.api_urls(location, date) {
            match self.fetch_endpoint(&url).await {
                Ok(movies) if !movies.is_empty() => {
                    info!(
                        chain = "cineplexx",
                        location = location.location_id,
                        url = %url,
                        count = movies.len(),
                        "listed via json endpoint"
                    );
                    return ScrapeOutcome::Listed(movies);
                }
                Ok(_) => debug!(url = %url, "json endpoint had no sessions"),
                Err(e) => debug!(url = %url, error = %e, "json endpoint unavailable"),
            }
        }

        let request = RenderRequest::new(self.listing_url(location, date));
        scrape_page(location, self.renderer.as_ref(), &request, &self.settings, &self.cascade).await
    }
}
