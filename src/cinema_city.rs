use crate::browser::{PageRenderer, RenderRequest};
use crate::extract::{Cascade, SelectorProfile};
use crate::registry::scrape_page;
use crate::showtime::{self, ShowtimeSet};
use crate::{ChainLocation, ChainScraper, RawMovie, ScrapeOutcome, ScrapeSettings};
use chrono::NaiveDate;
use reqwest::{Client, Url, header};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const BASE: &str = "https://www.cinemacity.ro";
const QUICKBOOK_PATH: &str = "/ro/data-api-service/v1/quickbook/10107/film-events/in-cinema";
const API_LANGS: [&str; 2] = ["ro_RO", "en_GB"];

/// Genre attributes the data API mixes in with format tags (2d, imax, dubbed...).
const GENRE_ATTRIBUTES: [&str; 18] = [
    "action", "adventure", "animation", "biography", "comedy", "crime", "documentary",
    "drama", "family", "fantasy", "history", "horror", "musical", "mystery", "romance",
    "sci-fi", "thriller", "war",
];

const PROFILE: SelectorProfile = SelectorProfile {
    containers: &[".qb-movie", ".movie-row", "[data-automation-id=\"movie\"]"],
    titles: &[".qb-movie-name", "h3.qb-movie-name", ".movie-name", "h3", "h2"],
    showtimes: &[".qb-movie-info-column a.btn", "a.btn-sm", ".showtime", "time"],
    durations: &[".qb-movie-info span:last-child", ".movie-length"],
    genres: &[".qb-movie-info span:first-child", ".movie-genres"],
};

/// Scraper for Cinema City Romania. Tries the quickbook data API first and
/// renders the booking page only when the API gives nothing.
pub struct CinemaCityScraper {
    renderer: Arc<dyn PageRenderer>,
    client: Client,
    settings: ScrapeSettings,
    base: String,
    cascade: Cascade,
}

impl CinemaCityScraper {
    pub fn new(renderer: Arc<dyn PageRenderer>, client: Client, settings: ScrapeSettings) -> Self {
        Self {
            renderer,
            client,
            settings,
            base: BASE.to_string(),
            cascade: Cascade::standard(&PROFILE, Url::parse(BASE).ok()),
        }
    }

    /// Point both the data API and the listing pages at another host.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into().trim_end_matches('/').to_string();
        self.cascade = Cascade::standard(&PROFILE, Url::parse(&self.base).ok());
        self
    }

    fn api_urls(&self, location: &ChainLocation, date: NaiveDate) -> Vec<String> {
        API_LANGS
            .iter()
            .map(|lang| {
                format!(
                    "{}{}/{}/at-date/{}?attr=&lang={}",
                    self.base,
                    QUICKBOOK_PATH,
                    location.location_id,
                    date.format("%Y-%m-%d"),
                    lang
                )
            })
            .collect()
    }

    async fn fetch_quickbook(
        &self,
        url: &str,
    ) -> Result<Vec<RawMovie>, Box<dyn std::error::Error + Send + Sync>> {
        let body = self
            .client
            .get(url)
            .header(header::USER_AGENT, self.settings.user_agent.as_str())
            .header(header::ACCEPT, "application/json,text/javascript,*/*;q=0.1")
            .timeout(self.settings.nav_timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(movies_from_quickbook(&body)?)
    }
}

#[derive(Debug, Deserialize)]
struct QuickbookResponse {
    body: QuickbookBody,
}

#[derive(Debug, Deserialize)]
struct QuickbookBody {
    #[serde(default)]
    films: Vec<QuickbookFilm>,
    #[serde(default)]
    events: Vec<QuickbookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuickbookFilm {
    id: String,
    name: String,
    #[serde(default)]
    length: u32,
    #[serde(default)]
    poster_link: String,
    #[serde(default)]
    attribute_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuickbookEvent {
    film_id: String,
    event_date_time: String,
}

/// Films with at least one event, in the order the API lists them.
pub fn movies_from_quickbook(body: &str) -> Result<Vec<RawMovie>, serde_json::Error> {
    let parsed: QuickbookResponse = serde_json::from_str(body)?;

    let mut times: HashMap<&str, ShowtimeSet> = HashMap::new();
    for event in &parsed.body.events {
        if let Some(t) = showtime::time_of_iso(&event.event_date_time) {
            times.entry(event.film_id.as_str()).or_default().insert(&t);
        }
    }

    let movies = parsed
        .body
        .films
        .iter()
        .filter(|f| !f.name.trim().is_empty())
        .filter_map(|f| {
            let showtimes = times.remove(f.id.as_str())?;
            let mut movie = RawMovie::new(f.name.trim()).with_showtimes(showtimes);
            movie.duration_minutes = f.length;
            movie.poster_url = f.poster_link.clone();
            if let Some(genre) = f
                .attribute_ids
                .iter()
                .find(|a| GENRE_ATTRIBUTES.contains(&a.as_str()))
            {
                movie.genre = capitalize(genre);
            }
            Some(movie)
        })
        .collect();
    Ok(movies)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait::async_trait]
impl ChainScraper for CinemaCityScraper {
    fn chain_key(&self) -> &'static str {
        "cinemacity"
    }

    fn listing_url(&self, location: &ChainLocation, date: NaiveDate) -> String {
        format!(
            "{}/cinemas/{}/{}#/buy-tickets-by-cinema?in-cinema={}&at={}&view-mode=list",
            self.base,
            location.url_slug,
            location.location_id,
            location.location_id,
            date.format("%Y-%m-%d")
        )
    }

    async fn scrape(&self, location: &ChainLocation, date: NaiveDate) -> ScrapeOutcome {
        for url in self.api_urls(location, date) {
            match self.fetch_quickbook(&url).await {
                Ok(movies) if !movies.is_empty() => {
                    info!(
                        chain = "cinemacity",
                        location = location.location_id,
                        count = movies.len(),
                        "listed via data api"
                    );
                    return ScrapeOutcome::Listed(movies);
                }
                Ok(_) => debug!(url = %url, "data api returned no events"),
                Err(e) => debug!(url = %url, error = %e, "data api unavailable"),
            }
        }

        let request = RenderRequest::new(self.listing_url(location, date));
        scrape_page(location, self.renderer.as_ref(), &request, &self.settings, &self.cascade).await
    }
}
