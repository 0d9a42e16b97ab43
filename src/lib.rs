use serde::Serialize;

pub mod api;
pub mod browser;
pub mod cache;
pub mod cinema_city;
pub mod cineplexx;
pub mod config;
pub mod directory;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod filter;
pub mod happy_cinema;
pub mod loose_json;
pub mod registry;
pub mod showtime;

use chrono::NaiveDate;
use std::time::Duration;

pub use showtime::ShowtimeSet;

/// Genre used when a listing does not expose one.
pub const UNKNOWN_GENRE: &str = "Unknown";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

/// One movie as found on a chain listing page for a single day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawMovie {
    pub title: String,
    /// Running time in minutes, 0 when unknown.
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
    pub genre: String,
    #[serde(rename = "poster")]
    pub poster_url: String,
    /// Zero-padded `HH:MM`, deduplicated, ascending.
    pub showtimes: Vec<String>,
}

impl RawMovie {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            duration_minutes: 0,
            genre: UNKNOWN_GENRE.to_string(),
            poster_url: String::new(),
            showtimes: Vec::new(),
        }
    }

    pub fn with_showtimes(mut self, showtimes: ShowtimeSet) -> Self {
        self.showtimes = showtimes.into_vec();
        self
    }

    /// Adds showtimes while keeping the list normalized.
    pub fn merge_showtimes(&mut self, more: &ShowtimeSet) {
        let mut set: ShowtimeSet = self.showtimes.iter().map(String::as_str).collect();
        set.extend_from(more);
        self.showtimes = set.into_vec();
    }
}

/// Canonical fields taken from the metadata catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFields {
    pub catalog_id: u64,
    pub english_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backdrop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
}

/// A scraped movie after the catalog lookup. `catalog` is `None` when no
/// match was found, in which case `movie` is exactly what was scraped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedMovie {
    #[serde(flatten)]
    pub movie: RawMovie,
    #[serde(flatten)]
    pub catalog: Option<CatalogFields>,
    /// The scraped (localized) title, never overwritten.
    pub romanian_title: String,
}

impl EnrichedMovie {
    pub fn unmatched(movie: RawMovie) -> Self {
        Self {
            romanian_title: movie.title.clone(),
            movie,
            catalog: None,
        }
    }
}

/// One physical cinema of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLocation {
    pub chain_key: &'static str,
    pub location_id: &'static str,
    pub name: &'static str,
    pub city_slug: &'static str,
    pub url_slug: &'static str,
}

/// Timing knobs shared by every chain scraper.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub nav_timeout: Duration,
    /// Wait after the page reports loaded, for client-side hydration.
    pub settle_delay: Duration,
    pub user_agent: String,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            nav_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(3000),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// What a chain scrape produced. Both `Empty` and `Failed` carry no movies;
/// they differ only in whether the listing was actually read.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    Listed(Vec<RawMovie>),
    Empty,
    Failed(String),
}

impl ScrapeOutcome {
    pub fn from_movies(movies: Vec<RawMovie>) -> Self {
        if movies.is_empty() {
            ScrapeOutcome::Empty
        } else {
            ScrapeOutcome::Listed(movies)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScrapeOutcome::Listed(_) => "listed",
            ScrapeOutcome::Empty => "empty",
            ScrapeOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ScrapeOutcome::Failed(_))
    }

    pub fn into_movies(self) -> Vec<RawMovie> {
        match self {
            ScrapeOutcome::Listed(movies) => movies,
            ScrapeOutcome::Empty | ScrapeOutcome::Failed(_) => Vec::new(),
        }
    }
}

/// Trait that all chain scrapers implement.
///
/// `scrape` never returns an error: navigation and extraction problems are
/// logged and reported as [`ScrapeOutcome::Failed`].
#[async_trait::async_trait]
pub trait ChainScraper: Send + Sync {
    /// Key used in cinema ids, e.g. `cinemacity` in `cinemacity-1806`.
    fn chain_key(&self) -> &'static str;

    /// Listing URL for one location and day.
    fn listing_url(&self, location: &ChainLocation, date: NaiveDate) -> String;

    async fn scrape(&self, location: &ChainLocation, date: NaiveDate) -> ScrapeOutcome;
}
