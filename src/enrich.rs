//! Catalog enrichment.
//!
//! Each scraped title is cleaned, searched in the metadata catalog and, when
//! the catalog returns anything, merged with its first (most relevant)
//! result. Lookups for different movies run concurrently; a failed or empty
//! lookup leaves that movie as scraped.

use crate::error::CatalogError;
use crate::{CatalogFields, EnrichedMovie, RawMovie};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, header};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

/// Screening-format markers that cinemas append to titles.
static FORMAT_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\s*(?:[-–|]\s*)?[\(\[]?\b(?:2d|3d|4dx|imax|dublat|subtitrat|dub|sub|premier[aă])\b[\)\]]?\s*$",
    )
    .expect("format suffix regex")
});
static TRAILING_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*\S)\s*\((\d{4})\)$").expect("year regex"));

/// Title as sent to the catalog, plus the release year when the scraped
/// title ended in one, e.g. `Avatar (2009)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub year: Option<u16>,
}

impl SearchQuery {
    pub fn from_title(title: &str) -> Self {
        let mut text = strip_formats(title.trim());
        let mut year = None;
        if let Some(c) = TRAILING_YEAR.captures(&text) {
            year = c.get(2).and_then(|y| y.as_str().parse().ok());
            if year.is_some() {
                text = c.get(1).map(|t| t.as_str().to_string()).unwrap_or_default();
            }
        }
        Self {
            text: strip_formats(&text),
            year,
        }
    }
}

fn strip_formats(title: &str) -> String {
    let mut current = title.to_string();
    loop {
        let stripped = FORMAT_SUFFIX.replace(&current, "").trim().to_string();
        if stripped == current || stripped.is_empty() {
            return current;
        }
        current = stripped;
    }
}

/// One search result from the catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
}

/// Title search against a movie metadata catalog, results in the catalog's
/// own relevance order.
#[async_trait::async_trait]
pub trait MovieCatalog: Send + Sync {
    async fn search(&self, query: &str, year: Option<u16>) -> Result<Vec<CatalogEntry>, CatalogError>;
}

/// The Movie Database (TMDB) v3 search API.
pub struct TmdbCatalog {
    client: Client,
    api_key: String,
    base_url: String,
    language: String,
}

impl TmdbCatalog {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: TMDB_API_BASE.to_string(),
            language: "en-US".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<CatalogEntry>,
}

#[async_trait::async_trait]
impl MovieCatalog for TmdbCatalog {
    async fn search(&self, query: &str, year: Option<u16>) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut params = vec![
            ("api_key", self.api_key.clone()),
            ("query", query.to_string()),
            ("language", self.language.clone()),
            ("include_adult", "false".to_string()),
        ];
        if let Some(year) = year {
            params.push(("year", year.to_string()));
        }

        let body = self
            .client
            .get(format!("{}/search/movie", self.base_url))
            .header(header::ACCEPT, "application/json")
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let parsed: SearchResponse = serde_json::from_str(&body)?;
        Ok(parsed.results)
    }
}

/// Runs catalog lookups for a batch of scraped movies.
#[derive(Clone, Default)]
pub struct Enricher {
    catalog: Option<Arc<dyn MovieCatalog>>,
}

impl Enricher {
    pub fn new(catalog: Arc<dyn MovieCatalog>) -> Self {
        Self {
            catalog: Some(catalog),
        }
    }

    /// An enricher without a catalog; every movie passes through unmatched.
    pub fn disabled() -> Self {
        Self { catalog: None }
    }

    /// One output per input, same order.
    pub async fn enrich(&self, movies: Vec<RawMovie>) -> Vec<EnrichedMovie> {
        let Some(catalog) = self.catalog.as_deref() else {
            return movies.into_iter().map(EnrichedMovie::unmatched).collect();
        };
        join_all(movies.into_iter().map(|m| enrich_one(catalog, m))).await
    }
}

async fn enrich_one(catalog: &dyn MovieCatalog, movie: RawMovie) -> EnrichedMovie {
    let query = SearchQuery::from_title(&movie.title);
    if query.text.is_empty() {
        return EnrichedMovie::unmatched(movie);
    }
    match catalog.search(&query.text, query.year).await {
        Ok(results) => match results.into_iter().next() {
            Some(entry) => merge(movie, entry),
            None => {
                debug!(title = %movie.title, query = %query.text, "no catalog match");
                EnrichedMovie::unmatched(movie)
            }
        },
        Err(e) => {
            warn!(title = %movie.title, error = %e, "catalog lookup failed");
            EnrichedMovie::unmatched(movie)
        }
    }
}

fn merge(mut movie: RawMovie, entry: CatalogEntry) -> EnrichedMovie {
    let romanian_title = movie.title.clone();
    if let Some(path) = non_empty(entry.poster_path) {
        movie.poster_url = format!("{}/w500{}", TMDB_IMAGE_BASE, path);
    }
    let fields = CatalogFields {
        catalog_id: entry.id,
        original_title: non_empty(entry.original_title).filter(|t| *t != entry.title),
        english_title: entry.title,
        overview: non_empty(entry.overview),
        vote_average: entry.vote_average,
        backdrop: non_empty(entry.backdrop_path).map(|p| format!("{}/w1280{}", TMDB_IMAGE_BASE, p)),
        release_date: non_empty(entry.release_date),
    };
    EnrichedMovie {
        movie,
        catalog: Some(fields),
        romanian_title,
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}
