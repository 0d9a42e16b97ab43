//! HTTP API.
//!
//! `GET /api/movies/:cinemaId/:date` returns the enriched listing as a JSON
//! array. Whether the listing was actually read is reported in the
//! `x-scrape-outcome` header (`listed`, `empty` or `failed`); failed scrapes
//! are not cached.

use crate::cache::{CacheKey, Fill, ResponseCache};
use crate::directory::{CinemaDirectory, CinemaEntry};
use crate::enrich::Enricher;
use crate::error::ApiError;
use crate::filter::ContentFilter;
use crate::registry::ScraperRegistry;
use crate::{ChainLocation, ChainScraper, EnrichedMovie};
use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::{HeaderName, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const OUTCOME_HEADER: &str = "x-scrape-outcome";

/// A serialized listing as served, plus the scrape outcome label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedListing {
    pub body: Arc<str>,
    pub outcome: &'static str,
}

#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<CinemaDirectory>,
    pub scrapers: ScraperRegistry,
    pub enricher: Enricher,
    pub filter: Arc<ContentFilter>,
    pub cache: Arc<ResponseCache<CachedListing>>,
}

impl AppState {
    /// Validate a cinema id and date and find the scraper for them.
    pub fn resolve(
        &self,
        cinema_id: &str,
        date: &str,
    ) -> Result<(Arc<dyn ChainScraper>, ChainLocation, NaiveDate), ApiError> {
        let location = self.directory.resolve(cinema_id)?.clone();
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| ApiError::InvalidDate(date.to_string()))?;
        let scraper = self
            .scrapers
            .get(location.chain_key)
            .ok_or(ApiError::ChainNotFound)?;
        Ok((scraper, location, date))
    }

    /// Scrape, enrich and filter one listing, bypassing the cache.
    pub async fn collect(
        &self,
        scraper: &dyn ChainScraper,
        location: &ChainLocation,
        date: NaiveDate,
    ) -> (Vec<EnrichedMovie>, &'static str) {
        let outcome = scraper.scrape(location, date).await;
        let label = outcome.label();
        let enriched = self.enricher.enrich(outcome.into_movies()).await;
        (self.filter.apply(enriched), label)
    }

    /// Cached listing for a cinema and day, scraping on a miss.
    ///
    /// The lookup and the fill run on their own task, so a client that goes
    /// away does not cancel the scrape and its result is still cached. A
    /// panic inside a scraper becomes [`ApiError::ScrapeFailed`].
    pub async fn listing(&self, cinema_id: &str, date: &str) -> Result<CachedListing, ApiError> {
        let (scraper, location, date) = self.resolve(cinema_id, date)?;
        let key = CacheKey::new(location.chain_key, location.location_id, date);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let state = self.clone();
        let task = tokio::spawn(async move {
            let cache = state.cache.clone();
            cache
                .get_or_fill(key, || async move {
                    let (movies, outcome) = state.collect(scraper.as_ref(), &location, date).await;
                    let body = serde_json::to_string(&movies)
                        .map_err(|e| ApiError::ScrapeFailed(e.to_string()))?;
                    Ok::<_, ApiError>(Fill {
                        value: CachedListing {
                            body: body.into(),
                            outcome,
                        },
                        cacheable: outcome != "failed",
                    })
                })
                .await
        });
        match task.await {
            Ok(result) => result,
            Err(e) => Err(ApiError::ScrapeFailed(e.to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            ApiError::ChainNotFound | ApiError::LocationNotFound => (StatusCode::NOT_FOUND, None),
            ApiError::InvalidDate(d) => (StatusCode::BAD_REQUEST, Some(d.clone())),
            ApiError::ScrapeFailed(d) => {
                error!(details = %d, "listing request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Some(d.clone()))
            }
        };
        let body = ErrorBody {
            error: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    cache_size: usize,
    version: &'static str,
}

pub async fn movies(
    State(state): State<AppState>,
    Path((cinema_id, date)): Path<(String, String)>,
) -> Response {
    match state.listing(&cinema_id, &date).await {
        Ok(listing) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/json"),
                (HeaderName::from_static(OUTCOME_HEADER), listing.outcome),
            ],
            listing.body.to_string(),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn cinemas(State(state): State<AppState>) -> Json<Vec<CinemaEntry>> {
    Json(state.directory.entries())
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        cache_size: state.cache.len(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/movies/:cinema_id/:date", get(movies))
        .route("/api/cinemas", get(cinemas))
        .route("/api/health", get(health))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Removes expired cache entries every `every`.
pub fn spawn_sweeper(cache: Arc<ResponseCache<CachedListing>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            cache.sweep();
        }
    })
}

pub async fn serve(listen: &str, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = listen.parse().context("Invalid listen address")?;
    let listener = TcpListener::bind(&addr)
        .await
        .context("Failed to bind HTTP server")?;
    info!("listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("HTTP server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::SnapshotRenderer;
    use crate::cache::{DEFAULT_TTL, ManualClock};
    use crate::happy_cinema::HappyCinemaScraper;
    use crate::{RawMovie, ScrapeOutcome, ScrapeSettings};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Takes a while, then lists one film.
    struct SlowScraper {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ChainScraper for SlowScraper {
        fn chain_key(&self) -> &'static str {
            "happycinema"
        }

        fn listing_url(&self, location: &ChainLocation, _date: NaiveDate) -> String {
            format!("https://slow.example.ro/{}", location.url_slug)
        }

        async fn scrape(&self, _location: &ChainLocation, _date: NaiveDate) -> ScrapeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            ScrapeOutcome::Listed(vec![
                RawMovie::new("Oppenheimer").with_showtimes(["19:00"].into_iter().collect()),
            ])
        }
    }

    fn state() -> AppState {
        let renderer = SnapshotRenderer::new();
        AppState {
            directory: Arc::new(CinemaDirectory::standard()),
            scrapers: ScraperRegistry::new()
                .with(HappyCinemaScraper::new(Arc::new(renderer), ScrapeSettings::default())),
            enricher: Enricher::disabled(),
            filter: Arc::new(ContentFilter::default()),
            cache: Arc::new(ResponseCache::new(DEFAULT_TTL, Arc::new(ManualClock::new()))),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_chain_is_404() {
        let response = movies(State(state()), Path(("acme-9999".into(), "2024-03-01".into()))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Cinema chain not found");
    }

    #[tokio::test]
    async fn unknown_location_is_404() {
        let response =
            movies(State(state()), Path(("happycinema-9999".into(), "2024-03-01".into()))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Cinema location not found");
    }

    #[tokio::test]
    async fn bad_date_is_400() {
        let response = movies(State(state()), Path(("happycinema-1".into(), "01.03.2024".into()))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_scrape_is_an_uncached_empty_array() {
        let state = state();
        let response = movies(State(state.clone()), Path(("happycinema-1".into(), "2024-03-01".into()))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[OUTCOME_HEADER], "failed");
        assert_eq!(body_json(response).await, serde_json::json!([]));
        assert!(state.cache.is_empty());
    }

    #[tokio::test]
    async fn abandoned_request_still_caches_the_listing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut state = state();
        state.scrapers = ScraperRegistry::new().with(SlowScraper { calls: calls.clone() });

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            state.listing("happycinema-1", "2024-03-01"),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(state.cache.len(), 1);

        let listing = state.listing("happycinema-1", "2024-03-01").await.unwrap();
        assert_eq!(listing.outcome, "listed");
        assert!(listing.body.contains("Oppenheimer"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scrape_failure_maps_to_500_with_details() {
        let response = ApiError::ScrapeFailed("task panicked".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn health_reports_cache_size() {
        let json = body_json(health(State(state())).await.into_response()).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["cacheSize"], 0);
    }
}
