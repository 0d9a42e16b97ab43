use crate::browser::{PageRenderer, RenderRequest};
use crate::extract::{Cascade, SelectorProfile};
use crate::registry::scrape_page;
use crate::{ChainLocation, ChainScraper, ScrapeOutcome, ScrapeSettings};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Europe::Bucharest;
use reqwest::Url;
use std::sync::Arc;

const BASE: &str = "https://www.happy-cinema.ro";
const COOKIE_BANNER: &str = "#onetrust-accept-btn-handler";

const PROFILE: SelectorProfile = SelectorProfile {
    containers: &[".program-movie", ".movie-program", ".film-item"],
    titles: &[".program-movie__title", ".movie-title", "h2", "h3"],
    showtimes: &[".program-hour", ".ora", ".hour", "button.time"],
    durations: &[".durata", ".program-movie__duration", ".duration"],
    genres: &[".gen", ".program-movie__genre", ".genre"],
};

/// Scraper for Happy Cinema. The program page has a fixed URL per cinema and
/// shows today; other days are reached through the in-page date picker,
/// whose buttons carry the day as `dd-mm-yyyy`.
pub struct HappyCinemaScraper {
    renderer: Arc<dyn PageRenderer>,
    settings: ScrapeSettings,
    base: String,
    cascade: Cascade,
}

impl HappyCinemaScraper {
    pub fn new(renderer: Arc<dyn PageRenderer>, settings: ScrapeSettings) -> Self {
        Self {
            renderer,
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

    /// Page request for `date`. Picking the day is mandatory unless it is
    /// today, which the page already shows.
    pub fn request_for(&self, location: &ChainLocation, date: NaiveDate, today: NaiveDate) -> RenderRequest {
        RenderRequest::new(self.listing_url(location, date))
            .click(COOKIE_BANNER, false)
            .click(date_picker_selector(date), date != today)
    }
}

/// Calendar day in Romania at `instant`; the program page opens on it.
pub fn romanian_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Bucharest).date_naive()
}

pub fn date_picker_selector(date: NaiveDate) -> String {
    format!("[data-date=\"{}\"]", date.format("%d-%m-%Y"))
}

#[async_trait::async_trait]
impl ChainScraper for HappyCinemaScraper {
    fn chain_key(&self) -> &'static str {
        "happycinema"
    }

    fn listing_url(&self, location: &ChainLocation, _date: NaiveDate) -> String {
        format!("{}/cinema/{}/program", self.base, location.url_slug)
    }

    async fn scrape(&self, location: &ChainLocation, date: NaiveDate) -> ScrapeOutcome {
        let request = self.request_for(location, date, romanian_date(Utc::now()));
        scrape_page(location, self.renderer.as_ref(), &request, &self.settings, &self.cascade).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{Interaction, SnapshotRenderer};
    use crate::directory::CinemaDirectory;
    use chrono::TimeZone;

    fn location() -> ChainLocation {
        CinemaDirectory::standard().resolve("happycinema-1").unwrap().clone()
    }

    fn scraper(renderer: SnapshotRenderer) -> HappyCinemaScraper {
        HappyCinemaScraper::new(Arc::new(renderer), ScrapeSettings::default())
    }

    #[test]
    fn date_picker_uses_romanian_day_first_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(date_picker_selector(date), "[data-date=\"01-03-2024\"]");
    }

    #[test]
    fn picking_another_day_is_required() {
        let s = scraper(SnapshotRenderer::new());
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let tomorrow = today.succ_opt().unwrap();

        let req = s.request_for(&location(), tomorrow, today);
        assert_eq!(req.url, "https://www.happy-cinema.ro/cinema/ploiesti-afi/program");
        assert_eq!(
            req.interactions[1],
            Interaction::Click {
                selector: "[data-date=\"02-03-2024\"]".to_string(),
                required: true
            }
        );

        let req = s.request_for(&location(), today, today);
        assert!(matches!(&req.interactions[1], Interaction::Click { required: false, .. }));
    }

    #[tokio::test]
    async fn render_failure_is_reported_not_raised() {
        let renderer = SnapshotRenderer::new();
        let s = scraper(renderer.clone());
        let outcome = s
            .scrape(&location(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .await;
        assert!(outcome.is_failed());
        assert_eq!(renderer.opened(), 1);
        assert_eq!(renderer.closed(), 1);

        let requests = renderer.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].interactions,
            vec![
                Interaction::Click {
                    selector: COOKIE_BANNER.to_string(),
                    required: false
                },
                Interaction::Click {
                    selector: "[data-date=\"01-03-2024\"]".to_string(),
                    required: true
                },
            ]
        );
    }

    #[test]
    fn today_follows_romanian_time() {
        let late_winter_evening = Utc.with_ymd_and_hms(2024, 3, 1, 22, 30, 0).unwrap();
        assert_eq!(romanian_date(late_winter_evening), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());

        let summer = Utc.with_ymd_and_hms(2024, 7, 1, 20, 59, 0).unwrap();
        assert_eq!(romanian_date(summer), NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        let summer_midnight = Utc.with_ymd_and_hms(2024, 7, 1, 21, 0, 0).unwrap();
        assert_eq!(romanian_date(summer_midnight), NaiveDate::from_ymd_opt(2024, 7, 2).unwrap());
    }

    #[tokio::test]
    async fn page_without_known_containers_uses_text_fallback() {
        let html = r#"<body><div class="zi">
            <article><h2>Monștri de buzunar</h2><p>10:30 &middot; 12:45</p></article>
            <article><h2>Oppenheimer</h2><p>19:00</p></article>
        </div></body>"#;
        let renderer = SnapshotRenderer::new()
            .with_page("https://www.happy-cinema.ro/cinema/ploiesti-afi/program", html);
        let outcome = scraper(renderer)
            .scrape(&location(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .await;
        let movies = outcome.into_movies();
        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0].title, "Monștri de buzunar");
        assert_eq!(movies[0].showtimes, vec!["10:30", "12:45"]);
        assert_eq!(movies[1].title, "Oppenheimer");
    }
}
