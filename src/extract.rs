//! Page extraction strategies.
//!
//! A listing page is handed to a [`Cascade`]: an ordered list of strategies,
//! each a pure function of the parsed document. The first strategy that
//! yields at least one movie wins. Chain scrapers put a [`ContainerStrategy`]
//! (known container classes) first and a [`TextScanStrategy`] (any `HH:MM`
//! text anchored to a nearby heading) last.

use crate::showtime::{self, ShowtimeSet};
use crate::{RawMovie, UNKNOWN_GENRE};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::{debug, warn};

static HOURS_MINUTES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d)\s*(?:h|ore|ora|oră)(?:\s*(?:și|si)?\s*(\d{1,2})\s*(?:min|m))?\b")
        .expect("hours regex")
});
static MINUTES_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{2,3})\s*(?:min|minute|mins|m)\b|\b(\d{2,3})['′]")
        .expect("minutes regex")
});

/// Attributes that sometimes carry a showtime instead of the element text.
const TIME_ATTRIBUTES: [&str; 3] = ["datetime", "data-time", "data-showtime"];
/// Image attributes checked in order; lazy loaders keep the real URL in `data-*`.
const POSTER_ATTRIBUTES: [&str; 3] = ["data-src", "data-lazy-src", "src"];

/// Extracts movies from one parsed document, or `None` when the strategy
/// does not apply to it.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, doc: &Html) -> Option<Vec<RawMovie>>;
}

/// Selector lists for one chain's listing markup. Every list is ordered by
/// preference.
#[derive(Debug, Clone, Copy)]
pub struct SelectorProfile {
    pub containers: &'static [&'static str],
    pub titles: &'static [&'static str],
    pub showtimes: &'static [&'static str],
    pub durations: &'static [&'static str],
    pub genres: &'static [&'static str],
}

/// Ordered strategy list; see the module docs.
pub struct Cascade {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Cascade {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Container selectors from `profile`, then the document-wide text scan.
    pub fn standard(profile: &SelectorProfile, base_url: Option<Url>) -> Self {
        Cascade::new()
            .then(ContainerStrategy::new(profile, base_url))
            .then(TextScanStrategy::default())
    }

    pub fn then(mut self, strategy: impl ExtractionStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Runs the strategies in order against `html`.
    pub fn run(&self, html: &str) -> Vec<RawMovie> {
        let doc = Html::parse_document(html);
        for strategy in &self.strategies {
            match strategy.extract(&doc) {
                Some(movies) if !movies.is_empty() => {
                    debug!(strategy = strategy.name(), count = movies.len(), "extraction succeeded");
                    return movies;
                }
                _ => debug!(strategy = strategy.name(), "extraction found nothing"),
            }
        }
        Vec::new()
    }
}

impl Default for Cascade {
    fn default() -> Self {
        Self::new()
    }
}

/// Structured extraction scoped to known "one movie" containers.
pub struct ContainerStrategy {
    containers: Vec<Selector>,
    titles: Vec<Selector>,
    showtimes: Vec<Selector>,
    durations: Vec<Selector>,
    genres: Vec<Selector>,
    images: Selector,
    base_url: Option<Url>,
}

impl ContainerStrategy {
    pub fn new(profile: &SelectorProfile, base_url: Option<Url>) -> Self {
        Self {
            containers: parse_selectors(profile.containers),
            titles: parse_selectors(profile.titles),
            showtimes: parse_selectors(profile.showtimes),
            durations: parse_selectors(profile.durations),
            genres: parse_selectors(profile.genres),
            images: Selector::parse("img").expect("img selector"),
            base_url,
        }
    }

    fn movie_from(&self, container: ElementRef<'_>) -> Option<RawMovie> {
        let title = first_text(container, &self.titles)?;

        // Dedicated showtime elements first, then the raw container text,
        // for markup where times are not wrapped in their own element.
        let mut times = ShowtimeSet::new();
        for sel in &self.showtimes {
            for el in container.select(sel) {
                let text = element_text(el);
                if showtime::contains_time(&text) {
                    times.scan(&text);
                }
                for attr in TIME_ATTRIBUTES {
                    if let Some(value) = el.value().attr(attr) {
                        if let Some(t) = showtime::time_of_iso(value) {
                            times.insert(&t);
                        } else {
                            times.insert(value);
                        }
                    }
                }
            }
        }
        let full_text = element_text(container);
        times.scan(&full_text);

        let mut movie = RawMovie::new(title).with_showtimes(times);
        movie.duration_minutes = first_text(container, &self.durations)
            .and_then(|t| parse_duration(&t))
            .unwrap_or(0);
        if let Some(genre) = first_text(container, &self.genres) {
            movie.genre = genre;
        }
        if let Some(poster) = self.poster_of(container) {
            movie.poster_url = poster;
        }
        Some(movie)
    }

    fn poster_of(&self, container: ElementRef<'_>) -> Option<String> {
        container.select(&self.images).find_map(|img| {
            POSTER_ATTRIBUTES
                .iter()
                .filter_map(|a| img.value().attr(a))
                .map(str::trim)
                .find(|src| !src.is_empty() && !src.starts_with("data:"))
                .map(|src| absolutize(self.base_url.as_ref(), src))
        })
    }
}

impl ExtractionStrategy for ContainerStrategy {
    fn name(&self) -> &'static str {
        "containers"
    }

    fn extract(&self, doc: &Html) -> Option<Vec<RawMovie>> {
        // First selector with any match wins; matches from different
        // selectors are never combined.
        let (selector, containers) = self.containers.iter().find_map(|sel| {
            let found: Vec<ElementRef<'_>> = doc.select(sel).collect();
            (!found.is_empty()).then_some((sel, found))
        })?;
        debug!(selector = ?selector, count = containers.len(), "matched movie containers");

        let movies = containers
            .into_iter()
            .filter_map(|c| self.movie_from(c))
            .filter(|m| !m.title.is_empty());
        Some(merge_by_title(movies))
    }
}

/// Document-wide fallback: every text node holding a time is attributed to
/// the closest heading that precedes it, searching outwards through its
/// ancestors.
pub struct TextScanStrategy {
    headings: Selector,
    max_depth: usize,
}

impl TextScanStrategy {
    pub fn new(headings: &str, max_depth: usize) -> Self {
        let headings = Selector::parse(headings).unwrap_or_else(|e| {
            warn!(selector = headings, error = ?e, "invalid heading selector, using h1-h6");
            Selector::parse("h1, h2, h3, h4, h5, h6").expect("heading selector")
        });
        Self {
            headings,
            max_depth,
        }
    }

    /// Closest heading before a text node: its preceding siblings, nearest
    /// first, then the same search one level up, for at most `max_depth`
    /// levels. Headings that come after the text are never used.
    fn nearest_heading(&self, before_text: &[ElementRef<'_>], parent: ElementRef<'_>) -> Option<String> {
        if let Some(title) = before_text.iter().find_map(|el| self.heading_in(*el)) {
            return Some(title);
        }
        let mut current = parent;
        for _ in 0..self.max_depth {
            if self.headings.matches(&current)
                && let Some(title) = heading_title(current)
            {
                return Some(title);
            }
            if let Some(title) = current
                .prev_siblings()
                .filter_map(ElementRef::wrap)
                .find_map(|el| self.heading_in(el))
            {
                return Some(title);
            }
            current = current.parent().and_then(ElementRef::wrap)?;
        }
        None
    }

    /// `el` itself when it is a usable heading, otherwise its last heading
    /// descendant.
    fn heading_in(&self, el: ElementRef<'_>) -> Option<String> {
        if self.headings.matches(&el)
            && let Some(title) = heading_title(el)
        {
            return Some(title);
        }
        el.select(&self.headings).filter_map(heading_title).last()
    }
}

impl Default for TextScanStrategy {
    fn default() -> Self {
        Self::new(
            "h1, h2, h3, h4, h5, h6, [class*=\"title\"], [class*=\"Title\"], strong",
            6,
        )
    }
}

impl ExtractionStrategy for TextScanStrategy {
    fn name(&self) -> &'static str {
        "text-scan"
    }

    fn extract(&self, doc: &Html) -> Option<Vec<RawMovie>> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, ShowtimeSet> = HashMap::new();

        for node in doc.root_element().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            if !showtime::contains_time(text) {
                continue;
            }
            let Some(parent) = node.parent().and_then(ElementRef::wrap) else {
                continue;
            };
            if matches!(parent.value().name(), "script" | "style" | "noscript") {
                continue;
            }
            let before: Vec<ElementRef<'_>> = node.prev_siblings().filter_map(ElementRef::wrap).collect();
            let Some(title) = self.nearest_heading(&before, parent) else {
                continue;
            };
            groups
                .entry(title.clone())
                .or_insert_with(|| {
                    order.push(title);
                    ShowtimeSet::new()
                })
                .scan(text);
        }

        let movies: Vec<RawMovie> = order
            .into_iter()
            .filter_map(|title| {
                let times = groups.remove(&title)?;
                Some(RawMovie::new(title).with_showtimes(times))
            })
            .collect();
        Some(movies)
    }
}

fn parse_selectors(list: &[&str]) -> Vec<Selector> {
    list.iter()
        .filter_map(|s| match Selector::parse(s) {
            Ok(sel) => Some(sel),
            Err(e) => {
                warn!(selector = *s, error = ?e, "skipping invalid selector");
                None
            }
        })
        .collect()
}

/// Text of an element with whitespace collapsed.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First non-empty text found by trying `selectors` in order.
fn first_text(container: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        container
            .select(sel)
            .map(element_text)
            .find(|t| !t.is_empty())
    })
}

/// Heading text usable as a title: times removed, must contain a letter.
fn heading_title(el: ElementRef<'_>) -> Option<String> {
    let stripped = showtime::strip_times(&element_text(el));
    let title = stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '-' || c == '|' || c == ',' || c.is_whitespace())
        .to_string();
    title.chars().any(char::is_alphabetic).then_some(title)
}

/// Combines records sharing a title, keeping first-seen order.
pub(crate) fn merge_by_title(movies: impl Iterator<Item = RawMovie>) -> Vec<RawMovie> {
    let mut merged: Vec<RawMovie> = Vec::new();
    for movie in movies {
        match merged.iter_mut().find(|m| m.title == movie.title) {
            Some(existing) => {
                let more: ShowtimeSet = movie.showtimes.iter().map(String::as_str).collect();
                existing.merge_showtimes(&more);
                if existing.duration_minutes == 0 {
                    existing.duration_minutes = movie.duration_minutes;
                }
                if existing.genre == UNKNOWN_GENRE {
                    existing.genre = movie.genre;
                }
                if existing.poster_url.is_empty() {
                    existing.poster_url = movie.poster_url;
                }
            }
            None => merged.push(movie),
        }
    }
    merged
}

pub(crate) fn absolutize(base: Option<&Url>, src: &str) -> String {
    match base {
        Some(base) => base
            .join(src)
            .map(String::from)
            .unwrap_or_else(|_| src.to_string()),
        None => src.to_string(),
    }
}

/// Best-effort running time: `120 min`, `2h 10min`, `2 ore și 5 min`, `95'`.
pub fn parse_duration(text: &str) -> Option<u32> {
    if let Some(c) = HOURS_MINUTES.captures(text) {
        let hours: u32 = c.get(1)?.as_str().parse().ok()?;
        let minutes: u32 = c.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        let total = hours * 60 + minutes;
        if total > 0 {
            return Some(total);
        }
    }
    let c = MINUTES_ONLY.captures(text)?;
    let minutes: u32 = c.get(1).or_else(|| c.get(2))?.as_str().parse().ok()?;
    (20..=600).contains(&minutes).then_some(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: SelectorProfile = SelectorProfile {
        containers: &[".film-card", ".movie"],
        titles: &[".film-title", "h2"],
        showtimes: &[".time", "a.session"],
        durations: &[".length"],
        genres: &[".genre"],
    };

    fn cascade() -> Cascade {
        Cascade::standard(&PROFILE, Url::parse("https://cinema.example.ro/program/").ok())
    }

    #[test]
    fn first_matching_container_selector_wins() {
        let html = r#"
            <div class="film-card"><h2>Dune: Part Two</h2><span class="time">14:00</span></div>
            <div class="movie"><h2>Other Naming</h2><span class="time">16:00</span></div>
        "#;
        let movies = cascade().run(html);
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Dune: Part Two");
    }

    #[test]
    fn times_from_elements_and_raw_text_are_unioned() {
        let html = r#"
            <div class="film-card">
              <h3 class="film-title">Anatomia unei căderi</h3>
              <a class="session" datetime="2024-03-01T21:15:00">seara</a>
              <span class="time">18:00</span>
              <p>Proiecții și la 9:45 pentru elevi</p>
            </div>"#;
        let movies = cascade().run(html);
        assert_eq!(movies[0].showtimes, vec!["09:45", "18:00", "21:15"]);
    }

    #[test]
    fn containers_without_title_are_dropped() {
        let html = r#"
            <div class="film-card"><span class="time">10:00</span></div>
            <div class="film-card"><h2>  </h2><span class="time">11:00</span></div>
            <div class="film-card"><h2>Kung Fu Panda 4</h2><span class="time">12:00</span></div>
        "#;
        let movies = cascade().run(html);
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Kung Fu Panda 4");
    }

    #[test]
    fn same_title_in_two_containers_is_merged() {
        let html = r#"
            <div class="film-card"><h2>Civil War</h2><span class="time">20:30</span></div>
            <div class="film-card"><h2>Civil War</h2><span class="time">17:00</span><span class="time">20:30</span></div>
        "#;
        let movies = cascade().run(html);
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].showtimes, vec!["17:00", "20:30"]);
    }

    #[test]
    fn optional_fields_are_best_effort() {
        let html = r#"
            <div class="film-card">
              <img data-src="/posters/dune.jpg" src="data:image/gif;base64,R0l">
              <h2>Dune</h2><span class="length">2h 46min</span><span class="genre">SF</span>
              <span class="time">19:00</span>
            </div>
            <div class="film-card"><h2>Vara</h2><span class="time">19:30</span></div>"#;
        let movies = cascade().run(html);
        assert_eq!(movies[0].duration_minutes, 166);
        assert_eq!(movies[0].genre, "SF");
        assert_eq!(movies[0].poster_url, "https://cinema.example.ro/posters/dune.jpg");
        assert_eq!(movies[1].duration_minutes, 0);
        assert_eq!(movies[1].genre, UNKNOWN_GENRE);
        assert_eq!(movies[1].poster_url, "");
    }

    #[test]
    fn falls_back_to_text_scan_when_no_container_matches() {
        let html = r#"
            <main>
              <section><h3>Challengers</h3><ul><li>13:10</li><li>18:40</li></ul></section>
              <section><h3>Inside Out 2 (dublat)</h3><p>Ore: 10:00, 12:15</p></section>
              <script>var t = "23:59";</script>
            </main>"#;
        let movies = cascade().run(html);
        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0].title, "Challengers");
        assert_eq!(movies[0].showtimes, vec!["13:10", "18:40"]);
        assert_eq!(movies[1].title, "Inside Out 2 (dublat)");
        assert_eq!(movies[1].showtimes, vec!["10:00", "12:15"]);
    }

    #[test]
    fn text_scan_ignores_headings_that_are_only_times() {
        let html = r#"<div><h4>Program</h4><div><strong>21:00</strong></div></div>"#;
        let movies = TextScanStrategy::default()
            .extract(&Html::parse_document(html))
            .unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Program");
    }

    #[test]
    fn flat_listing_assigns_times_to_the_preceding_heading() {
        let html = r#"<div><h3>Film A</h3><p>10:00</p><h3>Film B</h3><p>12:00</p><p>14:30</p></div>"#;
        let movies = cascade().run(html);
        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0].title, "Film A");
        assert_eq!(movies[0].showtimes, vec!["10:00"]);
        assert_eq!(movies[1].title, "Film B");
        assert_eq!(movies[1].showtimes, vec!["12:00", "14:30"]);
    }

    #[test]
    fn heading_after_the_times_is_not_used() {
        let html = r#"<div><p>09:00</p><h3>Later Film</h3></div>"#;
        assert!(cascade().run(html).is_empty());
    }

    #[test]
    fn heading_nested_in_an_earlier_sibling_is_found() {
        let html = r#"<ul>
            <li><div class="head"><h4>Zona de interes</h4></div><span>17:15</span></li>
            <li><div class="head"><h4>Perfect Days</h4></div><span>19:40</span></li>
        </ul>"#;
        let movies = cascade().run(html);
        assert_eq!(movies.len(), 2);
        assert_eq!(movies[1].title, "Perfect Days");
        assert_eq!(movies[1].showtimes, vec!["19:40"]);
    }

    #[test]
    fn page_without_times_yields_nothing() {
        let html = "<html><body><h1>Nu sunt proiecții azi</h1></body></html>";
        assert!(cascade().run(html).is_empty());
    }

    #[test]
    fn extraction_is_idempotent() {
        let html = r#"<div class="movie"><h2>Furiosa</h2> 22:00 16:45 <a class="session">9:00</a></div>"#;
        assert_eq!(cascade().run(html), cascade().run(html));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("Durata: 120 min"), Some(120));
        assert_eq!(parse_duration("2 ore și 5 min"), Some(125));
        assert_eq!(parse_duration("1h"), Some(60));
        assert_eq!(parse_duration("95'"), Some(95));
        assert_eq!(parse_duration("Sala 3"), None);
        assert_eq!(parse_duration("horror"), None);
    }
}
