//! Best-effort reading of chain JSON endpoints whose exact shape is unknown.
//!
//! Any object that carries a title and a list of sessions is taken to be one
//! movie; everything else is searched recursively.

use crate::extract::{absolutize, merge_by_title, parse_duration};
use crate::showtime::{self, ShowtimeSet};
use crate::RawMovie;
use reqwest::Url;
use serde_json::Value;

const TITLE_KEYS: [&str; 5] = ["filmTitle", "movieTitle", "title", "titlu", "name"];
const SESSION_KEYS: [&str; 6] = ["sessions", "showtimes", "performances", "screenings", "events", "times"];
const TIME_KEYS: [&str; 7] = ["eventDateTime", "startTime", "showtime", "dateTime", "start", "time", "ora"];
const DURATION_KEYS: [&str; 4] = ["runningTime", "duration", "runtime", "length"];
const GENRE_KEYS: [&str; 3] = ["genre", "genres", "gen"];
const POSTER_KEYS: [&str; 5] = ["posterImageSrc", "posterLink", "posterUrl", "poster", "image"];

/// Movies found anywhere in `value`. Entries without a single showtime are
/// skipped so that "coming soon" lists do not leak in.
pub fn movies_from_value(value: &Value, base_url: Option<&Url>) -> Vec<RawMovie> {
    let mut found = Vec::new();
    collect(value, base_url, &mut found);
    merge_by_title(found.into_iter())
}

fn collect(value: &Value, base_url: Option<&Url>, out: &mut Vec<RawMovie>) {
    match value {
        Value::Object(map) => {
            let title = TITLE_KEYS
                .iter()
                .filter_map(|k| map.get(*k)?.as_str())
                .map(str::trim)
                .find(|t| !t.is_empty());
            let sessions = SESSION_KEYS.iter().find_map(|k| map.get(*k)?.as_array());
            if let (Some(title), Some(sessions)) = (title, sessions) {
                if let Some(movie) = movie_from(title, sessions, map, base_url) {
                    out.push(movie);
                }
                return;
            }
            for v in map.values() {
                collect(v, base_url, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect(v, base_url, out);
            }
        }
        _ => {}
    }
}

fn movie_from(
    title: &str,
    sessions: &[Value],
    map: &serde_json::Map<String, Value>,
    base_url: Option<&Url>,
) -> Option<RawMovie> {
    let mut times = ShowtimeSet::new();
    for session in sessions {
        match session {
            Value::String(s) => add_time(&mut times, s),
            Value::Object(obj) => {
                if let Some(s) = TIME_KEYS.iter().find_map(|k| obj.get(*k)?.as_str()) {
                    add_time(&mut times, s);
                }
            }
            _ => {}
        }
    }
    if times.is_empty() {
        return None;
    }

    let mut movie = RawMovie::new(title).with_showtimes(times);
    movie.duration_minutes = DURATION_KEYS
        .iter()
        .find_map(|k| match map.get(*k)? {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok().or_else(|| parse_duration(s)),
            _ => None,
        })
        .unwrap_or(0);
    if let Some(genre) = GENRE_KEYS.iter().find_map(|k| first_name(map.get(*k)?)) {
        movie.genre = genre;
    }
    if let Some(poster) = POSTER_KEYS
        .iter()
        .find_map(|k| map.get(*k)?.as_str())
        .filter(|p| !p.trim().is_empty())
    {
        movie.poster_url = absolutize(base_url, poster.trim());
    }
    Some(movie)
}

fn add_time(times: &mut ShowtimeSet, raw: &str) {
    if let Some(t) = showtime::time_of_iso(raw) {
        times.insert(&t);
    } else if !times.insert(raw) {
        times.scan(raw);
    }
}

/// A string, or the first string / `name` of an array.
fn first_name(value: &Value) -> Option<String> {
    let name = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => items.iter().find_map(|v| match v {
            Value::String(s) => Some(s.as_str()),
            Value::Object(o) => o.get("name")?.as_str(),
            _ => None,
        }),
        _ => None,
    }?;
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_movies_nested_in_any_envelope() {
        let body = json!({
            "data": {
                "cinema": "Băneasa",
                "films": [
                    {
                        "title": "Dune: Partea a doua",
                        "runtime": 166,
                        "genres": [{"name": "SF"}, {"name": "Aventură"}],
                        "poster": "/media/dune.jpg",
                        "sessions": [
                            {"startTime": "2024-03-01T20:15:00"},
                            {"startTime": "2024-03-01T14:00:00"},
                            {"startTime": "2024-03-01T14:00:00"}
                        ]
                    },
                    {"title": "Coming soon", "sessions": []}
                ]
            }
        });
        let base = Url::parse("https://www.cineplexx.ro/").unwrap();
        let movies = movies_from_value(&body, Some(&base));
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Dune: Partea a doua");
        assert_eq!(movies[0].showtimes, vec!["14:00", "20:15"]);
        assert_eq!(movies[0].duration_minutes, 166);
        assert_eq!(movies[0].genre, "SF");
        assert_eq!(movies[0].poster_url, "https://www.cineplexx.ro/media/dune.jpg");
    }

    #[test]
    fn plain_string_sessions() {
        let body = json!([{"name": "Vara", "showtimes": ["18:30", "9:00", "ora 21:00"], "duration": "95 min"}]);
        let movies = movies_from_value(&body, None);
        assert_eq!(movies[0].showtimes, vec!["09:00", "18:30", "21:00"]);
        assert_eq!(movies[0].duration_minutes, 95);
    }

    #[test]
    fn unrelated_json_yields_nothing() {
        let body = json!({"status": "ok", "message": "maintenance"});
        assert!(movies_from_value(&body, None).is_empty());
    }
}
