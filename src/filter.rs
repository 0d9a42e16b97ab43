//! Blocklist applied to enriched listings: adult titles and televised talk
//! shows that some chains sell tickets for alongside films.

use crate::EnrichedMovie;

const BLOCKED_KEYWORDS: [&str; 9] = [
    "xxx",
    "erotic",
    "porn",
    "adult only",
    "talk show",
    "talk-show",
    "late night with",
    "tonight show",
    "stand-up special",
];

const BLOCKED_GENRES: [&str; 3] = ["adult", "talk", "talk-show"];

/// Catalog ids of talk-show specials that keep getting matched to screenings.
const BLOCKED_CATALOG_IDS: [u64; 3] = [1043197, 1098160, 1151534];

#[derive(Debug, Clone)]
pub struct ContentFilter {
    keywords: Vec<String>,
    genres: Vec<String>,
    catalog_ids: Vec<u64>,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(
            BLOCKED_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            BLOCKED_GENRES.iter().map(|s| s.to_string()).collect(),
            BLOCKED_CATALOG_IDS.to_vec(),
        )
    }
}

impl ContentFilter {
    pub fn new(keywords: Vec<String>, genres: Vec<String>, catalog_ids: Vec<u64>) -> Self {
        Self {
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            genres: genres.into_iter().map(|g| g.to_lowercase()).collect(),
            catalog_ids,
        }
    }

    /// Filter that lets everything through.
    pub fn allow_all() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }

    pub fn is_blocked(&self, movie: &EnrichedMovie) -> bool {
        let mut titles = vec![movie.movie.title.to_lowercase()];
        if let Some(ref c) = movie.catalog {
            if self.catalog_ids.contains(&c.catalog_id) {
                return true;
            }
            titles.push(c.english_title.to_lowercase());
        }
        if titles
            .iter()
            .any(|t| self.keywords.iter().any(|k| t.contains(k.as_str())))
        {
            return true;
        }
        let genre = movie.movie.genre.to_lowercase();
        self.genres.iter().any(|g| *g == genre)
    }

    pub fn apply(&self, movies: Vec<EnrichedMovie>) -> Vec<EnrichedMovie> {
        movies.into_iter().filter(|m| !self.is_blocked(m)).collect()
    }
}
