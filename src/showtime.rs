//! Showtime parsing and normalization.
//!
//! Every time that leaves this module is a zero-padded `HH:MM` string.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// `H:MM`, `HH:MM` or `HH.MM` standing on its own (not part of `114:00` or
/// `14:005`).
static TIME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([01]?\d|2[0-3])([:.])([0-5]\d)\b").expect("time regex"));

/// Currency or unit right after a dotted number marks it as a price.
static PRICE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:lei|ron|eur|euro|€|\$|%)").expect("price regex"));

/// Normalize a single time token, e.g. `" 9:05 "` -> `"09:05"`, `"19.30"` -> `"19:30"`.
pub fn normalize_time(raw: &str) -> Option<String> {
    let (h, m) = raw.trim().split_once([':', '.'])?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(format!("{:02}:{:02}", hour, minute))
}

/// Byte range and normalized value of every time in `text`.
///
/// Dotted tokens are only taken with a two-digit hour and when they are not
/// part of a date (`01.03.2024`) or a price (`25.00 lei`).
fn time_tokens(text: &str) -> impl Iterator<Item = (std::ops::Range<usize>, String)> + '_ {
    TIME_PATTERN.captures_iter(text).filter_map(move |c| {
        let whole = c.get(0)?;
        let hour = c.get(1)?.as_str();
        if c.get(2)?.as_str() == "." {
            let before = &text[..whole.start()];
            let after = &text[whole.end()..];
            let joined = |s: &str| s.starts_with(|ch: char| ch.is_ascii_digit());
            if hour.len() != 2
                || before.ends_with(['.', ','])
                || after.strip_prefix(['.', ',']).is_some_and(joined)
                || PRICE_SUFFIX.is_match(after)
            {
                return None;
            }
        }
        let hour: u32 = hour.parse().ok()?;
        let minute: u32 = c.get(3)?.as_str().parse().ok()?;
        Some((whole.range(), format!("{:02}:{:02}", hour, minute)))
    })
}

/// All times found anywhere in `text`, normalized, in order of appearance.
pub fn find_times(text: &str) -> Vec<String> {
    time_tokens(text).map(|(_, t)| t).collect()
}

pub fn contains_time(text: &str) -> bool {
    time_tokens(text).next().is_some()
}

/// `text` with every time token removed.
pub fn strip_times(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (range, _) in time_tokens(text) {
        out.push_str(&text[last..range.start]);
        out.push(' ');
        last = range.end;
    }
    out.push_str(&text[last..]);
    out
}

/// Time part of an ISO datetime such as `2024-03-01T11:30:00`.
pub fn time_of_iso(s: &str) -> Option<String> {
    let time = s.split('T').nth(1)?;
    normalize_time(time.get(..5)?)
}

/// Ordered, deduplicated set of normalized showtimes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowtimeSet(BTreeSet<String>);

impl ShowtimeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `raw` if it is a valid time. Returns whether it was new.
    pub fn insert(&mut self, raw: &str) -> bool {
        match normalize_time(raw) {
            Some(t) => self.0.insert(t),
            None => false,
        }
    }

    /// Adds every time found in free text.
    pub fn scan(&mut self, text: &str) {
        self.0.extend(find_times(text));
    }

    pub fn extend_from(&mut self, other: &ShowtimeSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0.into_iter().collect()
    }
}

impl<'a> FromIterator<&'a str> for ShowtimeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = ShowtimeSet::new();
        for raw in iter {
            set.insert(raw);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_single_digit_hours() {
        assert_eq!(normalize_time("9:05").as_deref(), Some("09:05"));
        assert_eq!(normalize_time(" 21:30 ").as_deref(), Some("21:30"));
        assert_eq!(normalize_time("24:00"), None);
        assert_eq!(normalize_time("12:7"), None);
        assert_eq!(normalize_time("noon"), None);
    }

    #[test]
    fn finds_times_in_free_text() {
        let text = "Azi: 11:30, 14:00 si 9:15 (sala 3) | pret 25.00 lei | 114:00";
        assert_eq!(find_times(text), vec!["11:30", "14:00", "09:15"]);
    }

    #[test]
    fn dotted_times_are_accepted() {
        assert_eq!(normalize_time("19.30").as_deref(), Some("19:30"));
        let text = "Vineri 01.03.2024: 16.45, 19.30 si 21:00 | bilet 19.90 lei | 12.50 RON | 1.45";
        assert_eq!(find_times(text), vec!["16:45", "19:30", "21:00"]);
    }

    #[test]
    fn strip_removes_only_time_tokens() {
        assert_eq!(strip_times("Dune 14:00 / 19.30").split_whitespace().collect::<Vec<_>>(), vec!["Dune", "/"]);
        assert_eq!(strip_times("Sala 2, 25.00 lei"), "Sala 2, 25.00 lei");
    }

    #[test]
    fn iso_time_part() {
        assert_eq!(time_of_iso("2024-03-01T11:30:00").as_deref(), Some("11:30"));
        assert_eq!(time_of_iso("2024-03-01"), None);
    }

    #[test]
    fn set_is_sorted_and_deduplicated() {
        let set: ShowtimeSet = ["14:00", "11:30", "11:30", "bogus"].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.into_vec(), vec!["11:30", "14:00"]);
    }

    #[test]
    fn every_found_time_matches_hh_mm() {
        let re = Regex::new(r"^[0-2]\d:[0-5]\d$").unwrap();
        for t in find_times("0:00 7:45 12:59 23:59 19:00") {
            assert!(re.is_match(&t), "{t}");
        }
    }
}
