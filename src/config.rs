//! Command line and environment configuration.

use crate::{ScrapeSettings, USER_AGENT};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "cinemaro",
    version,
    about = "Showtimes from Romanian cinema chains, enriched with TMDB metadata"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Address the HTTP API listens on
    #[arg(long, env = "CINEMARO_LISTEN", default_value = "0.0.0.0:3001", global = true)]
    pub listen: String,

    /// TMDB v3 API key; without one, listings are served unenriched
    #[arg(long, env = "TMDB_API_KEY", hide_env_values = true, global = true)]
    pub tmdb_api_key: Option<String>,

    /// Chrome/Chromium executable, otherwise looked up on PATH
    #[arg(long, env = "CHROME_PATH", global = true)]
    pub chrome_path: Option<PathBuf>,

    /// Wait after page load and after each click, in milliseconds
    #[arg(long, default_value_t = 3000, global = true)]
    pub settle_ms: u64,

    #[arg(long, default_value_t = 30, global = true)]
    pub nav_timeout_secs: u64,

    #[arg(long, default_value_t = 1800, global = true)]
    pub cache_ttl_secs: u64,

    /// Interval between cache sweeps
    #[arg(long, default_value_t = 300, global = true)]
    pub sweep_secs: u64,

    /// Default log filter; RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Scrape one cinema for one day and print the JSON listing
    Scrape {
        /// e.g. cinemacity-1806
        cinema_id: String,
        /// YYYY-MM-DD
        date: String,
    },
    /// Print the cinema directory
    Cinemas,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    pub fn scrape_settings(&self) -> ScrapeSettings {
        ScrapeSettings {
            nav_timeout: Duration::from_secs(self.nav_timeout_secs),
            settle_delay: Duration::from_millis(self.settle_ms),
            user_agent: USER_AGENT.to_string(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::try_parse_from(["cinemaro"]).unwrap();
        assert_eq!(cli.command(), Command::Serve);
        assert_eq!(cli.cache_ttl(), Duration::from_secs(30 * 60));
        assert_eq!(cli.scrape_settings().settle_delay, Duration::from_secs(3));
    }

    #[test]
    fn flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cinemaro",
            "scrape",
            "happycinema-1",
            "2024-03-01",
            "--settle-ms",
            "500",
        ])
        .unwrap();
        assert_eq!(
            cli.command(),
            Command::Scrape {
                cinema_id: "happycinema-1".to_string(),
                date: "2024-03-01".to_string()
            }
        );
        assert_eq!(cli.scrape_settings().settle_delay, Duration::from_millis(500));
    }
}
