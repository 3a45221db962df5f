//! Command-line interface definitions for the APOD downloader.
//!
//! The start URL and output directory can also come from the environment
//! (`APOD_URL`, `APOD_DIR`).

use crate::models::Direction;
use crate::walker::{CrawlConfig, DEFAULT_OUTPUT_DIR};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Today's picture; the default starting point.
pub const DEFAULT_START_URL: &str = "https://apod.nasa.gov/apod/astropix.html";

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Walk backwards from today until the first APOD
/// apod_dl
///
/// # Just one day, into a custom directory
/// apod_dl -u https://apod.nasa.gov/apod/ap230814.html -o -d ./pictures
///
/// # Catch up forwards from a given day
/// apod_dl -u https://apod.nasa.gov/apod/ap230801.html -f
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Start from this page. If omitted, starts with today's page
    #[arg(short, long, env = "APOD_URL", value_parser = parse_start_url)]
    pub url: Option<String>,

    /// Directory to save files to
    #[arg(short, long, env = "APOD_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub dir: PathBuf,

    /// Just get the one day's picture and nothing else
    #[arg(short, long)]
    pub oneday: bool,

    /// Walk from the start day forwards instead of backwards
    #[arg(short, long)]
    pub forwards: bool,

    /// Longest random pause between two pages, in seconds
    #[arg(long, default_value_t = 3)]
    pub max_delay: u64,
}

impl Cli {
    pub fn start_url(&self) -> &str {
        self.url.as_deref().unwrap_or(DEFAULT_START_URL)
    }

    pub fn direction(&self) -> Direction {
        if self.forwards {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            output_dir: self.dir.clone(),
            direction: self.direction(),
            one_shot: self.oneday,
            max_delay: Duration::from_secs(self.max_delay),
        }
    }
}

fn parse_start_url(s: &str) -> Result<String, String> {
    Url::parse(s)
        .map(|_| s.to_string())
        .map_err(|e| format!("not an absolute URL: {e}"))
}
