//! Data models for a single APOD page and for a whole crawl.
//!
//! - [`Direction`]: which navigation anchor the walker follows
//! - [`ImageRecord`]: metadata scraped for one day's image
//! - [`PageExtract`]: everything the extractor pulls out of one page
//! - [`CrawlSummary`]: counters reported when the crawl ends

use std::fmt;

/// Which neighbouring day the walker moves to after each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Follow the `<` anchor, towards older days.
    #[default]
    Backward,
    /// Follow the `>` anchor, towards newer days.
    Forward,
}

impl Direction {
    /// The visible text of the navigation anchor for this direction.
    pub fn marker(self) -> &'static str {
        match self {
            Direction::Backward => "<",
            Direction::Forward => ">",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Backward => write!(f, "backward"),
            Direction::Forward => write!(f, "forward"),
        }
    }
}

/// Metadata for one day's image as it appears on the page.
///
/// `date` is the free-text label shown above the image (e.g. `2023 August 14`);
/// it is only parsed when the image response carries no `Last-Modified` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Date label as printed on the page.
    pub date: String,
    /// Basename of the resolved image URL, used as the local file name.
    pub filename: String,
    /// Title of the picture.
    pub title: String,
    /// Explanation paragraph, collapsed onto a single line.
    pub description: String,
    /// Absolute image URL.
    pub url: String,
}

impl ImageRecord {
    /// Render the record as one entry of `album_list.txt`.
    pub fn album_entry(&self) -> String {
        format!(
            "{} - {} - {} - {}\n\n",
            self.date, self.filename, self.title, self.description
        )
    }
}

/// Result of scraping one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageExtract {
    /// Present only when the page links an image.
    pub record: Option<ImageRecord>,
    /// Absolute URL of the adjacent day, absent at the end of the archive.
    pub next_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub pages: usize,
    pub images_downloaded: usize,
    pub images_skipped: usize,
    pub pages_without_image: usize,
    pub bytes_downloaded: u64,
}
