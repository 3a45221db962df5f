//! Filesystem and timestamp helpers used by the walker.
//!
//! - Output directory creation
//! - Deriving a capture timestamp from `Last-Modified` or the page's date label
//! - Applying access/modification times to a downloaded file
//! - String truncation for log output

use crate::error::CrawlError;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use std::fs::{File, FileTimes};
use std::path::Path;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, instrument, warn};

/// Format of the date label printed above each picture, e.g. `2023 August 14`.
pub const DATE_LABEL_FORMAT: &str = "%Y %B %d";

/// Create `path` (and its parents) unless it already exists.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_output_dir(path: &Path) -> Result<(), CrawlError> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| CrawlError::DirectoryCreate {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse an HTTP `Last-Modified` value (RFC 2822 / IMF-fixdate).
pub fn parse_last_modified(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(SystemTime::from)
}

/// Interpret a page date label as local midnight of that day.
pub fn parse_date_label(label: &str) -> Result<SystemTime, CrawlError> {
    let date_parse_error = || CrawlError::DateParse {
        label: label.to_string(),
    };

    let date = NaiveDate::parse_from_str(label.trim(), DATE_LABEL_FORMAT)
        .map_err(|_| date_parse_error())?;
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(date_parse_error)?;
    let local = Local
        .from_local_datetime(&midnight)
        .earliest()
        .ok_or_else(date_parse_error)?;
    Ok(SystemTime::from(local))
}

/// Timestamp to stamp on a downloaded image.
///
/// `Last-Modified` wins when present and well-formed; otherwise the date
/// label is parsed, and failing that the error is returned to the caller.
pub fn image_timestamp(
    last_modified: Option<&str>,
    date_label: &str,
) -> Result<SystemTime, CrawlError> {
    if let Some(value) = last_modified {
        match parse_last_modified(value) {
            Some(ts) => return Ok(ts),
            None => warn!(%value, "Unparseable Last-Modified header; using the page date"),
        }
    }
    parse_date_label(date_label)
}

/// Set both access and modification time of the file at `path`.
pub fn set_file_times(path: &Path, time: SystemTime) -> Result<(), CrawlError> {
    let file = File::options()
        .write(true)
        .open(path)
        .map_err(|e| CrawlError::io(path, e))?;
    let times = FileTimes::new().set_accessed(time).set_modified(time);
    file.set_times(times).map_err(|e| CrawlError::io(path, e))?;
    debug!(path = %path.display(), ?time, "Applied file times");
    Ok(())
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (moved back to a char boundary) with
/// an ellipsis and the number of dropped bytes appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}
