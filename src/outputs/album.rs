//! Append-only album log.
//!
//! Every page that links an image adds one entry to `album_list.txt`, even
//! when the image itself was downloaded on an earlier run:
//!
//! ```text
//! 2023 August 14 - M27_1024.jpg - The Dumbbell Nebula - Explanation: ...
//!
//! ```

use crate::error::CrawlError;
use crate::models::ImageRecord;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

/// File name of the album log inside the output directory.
pub const ALBUM_FILE: &str = "album_list.txt";

/// Append `record` to `<dir>/album_list.txt`, flushing before returning.
///
/// The file is opened in append mode for each entry and closed again, so a
/// crash never loses entries that were already written.
#[instrument(level = "debug", skip_all, fields(dir = %dir.display(), filename = %record.filename))]
pub async fn append_record(dir: &Path, record: &ImageRecord) -> Result<PathBuf, CrawlError> {
    let path = dir.join(ALBUM_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .map_err(|e| CrawlError::io(&path, e))?;

    file.write_all(record.album_entry().as_bytes())
        .await
        .map_err(|e| CrawlError::io(&path, e))?;
    file.flush().await.map_err(|e| CrawlError::io(&path, e))?;

    info!(path = %path.display(), "Saved album entry");
    Ok(path)
}
