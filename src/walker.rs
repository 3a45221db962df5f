//! The page walker: fetch a day, save its picture, move to the neighbour.
//!
//! # Crawl loop
//!
//! ```text
//! HAS_URL --fetch/extract/save--> HAS_URL (next link found)
//!    |                               |
//!    +-- one-shot, or no next link --+--> DONE
//! ```
//!
//! Pages are processed strictly one after another with a random pause of
//! `0..=max_delay` whole seconds in between. Any [`CrawlError`] stops the
//! crawl immediately; everything persisted up to that point stays on disk.

use crate::error::CrawlError;
use crate::models::{CrawlSummary, Direction, ImageRecord};
use crate::outputs::album;
use crate::scrapers::apod;
use crate::transport::{ImageResponse, Transport};
use crate::utils::{ensure_output_dir, image_timestamp, set_file_times, truncate_for_log};
use futures::StreamExt;
use rand::{Rng, rng};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Size of the pieces an image body is written in.
pub const CHUNK_SIZE: usize = 1024;

/// Default directory for images and the album log.
pub const DEFAULT_OUTPUT_DIR: &str = "apod-images";

/// Everything the walker needs to know about a crawl.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub output_dir: PathBuf,
    pub direction: Direction,
    /// Stop after the first page.
    pub one_shot: bool,
    /// Upper bound of the pause between pages.
    pub max_delay: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            direction: Direction::Backward,
            one_shot: false,
            max_delay: Duration::from_secs(3),
        }
    }
}

/// What happened to the picture of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageOutcome {
    /// The page links no image (video or embed days).
    Missing,
    /// A file with the same name was already present.
    Skipped,
    Downloaded { bytes: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PageOutcome {
    image: ImageOutcome,
    next_url: Option<String>,
}

/// Walks the archive one page at a time through a [`Transport`].
#[derive(Debug)]
pub struct PageWalker<T> {
    transport: T,
    config: CrawlConfig,
    summary: Cell<CrawlSummary>,
}

impl<T: Transport> PageWalker<T> {
    pub fn new(transport: T, config: CrawlConfig) -> Self {
        Self {
            transport,
            config,
            summary: Cell::new(CrawlSummary::default()),
        }
    }

    /// Counters for the pages processed since the last [`crawl`](Self::crawl) began.
    pub fn summary(&self) -> CrawlSummary {
        self.summary.get()
    }

    /// Process the page at `url` and return the URL of the adjacent day.
    ///
    /// `None` means the page has no navigation anchor for the configured
    /// direction, i.e. the end of the archive was reached.
    pub async fn fetch_and_process(&self, url: &str) -> Result<Option<String>, CrawlError> {
        let outcome = self.process_page(url).await?;

        let mut summary = self.summary.get();
        summary.pages += 1;
        match outcome.image {
            ImageOutcome::Missing => summary.pages_without_image += 1,
            ImageOutcome::Skipped => summary.images_skipped += 1,
            ImageOutcome::Downloaded { bytes } => {
                summary.images_downloaded += 1;
                summary.bytes_downloaded += bytes;
            }
        }
        self.summary.set(summary);

        Ok(outcome.next_url)
    }

    /// Follow the link chain from `start_url` until it runs out, or for a
    /// single page in one-shot mode.
    #[instrument(level = "info", skip(self), fields(direction = %self.config.direction, one_shot = self.config.one_shot))]
    pub async fn crawl(&self, start_url: &str) -> Result<CrawlSummary, CrawlError> {
        self.summary.set(CrawlSummary::default());
        let mut current = Some(start_url.to_string());

        while let Some(url) = current.take() {
            let next_url = self.fetch_and_process(&url).await?;

            if self.config.one_shot {
                debug!("One-shot mode; stopping after the first page");
                break;
            }

            current = next_url;
            if current.is_some() {
                self.pause().await;
            }
        }

        let summary = self.summary();
        info!(
            pages = summary.pages,
            downloaded = summary.images_downloaded,
            skipped = summary.images_skipped,
            without_image = summary.pages_without_image,
            bytes = summary.bytes_downloaded,
            "Crawl finished"
        );
        Ok(summary)
    }

    /// Fetch, extract, persist, and locate the next page.
    #[instrument(level = "info", skip(self))]
    async fn process_page(&self, url: &str) -> Result<PageOutcome, CrawlError> {
        Url::parse(url).map_err(|e| CrawlError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        ensure_output_dir(&self.config.output_dir).await?;

        info!(%url, "Getting image from page");
        let html = self.transport.fetch_page(url).await?;
        let page = apod::extract(&html, apod::parent_url(url), self.config.direction);

        let image = match &page.record {
            Some(record) => self.save_image(record).await?,
            None => {
                info!(%url, "No image link found");
                ImageOutcome::Missing
            }
        };

        if page.next_url.is_none() {
            warn!(%url, marker = self.config.direction.marker(), "Cannot find link to next or previous day");
        }

        Ok(PageOutcome {
            image,
            next_url: page.next_url,
        })
    }

    async fn save_image(&self, record: &ImageRecord) -> Result<ImageOutcome, CrawlError> {
        let dir = &self.config.output_dir;
        album::append_record(dir, record).await?;

        let dest = dir.join(&record.filename);
        info!(
            date = %record.date,
            url = %record.url,
            dest = %dest.display(),
            description = %truncate_for_log(&record.description, 120),
            "Saving image"
        );

        let exists = fs::try_exists(&dest)
            .await
            .map_err(|e| CrawlError::io(&dest, e))?;
        if exists {
            info!(filename = %record.filename, "File already downloaded");
            return Ok(ImageOutcome::Skipped);
        }

        let bytes = self.download(record, &dest).await?;
        Ok(ImageOutcome::Downloaded { bytes })
    }

    /// Stream the image into `dest` and stamp it with its capture time.
    ///
    /// The timestamp is resolved before the file is created, so a page whose
    /// date cannot be determined leaves no file behind.
    async fn download(&self, record: &ImageRecord, dest: &Path) -> Result<u64, CrawlError> {
        let ImageResponse {
            content_length,
            last_modified,
            mut body,
        } = self.transport.fetch_image(&record.url).await?;

        let timestamp = image_timestamp(last_modified.as_deref(), &record.date)?;

        let mut file = fs::File::create(dest)
            .await
            .map_err(|e| CrawlError::io(dest, e))?;
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for piece in chunk.chunks(CHUNK_SIZE) {
                file.write_all(piece)
                    .await
                    .map_err(|e| CrawlError::io(dest, e))?;
                written += piece.len() as u64;
            }
            debug!(
                written_kib = written / 1024,
                total_kib = content_length / 1024,
                "Download progress"
            );
        }
        file.flush().await.map_err(|e| CrawlError::io(dest, e))?;
        drop(file);

        set_file_times(dest, timestamp)?;
        info!(bytes = written, expected = content_length, dest = %dest.display(), "Download complete");
        Ok(written)
    }

    async fn pause(&self) {
        let max = self.config.max_delay.as_secs();
        let secs = rng().random_range(0..=max);
        debug!(secs, "Sleeping before next page");
        sleep(Duration::from_secs(secs)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::album::ALBUM_FILE;
    use crate::transport::HttpTransport;
    use chrono::{Local, TimeZone, Utc};
    use futures::stream;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::SystemTime;

    const BASE: &str = "https://apod.test/apod";

    #[derive(Default)]
    struct SpyTransport {
        pages: HashMap<String, String>,
        images: HashMap<String, (Vec<u8>, Option<String>)>,
        requests: Mutex<Vec<String>>,
    }

    impl SpyTransport {
        fn page(mut self, name: &str, html: String) -> Self {
            self.pages.insert(format!("{BASE}/{name}"), html);
            self
        }

        fn image(mut self, href: &str, bytes: &[u8], last_modified: Option<&str>) -> Self {
            self.images.insert(
                format!("{BASE}/{href}"),
                (bytes.to_vec(), last_modified.map(str::to_string)),
            );
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        fn image_requests(&self) -> Vec<String> {
            self.requests()
                .into_iter()
                .filter(|url| self.images.contains_key(url))
                .collect()
        }

        fn not_found(url: &str) -> CrawlError {
            CrawlError::Status {
                url: url.to_string(),
                status: 404,
            }
        }
    }

    impl Transport for SpyTransport {
        async fn fetch_page(&self, url: &str) -> Result<String, CrawlError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| Self::not_found(url))
        }

        async fn fetch_image(&self, url: &str) -> Result<ImageResponse, CrawlError> {
            self.requests.lock().unwrap().push(url.to_string());
            let (bytes, last_modified) = self.images.get(url).cloned().ok_or_else(|| Self::not_found(url))?;
            Ok(ImageResponse {
                content_length: bytes.len() as u64,
                last_modified,
                body: stream::iter(vec![Ok(bytes)]).boxed(),
            })
        }
    }

    fn day_page(date: &str, image: Option<&str>, prev: Option<&str>, next: Option<&str>) -> String {
        let image = image
            .map(|href| format!(r#"<a href="{href}"><img src="small.jpg"></a>"#))
            .unwrap_or_else(|| r#"<iframe src="https://video.test/embed"></iframe>"#.to_string());
        let prev = prev
            .map(|href| format!(r#"<a href="{href}">&lt;</a>"#))
            .unwrap_or_default();
        let next = next
            .map(|href| format!(r#"<a href="{href}">&gt;</a>"#))
            .unwrap_or_default();
        format!(
            r#"<html><body>
<p>{date}<br>{image}</p>
<center><b> Picture for {date} </b></center>
<p><b>Explanation:</b>
Stars   and
   dust.</p>
<center>{prev} | <a href="archivepix.html">Archive</a> | {next}</center>
</body></html>"#
        )
    }

    fn config(dir: &Path) -> CrawlConfig {
        CrawlConfig {
            output_dir: dir.to_path_buf(),
            max_delay: Duration::ZERO,
            ..CrawlConfig::default()
        }
    }

    fn album(dir: &Path) -> String {
        std::fs::read_to_string(dir.join(ALBUM_FILE)).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_downloads_image_and_logs_record() {
        let tmp = tempfile::tempdir().unwrap();
        let body: Vec<u8> = (0..2500u32).map(|i| (i % 256) as u8).collect();
        let spy = SpyTransport::default()
            .page("ap230814.html", day_page("2023 August 14", Some("image/2308/m27.jpg"), Some("ap230813.html"), None))
            .image("image/2308/m27.jpg", &body, Some("Mon, 14 Aug 2023 04:05:06 GMT"));
        let walker = PageWalker::new(spy, config(tmp.path()));

        let next = walker
            .fetch_and_process(&format!("{BASE}/ap230814.html"))
            .await
            .unwrap();

        assert_eq!(next, Some(format!("{BASE}/ap230813.html")));
        assert_eq!(walker.summary().images_downloaded, 1);
        assert_eq!(walker.summary().bytes_downloaded, 2500);

        let saved = tmp.path().join("m27.jpg");
        assert_eq!(std::fs::read(&saved).unwrap(), body);
        let modified = std::fs::metadata(&saved).unwrap().modified().unwrap();
        assert_eq!(
            modified,
            SystemTime::from(Utc.with_ymd_and_hms(2023, 8, 14, 4, 5, 6).unwrap())
        );

        assert_eq!(
            album(tmp.path()),
            "2023 August 14 - m27.jpg - Picture for 2023 August 14 - Explanation: Stars and dust.\n\n"
        );
    }

    #[tokio::test]
    async fn test_existing_file_is_not_refetched() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("m27.jpg"), b"already here").unwrap();
        let spy = SpyTransport::default()
            .page("ap230814.html", day_page("2023 August 14", Some("image/2308/m27.jpg"), None, None))
            .image("image/2308/m27.jpg", b"new bytes", None);
        let walker = PageWalker::new(spy, config(tmp.path()));

        walker
            .fetch_and_process(&format!("{BASE}/ap230814.html"))
            .await
            .unwrap();

        assert_eq!(walker.summary().images_skipped, 1);
        assert_eq!(walker.summary().images_downloaded, 0);
        assert!(walker.transport.image_requests().is_empty());
        assert_eq!(
            std::fs::read(tmp.path().join("m27.jpg")).unwrap(),
            b"already here"
        );
        assert_eq!(album(tmp.path()).matches("m27.jpg").count(), 1);
    }

    #[tokio::test]
    async fn test_page_without_image() {
        let tmp = tempfile::tempdir().unwrap();
        let spy = SpyTransport::default().page(
            "ap230813.html",
            day_page("2023 August 13", None, Some("ap230812.html"), Some("ap230814.html")),
        );
        let walker = PageWalker::new(spy, config(tmp.path()));

        let next = walker
            .fetch_and_process(&format!("{BASE}/ap230813.html"))
            .await
            .unwrap();

        assert_eq!(next, Some(format!("{BASE}/ap230812.html")));
        assert!(!tmp.path().join(ALBUM_FILE).exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
        assert_eq!(walker.transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_timestamp_falls_back_to_date_label() {
        let tmp = tempfile::tempdir().unwrap();
        let spy = SpyTransport::default()
            .page("ap230814.html", day_page("2023 August 14", Some("image/2308/m27.jpg"), None, None))
            .image("image/2308/m27.jpg", b"jpeg", None);
        let walker = PageWalker::new(spy, config(tmp.path()));

        walker
            .fetch_and_process(&format!("{BASE}/ap230814.html"))
            .await
            .unwrap();

        let modified = std::fs::metadata(tmp.path().join("m27.jpg"))
            .unwrap()
            .modified()
            .unwrap();
        let expected = Local.with_ymd_and_hms(2023, 8, 14, 0, 0, 0).unwrap();
        assert_eq!(modified, SystemTime::from(expected));
    }

    #[tokio::test]
    async fn test_unparseable_date_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let spy = SpyTransport::default()
            .page("odd.html", day_page("Someday", Some("image/odd.jpg"), None, None))
            .image("image/odd.jpg", b"jpeg", None);
        let walker = PageWalker::new(spy, config(tmp.path()));

        let err = walker
            .fetch_and_process(&format!("{BASE}/odd.html"))
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::DateParse { ref label } if label == "Someday"));
        assert!(!tmp.path().join("odd.jpg").exists());
    }

    #[tokio::test]
    async fn test_forward_direction() {
        let tmp = tempfile::tempdir().unwrap();
        let spy = SpyTransport::default().page(
            "ap230813.html",
            day_page("2023 August 13", None, Some("ap230812.html"), Some("ap230814.html")),
        );
        let walker = PageWalker::new(
            spy,
            CrawlConfig {
                direction: Direction::Forward,
                ..config(tmp.path())
            },
        );

        let next = walker
            .fetch_and_process(&format!("{BASE}/ap230813.html"))
            .await
            .unwrap();
        assert_eq!(next, Some(format!("{BASE}/ap230814.html")));
    }

    #[tokio::test]
    async fn test_crawl_terminates_at_end_of_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let spy = SpyTransport::default()
            .page("a.html", day_page("2023 August 14", Some("image/x.jpg"), Some("b.html"), None))
            .page("b.html", "<html><body><p>Nothing today</p></body></html>".to_string())
            .image("image/x.jpg", b"xxxx", None);
        let walker = PageWalker::new(spy, config(tmp.path()));

        let summary = walker.crawl(&format!("{BASE}/a.html")).await.unwrap();

        assert_eq!(
            summary,
            CrawlSummary {
                pages: 2,
                images_downloaded: 1,
                images_skipped: 0,
                pages_without_image: 1,
                bytes_downloaded: 4,
            }
        );
        assert_eq!(
            walker.transport.requests(),
            vec![
                format!("{BASE}/a.html"),
                format!("{BASE}/image/x.jpg"),
                format!("{BASE}/b.html"),
            ]
        );
        assert_eq!(std::fs::read(tmp.path().join("x.jpg")).unwrap(), b"xxxx");
        assert_eq!(album(tmp.path()).matches("\n\n").count(), 1);
    }

    #[tokio::test]
    async fn test_crawl_resets_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let spy = SpyTransport::default()
            .page("a.html", day_page("2023 August 14", None, None, None));
        let walker = PageWalker::new(spy, config(tmp.path()));

        walker.fetch_and_process(&format!("{BASE}/a.html")).await.unwrap();
        walker.fetch_and_process(&format!("{BASE}/a.html")).await.unwrap();
        assert_eq!(walker.summary().pages, 2);

        let summary = walker.crawl(&format!("{BASE}/a.html")).await.unwrap();
        assert_eq!(summary.pages, 1);
        assert_eq!(summary.pages_without_image, 1);
        assert_eq!(walker.summary(), summary);
    }

    #[tokio::test]
    async fn test_one_shot_processes_single_page() {
        let tmp = tempfile::tempdir().unwrap();
        let spy = SpyTransport::default()
            .page("a.html", day_page("2023 August 14", None, Some("b.html"), None))
            .page("b.html", day_page("2023 August 13", None, None, None));
        let walker = PageWalker::new(
            spy,
            CrawlConfig {
                one_shot: true,
                ..config(tmp.path())
            },
        );

        let summary = walker.crawl(&format!("{BASE}/a.html")).await.unwrap();

        assert_eq!(summary.pages, 1);
        assert_eq!(walker.transport.requests(), vec![format!("{BASE}/a.html")]);
    }

    #[tokio::test]
    async fn test_crawl_fails_fast_on_fetch_error() {
        let tmp = tempfile::tempdir().unwrap();
        let spy = SpyTransport::default()
            .page("a.html", day_page("2023 August 14", None, Some("gone.html"), None));
        let walker = PageWalker::new(spy, config(tmp.path()));

        let err = walker.crawl(&format!("{BASE}/a.html")).await.unwrap_err();

        assert!(matches!(err, CrawlError::Status { status: 404, .. }));
        assert_eq!(walker.transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_image_error_status_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let spy = SpyTransport::default()
            .page("a.html", day_page("2023 August 14", Some("image/missing.jpg"), None, None));
        let walker = PageWalker::new(spy, config(tmp.path()));

        let err = walker
            .fetch_and_process(&format!("{BASE}/a.html"))
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::Status { status: 404, .. }));
        assert!(!tmp.path().join("missing.jpg").exists());
    }

    #[tokio::test]
    async fn test_creates_output_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("apod-images");
        let spy = SpyTransport::default()
            .page("a.html", day_page("2023 August 14", None, None, None));
        let walker = PageWalker::new(spy, config(&out));

        walker.fetch_and_process(&format!("{BASE}/a.html")).await.unwrap();
        assert!(out.is_dir());
    }

    #[tokio::test]
    async fn test_rejects_relative_start_url() {
        let tmp = tempfile::tempdir().unwrap();
        let walker = PageWalker::new(SpyTransport::default(), config(tmp.path()));

        let err = walker.fetch_and_process("ap230814.html").await.unwrap_err();
        assert!(matches!(err, CrawlError::InvalidUrl { .. }));
        assert!(walker.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_crawl_over_http() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apod/a.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(day_page(
                "2023 August 14",
                Some("image/2308/x.jpg"),
                Some("b.html"),
                None,
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/apod/image/2308/x.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fake jpeg".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/apod/b.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let walker = PageWalker::new(HttpTransport::new().unwrap(), config(tmp.path()));

        let summary = walker
            .crawl(&format!("{}/apod/a.html", server.uri()))
            .await
            .unwrap();

        assert_eq!(summary.pages, 2);
        assert_eq!(summary.images_downloaded, 1);
        assert_eq!(std::fs::read(tmp.path().join("x.jpg")).unwrap(), b"fake jpeg");
        assert!(album(tmp.path()).starts_with("2023 August 14 - x.jpg - "));
    }
}
