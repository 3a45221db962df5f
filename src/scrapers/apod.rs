//! Astronomy Picture of the Day page scraper.
//!
//! An APOD day page looks roughly like this:
//!
//! ```text
//! <p>2023 August 14<br>
//!   <a href="image/2308/M27_1024.jpg"><img src="image/2308/M27_600.jpg"></a>
//! </p>
//! <center><b> The Dumbbell Nebula </b> ...</center>
//! <p><b> Explanation: </b> ...</p>
//! <center><a href="ap230813.html">&lt;</a> | ... | <a href="ap230815.html">&gt;</a></center>
//! ```
//!
//! Links on the page are relative to the directory holding the page, and are
//! resolved by plain concatenation: `parent + "/" + href`.

use crate::models::{Direction, ImageRecord, PageExtract};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, instrument, warn};
use url::Url;

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());
static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Strip the final path segment off `url`.
///
/// `https://apod.nasa.gov/apod/astropix.html` becomes
/// `https://apod.nasa.gov/apod`.
pub fn parent_url(url: &str) -> &str {
    match url.rfind('/') {
        Some(idx) => &url[..idx],
        None => "",
    }
}

/// Resolve an href found on a page living under `parent`.
pub fn resolve(parent: &str, href: &str) -> String {
    format!("{parent}/{href}")
}

/// Collapse an explanation paragraph onto a single line.
///
/// Newlines become spaces, the ends are trimmed, and every whitespace run of
/// two or more characters is replaced by a single space.
pub fn normalize_description(raw: &str) -> String {
    let flat = raw.replace('\n', " ");
    WHITESPACE_RUN.replace_all(flat.trim(), " ").into_owned()
}

/// Final path segment of `url`, percent-decoded.
///
/// `None` when the path ends in `/`, or when the decoded name could step
/// outside the output directory.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.last()?;
    let name = urlencoding::decode(segment).ok()?.into_owned();

    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return None;
    }
    Some(name)
}

/// Scrape one APOD page.
///
/// Finds the first anchor whose href starts with `image` and reads the date
/// label (nearest preceding `<p>`), the title (nearest following `<b>`), and
/// the explanation (nearest following `<p>`) around it. "Preceding" and
/// "following" are in document order, so the date paragraph may be the
/// anchor's own parent. Independently of the image, the anchor whose text is
/// exactly the direction marker provides the next page.
#[instrument(level = "debug", skip(html))]
pub fn extract(html: &str, parent: &str, direction: Direction) -> PageExtract {
    let document = Html::parse_document(html);

    let record = extract_record(&document, parent);
    let next_url = find_navigation(&document, parent, direction);

    PageExtract { record, next_url }
}

fn extract_record(document: &Html, parent: &str) -> Option<ImageRecord> {
    let elements: Vec<ElementRef<'_>> = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .collect();

    let anchor_pos = elements.iter().position(|el| {
        el.value().name() == "a"
            && el
                .value()
                .attr("href")
                .is_some_and(|href| href.starts_with("image"))
    })?;
    let href = elements[anchor_pos].value().attr("href")?;

    let url = resolve(parent, href);
    let Some(filename) = filename_from_url(&url) else {
        warn!(%url, "Image link has no file name; ignoring it");
        return None;
    };

    let date = elements[..anchor_pos]
        .iter()
        .rev()
        .find(|el| el.value().name() == "p")
        .map(stripped_text)
        .unwrap_or_default();

    let following = &elements[anchor_pos + 1..];
    let title = following
        .iter()
        .find(|el| el.value().name() == "b")
        .map(stripped_text)
        .unwrap_or_default();
    let description = following
        .iter()
        .find(|el| el.value().name() == "p")
        .map(|el| normalize_description(&el.text().collect::<String>()))
        .unwrap_or_default();

    debug!(%url, %filename, %date, %title, "Found image link");
    Some(ImageRecord {
        date,
        filename,
        title,
        description,
        url,
    })
}

fn find_navigation(document: &Html, parent: &str, direction: Direction) -> Option<String> {
    let marker = direction.marker();
    document
        .select(&LINK_SELECTOR)
        .find(|el| el.text().collect::<String>() == marker)
        .and_then(|el| el.value().attr("href"))
        .map(|href| resolve(parent, href))
}

/// Text fragments of `el`, each trimmed, joined without separator.
fn stripped_text(el: &ElementRef<'_>) -> String {
    el.text().map(str::trim).filter(|s| !s.is_empty()).collect()
}
