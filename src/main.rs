//! # apod_dl
//!
//! Walks NASA's [Astronomy Picture of the Day](https://apod.nasa.gov/apod/)
//! archive one day at a time, saving each day's image together with a line of
//! metadata in `album_list.txt`.
//!
//! ## Usage
//!
//! ```sh
//! apod_dl -d ./apod-images
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: [`transport`] requests the day page over HTTPS
//! 2. **Extraction**: [`scrapers::apod`] finds the image, its caption, and the
//!    link to the neighbouring day
//! 3. **Persistence**: [`outputs::album`] appends the caption; [`walker`]
//!    streams the image to disk and stamps its capture date
//! 4. **Navigation**: [`walker`] moves to the next day until the chain ends

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod error;
mod models;
mod outputs;
mod scrapers;
mod transport;
mod utils;
mod walker;

use cli::Cli;
use transport::HttpTransport;
use walker::PageWalker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("apod_dl starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = args.crawl_config();
    info!(
        start = %args.start_url(),
        dir = %config.output_dir.display(),
        direction = %config.direction,
        one_shot = config.one_shot,
        "Crawl configured"
    );

    let transport = HttpTransport::new()?;
    let walker = PageWalker::new(transport, config);

    let summary = match walker.crawl(args.start_url()).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Crawl aborted");
            return Err(e.into());
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        pages = summary.pages,
        downloaded = summary.images_downloaded,
        "Execution complete"
    );

    Ok(())
}
