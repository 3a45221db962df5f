//! Page scrapers for the sites the walker understands.
//!
//! Scrapers are pure: they receive an already-fetched HTML document and
//! return a [`PageExtract`](crate::models::PageExtract). Network and
//! filesystem concerns live in [`transport`](crate::transport) and
//! [`walker`](crate::walker), so the brittle markup handling can be tested
//! without either.
//!
//! | Site | Module | Notes |
//! |------|--------|-------|
//! | Astronomy Picture of the Day | [`apod`] | One image per day, `<`/`>` day navigation |

pub mod apod;
