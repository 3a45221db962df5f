//! Persistent outputs written next to the downloaded images.
//!
//! # Output Structure
//!
//! ```text
//! apod-images/
//! ├── album_list.txt     # one entry per image, appended as pages are visited
//! ├── M27_1024.jpg
//! └── ...
//! ```

pub mod album;
