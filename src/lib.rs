//! Records which window has focus and how busy the keyboard and mouse are, and turns it into a
//! compact timeline. Titles are stripped of configured keywords before they touch the disk and
//! are additionally scrubbed by a local language model before they are shown.
//!

pub mod anonymize;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod fs;
pub mod timeline;
pub mod utils;
pub mod window_api;
