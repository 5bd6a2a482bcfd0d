//! # Regstat Common Library
//!
//! Shared code for the regional performance resolver:
//! - Data models (performance records, regions, cache entries)
//! - Calendar month normalization and clocks
//! - Configuration loading
//! - SQLite database initialization

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, Month, SystemClock};
