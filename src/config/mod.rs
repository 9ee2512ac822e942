//! Run configuration.
//!
//! This module provides:
//! - The immutable `Options` record and its sub-records
//! - Extra-header line parsing
//! - Constants and defaults

mod constants;
mod headers;
mod types;

pub use constants::*;
pub use headers::parse_header_line;
pub use types::{Chrome, Logging, Options, Scan, ScreenshotFormat, WriterConfig};
