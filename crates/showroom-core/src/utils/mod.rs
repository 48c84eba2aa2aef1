//! Utility functions for human-readable formatting.

pub mod format;

pub use format::{format_age, format_bytes, truncate_string};
