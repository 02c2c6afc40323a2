//! Utility functions shared by the parser, config loader and console output.
//!
//! - **URL validation**: sanity checks for configured feed URLs
//! - **Text processing**: terminal-safe sanitising and width-aware truncation

mod text;
mod url_validator;

pub use text::{strip_control_chars, truncate_to_width};
pub use url_validator::{validate_url, UrlValidationError};
