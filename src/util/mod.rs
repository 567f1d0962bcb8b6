//! Utility functions shared by the resolver and the daemon.
//!
//! - **URL validation**: accepts absolute http(s) feed URLs and, when asked,
//!   refuses hosts on loopback or private networks.

mod url_validator;

pub use url_validator::{validate_feed_url, UrlValidationError};
