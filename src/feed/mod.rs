//! Feed resolution: fetch a source URL and normalize its entries.
//!
//! - [`parser`] - `feed-rs` parsing plus the link filter
//! - [`resolver`] - the [`Resolver`] seam and its HTTP implementation
//!
//! # Example
//!
//! ```ignore
//! use feedcache::feed::{HttpResolver, Resolver, ResolverOptions};
//!
//! let resolver = HttpResolver::new(reqwest::Client::new(), ResolverOptions::default());
//! let resolved = resolver.resolve("https://example.com/feed.xml").await?;
//! println!("{}: {} items", resolved.title, resolved.items.len());
//! ```

mod parser;
mod resolver;

pub use parser::{is_absolute_http_link, parse_feed, ParseResult, ResolvedItem};
pub use resolver::{
    HttpResolver, ResolveError, ResolvedSource, Resolver, ResolverOptions, DEFAULT_MAX_FEED_SIZE,
    DEFAULT_TIMEOUT, DEFAULT_USER_AGENT,
};
