//! Keeps a local cache of posts from RSS/Atom sources fresh.
//!
//! - [`feed`] - fetch and normalize one source
//! - [`storage`] - source, post and collection stores (SQLite or in-memory)
//! - [`scheduler`] - worker pool, periodic sweep and orphan cleanup
//! - [`assignment`] - attach source URLs to a collection
//! - [`config`] - TOML configuration

pub mod assignment;
pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;

pub use assignment::SourceAssigner;
pub use config::Config;
pub use scheduler::{RefreshEvent, Scheduler, SchedulerOptions};
