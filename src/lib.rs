//! # htmlfeed
//!
//! Follow feeds that are published as plain HTML pages and a plain-text
//! listing of their addresses.
//!
//! ## Architecture
//!
//! ```text
//! ChangePoller → Listing Fetcher → Listing Differ → Store
//!                                                     ↓
//!            Transport → DocumentSanitizer → compose_sections → Scene
//! ```
//!
//! - [`fetcher`]: HTTP transport, change fingerprints, listing and detail fetchers
//! - [`document`]: hook-driven reader, sanitizer and scene composer
//! - [`store`]: SQLite persistence and listing diffs
//!
//! ## Quick Start
//!
//! ```bash
//! # Follow a feed
//! htmlfeed follow https://example.com/blog/index.txt
//!
//! # Check every feed for new posts
//! htmlfeed refresh
//!
//! # Print the sanitized scenes of a post
//! htmlfeed preview https://example.com/blog/first.html
//! ```

/// Address parsing, folder derivation and reference resolution.
pub mod address;

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the store,
/// transport, poller and configuration.
pub mod app;

/// Command-line interface using clap.
///
/// - `follow <url>` - Follow a feed
/// - `unfollow <url>` - Stop following a feed
/// - `refresh` - Probe every feed and record new posts
/// - `list [--posts]` - List feeds or posts
/// - `details <url>` - Print feed metadata as JSON
/// - `preview <url>` - Print the scenes of a post
pub mod cli;

/// Configuration loaded from `~/.config/htmlfeed/config.toml`.
pub mod config;

/// Foreign document reading, sanitization and scene composition.
pub mod document;

/// Core domain models.
///
/// - [`Feed`](domain::Feed): a followed feed and its metadata
/// - [`Listing`](domain::Listing): ordered entry addresses of one revision
/// - [`Post`](domain::Post): an entry recorded with SHA256 ID
/// - [`Fingerprint`](domain::Fingerprint): opaque change token
pub mod domain;

/// Network side of the pipeline.
///
/// - [`Transport`](fetcher::Transport): async trait for single requests
/// - [`HttpTransport`](fetcher::http_fetcher::HttpTransport): reqwest-based implementation
/// - [`ChangePoller`](fetcher::poller::ChangePoller): concurrent fingerprint sweeps
pub mod fetcher;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
