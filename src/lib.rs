//! Paginated catalog browsing over a read-only REST API.
//!
//! The interesting parts are [`cache::ResponseCache`], which coalesces
//! identical in-flight requests and invalidates by tag, and
//! [`pagination::PagedList`], which folds offset-based pages into one
//! deduplicated, order-preserving list.

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod event;
pub mod logging;
pub mod normalize;
pub mod pagination;
pub mod query;
pub mod render;
