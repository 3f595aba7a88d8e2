//! Crawler module for fetching, paginating and scheduling
//!
//! This module contains the core crawling logic, including:
//! - The renderer seam and its reqwest-backed implementation
//! - Next-page discovery from pagination rules
//! - The frontier with its dedup set
//! - Overall crawl coordination at bounded concurrency

mod coordinator;
mod paginator;
mod renderer;
mod scheduler;

pub use coordinator::{Coordinator, CrawlOptions};
pub use paginator::Paginator;
pub use renderer::{build_http_client, FetchError, HttpRenderer, RenderedPage, Renderer};
pub use scheduler::{Frontier, QueuedUnit, Ready};
