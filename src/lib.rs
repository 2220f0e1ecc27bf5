//! Keyword-driven news crawl engine.
//!
//! A run loads [`config::CrawlTarget`]s from YAML and, for each one, walks
//! every keyword's listing pages with a [`pagination::PaginationStrategy`],
//! fetches matching articles through a rate-limited [`fetch::Fetcher`],
//! extracts them with an [`extract::ExtractorPipeline`] and keeps the ones
//! the [`dedup::DedupIndex`] has not seen yet.
//!
//! See [`orchestrator`] for the loop itself.

pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod orchestrator;
pub mod outputs;
pub mod pagination;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
