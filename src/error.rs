//! Error taxonomy for the crawl engine.
//!
//! Errors are split by how far they are allowed to travel:
//!
//! - [`FetchError`]: surfaced by a [`crate::fetch::Fetcher`] once its retry
//!   budget is spent or a failure is not worth retrying. Transient failures
//!   never leave the fetcher.
//! - [`ExtractionError`]: a page lacked a mandatory field. Costs one item.
//! - [`PaginationError`]: the strategy could not drive the page. Ends one
//!   keyword loop.
//! - [`SessionError`]: the HTTP client or browser could not be acquired.
//!   Ends one target's run, never its siblings.
//! - [`ConfigError`]: rejected at load time, before any request is made.
//! - [`CrawlError`]: either of the two above, as reported for one target.

use std::path::PathBuf;
use thiserror::Error;

/// A fetch that failed permanently.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a status outside the retryable set.
    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// Every attempt failed with a retryable condition.
    #[error("{url}: gave up after {attempts} attempts (last: {last})")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    /// A connection-level failure that retrying will not fix (DNS, TLS, bad body).
    #[error("{url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The browser loaded the page but the readiness marker never appeared.
    #[error("{url}: timed out after {waited_ms}ms waiting for `{marker}`")]
    MarkerTimeout {
        url: String,
        marker: String,
        waited_ms: u128,
    },

    #[error("browser: {0}")]
    Browser(String),

    #[error("invalid url `{0}`")]
    InvalidUrl(String),
}

/// Why a candidate article page did not yield a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("missing mandatory field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("{strategy} pagination needs a browser session")]
    RequiresBrowser { strategy: &'static str },

    #[error(transparent)]
    Driver(#[from] FetchError),
}

/// The crawl session (HTTP client or browser) could not be acquired.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to launch browser: {0}")]
    Browser(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid keywords file {path}: {source}")]
    Keywords {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("target `{target}`: invalid selector `{selector}`: {reason}")]
    Selector {
        target: String,
        selector: String,
        reason: String,
    },

    #[error("target `{target}`: {reason}")]
    Invalid { target: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(target: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why a target produced no run at all.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
