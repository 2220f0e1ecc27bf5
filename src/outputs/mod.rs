//! Output writers for accepted articles.
//!
//! Every format renders the same fixed column contract, in this order:
//!
//! | Column | Source |
//! |--------|--------|
//! | `keyword` | keyword that matched the listing entry |
//! | `headline` | article headline |
//! | `published_date` | `YYYY-MM-DD` or `unknown` |
//! | `byline` | author, or `unknown` |
//! | `section` | section name, possibly empty |
//! | `word_count` | whitespace tokens in `content` |
//! | `content` | paragraphs joined by a blank line |
//! | `tags` | tag list joined with `", "` |
//!
//! # Submodules
//!
//! - [`csv`]: one header row plus one row per record
//! - [`json`]: one JSON object per line
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! └── 2024/
//!     └── 10/
//!         └── 03/
//!             ├── BusinessMirror.csv
//!             └── BusinessMirror.jsonl
//! ```

use crate::models::ArticleRecord;
use crate::store::ArticleStore;
use crate::utils::dated_output_dir;
use chrono::NaiveDate;
use clap::ValueEnum;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub mod csv;
pub mod json;

/// Column names, in output order.
pub const COLUMNS: [&str; 8] = [
    "keyword",
    "headline",
    "published_date",
    "byline",
    "section",
    "word_count",
    "content",
    "tags",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
    Both,
}

impl OutputFormat {
    fn csv(self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Both)
    }

    fn json(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Both)
    }
}

/// One record flattened into the column contract. Field order is the column order.
#[derive(Debug, Serialize)]
pub struct OutputRow<'a> {
    pub keyword: &'a str,
    pub headline: &'a str,
    pub published_date: String,
    pub byline: &'a str,
    pub section: &'a str,
    pub word_count: usize,
    pub content: &'a str,
    pub tags: String,
}

impl<'a> From<&'a ArticleRecord> for OutputRow<'a> {
    fn from(record: &'a ArticleRecord) -> Self {
        Self {
            keyword: record.keyword(),
            headline: record.headline(),
            published_date: record.published().to_string(),
            byline: record.byline(),
            section: record.section(),
            word_count: record.word_count(),
            content: record.content(),
            tags: record.tags().join(", "),
        }
    }
}

/// File stem for a target name: anything but ASCII letters, digits, `-` and `_` becomes `_`.
pub fn file_stem(target: &str) -> String {
    target
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Write one target's records under the dated directory for `date`.
///
/// # Arguments
///
/// * `store` - Records in acceptance order
/// * `output_dir` - Root output directory
/// * `date` - Run date selecting the `YYYY/MM/DD` subdirectory
/// * `target` - Target name, used as the file stem
/// * `format` - Which files to write
///
/// # Returns
///
/// The paths written, or an error if a directory or file cannot be written.
#[instrument(level = "info", skip(store, output_dir), fields(records = store.len(), output_dir = %output_dir.display()))]
pub async fn write_target(
    store: &ArticleStore,
    output_dir: &Path,
    date: NaiveDate,
    target: &str,
    format: OutputFormat,
) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let dir = dated_output_dir(output_dir, date);
    tokio::fs::create_dir_all(&dir).await?;

    let stem = file_stem(target);
    let mut written = Vec::new();
    if format.csv() {
        let path = dir.join(format!("{stem}.csv"));
        csv::write_csv(store, &path).await?;
        written.push(path);
    }
    if format.json() {
        let path = dir.join(format!("{stem}.jsonl"));
        json::write_json_lines(store, &path).await?;
        written.push(path);
    }

    info!(files = written.len(), "Wrote target output");
    Ok(written)
}
