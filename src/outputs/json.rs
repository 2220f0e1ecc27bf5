//! JSON-lines output.
//!
//! Each record becomes one JSON object on its own line, with the same keys
//! and values as the CSV columns. `word_count` stays a number.
//!
//! ```text
//! {"keyword":"BSP","headline":"BSP keeps rates","published_date":"2024-10-03",...}
//! {"keyword":"GCash","headline":"GCash expands","published_date":"unknown",...}
//! ```

use super::OutputRow;
use crate::store::ArticleStore;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Render records as JSON lines, each terminated by `\n`.
pub fn render(store: &ArticleStore) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for record in store {
        out.push_str(&serde_json::to_string(&OutputRow::from(record))?);
        out.push('\n');
    }
    Ok(out)
}

/// Write records to `path` as JSON lines, replacing any existing file.
///
/// # Arguments
///
/// * `store` - Records in acceptance order
/// * `path` - Destination file
///
/// # Returns
///
/// `Ok(())` on success, or an error if serialization or file writing fails.
#[instrument(level = "info", skip_all, fields(path = %path.display(), records = store.len()))]
pub async fn write_json_lines(store: &ArticleStore, path: &Path) -> Result<(), Box<dyn Error>> {
    let lines = render(store)?;
    if let Err(e) = fs::write(path, lines).await {
        error!(error = %e, "Failed to write JSON lines");
        return Err(e.into());
    }
    info!("Wrote JSON lines");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::tests::sample_store;
    use serde_json::Value;

    #[test]
    fn test_one_object_per_line() {
        let out = render(&sample_store()).unwrap();
        let lines: Vec<Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["keyword"], "BSP");
        assert_eq!(lines[0]["word_count"], 4);
        assert_eq!(lines[0]["content"], "First paragraph.\n\nSecond one.");
        assert_eq!(lines[1]["published_date"], "unknown");
        assert_eq!(lines[1]["tags"], "GCash");
    }

    #[test]
    fn test_empty_store_renders_nothing() {
        assert_eq!(render(&ArticleStore::new()).unwrap(), "");
    }

    #[tokio::test]
    async fn test_write_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        write_json_lines(&sample_store(), &path).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
