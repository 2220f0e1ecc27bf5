//! CSV output.
//!
//! The header row is always written, so a run without records still yields
//! a valid file.

use super::{COLUMNS, OutputRow};
use crate::store::ArticleStore;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Render records as CSV bytes.
pub fn render(store: &ArticleStore) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut writer = ::csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for record in store {
        writer.serialize(OutputRow::from(record))?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(bytes)
}

/// Write records to `path`, replacing any existing file.
#[instrument(level = "info", skip(store, path), fields(path = %path.display(), records = store.len()))]
pub async fn write_csv(store: &ArticleStore, path: &Path) -> Result<(), Box<dyn Error>> {
    let bytes = render(store)?;
    fs::write(path, bytes).await?;
    info!("Wrote CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::tests::sample_store;

    #[test]
    fn test_render_header_and_rows() {
        let bytes = render(&sample_store()).unwrap();
        let mut reader = ::csv::Reader::from_reader(bytes.as_slice());

        let headers: Vec<_> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(headers, COLUMNS);

        let rows: Vec<::csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "BSP keeps rates, \"for now\"");
        assert_eq!(&rows[0][2], "2024-10-03");
        assert_eq!(&rows[0][5], "4");
        assert_eq!(&rows[0][6], "First paragraph.\n\nSecond one.");
        assert_eq!(&rows[1][2], "unknown");
        assert_eq!(&rows[1][7], "GCash");
    }

    #[test]
    fn test_empty_store_renders_header_only() {
        let bytes = render(&ArticleStore::new()).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "keyword,headline,published_date,byline,section,word_count,content,tags\n"
        );
    }

    #[tokio::test]
    async fn test_write_csv_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale").unwrap();

        write_csv(&sample_store(), &path).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("keyword,headline"));
    }
}
