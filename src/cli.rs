//! Command-line interface definitions for newscrawl.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every option can also be provided through an environment variable.

use crate::outputs::OutputFormat;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the newscrawl binary.
///
/// # Examples
///
/// ```sh
/// # Crawl every configured target, writing CSV and JSON lines
/// newscrawl -c targets.yaml -o ./out
///
/// # One target, CSV only, at most three listing pages per keyword
/// newscrawl -c targets.yaml -o ./out --target BusinessMirror --format csv --max-pages 3
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML file declaring crawl targets
    #[arg(short, long, env = "NEWSCRAWL_CONFIG")]
    pub config: PathBuf,

    /// Root directory for dated output files
    #[arg(short, long, env = "NEWSCRAWL_OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    /// Output files to write
    #[arg(short, long, value_enum, env = "NEWSCRAWL_FORMAT", default_value_t = OutputFormat::Both)]
    pub format: OutputFormat,

    /// Only crawl targets with these names (repeatable)
    #[arg(short, long = "target")]
    pub targets: Vec<String>,

    /// Override every target's listing page ceiling
    #[arg(long, env = "NEWSCRAWL_MAX_PAGES")]
    pub max_pages: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "newscrawl",
            "--config",
            "targets.yaml",
            "--output-dir",
            "./out",
            "--format",
            "csv",
            "--max-pages",
            "3",
        ]);

        assert_eq!(cli.config, PathBuf::from("targets.yaml"));
        assert_eq!(cli.output_dir, PathBuf::from("./out"));
        assert_eq!(cli.format, OutputFormat::Csv);
        assert_eq!(cli.max_pages, Some(3));
        assert!(cli.targets.is_empty());
    }

    #[test]
    fn test_cli_short_flags_and_repeated_targets() {
        let cli = Cli::parse_from([
            "newscrawl",
            "-c",
            "/etc/newscrawl.yaml",
            "-o",
            "/tmp/out",
            "-t",
            "BusinessMirror",
            "-t",
            "Bilyonaryo",
        ]);

        assert_eq!(cli.config, PathBuf::from("/etc/newscrawl.yaml"));
        assert_eq!(cli.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(cli.targets, vec!["BusinessMirror", "Bilyonaryo"]);
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        let result = Cli::try_parse_from(["newscrawl", "-c", "t.yaml", "--format", "xml"]);
        assert!(result.is_err());
    }
}
