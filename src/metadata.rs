//! # Metadata
//!
//! Host metadata written by a local OneAgent, exported as enrichment dimensions
//!
//! The agent publishes the location of a properties file through an indirection file. Both being
//! absent is normal on hosts without an agent.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// File whose content is the path of the actual metadata properties file
pub const INDIRECTION_FILE: &str = "dt_metadata_e617c525669e072eebe3d0f08212e8f2.properties";

/// Read the agent's metadata, empty when no agent is installed
pub fn read_enrichment_dimensions() -> Vec<(String, String)> {
    read_from(Path::new(INDIRECTION_FILE))
}

/// Read metadata through the given indirection file
pub fn read_from(indirection_file: &Path) -> Vec<(String, String)> {
    let metadata_file = match fs::read_to_string(indirection_file) {
        Ok(content) => content,
        Err(err) => {
            info!("Could not read the metadata indirection file, this is normal if no OneAgent is installed: {err}");
            return Vec::new();
        }
    };

    let metadata_file = metadata_file.trim();
    if metadata_file.is_empty() {
        warn!("Metadata file not specified in the indirection file");
        return Vec::new();
    }

    match fs::read_to_string(metadata_file) {
        Ok(content) => parse(&content),
        Err(err) => {
            info!("Could not read the metadata file {metadata_file}: {err}");
            Vec::new()
        }
    }
}

/// Parse `key=value` lines, split at the first `=`
pub fn parse(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            debug!("Parsing metadata line {line:?}");
            match line.trim().split_once('=') {
                Some((key, value)) if !key.is_empty() && !value.is_empty() => Some((key.to_string(), value.to_string())),
                _ => {
                    warn!("Could not parse metadata line {line:?}");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// A file in the temp dir that is removed on drop
    struct TempFile(PathBuf);

    impl TempFile {
        fn new(name: &str, content: &str) -> Self {
            let path = std::env::temp_dir().join(format!("metrics_dynatrace_{}_{name}", std::process::id()));
            fs::write(&path, content).unwrap();
            Self(path)
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }

    fn pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    #[test]
    fn parse_valid() {
        assert_eq!(
            parse("prop.a=value.a\nprop.b=value.b\n"),
            pairs(&[("prop.a", "value.a"), ("prop.b", "value.b")])
        );
    }

    #[test]
    fn parse_splits_at_first_equals() {
        assert_eq!(parse("key=value=more"), pairs(&[("key", "value=more")]));
        assert_eq!(parse("  key = value  "), pairs(&[("key ", " value")]));
    }

    #[test]
    fn parse_skips_invalid() {
        let content = "=0x5c14d9a68d569861\nkey_no_value=\nno_equals\n\nvalid=yes\n===";
        assert_eq!(parse(content), pairs(&[("valid", "yes")]));
    }

    #[test]
    fn parse_empty() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn read_through_indirection() {
        let metadata = TempFile::new("metadata", "dt.entity.host=HOST-1\ndt.entity.process_group_instance=PGI-2\n");
        let indirection = TempFile::new("indirection", &format!("{}\n", metadata.0.display()));

        assert_eq!(
            read_from(&indirection.0),
            pairs(&[
                ("dt.entity.host", "HOST-1"),
                ("dt.entity.process_group_instance", "PGI-2")
            ])
        );
    }

    #[test]
    fn missing_files() {
        assert!(read_from(Path::new("/nonexistent/metrics_dynatrace/indirection")).is_empty());

        let empty = TempFile::new("empty_indirection", "");
        assert!(read_from(&empty.0).is_empty());

        let dangling = TempFile::new("dangling_indirection", "/nonexistent/metrics_dynatrace/metadata");
        assert!(read_from(&dangling.0).is_empty());
    }
}
