//! Reads UTF-8 text files within a size cap and extension allow-list.

use std::fs;
use std::path::Path;

use tracing::info;

use super::{Tool, ToolOutput};

#[derive(Debug, Clone)]
pub struct FileReader {
    max_bytes: u64,
    allowed_extensions: Vec<String>,
    description: String,
}

impl FileReader {
    pub fn new(max_bytes: u64, allowed_extensions: Vec<String>) -> Self {
        let allowed_extensions: Vec<String> = allowed_extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        let description = format!(
            "Read a text file by path. Supported extensions: {}.",
            allowed_extensions.join(", ")
        );
        Self {
            max_bytes,
            allowed_extensions,
            description,
        }
    }

    fn read(&self, raw: &str) -> Result<String, ToolOutput> {
        let trimmed = raw.trim().trim_matches(|c: char| c == '"' || c == '\'');
        let path = Path::new(trimmed);
        if trimmed.is_empty() || !path.exists() {
            return Err(ToolOutput::failure(
                "FileNotFound",
                format!("File not found: {trimmed}"),
            ));
        }
        let metadata = fs::metadata(path)
            .map_err(|e| ToolOutput::failure("ReadError", format!("Failed to stat {trimmed}: {e}")))?;
        if !metadata.is_file() {
            return Err(ToolOutput::failure(
                "NotAFile",
                format!("Path is not a file: {trimmed}"),
            ));
        }
        if metadata.len() > self.max_bytes {
            return Err(ToolOutput::failure(
                "FileTooLarge",
                format!(
                    "File too large: {} bytes (max {} bytes)",
                    metadata.len(),
                    self.max_bytes
                ),
            ));
        }
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if !self.allowed_extensions.contains(&extension) {
            return Err(ToolOutput::failure(
                "UnsupportedFormat",
                format!(
                    "Unsupported format: '{extension}'. Supported: {}",
                    self.allowed_extensions.join(", ")
                ),
            ));
        }

        info!(path = %path.display(), bytes = metadata.len(), "reading file");
        let content = fs::read_to_string(path)
            .map_err(|e| ToolOutput::failure("ReadError", format!("Failed to read file: {e}")))?;
        if extension == "csv" {
            return Ok(summarize_csv(&content));
        }
        Ok(content)
    }
}

impl Tool for FileReader {
    fn name(&self) -> &str {
        "file_reader"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn execute(&self, input: &str) -> ToolOutput {
        match self.read(input) {
            Ok(content) => ToolOutput::ok(content),
            Err(failure) => failure,
        }
    }
}

/// Prefix CSV content with its row and column counts and the header names.
fn summarize_csv(content: &str) -> String {
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return "CSV summary: empty file".to_string();
    };
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let rows = lines.count();
    format!(
        "CSV summary: {rows} rows x {} columns\nColumns: {}\n\n{content}",
        columns.len(),
        columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(max_bytes: u64) -> FileReader {
        FileReader::new(max_bytes, vec!["txt".to_string(), ".CSV".to_string()])
    }

    #[test]
    fn reads_text_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("notes.txt");
        fs::write(&path, "hello\nworld\n").expect("write");

        let output = reader(1024).execute(&format!("  {}  ", path.display()));
        assert!(output.success);
        assert_eq!(output.value.as_deref(), Some("hello\nworld\n"));
    }

    #[test]
    fn csv_gets_summary_header() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sales.csv");
        fs::write(&path, "region,amount\nnorth,10\nsouth,20\n").expect("write");

        let output = reader(1024).execute(&path.display().to_string());
        let value = output.value.expect("value");
        assert!(value.starts_with("CSV summary: 2 rows x 2 columns\nColumns: region, amount\n\n"));
        assert!(value.ends_with("south,20\n"));
    }

    #[test]
    fn failure_kinds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let big = temp.path().join("big.txt");
        fs::write(&big, "x".repeat(64)).expect("write");
        let binary = temp.path().join("image.png");
        fs::write(&binary, "png").expect("write");
        let invalid = temp.path().join("latin1.txt");
        fs::write(&invalid, [0xff, 0xfe, 0x00]).expect("write");

        let kind = |input: &str, max: u64| reader(max).execute(input).error_kind.expect("kind");
        assert_eq!(kind(&temp.path().join("missing.txt").display().to_string(), 1024), "FileNotFound");
        assert_eq!(kind(&temp.path().display().to_string(), 1024), "NotAFile");
        assert_eq!(kind(&big.display().to_string(), 10), "FileTooLarge");
        assert_eq!(kind(&binary.display().to_string(), 1024), "UnsupportedFormat");
        assert_eq!(kind(&invalid.display().to_string(), 1024), "ReadError");
    }
}
