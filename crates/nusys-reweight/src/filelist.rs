use std::fs;
use std::path::Path;

use nusys_core::errors::{ErrorInfo, NusysError};

/// Parses a file list: one identifier per line, blank lines and `#`
/// comments skipped, relative entries joined onto `base_dir` when given.
pub fn parse_file_list(contents: &str, base_dir: Option<&Path>) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match base_dir {
            Some(base) if Path::new(line).is_relative() => base.join(line).display().to_string(),
            _ => line.to_string(),
        })
        .collect()
}

/// Reads and parses a file list from disk.
pub fn load_file_list(path: &Path, base_dir: Option<&Path>) -> Result<Vec<String>, NusysError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        NusysError::Io(
            ErrorInfo::new("file_list", "failed to read file list")
                .with_context("file", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })?;
    Ok(parse_file_list(&contents, base_dir))
}
