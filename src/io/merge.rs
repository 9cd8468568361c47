//! Concatenate per-chunk result files into one corpus file.
//!
//! Each sampling chunk appends to its own `<id>.acquisition_external_product`
//! file. We collect every file matching the configured glob pattern, sort the
//! paths lexicographically, and write them back to back.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// What the merge step found.
#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub output: PathBuf,
    pub files: Vec<PathBuf>,
    pub bytes: usize,
}

/// Concatenate files matching `pattern` into `output`.
///
/// `output` itself is skipped even if it matches the pattern, so re-running an
/// analysis never feeds the previous corpus back in.
pub fn concatenate_result_files(pattern: &str, output: &Path) -> Result<MergeSummary, AppError> {
    let entries = glob::glob(pattern)
        .map_err(|e| AppError::new(2, format!("Invalid file pattern '{pattern}': {e}")))?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() && !same_file(&path, output) => files.push(path),
            Ok(_) => {}
            Err(e) => log::warn!("Skipping unreadable path while globbing '{pattern}': {e}"),
        }
    }
    files.sort();

    let mut out = File::create(output)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", output.display())))?;

    let mut bytes = 0usize;
    for path in &files {
        let content = fs::read(path)
            .map_err(|e| AppError::new(2, format!("Failed to read '{}': {e}", path.display())))?;
        out.write_all(&content)
            .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", output.display())))?;
        bytes += content.len();
    }

    log::info!(
        "Concatenated {} result file(s) ({bytes} bytes) into {}",
        files.len(),
        output.display()
    );

    Ok(MergeSummary {
        output: output.to_path_buf(),
        files,
        bytes,
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_in_sorted_order_and_skips_output() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1.acquisition_external_product"), "b\n").unwrap();
        fs::write(dir.path().join("0.acquisition_external_product"), "a\n").unwrap();
        fs::write(dir.path().join("unrelated.txt"), "zzz\n").unwrap();

        let output = dir.path().join("merged.acquisition_external_product_all");
        fs::write(&output, "stale\n").unwrap();

        let pattern = format!("{}/*.acquisition_external_product*", dir.path().display());
        let summary = concatenate_result_files(&pattern, &output).unwrap();

        assert_eq!(summary.files.len(), 2);
        assert_eq!(fs::read_to_string(&output).unwrap(), "a\nb\n");
    }

    #[test]
    fn no_matches_yields_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("merged");
        let pattern = format!("{}/*.nothing", dir.path().display());
        let summary = concatenate_result_files(&pattern, &output).unwrap();
        assert!(summary.files.is_empty());
        assert_eq!(fs::read_to_string(&output).unwrap(), "");
    }
}
