//! Byte-exact comparison of runsql output against golden files.
//!
//! Exactness is the contract: runsql's formatting must reproduce the golden
//! bytes, so there is no normalization or tolerance of any kind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonOutcome {
    pub expected: PathBuf,
    pub actual: PathBuf,
    pub matched: bool,
    pub expected_sha256: String,
    pub actual_sha256: String,
    /// Offset of the first differing byte (or of the shorter file's end).
    pub first_difference: Option<usize>,
    /// Actual content with newlines removed; only populated on mismatch.
    pub actual_content: Option<String>,
}

/// Compare two files without raising on mismatch.
pub fn compare_files(expected: &Path, actual: &Path) -> HarnessResult<ComparisonOutcome> {
    if !expected.is_file() {
        return Err(HarnessError::MissingFixture(expected.to_path_buf()));
    }
    let expected_bytes = fs::read(expected)?;
    let actual_bytes = fs::read(actual)?;

    let first_difference = first_difference(&expected_bytes, &actual_bytes);
    let matched = first_difference.is_none();
    let actual_content =
        (!matched).then(|| collapse_newlines(&String::from_utf8_lossy(&actual_bytes)));

    Ok(ComparisonOutcome {
        expected: expected.to_path_buf(),
        actual: actual.to_path_buf(),
        matched,
        expected_sha256: sha256_bytes_hex(&expected_bytes),
        actual_sha256: sha256_bytes_hex(&actual_bytes),
        first_difference,
        actual_content,
    })
}

/// Compare and raise [`HarnessError::OutputMismatch`] on any difference,
/// after dumping the actual content for diagnosis.
pub fn assert_files_match(expected: &Path, actual: &Path) -> HarnessResult<ComparisonOutcome> {
    let outcome = compare_files(expected, actual)?;
    if outcome.matched {
        tracing::debug!(
            expected = %expected.display(),
            actual = %actual.display(),
            "output matches golden file"
        );
        return Ok(outcome);
    }

    let content = outcome.actual_content.as_deref().unwrap_or_default();
    tracing::error!(
        expected = %expected.display(),
        actual = %actual.display(),
        first_difference = ?outcome.first_difference,
        expected_sha256 = %outcome.expected_sha256,
        actual_sha256 = %outcome.actual_sha256,
        "output differs from golden file"
    );
    eprintln!();
    eprintln!("File contents:");
    eprintln!("{content}");
    eprintln!();

    Err(HarnessError::OutputMismatch {
        expected: expected.to_path_buf(),
        actual: actual.to_path_buf(),
    })
}

fn first_difference(left: &[u8], right: &[u8]) -> Option<usize> {
    left.iter()
        .zip(right.iter())
        .position(|(a, b)| a != b)
        .or_else(|| (left.len() != right.len()).then(|| left.len().min(right.len())))
}

fn collapse_newlines(text: &str) -> String {
    text.replace('\n', "")
}

fn sha256_bytes_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
