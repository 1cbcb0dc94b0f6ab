//! Maps RustScan diagnostics onto error kinds.
//!
//! Only markers known to predict an unusable report are turned into errors. Anything
//! else stays a plain warning for the caller to judge.

use scanbind_common::error::ScanError;

const MALLOC_FAILED: &str = "Malloc Failed!";
const RESOLVE_FAILED: &str = "Error resolving name";

/// Returns the error for the first stderr line carrying a known fatal marker.
pub fn classify<S: AsRef<str>>(lines: &[S]) -> Option<ScanError> {
    lines.iter().find_map(|line| classify_line(line.as_ref()))
}

fn classify_line(line: &str) -> Option<ScanError> {
    if line.contains(MALLOC_FAILED) {
        return Some(ScanError::MallocFailed);
    }
    None
}

/// Classifies the error message a finished report carries.
pub fn classify_scan_error(msg: &str) -> ScanError {
    if msg.contains(RESOLVE_FAILED) {
        ScanError::ResolveName
    } else {
        ScanError::ScanFailed(msg.to_string())
    }
}

/// Splits captured stderr into warning lines, dropping the trailing newline.
pub fn warnings_from_stderr(stderr: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim_matches('\n');
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n').map(str::to_string).collect()
}
