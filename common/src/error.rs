//! Failure taxonomy for a scan.

use std::io;

use thiserror::Error;

use crate::report::Report;

#[derive(Error, Debug)]
pub enum ScanError {
    /// Nothing named `rustscan` was found on `PATH` and no explicit path was configured.
    #[error("RustScan binary was not found")]
    NotInstalled,

    #[error("invalid scan configuration: {0}")]
    InvalidConfig(String),

    #[error("unable to start RustScan: {0}")]
    Spawn(#[source] io::Error),

    #[error("I/O error while reading RustScan output: {0}")]
    Io(#[from] io::Error),

    /// The deadline elapsed or the scan was cancelled before the process exited.
    #[error("RustScan scan timed out")]
    Timeout,

    /// More open ports than the caller's limit; the target is presumed to sit behind a CDN.
    #[error("CDN suspected: {open_ports} open ports reported, limit is {limit}")]
    CdnSuspected { open_ports: usize, limit: usize },

    #[error("malloc failed, probably out of space")]
    MallocFailed,

    #[error("unable to parse RustScan output, see warnings for details")]
    ParseOutput,

    #[error("RustScan could not resolve a name")]
    ResolveName,

    /// Scan-level error message from the report that matches no known pattern.
    #[error("{0}")]
    ScanFailed(String),
}

impl ScanError {
    /// Errors reported by the tool about the scan itself, which still come with a report.
    pub fn is_scan_level(&self) -> bool {
        matches!(self, ScanError::ResolveName | ScanError::ScanFailed(_))
    }
}

/// A failed run.
///
/// Carries whatever warnings were collected before the failure. `report` is only
/// present for scan-level failures, where the tool's partial result is still useful.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ScanFailure {
    #[source]
    pub error: ScanError,
    pub warnings: Vec<String>,
    pub report: Option<Report>,
}

impl ScanFailure {
    pub fn new(error: ScanError) -> Self {
        Self {
            error,
            warnings: Vec::new(),
            report: None,
        }
    }

    pub fn with_warnings(error: ScanError, warnings: Vec<String>) -> Self {
        Self {
            error,
            warnings,
            report: None,
        }
    }

    pub fn with_report(error: ScanError, warnings: Vec<String>, report: Report) -> Self {
        Self {
            error,
            warnings,
            report: Some(report),
        }
    }
}

impl From<ScanError> for ScanFailure {
    fn from(error: ScanError) -> Self {
        Self::new(error)
    }
}
