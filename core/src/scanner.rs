//! The scan orchestrator.
//!
//! A [`Scanner`] owns one validated [`ScanConfig`] and turns every call to
//! [`ScanRunner::run`] (or its filtered and progress-reporting variants) into exactly
//! one RustScan invocation:
//!
//! 1. spawn RustScan with XML output on stdout,
//! 2. stream stdout, counting `Open ` announcements and aborting once they exceed
//!    the caller's limit (the target is then presumed to be fronted by a CDN),
//! 3. race process exit against cancellation,
//! 4. classify stderr, extract and parse the XML report, check the report's own
//!    error message and finally apply the caller's filters.
//!
//! The child is reaped or killed on every path out of a run.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use scanbind_common::config::ScanConfig;
use scanbind_common::error::{ScanError, ScanFailure};
use scanbind_common::report::Report;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::filter::ScanFilters;
use crate::{args, diagnostics, locate, parser};

mod process;
mod stream;

use process::{Race, ScanProcess, cancelled, first_of};
use stream::OutputBuffer;

const CHUNK_SIZE: usize = 1024;
const COMPLETE: f32 = 100.0;

/// A successful run: the report plus any non-fatal diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub report: Report,
    pub warnings: Vec<String>,
}

pub type ScanResult = Result<Scan, ScanFailure>;

/// Something that can run a scan.
#[async_trait]
pub trait ScanRunner {
    /// Runs one scan, treating more than `limit` open ports as a CDN.
    async fn run(&self, limit: usize) -> ScanResult;
}

#[derive(Debug)]
pub struct Scanner {
    config: ScanConfig,
    binary: PathBuf,
    args: Vec<String>,
}

impl Scanner {
    /// Resolves the binary and prepares the command line.
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        let binary = match &config.binary_path {
            Some(path) => path.clone(),
            None => locate::find_binary(locate::DEFAULT_BINARY).ok_or(ScanError::NotInstalled)?,
        };
        let args = args::command_line(&config);

        Ok(Self {
            config,
            binary,
            args,
        })
    }

    /// The exact argument vector each run passes to RustScan.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub async fn run_filtered(&self, limit: usize, filters: &ScanFilters) -> ScanResult {
        self.execute(limit, filters, None).await
    }

    /// Like [`Scanner::run_filtered`], also publishing progress percentages.
    ///
    /// Sends never wait: when the channel is full the update is dropped.
    pub async fn run_with_progress(
        &self,
        limit: usize,
        filters: &ScanFilters,
        progress: mpsc::Sender<f32>,
    ) -> ScanResult {
        self.execute(limit, filters, Some(&progress)).await
    }

    async fn execute(
        &self,
        limit: usize,
        filters: &ScanFilters,
        progress: Option<&mpsc::Sender<f32>>,
    ) -> ScanResult {
        let deadline = self.config.deadline.map(|d| Instant::now() + d);
        let cancel = cancelled(self.config.cancel.clone(), deadline);
        tokio::pin!(cancel);

        debug!(binary = %self.binary.display(), args = ?self.args, "Starting RustScan");
        let mut process = ScanProcess::spawn(&self.binary, &self.args)
            .map_err(|e| ScanFailure::new(ScanError::Spawn(e)))?;

        let mut output = OutputBuffer::default();
        let mut chunk = vec![0u8; CHUNK_SIZE];

        loop {
            let read = match first_of(process.read_chunk(&mut chunk), &mut cancel).await {
                Race::Finished(read) => read,
                Race::Cancelled => {
                    process.kill().await;
                    return Err(ScanError::Timeout.into());
                }
            };
            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    process.kill().await;
                    return Err(ScanError::Io(e).into());
                }
            };

            trace!(bytes = n, "stdout chunk");
            let open_ports = output.push(&chunk[..n]);
            if open_ports > limit {
                info!(open_ports, limit, "Open port limit exceeded, CDN suspected");
                process.kill().await;
                return Err(ScanError::CdnSuspected { open_ports, limit }.into());
            }

            if let Some(tx) = progress
                && let Some(percent) = output.take_progress()
            {
                send_progress(tx, percent);
            }
        }

        let status = match first_of(process.wait(), &mut cancel).await {
            Race::Finished(Ok(status)) => status,
            Race::Finished(Err(e)) => {
                process.kill().await;
                return Err(ScanError::Io(e).into());
            }
            Race::Cancelled => {
                process.kill().await;
                return Err(ScanError::Timeout.into());
            }
        };
        debug!(%status, open_ports = output.open_ports(), "RustScan exited");

        // The leader is gone; whatever is left in its group would keep stderr open.
        process.kill_group();
        let stderr = process.collect_stderr(&mut cancel).await;
        let warnings = diagnostics::warnings_from_stderr(&stderr);
        if let Some(error) = diagnostics::classify(&warnings) {
            return Err(ScanFailure::with_warnings(error, warnings));
        }

        let result = self.build_report(&output, warnings, filters);
        if let (Some(tx), Ok(_)) = (progress, &result) {
            send_progress(tx, COMPLETE);
        }
        result
    }

    fn build_report(
        &self,
        output: &OutputBuffer,
        mut warnings: Vec<String>,
        filters: &ScanFilters,
    ) -> ScanResult {
        let payload = output.payload(self.display_target());

        let report = match parser::parse(&payload) {
            Ok(report) => report,
            Err(e) => {
                warnings.push(e.to_string());
                return Err(ScanFailure::with_warnings(ScanError::ParseOutput, warnings));
            }
        };

        if report.stats.finished.has_error() {
            let error = diagnostics::classify_scan_error(&report.stats.finished.error_msg);
            warn!("RustScan reported a scan failure: {}", error);
            return Err(ScanFailure::with_report(error, warnings, report));
        }

        let report = filters.apply(report);
        info!(hosts = report.hosts.len(), "Scan complete");
        Ok(Scan { report, warnings })
    }

    /// Address used for the synthesized report when nothing was found.
    fn display_target(&self) -> &str {
        self.config.targets.first().map(String::as_str).unwrap_or_default()
    }
}

#[async_trait]
impl ScanRunner for Scanner {
    async fn run(&self, limit: usize) -> ScanResult {
        self.execute(limit, &ScanFilters::none(), None).await
    }
}

fn send_progress(tx: &mpsc::Sender<f32>, percent: f32) {
    match tx.try_send(percent) {
        Ok(()) => trace!(percent, "progress sent"),
        Err(TrySendError::Full(_)) => trace!(percent, "progress channel full, update dropped"),
        Err(TrySendError::Closed(_)) => {}
    }
}
