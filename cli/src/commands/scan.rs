use std::time::Instant;

use colored::*;
use scanbind_common::error::{ScanError, ScanFailure};
use scanbind_common::report::{Port, Report};
use scanbind_core::{Scan, ScanFilters, Scanner};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::commands::ScanArgs;
use crate::terminal::{print, spinner};

const PROGRESS_BUFFER: usize = 16;

pub async fn scan(args: ScanArgs) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let scanner = Scanner::new(args.to_config(cancel)?)?;
    let filters = if args.open_only {
        ScanFilters::none().with_port(Port::is_open)
    } else {
        ScanFilters::none()
    };

    info!("Running {} {}", scanner.binary().display(), scanner.args().join(" "));
    let start_time = Instant::now();

    let result = if args.progress {
        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let bar = spinner::follow_progress(rx);
        let result = scanner.run_with_progress(args.limit, &filters, tx).await;
        progress_display_finished(bar).await;
        result
    } else {
        let pb = spinner::start_spinner("Scanning...");
        let result = scanner.run_filtered(args.limit, &filters).await;
        pb.finish_and_clear();
        result
    };

    let total: ColoredString = format!("{:.2}s", start_time.elapsed().as_secs_f64()).yellow();
    match result {
        Ok(Scan { report, warnings }) => {
            print::warnings(&warnings);
            print::report(&report);
            info!("Finished in {}", total);
            Ok(())
        }
        Err(failure) => handle_failure(failure),
    }
}

fn handle_failure(failure: ScanFailure) -> anyhow::Result<()> {
    print::warnings(&failure.warnings);

    if let ScanError::CdnSuspected { open_ports, limit } = failure.error {
        warn!(
            "{} open ports exceed the limit of {}, target is likely behind a CDN",
            open_ports, limit
        );
        return Ok(());
    }

    if let Some(report) = partial_report(&failure) {
        print::report(report);
    }
    Err(failure.into())
}

/// The report worth showing for a failed run: only scan-level errors carry one.
fn partial_report(failure: &ScanFailure) -> Option<&Report> {
    failure
        .report
        .as_ref()
        .filter(|_| failure.error.is_scan_level())
}

async fn progress_display_finished(bar: JoinHandle<()>) -> bool {
    match bar.await {
        Ok(()) => true,
        Err(e) => {
            warn!("progress display task failed: {}", e);
            false
        }
    }
}

pub fn show_args(args: ScanArgs) -> anyhow::Result<()> {
    let scanner = Scanner::new(args.to_config(CancellationToken::new())?)?;
    print::print(&format!("{} {}", scanner.binary().display(), scanner.args().join(" ")));
    Ok(())
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping scan");
            cancel.cancel();
        }
    });
}
