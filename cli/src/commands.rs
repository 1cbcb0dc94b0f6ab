pub mod scan;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use scanbind_common::config::{ScanConfig, ScanOrder};
use scanbind_common::error::ScanError;
use tokio_util::sync::CancellationToken;

/// Open ports tolerated before a target is treated as CDN-fronted.
const DEFAULT_LIMIT: usize = 30;

#[derive(Parser)]
#[command(name = "scanbind")]
#[command(about = "Runs RustScan and reports what it found.")]
pub struct CommandLine {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan one or more hosts
    #[command(alias = "s")]
    Scan(ScanArgs),
    /// Print the RustScan command line a scan would use
    #[command(alias = "a")]
    Args(ScanArgs),
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Hosts, IPs or CIDR ranges to scan
    pub targets: Vec<String>,

    /// Ports ("80,443") or a range ("1-1000"); may be repeated
    #[arg(short, long = "ports")]
    pub ports: Vec<String>,

    /// Abort when more open ports than this are reported
    #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
    pub limit: usize,

    /// Give up on the whole scan after this many seconds
    #[arg(long)]
    pub deadline: Option<u64>,

    #[arg(short, long)]
    pub batch_size: Option<u32>,

    /// Milliseconds before a port is assumed closed
    #[arg(short, long)]
    pub timeout: Option<u32>,

    #[arg(long)]
    pub scan_order: Option<ScanOrder>,

    #[arg(short, long)]
    pub ulimit: Option<u64>,

    /// Continue a paused scan
    #[arg(long)]
    pub resume: bool,

    /// Path to the rustscan binary (default: search PATH)
    #[arg(long)]
    pub binary: Option<PathBuf>,

    /// Only report open ports
    #[arg(long)]
    pub open_only: bool,

    /// Show a progress bar fed by nmap's task progress
    #[arg(long)]
    pub progress: bool,

    /// Extra arguments passed to RustScan verbatim
    #[arg(last = true)]
    pub extra: Vec<String>,
}

impl ScanArgs {
    pub fn to_config(&self, cancel: CancellationToken) -> Result<ScanConfig, ScanError> {
        let mut builder = ScanConfig::builder()
            .targets(self.targets.iter().cloned())
            .resume(self.resume)
            .custom_args(self.extra.iter().cloned())
            .cancel_token(cancel);

        for ports in &self.ports {
            builder = builder.ports(ports.clone());
        }
        if let Some(secs) = self.deadline {
            builder = builder.deadline(std::time::Duration::from_secs(secs));
        }
        if let Some(size) = self.batch_size {
            builder = builder.batch_size(size);
        }
        if let Some(millis) = self.timeout {
            builder = builder.timeout_ms(millis);
        }
        if let Some(order) = self.scan_order {
            builder = builder.scan_order(order);
        }
        if let Some(ulimit) = self.ulimit {
            builder = builder.ulimit(ulimit);
        }
        if let Some(binary) = &self.binary {
            builder = builder.binary_path(binary.clone());
        }

        builder.build()
    }
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
