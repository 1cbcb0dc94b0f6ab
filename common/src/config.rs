//! # Scan Configuration
//!
//! Everything a single run needs, gathered up front and validated once.
//! A [`ScanConfig`] cannot be modified after [`ScanConfigBuilder::build`], so a scan
//! in progress always sees the settings it started with.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ScanError;

/// Order in which RustScan walks the port list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanOrder {
    #[default]
    Serial,
    Random,
}

impl fmt::Display for ScanOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOrder::Serial => f.write_str("Serial"),
            ScanOrder::Random => f.write_str("Random"),
        }
    }
}

impl FromStr for ScanOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Ok(ScanOrder::Serial),
            "random" => Ok(ScanOrder::Random),
            _ => Err(format!("invalid scan order: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub targets: Vec<String>,
    /// Port specs as given, e.g. `"80"`, `"80,443"` or `"1-1000"`.
    pub ports: Vec<String>,
    pub batch_size: Option<u32>,
    /// Per-port timeout in milliseconds before a port is assumed closed.
    pub timeout_ms: Option<u32>,
    pub scan_order: Option<ScanOrder>,
    pub ulimit: Option<u64>,
    pub resume: bool,
    pub custom_args: Vec<String>,
    pub binary_path: Option<PathBuf>,
    /// Upper bound on the whole run, measured from the moment it starts.
    pub deadline: Option<Duration>,
    pub cancel: CancellationToken,
}

impl ScanConfig {
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    targets: Vec<String>,
    ports: Vec<String>,
    batch_size: Option<u32>,
    timeout_ms: Option<u32>,
    scan_order: Option<ScanOrder>,
    ulimit: Option<u64>,
    resume: bool,
    custom_args: Vec<String>,
    binary_path: Option<PathBuf>,
    deadline: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl ScanConfigBuilder {
    pub fn targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets.extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Adds a port spec. Repeated calls accumulate.
    pub fn ports(mut self, ports: impl Into<String>) -> Self {
        self.ports.push(ports.into());
        self
    }

    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn timeout_ms(mut self, millis: u32) -> Self {
        self.timeout_ms = Some(millis);
        self
    }

    pub fn scan_order(mut self, order: ScanOrder) -> Self {
        self.scan_order = Some(order);
        self
    }

    pub fn ulimit(mut self, ulimit: u64) -> Self {
        self.ulimit = Some(ulimit);
        self
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Raw arguments passed to the binary untouched.
    pub fn custom_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn binary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_path = Some(path.into());
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Result<ScanConfig, ScanError> {
        if self.targets.is_empty() && !self.resume {
            return Err(ScanError::InvalidConfig("no targets given".into()));
        }
        if let Some(blank) = self.targets.iter().find(|t| t.trim().is_empty()) {
            return Err(ScanError::InvalidConfig(format!("blank target {blank:?}")));
        }
        for spec in &self.ports {
            validate_port_spec(spec)?;
        }
        if self.batch_size == Some(0) {
            return Err(ScanError::InvalidConfig("batch size must be positive".into()));
        }

        Ok(ScanConfig {
            targets: self.targets,
            ports: self.ports,
            batch_size: self.batch_size,
            timeout_ms: self.timeout_ms,
            scan_order: self.scan_order,
            ulimit: self.ulimit,
            resume: self.resume,
            custom_args: self.custom_args,
            binary_path: self.binary_path,
            deadline: self.deadline,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

/// Accepts comma separated ports and `lo-hi` ranges within 1..=65535.
fn validate_port_spec(spec: &str) -> Result<(), ScanError> {
    let invalid = |why: &str| ScanError::InvalidConfig(format!("invalid port spec {spec:?}: {why}"));

    if spec.is_empty() {
        return Err(invalid("empty"));
    }

    for part in spec.split(',') {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo = parse_port(lo).ok_or_else(|| invalid("bad range start"))?;
                let hi = parse_port(hi).ok_or_else(|| invalid("bad range end"))?;
                if lo > hi {
                    return Err(invalid("range start after end"));
                }
            }
            None => {
                parse_port(part).ok_or_else(|| invalid("bad port"))?;
            }
        }
    }
    Ok(())
}

fn parse_port(s: &str) -> Option<u16> {
    match s.trim().parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}
