//! Post-scan narrowing of a report.
//!
//! Both filters build a new [`Report`] and leave their input untouched.

use std::fmt;

use scanbind_common::report::{Host, Port, Report};

pub type HostPredicate = Box<dyn Fn(&Host) -> bool + Send + Sync>;
pub type PortPredicate = Box<dyn Fn(&Port) -> bool + Send + Sync>;

/// Keeps only hosts for which `keep` returns true, in their original order.
pub fn filter_hosts<F>(report: &Report, keep: F) -> Report
where
    F: Fn(&Host) -> bool,
{
    Report {
        hosts: report.hosts.iter().filter(|h| keep(h)).cloned().collect(),
        ..report_without_hosts(report)
    }
}

/// Keeps only ports for which `keep` returns true, on every host.
pub fn filter_ports<F>(report: &Report, keep: F) -> Report
where
    F: Fn(&Port) -> bool,
{
    let hosts = report
        .hosts
        .iter()
        .map(|host| Host {
            ports: host.ports.iter().filter(|p| keep(p)).cloned().collect(),
            ..host_without_ports(host)
        })
        .collect();

    Report {
        hosts,
        ..report_without_hosts(report)
    }
}

fn report_without_hosts(report: &Report) -> Report {
    Report {
        scanner: report.scanner.clone(),
        args: report.args.clone(),
        start: report.start,
        version: report.version.clone(),
        hosts: Vec::new(),
        stats: report.stats.clone(),
    }
}

fn host_without_ports(host: &Host) -> Host {
    Host {
        status: host.status.clone(),
        addresses: host.addresses.clone(),
        hostnames: host.hostnames.clone(),
        ports: Vec::new(),
        start_time: host.start_time,
        end_time: host.end_time,
    }
}

/// Predicates applied after a successful parse. Passed per call, never stored.
#[derive(Default)]
pub struct ScanFilters {
    pub host: Option<HostPredicate>,
    pub port: Option<PortPredicate>,
}

impl ScanFilters {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_host<F>(mut self, keep: F) -> Self
    where
        F: Fn(&Host) -> bool + Send + Sync + 'static,
    {
        self.host = Some(Box::new(keep));
        self
    }

    pub fn with_port<F>(mut self, keep: F) -> Self
    where
        F: Fn(&Port) -> bool + Send + Sync + 'static,
    {
        self.port = Some(Box::new(keep));
        self
    }

    /// Ports first, then hosts, so a host predicate sees the narrowed port list.
    pub fn apply(&self, report: Report) -> Report {
        let report = match &self.port {
            Some(keep) => filter_ports(&report, keep),
            None => report,
        };
        match &self.host {
            Some(keep) => filter_hosts(&report, keep),
            None => report,
        }
    }
}

impl fmt::Debug for ScanFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanFilters")
            .field("host", &self.host.is_some())
            .field("port", &self.port.is_some())
            .finish()
    }
}
