//! # Scan Report Model
//!
//! Passive data structures describing one completed scan. Everything here is
//! created fresh by the parser on each run and owned by the caller afterwards.
//!
//! ```text
//! Report ─┬─ Host ─┬─ Address
//!         │        ├─ Hostname
//!         │        └─ Port ── State, Service
//!         └─ Stats ── Finished, HostStats
//! ```

/// Root result of one scan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Report {
    pub scanner: String,
    pub args: String,
    /// Unix timestamp of the scan start, as reported by the tool.
    pub start: i64,
    pub version: String,
    pub hosts: Vec<Host>,
    pub stats: Stats,
}

/// One scanned endpoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Host {
    pub status: Status,
    pub addresses: Vec<Address>,
    pub hostnames: Vec<Hostname>,
    pub ports: Vec<Port>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl Host {
    /// The address used when presenting this host.
    pub fn primary_address(&self) -> Option<&Address> {
        self.addresses.first()
    }

    /// Hosts without an address or without ports carry nothing worth showing.
    pub fn is_displayable(&self) -> bool {
        !self.addresses.is_empty() && !self.ports.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Status {
    pub state: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Address {
    pub addr: String,
    /// `ipv4`, `ipv6` or `mac`.
    pub addr_type: String,
    pub vendor: Option<String>,
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.addr)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hostname {
    pub name: String,
    /// `user` or `PTR`.
    pub kind: String,
}

/// One scanned port on a host.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Port {
    pub id: u16,
    pub protocol: String,
    pub state: State,
    pub service: Service,
}

impl Port {
    pub fn is_open(&self) -> bool {
        self.state.state == "open"
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct State {
    /// `open`, `closed`, `filtered`, ...
    pub state: String,
    pub reason: String,
    pub reason_ttl: u32,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.state)
    }
}

/// Whatever the scanner believes is listening on a port.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Service {
    pub name: String,
    pub product: Option<String>,
    pub version: Option<String>,
    pub extra_info: Option<String>,
    pub method: Option<String>,
    pub confidence: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stats {
    pub finished: Finished,
    pub hosts: HostStats,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Finished {
    pub time: i64,
    pub time_str: String,
    /// Wall-clock duration of the scan in seconds.
    pub elapsed: f64,
    pub summary: String,
    pub exit: String,
    /// Non-empty when the tool finished but flagged the scan itself as failed.
    pub error_msg: String,
}

impl Finished {
    pub fn has_error(&self) -> bool {
        !self.error_msg.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostStats {
    pub up: u32,
    pub down: u32,
    pub total: u32,
}
