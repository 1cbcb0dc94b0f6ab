//! Parser for RustScan's XML report.
//!
//! RustScan hands its findings to nmap, so the report is nmap's `-oX` format.
//! Only the parts the model needs are read; unknown elements are skipped.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use thiserror::Error;

use scanbind_common::report::{
    Address, Finished, Host, HostStats, Hostname, Port, Report, Service, State, Stats, Status,
};

const ROOT_ELEMENT: &[u8] = b"nmaprun";

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("report is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("report contains no root element")]
    MissingRoot,

    #[error("unexpected root element <{0}>, expected <nmaprun>")]
    UnexpectedRoot(String),

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("report does not match the expected schema: {0}")]
    Schema(#[from] quick_xml::DeError),
}

/// Parses a complete XML report.
pub fn parse(bytes: &[u8]) -> Result<Report, ParseError> {
    let text = std::str::from_utf8(bytes)?;
    check_root(text)?;
    let run: XmlRun = quick_xml::de::from_str(text)?;
    Ok(run.into())
}

/// Builds the report used when RustScan found no open ports and printed no XML.
///
/// It has a single host addressed as `target` with one closed port, so everything
/// downstream can treat "nothing found" like any other result.
pub fn empty_report(target: &str) -> Vec<u8> {
    let target = escape_attr(target);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -p 80 -oX - {target}" start="0" startstr="" version="7.92" xmloutputversion="1.05">
<scaninfo type="connect" protocol="tcp" numservices="1" services="80"/>
<verbose level="0"/>
<debugging level="0"/>
<host starttime="0" endtime="0"><status state="up" reason="conn-refused" reason_ttl="0"/>
<address addr="{target}" addrtype="ipv4"/>
<hostnames>
</hostnames>
<ports><port protocol="tcp" portid="80"><state state="closed" reason="conn-refused" reason_ttl="0"/><service name="http" method="table" conf="3"/></port>
</ports>
</host>
<runstats><finished time="0" timestr="" summary="Nmap done; 1 IP address (1 host up) scanned in 0.00 seconds" elapsed="0" exit="success"/><hosts up="1" down="0" total="1"/>
</runstats>
</nmaprun>
"#
    )
    .into_bytes()
}

fn escape_attr(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}

/// Rejects documents whose first element is not `<nmaprun>`.
fn check_root(text: &str) -> Result<(), ParseError> {
    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                let name = e.name();
                if name.as_ref() == ROOT_ELEMENT {
                    return Ok(());
                }
                return Err(ParseError::UnexpectedRoot(
                    String::from_utf8_lossy(name.as_ref()).into_owned(),
                ));
            }
            Event::Eof => return Err(ParseError::MissingRoot),
            _ => {}
        }
    }
}

#[derive(Debug, Deserialize)]
struct XmlRun {
    #[serde(rename = "@scanner", default)]
    scanner: String,
    #[serde(rename = "@args", default)]
    args: String,
    #[serde(rename = "@start", default)]
    start: i64,
    #[serde(rename = "@version", default)]
    version: String,
    #[serde(rename = "host", default)]
    hosts: Vec<XmlHost>,
    #[serde(rename = "runstats")]
    run_stats: XmlRunStats,
}

#[derive(Debug, Deserialize)]
struct XmlHost {
    #[serde(rename = "@starttime")]
    start_time: Option<i64>,
    #[serde(rename = "@endtime")]
    end_time: Option<i64>,
    status: Option<XmlStatus>,
    #[serde(rename = "address", default)]
    addresses: Vec<XmlAddress>,
    hostnames: Option<XmlHostnames>,
    ports: Option<XmlPorts>,
}

#[derive(Debug, Deserialize)]
struct XmlStatus {
    #[serde(rename = "@state", default)]
    state: String,
    #[serde(rename = "@reason", default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct XmlAddress {
    #[serde(rename = "@addr")]
    addr: String,
    #[serde(rename = "@addrtype", default)]
    addr_type: String,
    #[serde(rename = "@vendor")]
    vendor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlHostnames {
    #[serde(rename = "hostname", default)]
    hostnames: Vec<XmlHostname>,
}

#[derive(Debug, Deserialize)]
struct XmlHostname {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct XmlPorts {
    #[serde(rename = "port", default)]
    ports: Vec<XmlPort>,
}

#[derive(Debug, Deserialize)]
struct XmlPort {
    #[serde(rename = "@protocol")]
    protocol: String,
    #[serde(rename = "@portid")]
    id: u16,
    state: XmlState,
    service: Option<XmlService>,
}

#[derive(Debug, Deserialize)]
struct XmlState {
    #[serde(rename = "@state")]
    state: String,
    #[serde(rename = "@reason", default)]
    reason: String,
    #[serde(rename = "@reason_ttl", default)]
    reason_ttl: u32,
}

#[derive(Debug, Deserialize)]
struct XmlService {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@product")]
    product: Option<String>,
    #[serde(rename = "@version")]
    version: Option<String>,
    #[serde(rename = "@extrainfo")]
    extra_info: Option<String>,
    #[serde(rename = "@method")]
    method: Option<String>,
    #[serde(rename = "@conf")]
    confidence: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct XmlRunStats {
    finished: XmlFinished,
    hosts: Option<XmlHostStats>,
}

#[derive(Debug, Deserialize)]
struct XmlFinished {
    #[serde(rename = "@time", default)]
    time: i64,
    #[serde(rename = "@timestr", default)]
    time_str: String,
    #[serde(rename = "@elapsed", default)]
    elapsed: f64,
    #[serde(rename = "@summary", default)]
    summary: String,
    #[serde(rename = "@exit", default)]
    exit: String,
    #[serde(rename = "@errormsg", default)]
    error_msg: String,
}

#[derive(Debug, Deserialize)]
struct XmlHostStats {
    #[serde(rename = "@up", default)]
    up: u32,
    #[serde(rename = "@down", default)]
    down: u32,
    #[serde(rename = "@total", default)]
    total: u32,
}

impl From<XmlRun> for Report {
    fn from(run: XmlRun) -> Self {
        Report {
            scanner: run.scanner,
            args: run.args,
            start: run.start,
            version: run.version,
            hosts: run.hosts.into_iter().map(Host::from).collect(),
            stats: Stats {
                finished: run.run_stats.finished.into(),
                hosts: run
                    .run_stats
                    .hosts
                    .map(|h| HostStats {
                        up: h.up,
                        down: h.down,
                        total: h.total,
                    })
                    .unwrap_or_default(),
            },
        }
    }
}

impl From<XmlHost> for Host {
    fn from(host: XmlHost) -> Self {
        Host {
            status: host
                .status
                .map(|s| Status {
                    state: s.state,
                    reason: s.reason,
                })
                .unwrap_or_default(),
            addresses: host
                .addresses
                .into_iter()
                .map(|a| Address {
                    addr: a.addr,
                    addr_type: a.addr_type,
                    vendor: a.vendor,
                })
                .collect(),
            hostnames: host
                .hostnames
                .map(|h| h.hostnames)
                .unwrap_or_default()
                .into_iter()
                .map(|h| Hostname {
                    name: h.name,
                    kind: h.kind,
                })
                .collect(),
            ports: host
                .ports
                .map(|p| p.ports)
                .unwrap_or_default()
                .into_iter()
                .map(Port::from)
                .collect(),
            start_time: host.start_time,
            end_time: host.end_time,
        }
    }
}

impl From<XmlPort> for Port {
    fn from(port: XmlPort) -> Self {
        let service = port
            .service
            .map(|s| Service {
                name: s.name,
                product: s.product,
                version: s.version,
                extra_info: s.extra_info,
                method: s.method,
                confidence: s.confidence,
            })
            .unwrap_or_default();

        Port {
            id: port.id,
            protocol: port.protocol,
            state: State {
                state: port.state.state,
                reason: port.state.reason,
                reason_ttl: port.state.reason_ttl,
            },
            service,
        }
    }
}

impl From<XmlFinished> for Finished {
    fn from(f: XmlFinished) -> Self {
        Finished {
            time: f.time,
            time_str: f.time_str,
            elapsed: f.elapsed,
            summary: f.summary,
            exit: f.exit,
            error_msg: f.error_msg,
        }
    }
}
