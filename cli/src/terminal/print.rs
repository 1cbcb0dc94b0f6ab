use colored::*;
use scanbind_common::report::{Host, Port, Report};
use tracing::info;

use crate::terminal::colors;

pub const TOTAL_WIDTH: usize = 64;
pub const PRINT_TARGET: &str = "scanbind::print";
pub const RAW_FIELD: &str = "raw_msg";

pub fn print(msg: &str) {
    info!(target: "scanbind::print", raw_msg = msg);
}

pub fn header(msg: &str) {
    let formatted: String = format!("⟦ {} ⟧", msg);
    let msg_len: usize = formatted.chars().count();

    let dash_count: usize = TOTAL_WIDTH.saturating_sub(msg_len);
    let left: usize = dash_count / 2;
    let right: usize = dash_count - left;

    let line: ColoredString = format!(
        "{}{}{}",
        "─".repeat(left),
        formatted.to_uppercase().bright_green(),
        "─".repeat(right)
    )
    .bright_black();

    print(&format!("{}", line));
}

pub fn fat_separator() {
    let sep: ColoredString = "═".repeat(TOTAL_WIDTH).bright_black();
    print(&format!("{}", sep));
}

pub fn tree_head(idx: usize, name: &str) {
    let idx_str: String = format!("[{}]", idx.to_string().color(colors::ACCENT));
    let output: String = format!(
        "{} {}",
        idx_str.color(colors::SEPARATOR),
        name.color(colors::PRIMARY)
    );
    print(&output);
}

pub fn report(report: &Report) {
    let hosts: Vec<&Host> = report.hosts.iter().filter(|h| h.is_displayable()).collect();
    if hosts.is_empty() {
        header("no open ports");
    } else {
        header("scan results");
    }

    for (idx, host) in hosts.iter().enumerate() {
        host_tree(idx, host);
        if idx + 1 != hosts.len() {
            print("");
        }
    }

    let summary: String = format!(
        "RustScan done: {} hosts up scanned in {} seconds",
        report.hosts.len().to_string().green().bold(),
        format!("{:.2}", report.stats.finished.elapsed).yellow().bold()
    );
    fat_separator();
    print(&summary);
}

fn host_tree(idx: usize, host: &Host) {
    let name: String = match (host.primary_address(), host.hostnames.first()) {
        (Some(addr), Some(hostname)) => format!("{} ({})", addr, hostname.name),
        (Some(addr), None) => addr.to_string(),
        (None, _) => String::from("unknown"),
    };
    tree_head(idx, &name);

    for (i, port) in host.ports.iter().enumerate() {
        let last: bool = i + 1 == host.ports.len();
        let branch: ColoredString = if !last {
            "├─".bright_black()
        } else {
            "└─".bright_black()
        };
        print(&format!(" {} {}", branch, port_line(port)));
    }
}

fn port_line(port: &Port) -> String {
    let state_color = match port.state.state.as_str() {
        "open" => colors::PORT_OPEN,
        "closed" => colors::PORT_CLOSED,
        _ => colors::PORT_OTHER,
    };
    let id: String = format!("{}/{}", port.id, port.protocol);
    format!(
        "{:<10} {:<10} {}",
        id.color(colors::TEXT_DEFAULT),
        port.state.state.color(state_color),
        port.service.name.color(colors::ACCENT)
    )
}

pub fn warnings(warnings: &[String]) {
    for warning in warnings {
        tracing::warn!("{}", warning);
    }
}
