//! Translates a [`ScanConfig`] into RustScan's command line.

use scanbind_common::config::ScanConfig;

pub const RESUME_FLAG: &str = "--resume";

/// Hands everything after `--` to nmap and asks for XML on stdout.
pub const XML_TO_STDOUT: [&str; 3] = ["--", "-oX", "-"];

/// Builds the argument vector, without the trailing output selection.
pub fn build_args(cfg: &ScanConfig) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    if !cfg.targets.is_empty() {
        args.push("-a".into());
        args.push(cfg.targets.join(","));
    }

    if !cfg.ports.is_empty() {
        let list = cfg.ports.join(",");
        let flag = if !list.contains(',') && list.contains('-') {
            "-r"
        } else {
            "-p"
        };
        args.push(flag.into());
        args.push(list);
    }

    if let Some(size) = cfg.batch_size {
        args.extend(["-b".into(), size.to_string()]);
    }
    if let Some(millis) = cfg.timeout_ms {
        args.extend(["-t".into(), millis.to_string()]);
    }
    if let Some(order) = cfg.scan_order {
        args.extend(["--scan-order".into(), order.to_string()]);
    }
    if let Some(ulimit) = cfg.ulimit {
        args.extend(["-u".into(), ulimit.to_string()]);
    }
    if cfg.resume {
        args.push(RESUME_FLAG.into());
    }

    args.extend(cfg.custom_args.iter().cloned());
    args
}

/// True when the argument list continues a paused scan.
pub fn is_resume(args: &[String]) -> bool {
    args.iter().any(|a| a == RESUME_FLAG)
}

/// Full argv for one run: the configured flags plus XML output unless resuming.
pub fn command_line(cfg: &ScanConfig) -> Vec<String> {
    let mut args = build_args(cfg);
    if !is_resume(&args) {
        args.extend(XML_TO_STDOUT.iter().map(|s| s.to_string()));
    }
    args
}
