use std::fs;
use std::time::{Duration, Instant};

use scanbind_common::error::ScanError;
use scanbind_core::{ScanFilters, ScanRunner, Scanner};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::util::{self, MockScanner, TWO_PORT_REPORT};

const LIMIT: usize = 30;

#[tokio::test]
async fn two_open_ports_end_to_end() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new(&util::two_port_scan(TWO_PORT_REPORT));
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let scan = scanner.run(LIMIT).await.expect("scan should succeed");

    assert!(scan.warnings.is_empty(), "unexpected warnings: {:?}", scan.warnings);
    assert_eq!(scan.report.hosts.len(), 1);
    let ports: Vec<(u16, &str, &str)> = scan.report.hosts[0]
        .ports
        .iter()
        .map(|p| (p.id, p.state.state.as_str(), p.protocol.as_str()))
        .collect();
    assert_eq!(ports, vec![(80, "open", "tcp"), (443, "open", "tcp")]);
    assert_eq!(scan.report.stats.finished.elapsed, 0.25);
}

#[tokio::test]
async fn passes_xml_selection_to_binary() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new("");
    let args_file = mock.file("args");
    fs::write(
        mock.path(),
        format!(
            "#!/bin/sh\necho \"$@\" > '{}'\necho \"Looks like I didn't find any open ports\"\n",
            args_file.display()
        ),
    )
    .unwrap();
    let scanner = Scanner::new(mock.config().batch_size(100).build().unwrap()).unwrap();

    scanner.run(LIMIT).await.unwrap();

    let recorded = fs::read_to_string(args_file).unwrap();
    assert_eq!(recorded.trim(), "-a example.test -p 80,443 -b 100 -- -oX -");
}

#[tokio::test]
async fn too_many_open_ports_aborts_as_cdn() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new(
        r#"i=0
while [ $i -lt 31 ]; do
    echo "Open 93.184.216.34:$((1000 + i))"
    i=$((i + 1))
done
exec sleep 30"#,
    );
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let started = Instant::now();
    let failure = scanner.run(LIMIT).await.unwrap_err();

    assert!(matches!(
        failure.error,
        ScanError::CdnSuspected { open_ports: 31, limit: LIMIT }
    ));
    assert!(failure.report.is_none());
    assert!(failure.warnings.is_empty());
    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(!util::is_running(mock.pid()), "mock scanner still running");
}

#[tokio::test]
async fn zero_limit_trips_on_first_port() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new(&util::two_port_scan(TWO_PORT_REPORT));
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let failure = scanner.run(0).await.unwrap_err();
    assert!(matches!(failure.error, ScanError::CdnSuspected { limit: 0, .. }));
}

#[tokio::test]
async fn malloc_failure_is_classified() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new("echo 'Malloc Failed!' >&2\nexit 1");
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let failure = scanner.run(LIMIT).await.unwrap_err();

    assert!(matches!(failure.error, ScanError::MallocFailed));
    assert!(failure.report.is_none());
    assert_eq!(failure.warnings, vec!["Malloc Failed!".to_string()]);
}

#[tokio::test]
async fn unknown_stderr_stays_a_warning() {
    let _lock = util::exclusive().await;
    let body = format!(
        "echo '[!] File limit is lower than default batch size.' >&2\n{}",
        util::two_port_scan(TWO_PORT_REPORT)
    );
    let mock = MockScanner::new(&body);
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let scan = scanner.run(LIMIT).await.unwrap();
    assert_eq!(
        scan.warnings,
        vec!["[!] File limit is lower than default batch size.".to_string()]
    );
    assert_eq!(scan.report.hosts[0].ports.len(), 2);
}

#[tokio::test]
async fn deadline_while_streaming_times_out() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new("echo 'Open 93.184.216.34:80'\nexec sleep 30");
    let cfg = mock.config().deadline(Duration::from_millis(300)).build().unwrap();
    let scanner = Scanner::new(cfg).unwrap();

    let started = Instant::now();
    let failure = scanner.run(LIMIT).await.unwrap_err();

    assert!(matches!(failure.error, ScanError::Timeout));
    assert!(failure.report.is_none());
    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(!util::is_running(mock.pid()), "mock scanner still running");
}

#[tokio::test]
async fn cancel_after_stdout_closed_times_out() {
    let _lock = util::exclusive().await;
    // Closes stdout and keeps running, so only the exit race is left.
    let mock = MockScanner::new("exec >&-\nexec sleep 30");
    let token = CancellationToken::new();
    let cfg = mock.config().cancel_token(token.clone()).build().unwrap();
    let scanner = Scanner::new(cfg).unwrap();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        token.cancel();
    });
    let failure = scanner.run(LIMIT).await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(failure.error, ScanError::Timeout));
    assert!(!util::is_running(mock.pid()), "mock scanner still running");
}

#[tokio::test]
async fn cancel_after_exit_is_ignored() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new(&util::two_port_scan(TWO_PORT_REPORT));
    let token = CancellationToken::new();
    let scanner = Scanner::new(mock.config().cancel_token(token.clone()).build().unwrap()).unwrap();

    let scan = scanner.run(LIMIT).await.unwrap();
    token.cancel();
    assert_eq!(scan.report.hosts.len(), 1);
}

#[tokio::test]
async fn cdn_abort_kills_scanner_children() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new(&format!(
        r#"{}
i=0
while [ $i -lt 31 ]; do
    echo "Open 93.184.216.34:$((1000 + i))"
    i=$((i + 1))
done
wait"#,
        util::BACKGROUND_CHILD
    ));
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let failure = scanner.run(LIMIT).await.unwrap_err();

    assert!(matches!(failure.error, ScanError::CdnSuspected { .. }));
    let child = mock.recorded_pid("child.pid");
    assert!(util::exited_soon(child).await, "child {child} outlived the abort");
    assert!(!util::is_running(mock.pid()), "mock scanner still running");
}

#[tokio::test]
async fn deadline_kills_scanner_children() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new(&format!(
        "{}\necho 'Open 93.184.216.34:80'\nwait",
        util::BACKGROUND_CHILD
    ));
    let cfg = mock.config().deadline(Duration::from_millis(300)).build().unwrap();
    let scanner = Scanner::new(cfg).unwrap();

    let failure = scanner.run(LIMIT).await.unwrap_err();

    assert!(matches!(failure.error, ScanError::Timeout));
    let child = mock.recorded_pid("child.pid");
    assert!(util::exited_soon(child).await, "child {child} outlived the deadline");
    assert!(!util::is_running(mock.pid()), "mock scanner still running");
}

#[tokio::test]
async fn child_holding_stderr_does_not_stall_run() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new(
        r#"sleep 5 >/dev/null &
echo $! > "$(dirname "$0")/child.pid"
echo "Looks like I didn't find any open ports"
exit 0"#,
    );
    let cfg = mock.config().deadline(Duration::from_millis(300)).build().unwrap();
    let scanner = Scanner::new(cfg).unwrap();

    let started = Instant::now();
    let scan = scanner.run(LIMIT).await.expect("scan should succeed");

    assert!(started.elapsed() < Duration::from_secs(3), "run took {:?}", started.elapsed());
    assert_eq!(scan.report.hosts.len(), 1);
    let child = mock.recorded_pid("child.pid");
    assert!(util::exited_soon(child).await, "child {child} outlived the scan");
}

#[tokio::test]
async fn no_open_ports_yields_synthesized_report() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new(
        r#"echo "[~] The config file is expected to be at \"/root/.rustscan.toml\""
echo "[!] Looks like I didn't find any open ports for 93.184.216.34. This is usually caused by a high batch size."
exit 0"#,
    );
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let scan = scanner.run(LIMIT).await.unwrap();

    let hosts = &scan.report.hosts;
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].addresses[0].addr, "example.test");
    assert_eq!(hosts[0].ports.len(), 1);
    assert_eq!(hosts[0].ports[0].state.state, "closed");
    assert_eq!(scan.report.stats.finished.elapsed, 0.0);
}

#[tokio::test]
async fn broken_xml_is_a_parse_failure() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new(
        r#"echo "[~] Starting Script(s)"
echo '<?xml version="1.0"?><nmaprun scanner="nmap"><host>'
exit 0"#,
    );
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let failure = scanner.run(LIMIT).await.unwrap_err();

    assert!(matches!(failure.error, ScanError::ParseOutput));
    assert!(failure.report.is_none());
    assert_eq!(failure.warnings.len(), 1, "parser error should be kept as a warning");
}

#[tokio::test]
async fn missing_report_is_a_parse_failure() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new("echo '[~] Starting'\nexit 0");
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let failure = scanner.run(LIMIT).await.unwrap_err();
    assert!(matches!(failure.error, ScanError::ParseOutput));
}

#[tokio::test]
async fn resolve_failure_returns_report() {
    let _lock = util::exclusive().await;
    let report = r#"<?xml version="1.0"?>
<nmaprun scanner="nmap" args="nmap nowhere.invalid" start="1" version="7.94">
<runstats><finished time="1" timestr="" elapsed="0.02" summary="" exit="error" errormsg="Error resolving name &quot;nowhere.invalid&quot;"/><hosts up="0" down="0" total="0"/></runstats>
</nmaprun>"#;
    let mock = MockScanner::new(&util::two_port_scan(report));
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let failure = scanner.run(LIMIT).await.unwrap_err();

    assert!(matches!(failure.error, ScanError::ResolveName));
    let report = failure.report.expect("report kept on scan-level failure");
    assert_eq!(report.stats.finished.exit, "error");
}

#[tokio::test]
async fn unknown_scan_error_is_verbatim() {
    let _lock = util::exclusive().await;
    let report = TWO_PORT_REPORT.replace(
        r#"exit="success""#,
        r#"exit="error" errormsg="Failed to open device eth9""#,
    );
    let mock = MockScanner::new(&util::two_port_scan(&report));
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let failure = scanner.run(LIMIT).await.unwrap_err();

    assert!(matches!(failure.error, ScanError::ScanFailed(ref m) if m == "Failed to open device eth9"));
    assert_eq!(failure.report.map(|r| r.hosts.len()), Some(1));
}

#[tokio::test]
async fn filters_apply_after_parse() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new(&util::two_port_scan(TWO_PORT_REPORT));
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let filters = ScanFilters::none().with_port(|p| p.id == 443);
    let scan = scanner.run_filtered(LIMIT, &filters).await.unwrap();
    let ids: Vec<u16> = scan.report.hosts[0].ports.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![443]);

    let filters = ScanFilters::none().with_host(|h| h.addresses.is_empty());
    let scan = scanner.run_filtered(LIMIT, &filters).await.unwrap();
    assert!(scan.report.hosts.is_empty());
}

#[tokio::test]
async fn progress_is_reported() {
    let _lock = util::exclusive().await;
    let body = format!(
        r#"echo '<taskprogress task="Connect Scan" time="1" percent="25.00" remaining="3"/>'
echo '<taskprogress task="Connect Scan" time="2" percent="50.00" remaining="2"/>'
{}"#,
        util::two_port_scan(TWO_PORT_REPORT)
    );
    let mock = MockScanner::new(&body);
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let scan = scanner
        .run_with_progress(LIMIT, &ScanFilters::none(), tx)
        .await
        .unwrap();
    assert_eq!(scan.report.hosts.len(), 1);

    let mut updates = Vec::new();
    while let Some(p) = rx.recv().await {
        updates.push(p);
    }
    assert_eq!(updates.last(), Some(&100.0));
    assert!(updates.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {updates:?}");
}

#[tokio::test]
async fn unfed_progress_channel_does_not_stall() {
    let _lock = util::exclusive().await;
    let body = format!(
        "i=0\nwhile [ $i -lt 20 ]; do echo \"<taskprogress task=\\\"x\\\" percent=\\\"$i\\\"/>\"; i=$((i + 1)); done\n{}",
        util::two_port_scan(TWO_PORT_REPORT)
    );
    let mock = MockScanner::new(&body);
    let scanner = Scanner::new(mock.config().build().unwrap()).unwrap();

    let (tx, _rx) = mpsc::channel(1);
    let result = tokio::time::timeout(
        Duration::from_secs(20),
        scanner.run_with_progress(LIMIT, &ScanFilters::none(), tx),
    )
    .await
    .expect("scan stalled on a full progress channel");
    assert!(result.is_ok());
}

#[tokio::test]
async fn missing_binary_fails_to_spawn() {
    let _lock = util::exclusive().await;
    let mock = MockScanner::new("");
    let cfg = mock
        .config()
        .binary_path(mock.file("not-there"))
        .build()
        .unwrap();
    let scanner = Scanner::new(cfg).unwrap();

    let failure = scanner.run(LIMIT).await.unwrap_err();
    assert!(matches!(failure.error, ScanError::Spawn(_)));
    assert!(failure.warnings.is_empty());
}
