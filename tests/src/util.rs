use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use scanbind_common::config::{ScanConfig, ScanConfigBuilder};
use tempfile::TempDir;
use tokio::sync::{Mutex, MutexGuard};

// Writing an executable while another test forks can fail the exec with ETXTBSY,
// so mock-based tests run one at a time.
static MOCK_LOCK: Mutex<()> = Mutex::const_new(());

pub async fn exclusive() -> MutexGuard<'static, ()> {
    MOCK_LOCK.lock().await
}

/// A fake `rustscan` executable made from a shell script body.
///
/// The script records its pid first, so tests can check the process is gone.
pub struct MockScanner {
    dir: TempDir,
    path: PathBuf,
}

impl MockScanner {
    pub fn new(body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rustscan");
        let pid_file = dir.path().join("mock.pid");
        let script = format!("#!/bin/sh\necho $$ > '{}'\n{}\n", pid_file.display(), body);

        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Builder for the usual `example.test` / `80,443` scan against this mock.
    pub fn config(&self) -> ScanConfigBuilder {
        ScanConfig::builder()
            .target("example.test")
            .ports("80,443")
            .binary_path(self.path())
    }

    pub fn pid(&self) -> u32 {
        self.recorded_pid("mock.pid")
    }

    /// Pid a script wrote to `name` inside the mock's directory.
    pub fn recorded_pid(&self, name: &str) -> u32 {
        fs::read_to_string(self.file(name))
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }
}

/// Whether `pid` is alive. Zombies waiting for a reaper count as gone.
pub fn is_running(pid: u32) -> bool {
    if let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) {
        let state = stat.rsplit(')').next().unwrap_or("").trim_start();
        return !(state.starts_with('Z') || state.starts_with('X'));
    }
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Polls until `pid` is gone, giving orphaned processes time to be reaped.
pub async fn exited_soon(pid: u32) -> bool {
    for _ in 0..50 {
        if !is_running(pid) {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    false
}

/// Script lines starting `sleep 30` in the background and recording its pid
/// in `child.pid` next to the mock. The sleeper keeps stdout and stderr open.
pub const BACKGROUND_CHILD: &str = r#"sleep 30 &
echo $! > "$(dirname "$0")/child.pid""#;

pub const TWO_PORT_REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -vvv -p 80,443 -oX - 93.184.216.34" start="1700000000" version="7.94" xmloutputversion="1.05">
<scaninfo type="connect" protocol="tcp" numservices="2" services="80,443"/>
<host starttime="1700000000" endtime="1700000000"><status state="up" reason="syn-ack" reason_ttl="0"/>
<address addr="93.184.216.34" addrtype="ipv4"/>
<hostnames>
<hostname name="example.test" type="user"/>
</hostnames>
<ports><port protocol="tcp" portid="80"><state state="open" reason="syn-ack" reason_ttl="0"/><service name="http" method="table" conf="3"/></port>
<port protocol="tcp" portid="443"><state state="open" reason="syn-ack" reason_ttl="0"/><service name="https" method="table" conf="3"/></port>
</ports>
</host>
<runstats><finished time="1700000000" timestr="Tue Nov 14 22:13:20 2023" summary="Nmap done" elapsed="0.25" exit="success"/><hosts up="1" down="0" total="1"/>
</runstats>
</nmaprun>"#;

/// Script body printing the RustScan banner, two open ports and `report`.
pub fn two_port_scan(report: &str) -> String {
    format!(
        r#"echo "Open 93.184.216.34:80"
echo "Open 93.184.216.34:443"
echo "[~] Starting Script(s)"
echo '[>] Running script "nmap -vvv -p {{{{port}}}} {{{{ip}}}}" on ip 93.184.216.34'
echo
cat <<'XML'
{report}
XML
exit 0"#
    )
}
