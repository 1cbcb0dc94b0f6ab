//! Lifecycle of the RustScan child process.

use std::future::Future;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of racing some work against cancellation.
#[derive(Debug, PartialEq)]
pub(crate) enum Race<T> {
    Finished(T),
    Cancelled,
}

/// Waits for whichever of `work` and `cancel` completes first.
///
/// `work` is polled first, so work that is already complete wins over a
/// cancellation that arrived at the same time.
pub(crate) async fn first_of<W, C>(work: W, cancel: C) -> Race<W::Output>
where
    W: Future,
    C: Future<Output = ()>,
{
    tokio::select! {
        biased;
        out = work => Race::Finished(out),
        _ = cancel => Race::Cancelled,
    }
}

/// Resolves once the token is cancelled or the deadline passes.
pub(crate) async fn cancelled(token: CancellationToken, deadline: Option<Instant>) {
    match deadline {
        Some(at) => {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(at) => debug!("scan deadline reached"),
            }
        }
        None => token.cancelled().await,
    }
}

pub(crate) struct ScanProcess {
    child: Child,
    /// Group id of the scanner and everything it forks (nmap included).
    pgid: Option<u32>,
    stdout: ChildStdout,
    stderr: StderrDrain,
}

impl ScanProcess {
    pub fn spawn(binary: &Path, args: &[String]) -> io::Result<Self> {
        let mut command = Command::new(binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr was not captured"))?;

        let pgid = child.id();
        debug!(pid = ?pgid, "RustScan started");

        Ok(Self {
            child,
            pgid,
            stdout,
            stderr: StderrDrain::start(stderr),
        })
    }

    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf).await
    }

    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Kills the whole process group and reaps the leader. Pending
    /// diagnostics are dropped.
    pub async fn kill(mut self) {
        self.stderr.task.abort();
        self.kill_group();
        match self.child.kill().await {
            Ok(()) => debug!("RustScan killed"),
            Err(e) => warn!("Failed to kill RustScan: {}", e),
        }
    }

    /// Sends SIGKILL to every process left in the scanner's group.
    ///
    /// Safe to call after the leader exited: the group id stays reserved
    /// while any member is alive, and an empty group is not an error.
    #[cfg(unix)]
    pub fn kill_group(&self) {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid.and_then(|id| i32::try_from(id).ok()) else {
            return;
        };
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) => debug!(pgid, "process group killed"),
            Err(Errno::ESRCH) => {}
            Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
        }
    }

    #[cfg(not(unix))]
    pub fn kill_group(&self) {}

    /// Everything the process wrote to stderr. Call after it exited.
    ///
    /// Stops waiting once `cancel` resolves and returns what was read so
    /// far, so a descendant holding the pipe open cannot stall the caller.
    pub async fn collect_stderr<C>(self, cancel: C) -> Vec<u8>
    where
        C: Future<Output = ()>,
    {
        let Self { mut stderr, .. } = self;
        match first_of(&mut stderr.task, cancel).await {
            Race::Finished(Ok(Ok(()))) => {}
            Race::Finished(Ok(Err(e))) => warn!("Failed to read RustScan stderr: {}", e),
            Race::Finished(Err(e)) => warn!("stderr reader task failed: {}", e),
            Race::Cancelled => {
                stderr.task.abort();
                debug!("stderr still open at cancellation, keeping partial output");
            }
        }
        stderr.take()
    }
}

/// Background reader that keeps stderr drained so the scanner never blocks
/// on a full pipe.
struct StderrDrain {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<io::Result<()>>,
}

impl StderrDrain {
    fn start<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(drain(reader, Arc::clone(&buf)));
        Self { buf, task }
    }

    fn take(&self) -> Vec<u8> {
        self.buf
            .lock()
            .map(|mut bytes| std::mem::take(&mut *bytes))
            .unwrap_or_default()
    }
}

async fn drain<R>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 512];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        if let Ok(mut bytes) = sink.lock() {
            bytes.extend_from_slice(&chunk[..n]);
        }
    }
}
