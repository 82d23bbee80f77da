//! Engine child process supervision.
//!
//! [`EngineProcess`] owns the child and its three pipes. Output is pushed to
//! the owner as [`ProcessEvent`]s over an unbounded channel so the readers
//! keep draining the pipes no matter how busy the receiver is.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::{AbortHandle, JoinHandle};

use crate::error::EngineError;

/// Default time allowed for a voluntary exit after `quit`.
pub const DEFAULT_QUIT_GRACE: Duration = Duration::from_millis(500);

/// Default time allowed for exit after the terminate signal.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(2);

const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const KILL_WAIT: Duration = Duration::from_secs(1);
const OUTPUT_DRAIN: Duration = Duration::from_millis(200);

/// Output pushed by a running engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A trimmed, non-empty stdout line.
    Line(String),
    /// A trimmed, non-empty stderr line.
    Diagnostic(String),
    /// The process exited. Sent exactly once, after both pipes have drained.
    Terminated { code: Option<i32> },
}

/// Escalation timings for [`EngineProcess::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub quit_grace: Duration,
    pub terminate_grace: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            quit_grace: DEFAULT_QUIT_GRACE,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcessExit {
    code: Option<i32>,
}

/// A running engine process.
///
/// Dropping the value without calling [`EngineProcess::stop`] kills the
/// child and releases its pipes.
pub struct EngineProcess {
    path: PathBuf,
    pid: Option<u32>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    kill_tx: Option<oneshot::Sender<()>>,
    readers: [AbortHandle; 2],
    released: bool,
}

impl EngineProcess {
    /// Launch `path` with piped stdio and start the background readers.
    #[tracing::instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn spawn(
        path: &Path,
        args: &[String],
        working_dir: Option<&Path>,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) -> Result<Self, EngineError> {
        check_executable(path)?;

        let mut command = Command::new(path);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        tracing::debug!("Spawning engine process");
        let mut child = command.spawn().map_err(|e| {
            tracing::error!("Failed to spawn engine: {}", e);
            EngineError::launch(path, e.to_string())
        })?;

        // `child` is killed on drop if any pipe is missing
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(EngineError::launch(path, "engine stdio pipes unavailable"));
        };
        let pid = child.id();
        tracing::info!(?pid, "Engine process spawned");

        let stdout_reader = spawn_line_reader(stdout, events.clone(), ProcessEvent::Line, "stdout");
        let stderr_reader =
            spawn_line_reader(stderr, events.clone(), ProcessEvent::Diagnostic, "stderr");
        let readers = [stdout_reader.abort_handle(), stderr_reader.abort_handle()];

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = kill_rx => {
                    tracing::warn!("Force killing engine process");
                    if let Err(e) = child.start_kill() {
                        tracing::error!("Failed to kill engine process: {}", e);
                    }
                    child.wait().await
                }
            };
            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::error!("Failed to wait for engine process: {}", e);
                    None
                }
            };
            tracing::info!(?code, "Engine process exited");
            let _ = exit_tx.send(Some(ProcessExit { code }));

            // Let buffered output reach the owner before the exit notice
            let _ = tokio::time::timeout(OUTPUT_DRAIN, async {
                let _ = stdout_reader.await;
                let _ = stderr_reader.await;
            })
            .await;
            let _ = events.send(ProcessEvent::Terminated { code });
        });

        Ok(Self {
            path: path.to_path_buf(),
            pid,
            stdin: Arc::new(Mutex::new(Some(stdin))),
            exit_rx,
            kill_tx: Some(kill_tx),
            readers,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// Exit code once the process has exited. `None` while it runs or when
    /// it was ended by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        (*self.exit_rx.borrow()).and_then(|exit| exit.code)
    }

    /// Write one line to the engine's stdin.
    ///
    /// Concurrent callers are serialized so lines never interleave.
    pub async fn send(&self, line: &str) -> Result<(), EngineError> {
        if self.released || self.has_exited() {
            return Err(EngineError::NotRunning);
        }
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(EngineError::NotRunning)?;

        tracing::trace!("UCI >> {}", line);
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        stdin.write_all(buf.as_bytes()).await.map_err(|e| {
            tracing::error!("Failed to write to engine stdin: {}", e);
            EngineError::Io(e)
        })?;
        stdin.flush().await?;
        Ok(())
    }

    /// Shut the process down: `quit`, then SIGTERM, then kill.
    ///
    /// Every handle is released at the end regardless of how far the
    /// escalation got. Calling `stop` again is a no-op.
    #[tracing::instrument(level = "debug", skip(self), fields(pid = ?self.pid))]
    pub async fn stop(&mut self, policy: StopPolicy) {
        if self.released {
            return;
        }
        self.escalate(policy).await;
        self.release();
    }

    async fn escalate(&mut self, policy: StopPolicy) {
        if self.has_exited() {
            return;
        }

        if let Err(e) = self.send("quit").await {
            tracing::debug!("Could not send quit: {}", e);
        }
        // Closing stdin is a second quit signal for engines that read to EOF
        self.stdin.lock().await.take();
        if self.wait_exit(policy.quit_grace).await {
            tracing::debug!("Engine exited after quit");
            return;
        }

        if self.terminate() {
            let deadline = tokio::time::Instant::now() + policy.terminate_grace;
            while tokio::time::Instant::now() < deadline {
                if self.has_exited() {
                    tracing::debug!("Engine exited after terminate signal");
                    return;
                }
                tokio::time::sleep(TERMINATE_POLL_INTERVAL).await;
            }
        }

        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        if !self.wait_exit(KILL_WAIT).await {
            tracing::error!("Engine process did not exit after kill");
        }
    }

    #[cfg(unix)]
    fn terminate(&self) -> bool {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return false;
        };
        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        tracing::debug!("Sending SIGTERM to engine");
        match kill(nix_pid, Signal::SIGTERM) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to send SIGTERM: {}", e);
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> bool {
        false
    }

    /// Wait up to `timeout` for the exit notification.
    async fn wait_exit(&self, timeout: Duration) -> bool {
        let mut exit_rx = self.exit_rx.clone();
        // The borrow held by `wait_for` must end before `exit_rx` is dropped
        let result = tokio::time::timeout(timeout, exit_rx.wait_for(Option::is_some)).await;
        matches!(result, Ok(Ok(_)))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Ok(mut stdin) = self.stdin.try_lock() {
            stdin.take();
        }
        if !self.has_exited() {
            if let Some(kill_tx) = self.kill_tx.take() {
                let _ = kill_tx.send(());
            }
        }
        self.kill_tx = None;
        for reader in &self.readers {
            reader.abort();
        }
        tracing::debug!(pid = ?self.pid, "Engine process resources released");
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for EngineProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineProcess")
            .field("path", &self.path)
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .field("released", &self.released)
            .finish()
    }
}

fn spawn_line_reader<R>(
    stream: R,
    events: mpsc::UnboundedSender<ProcessEvent>,
    wrap: fn(String) -> ProcessEvent,
    stream_name: &'static str,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    tracing::debug!("Engine {} EOF", stream_name);
                    break;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    tracing::trace!("UCI << {}", trimmed);
                    if events.send(wrap(trimmed.to_string())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Error reading engine {}: {}", stream_name, e);
                    break;
                }
            }
        }
    })
}

fn check_executable(path: &Path) -> Result<(), EngineError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| EngineError::launch(path, format!("cannot access executable: {}", e)))?;
    if !metadata.is_file() {
        return Err(EngineError::launch(path, "not a regular file"));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(EngineError::launch(path, "file is not executable"));
        }
    }

    Ok(())
}
