//! Process runner
//!
//! Launches one test script as a child process, drains its stdout and stderr
//! concurrently, and enforces the descriptor's timeout. Every failure mode is
//! folded into the returned [`CapturedOutcome`]; running a script never
//! returns an error.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::common::Settings;

use super::descriptor::TestDescriptor;

/// How a script run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitStatus {
    /// The process exited normally with this code
    Code { code: i32 },
    /// The process was killed by a signal we didn't send
    Signal { signal: i32 },
    /// The process exceeded its timeout and was killed
    TimedOut,
    /// The process could never be started
    LaunchFailed { reason: String },
}

impl ExitStatus {
    /// Whether this is a clean `exit 0`
    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Code { code: 0 })
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code { code } => write!(f, "{}", code),
            ExitStatus::Signal { signal } => write!(f, "signal {}", signal),
            ExitStatus::TimedOut => write!(f, "TIMEOUT"),
            ExitStatus::LaunchFailed { .. } => write!(f, "LAUNCH FAILED"),
        }
    }
}

/// Everything captured from one execution attempt
#[derive(Debug, Clone)]
pub struct CapturedOutcome {
    pub exit: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl CapturedOutcome {
    /// True iff the process was killed for exceeding its timeout
    pub fn timed_out(&self) -> bool {
        matches!(self.exit, ExitStatus::TimedOut)
    }

    /// The launch failure reason, if the script never started
    pub fn launch_error(&self) -> Option<&str> {
        match &self.exit {
            ExitStatus::LaunchFailed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    fn launch_failed(reason: String, started: Instant) -> Self {
        Self {
            exit: ExitStatus::LaunchFailed { reason },
            stdout: Vec::new(),
            stderr: Vec::new(),
            duration: started.elapsed(),
        }
    }
}

/// Runs test scripts as child processes
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    interpreter: Option<String>,
    working_dir: PathBuf,
    kill_grace: Duration,
}

impl ProcessRunner {
    pub fn new(settings: &Settings) -> Self {
        Self {
            interpreter: settings.interpreter.clone(),
            working_dir: settings.project_root.clone(),
            kill_grace: settings.kill_grace,
        }
    }

    /// Run the descriptor's script once and capture what happened
    ///
    /// Spawns exactly one process. Output is captured in full; on timeout the
    /// whole process group is killed and whatever was written so far is kept.
    pub async fn run(&self, descriptor: &TestDescriptor) -> CapturedOutcome {
        let started = Instant::now();

        let Some(script) = resolve_script(&descriptor.script_path) else {
            return CapturedOutcome::launch_failed(
                format!("script not found: {}", descriptor.script_path.display()),
                started,
            );
        };

        let mut cmd = match self.command_for(&script) {
            Ok(cmd) => cmd,
            Err(reason) => return CapturedOutcome::launch_failed(reason, started),
        };

        cmd.current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a timeout can take down everything the script spawned
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return CapturedOutcome::launch_failed(describe_spawn_error(&script, &e), started),
        };
        let pid = child.id();
        tracing::debug!(script = %script.display(), ?pid, "Script started");

        let mut stdout = Capture::start(child.stdout.take());
        let mut stderr = Capture::start(child.stderr.take());

        let deadline = deadline_after(descriptor.timeout);
        let exit = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => exit_from_status(status),
            Ok(Err(e)) => ExitStatus::LaunchFailed {
                reason: format!("failed to wait for {}: {}", script.display(), e),
            },
            Err(_) => {
                tracing::debug!(script = %script.display(), timeout = ?descriptor.timeout, "Script timed out");
                kill_tree(&mut child, pid).await;
                ExitStatus::TimedOut
            }
        };

        // Descendants can keep the pipes open after the script itself exits
        let drain_deadline = if matches!(exit, ExitStatus::TimedOut) {
            deadline_after(self.kill_grace)
        } else {
            deadline
        };
        let stdout_done = stdout.join(drain_deadline).await;
        let stderr_done = stderr.join(drain_deadline).await;
        if !(stdout_done && stderr_done) && !matches!(exit, ExitStatus::TimedOut) {
            tracing::warn!(
                script = %script.display(),
                "Output still open at the timeout after the script exited; killing leftover processes"
            );
            kill_group(pid);
            let grace = deadline_after(self.kill_grace);
            stdout.join(grace).await;
            stderr.join(grace).await;
        }

        let duration = started.elapsed();
        CapturedOutcome {
            exit,
            stdout: stdout.finish(),
            stderr: stderr.finish(),
            duration,
        }
    }

    fn command_for(&self, script: &Path) -> Result<Command, String> {
        match &self.interpreter {
            Some(name) => {
                let program = which::which(name)
                    .map_err(|e| format!("interpreter '{}' not found: {}", name, e))?;
                let mut cmd = Command::new(program);
                cmd.arg(script);
                Ok(cmd)
            }
            None => Ok(Command::new(script)),
        }
    }
}

/// `now + budget`, saturating to a far-future instant instead of overflowing
fn deadline_after(budget: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(budget)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS))
}

/// Roughly 30 years, the same horizon tokio uses for "never"
const FAR_FUTURE_SECS: u64 = 86400 * 365 * 30;

/// Find the script on disk, falling back to `<path>.sh`
///
/// The result is absolute: the child runs in the project root, so a relative
/// program path would be ambiguous.
fn resolve_script(path: &Path) -> Option<PathBuf> {
    let mut with_ext = path.as_os_str().to_owned();
    with_ext.push(".sh");

    [path.to_path_buf(), PathBuf::from(with_ext)]
        .into_iter()
        .find(|candidate| candidate.is_file())
        .map(|found| found.canonicalize().unwrap_or(found))
}

fn describe_spawn_error(script: &Path, e: &std::io::Error) -> String {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => {
            format!("script {} is not executable: {}", script.display(), e)
        }
        _ => format!("failed to launch {}: {}", script.display(), e),
    }
}

fn exit_from_status(status: std::process::ExitStatus) -> ExitStatus {
    match status.code() {
        Some(code) => ExitStatus::Code { code },
        None => ExitStatus::Signal {
            signal: signal_of(&status).unwrap_or(0),
        },
    }
}

#[cfg(unix)]
fn signal_of(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Kill the script and, best-effort, everything in its process group
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "Failed to kill timed out script");
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // The child called setpgid(0, 0), so its pid is the group id
        let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if result != 0 {
            tracing::debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// One output stream being drained by a background task
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = reader.map(|reader| tokio::spawn(drain(reader, Arc::clone(&buffer))));
        Self { buffer, task }
    }

    /// Wait for the reader to reach EOF; false if the deadline hit first
    async fn join(&mut self, deadline: tokio::time::Instant) -> bool {
        let Some(task) = self.task.as_mut() else {
            return true;
        };
        if tokio::time::timeout_at(deadline, task).await.is_err() {
            return false;
        }
        self.task = None;
        true
    }

    /// Stop reading and hand back everything captured so far
    fn finish(self) -> Vec<u8> {
        if let Some(task) = self.task {
            task.abort();
        }
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *buffer)
    }
}

async fn drain<R>(mut reader: R, buffer: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buffer
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend_from_slice(&chunk[..n]),
            Err(e) => {
                tracing::debug!(error = %e, "Output stream read failed");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn runner(root: &Path, interpreter: Option<&str>) -> ProcessRunner {
        let mut settings = Settings::with_root(root);
        settings.interpreter = interpreter.map(str::to_string);
        ProcessRunner::new(&settings)
    }

    fn descriptor(script: PathBuf, timeout: Duration) -> TestDescriptor {
        TestDescriptor::new("t", script, timeout)
    }

    #[tokio::test]
    async fn test_captures_exit_code_and_streams() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "mixed.sh", "echo out; echo err >&2; exit 3");

        let outcome = runner(dir.path(), Some("sh"))
            .run(&descriptor(script, Duration::from_secs(10)))
            .await;

        assert_eq!(outcome.exit, ExitStatus::Code { code: 3 });
        assert_eq!(outcome.stdout, b"out\n");
        assert_eq!(outcome.stderr, b"err\n");
        assert!(!outcome.timed_out());
        assert!(!outcome.exit.is_success());
    }

    #[tokio::test]
    async fn test_unbounded_timeout_does_not_overflow_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "quick.sh", "echo quick");

        let outcome = runner(dir.path(), Some("sh"))
            .run(&descriptor(script, Duration::MAX))
            .await;

        assert_eq!(outcome.exit, ExitStatus::Code { code: 0 });
        assert_eq!(outcome.stdout_text(), "quick\n");
    }

    #[test]
    fn test_deadline_after_saturates() {
        let now = tokio::time::Instant::now();
        assert!(deadline_after(Duration::MAX) > now);
        assert!(deadline_after(Duration::from_secs(1)) > now);
    }

    #[tokio::test]
    async fn test_executes_script_directly_without_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "direct.sh", "echo direct");

        let outcome = runner(dir.path(), None)
            .run(&descriptor(script, Duration::from_secs(10)))
            .await;

        assert_eq!(outcome.exit, ExitStatus::Code { code: 0 });
        assert_eq!(outcome.stdout_text(), "direct\n");
    }

    #[tokio::test]
    async fn test_large_output_on_both_streams_does_not_deadlock() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "big.sh",
            "i=0; while [ $i -lt 4000 ]; do \
             echo 'stdout line padded to make the pipe fill up quickly'; \
             echo 'stderr line padded to make the pipe fill up quickly' >&2; \
             i=$((i+1)); done",
        );

        let outcome = runner(dir.path(), Some("sh"))
            .run(&descriptor(script, Duration::from_secs(30)))
            .await;

        assert!(outcome.exit.is_success(), "exit: {}", outcome.exit);
        assert_eq!(outcome.stdout_text().lines().count(), 4000);
        assert_eq!(outcome.stderr_text().lines().count(), 4000);
    }

    #[tokio::test]
    async fn test_timeout_kills_and_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "slow.sh", "echo before; sleep 30; echo after");

        let outcome = runner(dir.path(), Some("sh"))
            .run(&descriptor(script, Duration::from_millis(500)))
            .await;

        assert!(outcome.timed_out());
        assert_eq!(outcome.exit, ExitStatus::TimedOut);
        assert_eq!(outcome.stdout_text(), "before\n");
        assert!(outcome.duration >= Duration::from_millis(500));
        assert!(outcome.duration < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "bg.sh", "sleep 30 & sleep 30 & wait");

        let outcome = runner(dir.path(), Some("sh"))
            .run(&descriptor(script, Duration::from_millis(300)))
            .await;

        assert!(outcome.timed_out());
        assert!(outcome.duration < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_leftover_child_holding_stdout_keeps_stderr_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "leak.sh", "sleep 30 2>/dev/null & echo err >&2; exit 0");

        let outcome = runner(dir.path(), Some("sh"))
            .run(&descriptor(script, Duration::from_secs(1)))
            .await;

        assert_eq!(outcome.exit, ExitStatus::Code { code: 0 });
        assert_eq!(outcome.stderr_text(), "err\n");
        assert!(outcome.stdout.is_empty());
        assert!(outcome.duration < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_script_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = runner(dir.path(), None)
            .run(&descriptor(dir.path().join("nope.sh"), Duration::from_secs(5)))
            .await;

        let reason = outcome.launch_error().expect("launch failure");
        assert!(reason.contains("script not found"), "{reason}");
        assert!(!outcome.timed_out());
    }

    #[tokio::test]
    async fn test_non_executable_script_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.sh");
        std::fs::write(&path, "#!/bin/sh\necho hi\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let outcome = runner(dir.path(), None)
            .run(&descriptor(path, Duration::from_secs(5)))
            .await;

        let reason = outcome.launch_error().expect("launch failure");
        assert!(reason.contains("not executable"), "{reason}");
    }

    #[tokio::test]
    async fn test_unknown_interpreter_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "ok.sh", "exit 0");

        let outcome = runner(dir.path(), Some("definitely-not-a-shell-xyz"))
            .run(&descriptor(script, Duration::from_secs(5)))
            .await;

        assert!(outcome.launch_error().unwrap().contains("interpreter"));
    }

    #[tokio::test]
    async fn test_sh_extension_fallback() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "greet.sh", "echo hello");

        let outcome = runner(dir.path(), Some("sh"))
            .run(&descriptor(dir.path().join("greet"), Duration::from_secs(5)))
            .await;

        assert!(outcome.exit.is_success(), "exit: {}", outcome.exit);
        assert_eq!(outcome.stdout_text(), "hello\n");
    }

    #[tokio::test]
    async fn test_runs_in_project_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "found").unwrap();
        let script = write_script(dir.path(), "cat.sh", "cat marker.txt");

        let outcome = runner(dir.path(), Some("sh"))
            .run(&descriptor(script, Duration::from_secs(5)))
            .await;

        assert_eq!(outcome.stdout_text(), "found");
    }

    #[tokio::test]
    async fn test_killed_by_signal() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "suicide.sh", "kill -9 $$");

        let outcome = runner(dir.path(), Some("sh"))
            .run(&descriptor(script, Duration::from_secs(5)))
            .await;

        assert_eq!(outcome.exit, ExitStatus::Signal { signal: 9 });
        assert_eq!(outcome.exit.to_string(), "signal 9");
    }

    #[test]
    fn test_exit_status_display() {
        assert_eq!(ExitStatus::Code { code: 0 }.to_string(), "0");
        assert_eq!(ExitStatus::TimedOut.to_string(), "TIMEOUT");
        assert_eq!(
            ExitStatus::LaunchFailed {
                reason: "x".to_string()
            }
            .to_string(),
            "LAUNCH FAILED"
        );
        assert!(ExitStatus::Code { code: 0 }.is_success());
        assert!(!ExitStatus::TimedOut.is_success());
    }
}
