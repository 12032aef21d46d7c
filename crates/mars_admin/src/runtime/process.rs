//! Child process spawning and the handle that owns it

use crate::runtime::output::{LineQueue, StreamDrainer, StreamError, StreamSource};
use crate::runtime::pid_file::PidFile;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// Where the child's stdout and stderr go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Share the launcher's stdout/stderr
    #[default]
    Inherit,
    /// Pipe both streams into line queues
    Capture,
}

/// Everything needed to spawn one child
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Executable path or name looked up on PATH
    pub program: String,
    /// Arguments after the program
    pub args: Vec<String>,
    /// Variables added on top of the inherited environment
    pub env: HashMap<String, String>,
    /// Working directory (inherited when `None`)
    pub working_dir: Option<PathBuf>,
    pub output: OutputMode,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
            working_dir: None,
            output: OutputMode::Inherit,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Program and arguments joined by spaces, for display
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Spawns children and records their PID
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    pid_file: Option<PidFile>,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the PID of every successfully spawned child in `pid_file`
    pub fn with_pid_file(mut self, pid_file: PidFile) -> Self {
        self.pid_file = Some(pid_file);
        self
    }

    /// Spawn the child described by `spec`.
    ///
    /// In [`OutputMode::Capture`] both pipes get a [`StreamDrainer`] before
    /// this returns, so a chatty child can never fill a pipe and stall.
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self, spec: &LaunchSpec) -> Result<ProcessHandle, LaunchError> {
        log::debug!("Spawning: {}", spec.command_line());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).envs(&spec.env).stdin(Stdio::null());

        match spec.output {
            OutputMode::Capture => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            log::error!("Failed to spawn '{}': {}", spec.command_line(), e);
            LaunchError::Spawn {
                command: spec.command_line(),
                source: e,
            }
        })?;

        let mut drainers = Vec::new();
        let stdout = child.stdout.take().map(|stream| {
            let (drainer, queue) = StreamDrainer::spawn(StreamSource::Stdout, stream);
            drainers.push(drainer);
            queue
        });
        let stderr = child.stderr.take().map(|stream| {
            let (drainer, queue) = StreamDrainer::spawn(StreamSource::Stderr, stream);
            drainers.push(drainer);
            queue
        });

        let Some(pid) = child.id() else {
            return Err(LaunchError::MissingPid(spec.command_line()));
        };
        log::info!("Started '{}' with PID {}", spec.program, pid);

        if let Some(pid_file) = &self.pid_file {
            // The child is already running, so a failed write must not abort the launch
            match pid_file.write(pid) {
                Ok(()) => log::debug!("Wrote PID {} to {}", pid, pid_file.path().display()),
                Err(e) => log::warn!("{}", e),
            }
        }

        Ok(ProcessHandle {
            program: spec.program.clone(),
            pid,
            child,
            exit_code: None,
            stdout,
            stderr,
            drainers,
        })
    }
}

/// A spawned child.
///
/// Owns the OS process and the consumer ends of its output queues. The exit
/// code is recorded the first time it is observed and never changes after.
pub struct ProcessHandle {
    program: String,
    pid: u32,
    child: Child,
    exit_code: Option<i32>,
    stdout: Option<LineQueue>,
    stderr: Option<LineQueue>,
    drainers: Vec<StreamDrainer>,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Exit code, if the child has been observed to exit
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Captured stdout lines (only in [`OutputMode::Capture`])
    pub fn stdout(&mut self) -> Option<&mut LineQueue> {
        self.stdout.as_mut()
    }

    /// Captured stderr lines (only in [`OutputMode::Capture`])
    pub fn stderr(&mut self) -> Option<&mut LineQueue> {
        self.stderr.as_mut()
    }

    /// Move the stdout queue out, e.g. to poll it from another task
    pub fn take_stdout(&mut self) -> Option<LineQueue> {
        self.stdout.take()
    }

    /// Move the stderr queue out, e.g. to poll it from another task
    pub fn take_stderr(&mut self) -> Option<LineQueue> {
        self.stderr.take()
    }

    /// Check for exit without waiting
    pub fn try_exit_code(&mut self) -> std::io::Result<Option<i32>> {
        if self.exit_code.is_some() {
            return Ok(self.exit_code);
        }
        match self.child.try_wait()? {
            Some(status) => Ok(Some(self.record_exit(status))),
            None => Ok(None),
        }
    }

    /// Wait until the child exits. Cancel safe.
    pub async fn wait_exit(&mut self) -> std::io::Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let status = self.child.wait().await?;
        Ok(self.record_exit(status))
    }

    /// Kill the child and reap it
    pub async fn kill(&mut self) -> std::io::Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        log::info!("[{}] Killing PID {}", self.program, self.pid);
        self.child.kill().await?;
        self.wait_exit().await
    }

    /// Stop every drainer. Lines already queued stay readable.
    pub fn close_streams(&self) {
        for drainer in &self.drainers {
            drainer.close();
        }
    }

    /// Wait for every drainer to reach end-of-stream.
    ///
    /// Returns the errors of drainers that ended any other way.
    pub async fn finish_streams(&mut self) -> Vec<StreamError> {
        let mut errors = Vec::new();
        for drainer in self.drainers.drain(..) {
            if let Err(e) = drainer.finish().await {
                errors.push(e);
            }
        }
        errors
    }

    fn record_exit(&mut self, status: ExitStatus) -> i32 {
        *self.exit_code.get_or_insert_with(|| exit_code_of(status))
    }
}

/// Exit code of a finished child; signals map to `128 + signo` on unix
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

/// Errors that prevent a child from existing at all
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Spawned '{0}' but it has no PID")]
    MissingPid(String),
}

impl LaunchError {
    /// Underlying OS error code, never zero
    pub fn os_code(&self) -> i32 {
        match self {
            LaunchError::Spawn { source, .. } => match source.raw_os_error() {
                Some(code) if code != 0 => code,
                _ => 1,
            },
            LaunchError::MissingPid(_) => 1,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec::new("sh", vec!["-c".to_string(), script.to_string()])
            .with_output(OutputMode::Capture)
    }

    #[test]
    fn test_command_line() {
        let spec = LaunchSpec::new("java", vec!["-cp".into(), "a.jar".into(), "Main".into()]);
        assert_eq!(spec.command_line(), "java -cp a.jar Main");
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let spec = LaunchSpec::new("/nonexistent/definitely-not-here", vec![]);
        let err = ProcessLauncher::new().spawn(&spec).err().unwrap();

        assert!(matches!(err, LaunchError::Spawn { .. }));
        assert_ne!(err.os_code(), 0);
        assert!(err.to_string().contains("/nonexistent/definitely-not-here"));
    }

    #[tokio::test]
    async fn test_capture_tags_streams() {
        let mut handle = ProcessLauncher::new()
            .spawn(&sh("echo out; echo err >&2"))
            .unwrap();

        assert_eq!(handle.wait_exit().await.unwrap(), 0);
        assert!(handle.finish_streams().await.is_empty());

        let out = handle.stdout().unwrap().try_read().unwrap();
        assert_eq!(out.text, "out");
        assert_eq!(out.source, StreamSource::Stdout);

        let err = handle.stderr().unwrap().try_read().unwrap();
        assert_eq!(err.text, "err");
        assert!(err.source.is_stderr());
    }

    #[tokio::test]
    async fn test_inherit_has_no_queues() {
        let spec = LaunchSpec::new("true", vec![]);
        let mut handle = ProcessLauncher::new().spawn(&spec).unwrap();
        assert!(handle.stdout().is_none());
        assert!(handle.stderr().is_none());
        handle.wait_exit().await.unwrap();
    }

    #[tokio::test]
    async fn test_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = HashMap::new();
        env.insert("MARS_TEST_VALUE".to_string(), "hello env".to_string());
        let spec = sh("echo \"$MARS_TEST_VALUE\"; pwd")
            .with_env(env)
            .with_working_dir(dir.path());

        let mut handle = ProcessLauncher::new().spawn(&spec).unwrap();
        handle.wait_exit().await.unwrap();
        handle.finish_streams().await;

        let lines = handle.stdout().unwrap().drain_available();
        assert_eq!(lines[0].text, "hello env");
        let cwd = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(std::fs::canonicalize(&lines[1].text).unwrap(), cwd);
    }

    #[tokio::test]
    async fn test_exit_code_is_recorded_once() {
        let mut handle = ProcessLauncher::new().spawn(&sh("exit 3")).unwrap();
        assert_eq!(handle.wait_exit().await.unwrap(), 3);
        assert_eq!(handle.exit_code(), Some(3));
        assert_eq!(handle.try_exit_code().unwrap(), Some(3));
        assert_eq!(handle.kill().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_kill_reports_signal() {
        let mut handle = ProcessLauncher::new().spawn(&sh("sleep 30")).unwrap();
        assert_eq!(handle.try_exit_code().unwrap(), None);

        let code = tokio::time::timeout(Duration::from_secs(5), handle.kill())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code, 128 + 9);
    }

    #[tokio::test]
    async fn test_pid_file_written_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("logs").join("mars.pid"));
        let launcher = ProcessLauncher::new().with_pid_file(pid_file.clone());

        let mut handle = launcher.spawn(&sh("exit 0")).unwrap();
        assert_eq!(pid_file.read().unwrap(), Some(handle.pid()));
        handle.wait_exit().await.unwrap();
    }

    #[tokio::test]
    async fn test_pid_file_untouched_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = PidFile::new(dir.path().join("mars.pid"));
        let launcher = ProcessLauncher::new().with_pid_file(pid_file.clone());

        let spec = LaunchSpec::new("/nonexistent/definitely-not-here", vec![]);
        assert!(launcher.spawn(&spec).is_err());
        assert!(!pid_file.path().exists());
    }
}
