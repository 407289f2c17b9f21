//! Analyzer subprocess lifecycle.
//!
//! Spawns the analyzer command with piped stdio and hands the stdin/stdout
//! halves to the orchestrator. The process is killed on drop so a panicking
//! orchestrator cannot leak children.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use toolscribe_core::{
    env_string_with_default, Result, ScribeError, SPAWN_TIMEOUT_SECS,
};

/// How to launch the analyzer subprocess.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Program to execute.
    pub program: String,
    /// Arguments; the defaults request line-oriented JSON on both pipes.
    pub args: Vec<String>,
    /// Working directory, when the analyzer should run inside the project.
    pub working_dir: Option<PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let program = env_string_with_default("TOOLSCRIBE_ANALYZER_CMD", "claude");
        let args = match std::env::var("TOOLSCRIBE_ANALYZER_ARGS") {
            Ok(raw) if !raw.is_empty() => raw.split_whitespace().map(ToOwned::to_owned).collect(),
            _ => vec![
                "-p".to_owned(),
                "--output-format".to_owned(),
                "stream-json".to_owned(),
                "--input-format".to_owned(),
                "stream-json".to_owned(),
                "--verbose".to_owned(),
            ],
        };
        Self { program, args, working_dir: None }
    }
}

/// Handle to a running analyzer subprocess.
#[derive(Debug)]
pub struct AnalyzerProcess {
    child: Child,
    pid: u32,
}

impl AnalyzerProcess {
    /// Spawn the analyzer with piped stdio. Bounded by the external
    /// readiness timeout.
    ///
    /// # Errors
    /// Returns `ScribeError::Analyzer` if the command is missing or cannot
    /// be spawned.
    pub async fn spawn(config: &AnalyzerConfig) -> Result<Self> {
        let spawn = async {
            let mut cmd = Command::new(&config.program);
            cmd.args(&config.args);
            if let Some(ref dir) = config.working_dir {
                cmd.current_dir(dir);
            }
            cmd.stdin(Stdio::piped());
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
            cmd.kill_on_drop(true);

            cmd.spawn().map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ScribeError::Analyzer(format!(
                        "analyzer command '{}' not found on PATH",
                        config.program
                    ))
                } else {
                    ScribeError::Analyzer(format!("failed to spawn analyzer: {e}"))
                }
            })
        };

        let child = tokio::time::timeout(Duration::from_secs(SPAWN_TIMEOUT_SECS), spawn)
            .await
            .map_err(|_elapsed| ScribeError::Analyzer("analyzer spawn timed out".to_owned()))??;

        let pid = child.id().unwrap_or(0);
        tracing::debug!(pid, program = %config.program, "analyzer subprocess spawned");
        Ok(Self { child, pid })
    }

    /// Process id for logging.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Take the stdin handle (can only be taken once).
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take the stdout handle (can only be taken once).
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the stderr handle (can only be taken once).
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Forcefully terminate the subprocess.
    ///
    /// # Errors
    /// Returns `ScribeError::Analyzer` if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|e| ScribeError::Analyzer(format!("failed to kill analyzer: {e}")))
    }

    /// Wait for exit and return the status code, if any.
    ///
    /// # Errors
    /// Returns `ScribeError::Analyzer` if waiting fails.
    pub async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ScribeError::Analyzer(format!("failed to wait for analyzer: {e}")))?;
        Ok(status.code())
    }
}

impl Drop for AnalyzerProcess {
    fn drop(&mut self) {
        // non-async kill; reaped by the runtime
        let _ = self.child.start_kill();
    }
}

/// Relay analyzer stderr lines into the log at debug level.
pub fn spawn_stderr_logger(stderr: ChildStderr, pid: u32) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(pid, "analyzer stderr: {}", line);
        }
    });
}
