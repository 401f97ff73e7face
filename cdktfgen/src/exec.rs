//! External command execution
//!
//! Child processes see an explicit search path carried by [`ExecContext`]
//! instead of the process wide `PATH`, so exposing the pinned toolchain never
//! mutates global state.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Lines of stderr kept on a failed step
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Error)]
pub enum BuildStepError {
    #[error("run: {command:?}: empty command")]
    Empty { command: String },

    #[error("run: {command:?}: invalid search path: {source}")]
    SearchPath {
        command: String,
        #[source]
        source: std::env::JoinPathsError,
    },

    #[error("run: {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("run: {command:?}: {status}{}", stderr_suffix(.stderr))]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\n{}", stderr)
    }
}

impl BuildStepError {
    /// The literal command text of the failed step
    pub fn command(&self) -> &str {
        match self {
            BuildStepError::Empty { command }
            | BuildStepError::SearchPath { command, .. }
            | BuildStepError::Spawn { command, .. }
            | BuildStepError::Failed { command, .. } => command,
        }
    }
}

/// Search path handed to child processes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecContext {
    search_path: Vec<PathBuf>,
}

impl ExecContext {
    /// Start from the search path this process was launched with
    pub fn inherit() -> Self {
        let search_path = std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).collect())
            .unwrap_or_default();
        Self { search_path }
    }

    pub fn from_paths(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    /// Put `dir` ahead of every other search path entry
    pub fn with_prepended(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_path.insert(0, dir.into());
        self
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// The search path in `PATH` form
    pub fn path_env(&self) -> Result<OsString, std::env::JoinPathsError> {
        std::env::join_paths(&self.search_path)
    }

    /// Locate `binary` on this context's search path
    pub fn which(&self, binary: &str, cwd: &Path) -> Result<PathBuf, which::Error> {
        let path = self
            .path_env()
            .map_err(|_| which::Error::CannotFindBinaryPath)?;
        which::which_in(binary, Some(path), cwd)
    }
}

/// Runs one external build step to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` inside `dir`. Returns once the process has exited.
    async fn run(&self, exec: &ExecContext, dir: &Path, command: &str)
        -> Result<(), BuildStepError>;
}

/// Runs commands as child processes
///
/// The command text is split on whitespace into a program and its arguments;
/// no shell is involved. Output is streamed line by line to the debug log
/// while the step runs. A child whose step is abandoned is killed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        exec: &ExecContext,
        dir: &Path,
        command: &str,
    ) -> Result<(), BuildStepError> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| BuildStepError::Empty {
            command: command.to_string(),
        })?;
        let args: Vec<&str> = parts.collect();

        let path_env = exec
            .path_env()
            .map_err(|source| BuildStepError::SearchPath {
                command: command.to_string(),
                source,
            })?;
        let resolved = exec
            .which(program, dir)
            .unwrap_or_else(|_| PathBuf::from(program));

        tracing::debug!(
            cmd = %command,
            program = %resolved.display(),
            dir = %dir.display(),
            "running"
        );

        let spawn_err = |source| BuildStepError::Spawn {
            command: command.to_string(),
            source,
        };

        let mut child = Command::new(&resolved)
            .args(&args)
            .current_dir(dir)
            .env("PATH", path_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, _, stderr_tail) = tokio::try_join!(
            child.wait(),
            drain(command, "stdout", stdout, Tail::new(0)),
            drain(command, "stderr", stderr, Tail::new(STDERR_TAIL_LINES)),
        )
        .map_err(spawn_err)?;

        if !status.success() {
            return Err(BuildStepError::Failed {
                command: command.to_string(),
                status,
                stderr: stderr_tail.into_string(),
            });
        }

        Ok(())
    }
}

/// Log every line of a child stream as it arrives, keeping the last few
async fn drain<R>(
    command: &str,
    stream: &'static str,
    reader: Option<R>,
    mut tail: Tail,
) -> io::Result<Tail>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(tail);
    };

    let mut lines = BufReader::new(reader).split(b'\n');
    while let Some(raw) = lines.next_segment().await? {
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches('\r');
        tracing::debug!(cmd = %command, stream, "{}", line);
        tail.push(line);
    }
    Ok(tail)
}

/// Bounded window over the most recent lines of a stream
#[derive(Debug)]
struct Tail {
    lines: VecDeque<String>,
    limit: usize,
}

impl Tail {
    fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(limit),
            limit,
        }
    }

    fn push(&mut self, line: &str) {
        if self.limit == 0 {
            return;
        }
        if self.lines.len() == self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn into_string(self) -> String {
        let joined = Vec::from(self.lines).join("\n");
        joined.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepended_dir_comes_first() {
        let exec = ExecContext::from_paths(vec![PathBuf::from("/usr/bin")])
            .with_prepended("/tmp/tf-bin");

        assert_eq!(
            exec.search_path(),
            &[PathBuf::from("/tmp/tf-bin"), PathBuf::from("/usr/bin")]
        );
    }

    #[test]
    fn with_prepended_leaves_process_path_untouched() {
        let before = std::env::var_os("PATH");
        let _exec = ExecContext::inherit().with_prepended("/tmp/tf-bin-untouched");
        assert_eq!(std::env::var_os("PATH"), before);
    }

    #[test]
    fn tail_keeps_last_lines() {
        let mut tail = Tail::new(STDERR_TAIL_LINES);
        for i in 0..30 {
            tail.push(&format!("line {i}"));
        }
        let text = tail.into_string();
        assert!(text.starts_with("line 10"));
        assert!(text.ends_with("line 29"));
        assert_eq!(text.lines().count(), STDERR_TAIL_LINES);
    }

    #[test]
    fn zero_limit_tail_keeps_nothing() {
        let mut tail = Tail::new(0);
        tail.push("ignored");
        assert_eq!(tail.into_string(), "");
    }

    #[tokio::test]
    async fn drain_reads_every_line_and_strips_carriage_returns() {
        let input: &[u8] = b"first\r\nsecond\nthird";
        let tail = drain("npm run fetch", "stderr", Some(input), Tail::new(2))
            .await
            .unwrap();
        assert_eq!(tail.into_string(), "second\nthird");
    }

    #[test]
    fn failed_step_message_names_command() {
        let err = BuildStepError::Empty {
            command: "   ".to_string(),
        };
        assert_eq!(err.command(), "   ");
        assert!(err.to_string().starts_with(r#"run: "   ""#));
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;

        fn write_script(dir: &Path, name: &str, body: &str) {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        #[tokio::test]
        async fn runner_succeeds_on_zero_exit() {
            let dir = tempfile::tempdir().unwrap();
            let result = ProcessRunner
                .run(&ExecContext::inherit(), dir.path(), "true")
                .await;
            assert!(result.is_ok());
        }

        #[tokio::test]
        async fn runner_reports_non_zero_exit_with_command_text() {
            let dir = tempfile::tempdir().unwrap();
            let err = ProcessRunner
                .run(&ExecContext::inherit(), dir.path(), "false")
                .await
                .unwrap_err();

            assert!(matches!(err, BuildStepError::Failed { .. }));
            assert_eq!(err.command(), "false");
            assert!(err.to_string().contains(r#""false""#));
        }

        #[tokio::test]
        async fn runner_finds_binaries_on_prepended_path() {
            let bin = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            write_script(bin.path(), "cdktfgen-test-tool", "pwd > out.txt");

            let exec = ExecContext::inherit().with_prepended(bin.path());
            ProcessRunner
                .run(&exec, work.path(), "cdktfgen-test-tool --flag")
                .await
                .unwrap();

            let written = std::fs::read_to_string(work.path().join("out.txt")).unwrap();
            assert_eq!(
                Path::new(written.trim()).canonicalize().unwrap(),
                work.path().canonicalize().unwrap()
            );
        }

        #[tokio::test]
        async fn runner_captures_stderr_of_failed_step() {
            let bin = tempfile::tempdir().unwrap();
            write_script(bin.path(), "cdktfgen-failing-tool", "echo boom >&2\nexit 3");

            let exec = ExecContext::inherit().with_prepended(bin.path());
            let err = ProcessRunner
                .run(&exec, bin.path(), "cdktfgen-failing-tool")
                .await
                .unwrap_err();
            match err {
                BuildStepError::Failed { status, stderr, .. } => {
                    assert_eq!(status.code(), Some(3));
                    assert_eq!(stderr, "boom");
                }
                other => panic!("Expected Failed error, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn runner_drains_output_larger_than_pipe_buffer() {
            let bin = tempfile::tempdir().unwrap();
            write_script(
                bin.path(),
                "cdktfgen-chatty-tool",
                "seq 1 200000\nseq 1 200000 >&2",
            );

            let exec = ExecContext::inherit().with_prepended(bin.path());
            let result = tokio::time::timeout(
                std::time::Duration::from_secs(30),
                ProcessRunner.run(&exec, bin.path(), "cdktfgen-chatty-tool"),
            )
            .await
            .expect("chatty step should not stall on a full pipe");
            assert!(result.is_ok());
        }

        #[tokio::test]
        async fn runner_keeps_tail_of_long_failing_stderr() {
            let bin = tempfile::tempdir().unwrap();
            write_script(
                bin.path(),
                "cdktfgen-noisy-failure",
                "seq 1 100 >&2\nexit 1",
            );

            let exec = ExecContext::inherit().with_prepended(bin.path());
            let err = ProcessRunner
                .run(&exec, bin.path(), "cdktfgen-noisy-failure")
                .await
                .unwrap_err();
            match err {
                BuildStepError::Failed { stderr, .. } => {
                    assert_eq!(stderr.lines().count(), STDERR_TAIL_LINES);
                    assert!(stderr.starts_with("81"));
                    assert!(stderr.ends_with("100"));
                }
                other => panic!("Expected Failed error, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn runner_tolerates_non_utf8_stderr() {
            let bin = tempfile::tempdir().unwrap();
            write_script(
                bin.path(),
                "cdktfgen-binary-stderr",
                "printf 'bad \\377 byte\\n' >&2\nexit 1",
            );

            let exec = ExecContext::inherit().with_prepended(bin.path());
            let err = ProcessRunner
                .run(&exec, bin.path(), "cdktfgen-binary-stderr")
                .await
                .unwrap_err();
            match err {
                BuildStepError::Failed { stderr, .. } => {
                    assert_eq!(stderr, "bad \u{FFFD} byte");
                }
                other => panic!("Expected Failed error, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn runner_reports_missing_program() {
            let dir = tempfile::tempdir().unwrap();
            let exec = ExecContext::from_paths(vec![dir.path().to_path_buf()]);
            let err = ProcessRunner
                .run(&exec, dir.path(), "cdktfgen-no-such-program")
                .await
                .unwrap_err();
            assert!(matches!(err, BuildStepError::Spawn { .. }));
        }

        #[tokio::test]
        async fn runner_rejects_empty_command() {
            let dir = tempfile::tempdir().unwrap();
            let err = ProcessRunner
                .run(&ExecContext::inherit(), dir.path(), "  ")
                .await
                .unwrap_err();
            assert!(matches!(err, BuildStepError::Empty { .. }));
        }
    }
}
