//! Bounded subprocess runner: a global CPU-sized concurrency limiter, an
//! env overlay applied on top of the parent process's environment, and a
//! raise on nonzero exit. Stdout lines are the return value. Stdout and
//! stderr are streamed concurrently via a `tokio::task::JoinSet` so neither
//! pipe can back up and stall the child.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{BakeryError, Result};
use crate::joblog::JobLog;

/// Per-invocation overrides for a shell call.
#[derive(Clone, Debug, Default)]
pub struct ShellOpts {
    pub name: Option<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<std::path::PathBuf>,
}

/// Runs subprocesses under a global, CPU-sized concurrency bound.
///
/// One `ShellRunner` is shared (via `Arc`) by every recipe in a build, so
/// the concurrency bound is enforced build-wide rather than per recipe.
pub struct ShellRunner {
    limiter: Arc<Semaphore>,
    env: HashMap<String, String>,
}

impl ShellRunner {
    /// Bounds concurrency to the host's CPU count.
    pub fn new() -> Self {
        Self::with_jobs(num_cpus::get())
    }

    /// Bounds concurrency to an explicit job count (the CLI's `-j` override).
    pub fn with_jobs(jobs: usize) -> Self {
        ShellRunner {
            limiter: Arc::new(Semaphore::new(jobs.max(1))),
            env: HashMap::new(),
        }
    }

    /// A runner that inherits this one's concurrency limiter but overlays
    /// additional environment variables onto every call it makes.
    pub fn derive(&self, env: HashMap<String, String>) -> Self {
        let mut merged = self.env.clone();
        merged.extend(env);
        ShellRunner {
            limiter: self.limiter.clone(),
            env: merged,
        }
    }

    /// Runs `argv[0] argv[1..]`, streaming stdout/stderr line by line to
    /// `log`. Returns the captured stdout lines. Fails with
    /// `BakeryError::Subprocess` on a nonzero exit code.
    pub async fn run(&self, argv: &[String], opts: &ShellOpts, log: &JobLog) -> Result<Vec<String>> {
        let permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| BakeryError::Internal(e.to_string()))?;

        log.trace(argv.join(" "));

        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        command.envs(&self.env);
        command.envs(&opts.env);
        if let Some(cwd) = &opts.cwd {
            command.current_dir(cwd);
        }
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command.spawn()?;
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let (stdout_lines, stderr_lines) = collect_both(stdout, stderr, log.clone()).await?;

        let status = child.wait().await?;
        drop(permit);

        match status.code() {
            Some(0) => Ok(stdout_lines),
            code => Err(BakeryError::Subprocess {
                argv: argv.to_vec(),
                stdout: stdout_lines,
                stderr: stderr_lines,
                exit_code: code.unwrap_or(-1),
            }),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

async fn collect_both(
    stdout: ChildStdout,
    stderr: ChildStderr,
    log: JobLog,
) -> Result<(Vec<String>, Vec<String>)> {
    let out_lines = Arc::new(Mutex::new(Vec::new()));
    let err_lines = Arc::new(Mutex::new(Vec::new()));

    let mut join_set = JoinSet::new();

    {
        let out_lines = out_lines.clone();
        let log = log.clone();
        join_set.spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Some(line) = reader.next_line().await.unwrap_or(None) {
                let line = line.trim_end().to_string();
                log.print(&line);
                out_lines.lock().unwrap().push(line);
            }
        });
    }
    {
        let err_lines = err_lines.clone();
        join_set.spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Some(line) = reader.next_line().await.unwrap_or(None) {
                let line = line.trim_end().to_string();
                log.error(&line);
                err_lines.lock().unwrap().push(line);
            }
        });
    }

    while join_set.join_next().await.is_some() {}

    let out = Arc::try_unwrap(out_lines).unwrap().into_inner().unwrap();
    let err = Arc::try_unwrap(err_lines).unwrap().into_inner().unwrap();
    Ok((out, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_lines() {
        let runner = ShellRunner::with_jobs(2);
        let log = JobLog::new(Some("test"));
        let argv = vec!["sh".to_string(), "-c".to_string(), "echo one; echo two".to_string()];
        let lines = runner.run(&argv, &ShellOpts::default(), &log).await.unwrap();
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_subprocess_error() {
        let runner = ShellRunner::with_jobs(2);
        let log = JobLog::new(None);
        let argv = vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()];
        let err = runner.run(&argv, &ShellOpts::default(), &log).await.unwrap_err();
        match err {
            BakeryError::Subprocess { exit_code, .. } => assert_eq!(exit_code, 3),
            other => panic!("expected Subprocess error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn env_overlay_is_visible_to_child() {
        let runner = ShellRunner::with_jobs(1);
        let log = JobLog::new(None);
        let mut opts = ShellOpts::default();
        opts.env.insert("BAKERY_TEST_VAR".into(), "hello".into());
        let argv = vec!["sh".to_string(), "-c".to_string(), "echo $BAKERY_TEST_VAR".to_string()];
        let lines = runner.run(&argv, &opts, &log).await.unwrap();
        assert_eq!(lines, vec!["hello".to_string()]);
    }
}
