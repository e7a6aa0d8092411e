//! Execution sandbox: runs one target in its own process group
//!
//! The sandbox owns the child for the whole run. It starts the sampler right
//! after spawning, supervises the child until it exits or the timeout fires,
//! reaps it on every path, and only then returns. Faults raised by the target
//! end up in the returned [`ExecutionResult`]; only load failures and faults
//! of the sandbox itself are returned as errors.

use crate::cancel::CancellationToken;
use crate::config::AnalyzerConfig;
use crate::error::{LoadError, SandboxError};
use crate::metrics::MetricSummary;
use crate::result::{
    CapturedStream, ErrorInfo, ExecutionResult, ExecutionStatus, Hotspot, TestOutcome,
};
use crate::runner::{RunnerTable, HOTSPOT_LIMIT_ENV, RESULT_FILE_ENV, RESULT_MARKER};
use crate::sampler::{ExitUsage, Sampler};
use crate::target::AnalysisTarget;
use chrono::Utc;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// How often the supervisor polls the child for exit
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Longest stderr excerpt quoted in an `ExitStatus` message
const EXIT_MESSAGE_EXCERPT_CHARS: usize = 200;

/// Runs targets under a timeout with concurrent sampling
#[derive(Debug, Clone)]
pub struct Sandbox {
    runners: RunnerTable,
    sampler: Sampler,
    kill_grace: Duration,
    max_output_bytes: usize,
    hotspot_limit: usize,
}

/// How the child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Exited(i32),
    Signaled(Signal),
}

#[derive(Debug, Clone, Copy)]
struct ChildExit {
    termination: Termination,
    usage: ExitUsage,
    timed_out: bool,
}

/// Result written by the Python harness
#[derive(Debug, Default, Deserialize)]
struct HarnessReport {
    #[serde(default)]
    outcomes: Vec<TestOutcome>,
    #[serde(default)]
    hotspots: Vec<Hotspot>,
    #[serde(default)]
    error: Option<ErrorInfo>,
    #[serde(default)]
    load_error: Option<String>,
    #[serde(default)]
    line: Option<u32>,
}

impl Sandbox {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            runners: RunnerTable::from_config(config),
            sampler: Sampler::new(config.sample_interval()),
            kill_grace: config.kill_grace(),
            max_output_bytes: config.sandbox.max_output_bytes,
            hotspot_limit: config.sandbox.hotspot_limit,
        }
    }

    /// Run a target; see [`Sandbox::run_with_token`]
    pub fn run(
        &self,
        target: &AnalysisTarget,
        timeout: Duration,
    ) -> Result<ExecutionResult, SandboxError> {
        self.run_with_token(target, timeout, &CancellationToken::new())
    }

    /// Run a target until it exits, `timeout` elapses or `token` is cancelled
    ///
    /// Cancellation and timeout both terminate the process group (SIGTERM,
    /// then SIGKILL after the grace period) and report `timeout`.
    pub fn run_with_token(
        &self,
        target: &AnalysisTarget,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<ExecutionResult, SandboxError> {
        check_loadable(target)?;
        let command = self.runners.resolve(target)?;

        let result_file = if command.harness {
            let file = tempfile::Builder::new()
                .prefix("codeprof-result-")
                .suffix(".json")
                .tempfile()
                .map_err(|source| SandboxError::Io {
                    operation: "create result file",
                    source,
                })?;
            Some(file)
        } else {
            None
        };

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("CODEPROF", "1")
            .process_group(0);
        if let Some(file) = &result_file {
            process
                .env(RESULT_FILE_ENV, file.path())
                .env(HOTSPOT_LIMIT_ENV, self.hotspot_limit.to_string());
        }

        let started_at = Utc::now();
        let started = Instant::now();
        let mut child = process
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let pid = Pid::from_raw(child.id() as i32);
        tracing::debug!(target = %target.display_name(), pid = pid.as_raw(), "spawned runner");

        let stdout = capture(child.stdout.take(), self.max_output_bytes, "stdout");
        let stderr = capture(child.stderr.take(), self.max_output_bytes, "stderr");

        let sampler = match self.sampler.start(child.id(), started, token.clone()) {
            Ok(handle) => handle,
            Err(source) => {
                self.kill_and_reap(pid);
                return Err(SandboxError::Io {
                    operation: "start sampler",
                    source,
                });
            }
        };

        let exit = self.supervise(pid, started, timeout, token);
        let wall_time_secs = started.elapsed().as_secs_f64();
        let ended_at = Utc::now();

        // Stragglers left in the group by the runner
        let _ = killpg(pid, Signal::SIGKILL);

        let exit = match exit {
            Ok(exit) => exit,
            Err(source) => {
                token.cancel();
                let _ = sampler.finish(ExitUsage::default());
                return Err(SandboxError::Io {
                    operation: "wait for child",
                    source,
                });
            }
        };

        let series = sampler.finish(ExitUsage {
            elapsed_secs: wall_time_secs,
            ..exit.usage
        });
        if let Some(reason) = series.degraded() {
            tracing::warn!(target = %target.display_name(), "sampling degraded: {}", reason);
        }

        let stdout = self.collect(stdout, "stdout");
        let mut stderr = self.collect(stderr, "stderr");

        let report = match &result_file {
            Some(file) => {
                let from_stderr = take_harness_report(&mut stderr);
                read_harness_file(file.path()).or(from_stderr)
            }
            None => None,
        };

        if let Some(report) = &report {
            if let Some(err) = harness_load_error(target, report) {
                return Err(err.into());
            }
        }

        let (status, error) = classify_exit(&exit, timeout, report.as_ref(), &stderr);
        let exit_code = match exit.termination {
            Termination::Exited(code) if !exit.timed_out => Some(code),
            _ => None,
        };

        tracing::debug!(
            target = %target.display_name(),
            status = status.as_str(),
            wall_time_secs,
            samples = series.len(),
            "run finished"
        );

        let summary = MetricSummary::from_series(&series, wall_time_secs);
        let (tests, hotspots) = report
            .map(|r| (r.outcomes, r.hotspots))
            .unwrap_or_default();
        Ok(ExecutionResult {
            target: target.clone(),
            status,
            exit_code,
            error,
            stdout,
            stderr,
            tests,
            hotspots,
            samples: series,
            summary,
            started_at,
            ended_at,
            wall_time_secs,
        })
    }

    /// Poll the child until it exits or the deadline passes
    fn supervise(
        &self,
        pid: Pid,
        started: Instant,
        timeout: Duration,
        token: &CancellationToken,
    ) -> std::io::Result<ChildExit> {
        // None when the timeout is too large to represent; such a run never times out
        let deadline = started.checked_add(timeout);
        loop {
            match wait4(pid, libc::WNOHANG) {
                Ok(Some((termination, usage))) => {
                    return Ok(ChildExit {
                        termination,
                        usage,
                        timed_out: false,
                    })
                }
                Ok(None) => {}
                Err(err) => {
                    self.kill_and_reap(pid);
                    return Err(err);
                }
            }

            let now = Instant::now();
            if token.is_cancelled() || deadline.is_some_and(|d| now >= d) {
                token.cancel();
                tracing::debug!(pid = pid.as_raw(), "timeout fired, terminating process group");
                return self.terminate(pid);
            }

            let pause = deadline.map_or(POLL_INTERVAL, |d| {
                d.saturating_duration_since(now).min(POLL_INTERVAL)
            });
            std::thread::sleep(pause);
        }
    }

    /// SIGTERM the group, escalate to SIGKILL after the grace period, reap
    fn terminate(&self, pid: Pid) -> std::io::Result<ChildExit> {
        let _ = killpg(pid, Signal::SIGTERM);
        let grace_deadline = Instant::now().checked_add(self.kill_grace);

        while !grace_deadline.is_some_and(|d| Instant::now() >= d) {
            if let Some((termination, usage)) = wait4(pid, libc::WNOHANG)? {
                return Ok(ChildExit {
                    termination,
                    usage,
                    timed_out: true,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        tracing::debug!(pid = pid.as_raw(), "grace period elapsed, sending SIGKILL");
        let _ = killpg(pid, Signal::SIGKILL);
        loop {
            if let Some((termination, usage)) = wait4(pid, 0)? {
                return Ok(ChildExit {
                    termination,
                    usage,
                    timed_out: true,
                });
            }
        }
    }

    fn kill_and_reap(&self, pid: Pid) {
        let _ = killpg(pid, Signal::SIGKILL);
        if let Err(err) = wait4(pid, 0) {
            tracing::warn!(pid = pid.as_raw(), "failed to reap child: {}", err);
        }
    }

    /// Wait a bounded time for a reader; abandon it if the pipe stays open
    fn collect(&self, rx: Receiver<CapturedStream>, name: &str) -> CapturedStream {
        match rx.recv_timeout(self.kill_grace) {
            Ok(stream) => stream,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("{} still open after target exit, abandoning reader", name);
                CapturedStream {
                    text: String::new(),
                    truncated: true,
                }
            }
            Err(RecvTimeoutError::Disconnected) => CapturedStream::default(),
        }
    }
}

fn check_loadable(target: &AnalysisTarget) -> Result<(), LoadError> {
    match std::fs::metadata(target.path()) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(LoadError::Unreadable {
            path: target.path().to_path_buf(),
            reason: "not a regular file".to_string(),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(LoadError::Missing {
            path: target.path().to_path_buf(),
        }),
        Err(err) => Err(LoadError::Unreadable {
            path: target.path().to_path_buf(),
            reason: err.to_string(),
        }),
    }
}

/// `wait4(2)` returning the child's own resource usage
///
/// Returns `Ok(None)` when `WNOHANG` is set and the child is still running.
fn wait4(pid: Pid, flags: libc::c_int) -> std::io::Result<Option<(Termination, ExitUsage)>> {
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: rusage is plain old data; all-zero is a valid value
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        // SAFETY: both out-pointers are valid for the duration of the call
        let rc = unsafe { libc::wait4(pid.as_raw(), &mut status, flags, &mut usage) };

        if rc == 0 {
            return Ok(None);
        }
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        let termination = match WaitStatus::from_raw(pid, status).map_err(std::io::Error::from)? {
            WaitStatus::Exited(_, code) => Termination::Exited(code),
            WaitStatus::Signaled(_, signal, _) => Termination::Signaled(signal),
            // Not requested (no WUNTRACED/WCONTINUED); keep waiting
            _ => continue,
        };

        let cpu_secs = timeval_secs(&usage.ru_utime) + timeval_secs(&usage.ru_stime);
        // ru_maxrss is in kilobytes on Linux
        let peak_rss_bytes = u64::try_from(usage.ru_maxrss).ok().map(|kb| kb * 1024);

        return Ok(Some((
            termination,
            ExitUsage {
                elapsed_secs: 0.0,
                peak_rss_bytes,
                cpu_secs: Some(cpu_secs),
            },
        )));
    }
}

fn timeval_secs(tv: &libc::timeval) -> f64 {
    tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0
}

/// Drain a pipe on its own thread, keeping at most `limit` bytes
fn capture<R>(stream: Option<R>, limit: usize, name: &'static str) -> Receiver<CapturedStream>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = bounded(1);
    let Some(mut stream) = stream else {
        return rx;
    };

    let spawned = std::thread::Builder::new()
        .name(format!("codeprof-{name}"))
        .spawn(move || {
            let mut kept = Vec::new();
            let mut truncated = false;
            let mut buf = [0u8; 8192];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let room = limit.saturating_sub(kept.len());
                        kept.extend_from_slice(&buf[..n.min(room)]);
                        truncated |= n > room;
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            let _ = tx.send(CapturedStream {
                text: String::from_utf8_lossy(&kept).into_owned(),
                truncated,
            });
        });

    if let Err(err) = spawned {
        tracing::warn!("failed to start {} reader: {}", name, err);
    }
    rx
}

/// Remove harness marker lines from stderr and parse the last one
fn take_harness_report(stderr: &mut CapturedStream) -> Option<HarnessReport> {
    let mut report = None;
    let mut kept = String::with_capacity(stderr.text.len());
    for line in stderr.text.split_inclusive('\n') {
        match line.strip_prefix(RESULT_MARKER) {
            Some(payload) => match serde_json::from_str::<HarnessReport>(payload.trim()) {
                Ok(parsed) => report = Some(parsed),
                Err(err) => tracing::warn!("unparseable harness result line: {}", err),
            },
            None => kept.push_str(line),
        }
    }
    stderr.text = kept;
    report
}

/// Parse the harness's result file; `None` if it never wrote one
fn read_harness_file(path: &Path) -> Option<HarnessReport> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(path = %path.display(), "failed to read harness result: {}", err);
            return None;
        }
    };
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&text) {
        Ok(report) => Some(report),
        Err(err) => {
            tracing::warn!(path = %path.display(), "unparseable harness result: {}", err);
            None
        }
    }
}

/// Load failure reported by the harness, if any
///
/// Unknown kinds are logged and ignored so the run is classified from its
/// exit status instead.
fn harness_load_error(target: &AnalysisTarget, report: &HarnessReport) -> Option<LoadError> {
    let kind = report.load_error.as_deref()?;
    let message = report
        .error
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_default();
    match kind {
        "syntax" => Some(LoadError::Syntax {
            path: target.path().to_path_buf(),
            message,
            line: report.line,
        }),
        "missing_test" => Some(LoadError::MissingTest {
            path: target.path().to_path_buf(),
            name: target.test().unwrap_or(&message).to_string(),
        }),
        other => {
            tracing::warn!(
                target = %target.display_name(),
                kind = other,
                "ignoring unknown harness load error"
            );
            None
        }
    }
}

fn classify_exit(
    exit: &ChildExit,
    timeout: Duration,
    report: Option<&HarnessReport>,
    stderr: &CapturedStream,
) -> (ExecutionStatus, Option<ErrorInfo>) {
    if exit.timed_out {
        return (
            ExecutionStatus::Timeout,
            Some(ErrorInfo::new(
                "TimeoutError",
                format!("execution exceeded {:.3}s", timeout.as_secs_f64()),
            )),
        );
    }

    let reported = report.and_then(|r| r.error.clone());
    match exit.termination {
        Termination::Exited(0) => (ExecutionStatus::Success, None),
        Termination::Exited(code) => {
            let error = reported.unwrap_or_else(|| {
                let mut message = format!("exited with code {code}");
                if let Some(line) = last_line(&stderr.text) {
                    message.push_str(": ");
                    message.push_str(&excerpt(line, EXIT_MESSAGE_EXCERPT_CHARS));
                }
                ErrorInfo::new("ExitStatus", message)
            });
            (ExecutionStatus::Failure, Some(error))
        }
        Termination::Signaled(signal) => (
            ExecutionStatus::Failure,
            Some(ErrorInfo::new(
                "Signal",
                format!("terminated by {}", signal.as_str()),
            )),
        ),
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

/// First `max_chars` characters of `line`, with `...` appended when cut
fn excerpt(line: &str, max_chars: usize) -> String {
    match line.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &line[..end]),
        None => line.to_string(),
    }
}
