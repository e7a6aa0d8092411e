//! Metric sampler: polls a running target at a fixed interval
//!
//! The sampler runs on its own thread from the moment the target is spawned
//! until the sandbox stops it (after reaping the child) or the cancellation
//! token fires. Its only blocking point is the interval sleep, implemented as
//! a `recv_timeout` on the stop channel so that stopping is immediate.

use crate::cancel::CancellationToken;
use crate::metrics::{MetricSample, SampleSeries};
use crate::procfs::{ProbeError, ProcSnapshot, ProcessProbe};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Counters of a reaped child, used for the end-of-run sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExitUsage {
    pub elapsed_secs: f64,
    /// Peak resident size reported by the kernel
    pub peak_rss_bytes: Option<u64>,
    /// Total user + system CPU time
    pub cpu_secs: Option<f64>,
}

/// Sampler configuration
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    interval: Duration,
}

impl Sampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start sampling `pid`; `started` is the instant the child was spawned
    pub fn start(
        &self,
        pid: u32,
        started: Instant,
        token: CancellationToken,
    ) -> std::io::Result<SamplerHandle> {
        let (stop_tx, stop_rx) = bounded(1);
        let interval = self.interval;
        let worker = std::thread::Builder::new()
            .name(format!("codeprof-sampler-{pid}"))
            .spawn(move || sample_loop(pid, started, interval, &stop_rx, &token))?;

        Ok(SamplerHandle {
            stop: stop_tx,
            worker,
        })
    }
}

/// Running sampler; must be finished to collect the series
pub struct SamplerHandle {
    stop: Sender<()>,
    worker: JoinHandle<SamplerState>,
}

impl SamplerHandle {
    /// Stop sampling, join the thread and append the end-of-run sample
    pub fn finish(self, usage: ExitUsage) -> SampleSeries {
        // The worker may already have exited on cancellation
        let _ = self.stop.send(());
        let mut state = match self.worker.join() {
            Ok(state) => state,
            Err(_) => {
                let mut state = SamplerState::default();
                state.series.mark_degraded("sampler thread panicked");
                state
            }
        };
        state.record_exit(usage);
        state.series
    }
}

#[derive(Debug, Default)]
struct SamplerState {
    series: SampleSeries,
    last_elapsed: f64,
    last_cpu_secs: f64,
}

impl SamplerState {
    fn record(&mut self, probe: &ProcessProbe, snapshot: ProcSnapshot, elapsed: f64) {
        if !snapshot.unavailable.is_empty() {
            self.series.mark_degraded(snapshot.unavailable.join("; "));
        }

        let previous = self.series.last().copied().unwrap_or_default();
        let cpu_percent = match snapshot.cpu_ticks {
            Some(ticks) => {
                let cpu_secs = probe.ticks_to_secs(ticks);
                let percent = self.cpu_percent_since_last(cpu_secs, elapsed);
                self.last_cpu_secs = cpu_secs;
                percent
            }
            None => 0.0,
        };

        self.push(MetricSample {
            elapsed_secs: elapsed,
            memory_bytes: snapshot.rss_bytes.unwrap_or(previous.memory_bytes),
            cpu_percent,
            io_ops: snapshot.io_ops.unwrap_or(previous.io_ops),
            network_calls: snapshot.sockets.unwrap_or(previous.network_calls),
        });
    }

    fn record_time_only(&mut self, elapsed: f64) {
        self.push(MetricSample {
            elapsed_secs: elapsed,
            ..Default::default()
        });
    }

    fn record_exit(&mut self, usage: ExitUsage) {
        let previous = self.series.last().copied().unwrap_or_default();
        let cpu_percent = match usage.cpu_secs {
            Some(cpu_secs) => self.cpu_percent_since_last(cpu_secs, usage.elapsed_secs),
            None => previous.cpu_percent,
        };

        self.push(MetricSample {
            elapsed_secs: usage.elapsed_secs,
            memory_bytes: usage
                .peak_rss_bytes
                .unwrap_or(0)
                .max(previous.memory_bytes),
            cpu_percent,
            io_ops: previous.io_ops,
            network_calls: previous.network_calls,
        });
    }

    fn cpu_percent_since_last(&self, cpu_secs: f64, elapsed: f64) -> f64 {
        let wall = elapsed - self.last_elapsed;
        let cpu = cpu_secs - self.last_cpu_secs;
        if wall > 0.0 && cpu >= 0.0 {
            cpu / wall * 100.0
        } else {
            0.0
        }
    }

    fn push(&mut self, sample: MetricSample) {
        self.series.push(sample);
        if let Some(last) = self.series.last() {
            self.last_elapsed = last.elapsed_secs;
        }
    }
}

fn sample_loop(
    pid: u32,
    started: Instant,
    interval: Duration,
    stop: &Receiver<()>,
    token: &CancellationToken,
) -> SamplerState {
    let probe = ProcessProbe::new(pid);
    let procfs = ProcessProbe::procfs_available();
    let mut state = SamplerState::default();
    if !procfs {
        state
            .series
            .mark_degraded("procfs unavailable, sampling wall time only");
    }

    loop {
        let elapsed = started.elapsed().as_secs_f64();
        if procfs {
            match probe.snapshot() {
                // Exited and awaiting reap: the end-of-run sample covers it
                Ok(snapshot) if snapshot.zombie => {}
                Ok(snapshot) => state.record(&probe, snapshot, elapsed),
                Err(ProbeError::Gone) => {}
                Err(ProbeError::Unavailable(reason)) => {
                    state.series.mark_degraded(reason);
                    state.record_time_only(elapsed);
                }
            }
        } else {
            state.record_time_only(elapsed);
        }
        if state.series.is_empty() {
            // Start-of-run sample even when the child was already gone
            state.record_time_only(elapsed);
        }

        if token.is_cancelled() {
            tracing::debug!(pid, "sampler cancelled");
            break;
        }

        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::debug!(pid, samples = state.series.len(), "sampler stopped");
    state
}
