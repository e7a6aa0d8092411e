//! Resource counters of a running process read from `/proc/<pid>`
//!
//! Every counter is read independently. A counter that cannot be read
//! (permissions, hardened kernels, non-Linux hosts) is reported as missing
//! instead of failing the whole snapshot.

use nix::unistd::{sysconf, SysconfVar};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Fields of `/proc/<pid>/stat` the sampler uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFields {
    pub state: char,
    pub utime_ticks: u64,
    pub stime_ticks: u64,
}

/// One read of a process's counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcSnapshot {
    pub rss_bytes: Option<u64>,
    pub cpu_ticks: Option<u64>,
    pub io_ops: Option<u64>,
    pub sockets: Option<u64>,
    pub zombie: bool,
    /// Counters that could not be read, with the reason
    pub unavailable: Vec<String>,
}

/// Why a snapshot could not be taken at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The process no longer exists
    Gone,
    /// `/proc/<pid>/stat` exists but cannot be read
    Unavailable(String),
}

/// Reads counters for one pid
#[derive(Debug, Clone)]
pub struct ProcessProbe {
    root: PathBuf,
    ticks_per_sec: f64,
}

impl ProcessProbe {
    pub fn new(pid: u32) -> Self {
        Self::with_root(PathBuf::from(format!("/proc/{pid}")))
    }

    /// Probe rooted at an arbitrary directory laid out like `/proc/<pid>`
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            ticks_per_sec: clock_ticks_per_sec(),
        }
    }

    /// Whether this host exposes a Linux-style procfs at all
    pub fn procfs_available() -> bool {
        Path::new("/proc/self/stat").exists()
    }

    pub fn ticks_to_secs(&self, ticks: u64) -> f64 {
        ticks as f64 / self.ticks_per_sec
    }

    pub fn snapshot(&self) -> Result<ProcSnapshot, ProbeError> {
        let stat = match std::fs::read_to_string(self.root.join("stat")) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(ProbeError::Gone),
            Err(err) => return Err(ProbeError::Unavailable(format!("stat: {err}"))),
        };

        let mut snapshot = ProcSnapshot::default();
        match parse_stat(&stat) {
            Some(fields) => {
                snapshot.zombie = fields.state == 'Z' || fields.state == 'X';
                snapshot.cpu_ticks = Some(fields.utime_ticks + fields.stime_ticks);
            }
            None => snapshot.unavailable.push("stat: unparseable".to_string()),
        }

        if snapshot.zombie {
            return Ok(snapshot);
        }

        match std::fs::read_to_string(self.root.join("status")) {
            Ok(text) => snapshot.rss_bytes = parse_status_rss(&text),
            Err(err) => snapshot.unavailable.push(format!("status: {err}")),
        }

        match std::fs::read_to_string(self.root.join("io")) {
            Ok(text) => snapshot.io_ops = parse_io_ops(&text),
            Err(err) => snapshot.unavailable.push(format!("io: {err}")),
        }

        match count_sockets(&self.root.join("fd")) {
            Ok(count) => snapshot.sockets = Some(count),
            Err(err) => snapshot.unavailable.push(format!("fd: {err}")),
        }

        Ok(snapshot)
    }
}

fn clock_ticks_per_sec() -> f64 {
    match sysconf(SysconfVar::CLK_TCK) {
        Ok(Some(ticks)) if ticks > 0 => ticks as f64,
        _ => 100.0,
    }
}

/// Parse `/proc/<pid>/stat`; the command name may contain spaces and parens
pub fn parse_stat(text: &str) -> Option<StatFields> {
    let close = text.rfind(')')?;
    let mut fields = text[close + 1..].split_whitespace();
    // Fields after the command name start at field 3 (state)
    let state = fields.next()?.chars().next()?;
    // utime and stime are fields 14 and 15, i.e. 11 and 12 positions after state
    let utime_ticks = fields.nth(10)?.parse().ok()?;
    let stime_ticks = fields.next()?.parse().ok()?;
    Some(StatFields {
        state,
        utime_ticks,
        stime_ticks,
    })
}

/// `VmRSS` from `/proc/<pid>/status`, in bytes
pub fn parse_status_rss(text: &str) -> Option<u64> {
    text.lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// `syscr + syscw` from `/proc/<pid>/io`
pub fn parse_io_ops(text: &str) -> Option<u64> {
    let mut reads = None;
    let mut writes = None;
    for line in text.lines() {
        if let Some(v) = line.strip_prefix("syscr:") {
            reads = v.trim().parse::<u64>().ok();
        } else if let Some(v) = line.strip_prefix("syscw:") {
            writes = v.trim().parse::<u64>().ok();
        }
    }
    Some(reads? + writes?)
}

fn count_sockets(fd_dir: &Path) -> std::io::Result<u64> {
    let mut count = 0;
    for entry in std::fs::read_dir(fd_dir)? {
        let Ok(entry) = entry else { continue };
        // Descriptors can close between read_dir and read_link
        if let Ok(link) = std::fs::read_link(entry.path()) {
            if link.to_string_lossy().starts_with("socket:") {
                count += 1;
            }
        }
    }
    Ok(count)
}
