//! Process scanning utilities for reading process records from /proc.
//!
//! `ProcFs` implements [`ProcessSource`] on top of a procfs mount. The root
//! is configurable so tests can point it at a fake tree.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::cpu::{lifetime_cpu_percent, read_stat, read_uptime};
use super::memory::{parse_vmrss_bytes, read_statm_rss_bytes};
use super::{ProcessRecord, ProcessSource};
use crate::error::{Error, Result};

pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Process entry representing a directory in /proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub pid: u32,
    pub proc_path: PathBuf,
}

/// Wall-clock budget for one scan.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    pub(crate) fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.started.elapsed() > self.limit {
            return Err(Error::DeadlineExceeded(self.limit));
        }
        Ok(())
    }
}

/// Reads processes from a procfs mount.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
    timeout: Duration,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }

    /// Sets the deadline applied to whole-table scans.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn deadline(&self) -> Deadline {
        Deadline::start(self.timeout)
    }

    /// Runs `scan` on a worker thread and waits at most the scan timeout.
    /// A read that blocks (a D-state process, a wedged mount) leaves the
    /// worker behind; its late result is dropped.
    pub(crate) fn bounded<T, F>(&self, scan: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ProcFs, Deadline) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let procfs = self.clone();
        let deadline = self.deadline();
        thread::Builder::new()
            .name("proc-scan".into())
            .spawn(move || {
                let _ = tx.send(scan(&procfs, deadline));
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Scan of {} did not finish within {:?}, abandoning it",
                    self.root.display(),
                    self.timeout
                );
                Err(Error::DeadlineExceeded(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Io(std::io::Error::other(
                "process scan worker exited without a result",
            ))),
        }
    }

    fn scan_processes(&self, deadline: Deadline) -> Result<Vec<ProcessRecord>> {
        let uptime = read_uptime(&self.root).ok();
        let entries = collect_proc_entries(&self.root)?;

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            deadline.check()?;
            match self.read_record(entry.pid, uptime) {
                Ok(record) => out.push(record),
                // Processes routinely exit between readdir and open.
                Err(e) => debug!("Skipping pid {}: {}", entry.pid, e),
            }
        }
        Ok(out)
    }

    /// Reads one process. Only an unreadable status file fails the record;
    /// every other field degrades to empty or zero.
    fn read_record(&self, pid: u32, uptime: Option<f64>) -> std::io::Result<ProcessRecord> {
        let proc_path = self.root.join(pid.to_string());
        let status = fs::read_to_string(proc_path.join("status"))?;
        let fields = parse_status(&status);
        let stat = read_stat(&proc_path).ok();

        let name = fields
            .name
            .or_else(|| read_process_name(&proc_path))
            .unwrap_or_default();
        let parent_id = fields.ppid.or(stat.map(|s| s.ppid));
        let cmdline = read_cmdline(&proc_path).unwrap_or_default();
        let cpu_percent = match (stat, uptime) {
            (Some(stat), Some(uptime)) => lifetime_cpu_percent(&stat, uptime),
            _ => 0.0,
        };
        let rss_bytes = parse_vmrss_bytes(&status)
            .or_else(|| read_statm_rss_bytes(&proc_path))
            .unwrap_or(0);

        Ok(ProcessRecord {
            pid,
            parent_id,
            name,
            cmdline,
            cpu_percent,
            rss_bytes,
        })
    }
}

impl ProcessSource for ProcFs {
    fn list_processes(&self) -> Result<Vec<ProcessRecord>> {
        self.bounded(|procfs, deadline| procfs.scan_processes(deadline))
    }

    fn get_process(&self, pid: u32) -> Result<ProcessRecord> {
        self.bounded(move |procfs, _| {
            let uptime = read_uptime(&procfs.root).ok();
            procfs.read_record(pid, uptime).map_err(|e| match e.kind() {
                ErrorKind::NotFound => Error::TargetNotFound(pid),
                _ => Error::Io(e),
            })
        })
    }
}

/// Scans /proc directory for process entries with numeric PIDs.
pub fn collect_proc_entries(root: &Path) -> Result<Vec<ProcEntry>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(root)?.flatten() {
        let p = entry.path();
        let name = match p.file_name().and_then(|s| s.to_str()) {
            Some(v) => v,
            None => continue,
        };
        if !name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let pid: u32 = match name.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        out.push(ProcEntry { pid, proc_path: p });
    }
    Ok(out)
}

/// Fields read from `/proc/<pid>/status`.
#[derive(Debug, Default, PartialEq)]
pub struct StatusFields {
    pub name: Option<String>,
    pub ppid: Option<u32>,
}

/// Parses the `Name:` and `PPid:` lines of a status file.
pub fn parse_status(content: &str) -> StatusFields {
    let mut fields = StatusFields::default();
    for line in content.lines() {
        if let Some(v) = line.strip_prefix("Name:") {
            let v = v.trim();
            if !v.is_empty() {
                fields.name = Some(v.to_string());
            }
        } else if let Some(v) = line.strip_prefix("PPid:") {
            fields.ppid = v.trim().parse().ok();
        }
        if fields.name.is_some() && fields.ppid.is_some() {
            break;
        }
    }
    fields
}

/// Reads process name from comm file or extracts from cmdline.
pub fn read_process_name(proc_path: &Path) -> Option<String> {
    if let Ok(s) = fs::read_to_string(proc_path.join("comm")) {
        let t = s.trim();
        if !t.is_empty() {
            return Some(t.into());
        }
    }

    let content = fs::read(proc_path.join("cmdline")).ok()?;
    let first = content.split(|&b| b == 0u8).next()?;
    let first = std::str::from_utf8(first).ok()?;
    Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.to_string())
}

/// Reads the argument vector joined by spaces. Kernel threads have an empty
/// cmdline, which yields `Some("")`.
pub fn read_cmdline(proc_path: &Path) -> Option<String> {
    let content = fs::read(proc_path.join("cmdline")).ok()?;
    Some(
        content
            .split(|&b| b == 0u8)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_proc(root: &Path, pid: u32, name: &str, ppid: u32, cmdline: &[&str]) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("status"),
            format!("Name:\t{name}\nState:\tS (sleeping)\nPPid:\t{ppid}\nVmRSS:\t    2048 kB\n"),
        )
        .unwrap();
        fs::write(
            dir.join("stat"),
            format!("{pid} ({name}) S {ppid} 1 1 0 -1 0 0 0 0 0 100 100 0 0 20 0 1 0 0 0 0"),
        )
        .unwrap();
        let mut raw = Vec::new();
        for arg in cmdline {
            raw.extend_from_slice(arg.as_bytes());
            raw.push(0);
        }
        fs::write(dir.join("cmdline"), raw).unwrap();
    }

    #[test]
    fn test_parse_status() {
        let fields = parse_status("Name:\tnginx\nUmask:\t0022\nState:\tS\nPPid:\t812\n");
        assert_eq!(fields.name.as_deref(), Some("nginx"));
        assert_eq!(fields.ppid, Some(812));
    }

    #[test]
    fn test_parse_status_missing_ppid() {
        let fields = parse_status("Name:\tnginx\n");
        assert_eq!(fields.ppid, None);
    }

    #[test]
    fn test_collect_proc_entries_skips_non_numeric() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("1")).unwrap();
        fs::create_dir(dir.path().join("42")).unwrap();
        fs::create_dir(dir.path().join("self")).unwrap();
        fs::write(dir.path().join("uptime"), "1.0 1.0").unwrap();

        let mut pids: Vec<u32> = collect_proc_entries(dir.path())
            .unwrap()
            .iter()
            .map(|e| e.pid)
            .collect();
        pids.sort_unstable();
        assert_eq!(pids, vec![1, 42]);
    }

    #[test]
    fn test_list_processes_reads_records() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("uptime"), "1000.0 1000.0").unwrap();
        write_proc(dir.path(), 1, "init", 0, &["/sbin/init"]);
        write_proc(dir.path(), 200, "perl", 1, &["starman", "master", "--port", "5000"]);

        let procfs = ProcFs::new(dir.path());
        let mut records = procfs.list_processes().unwrap();
        records.sort_by_key(|r| r.pid);

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].pid, 200);
        assert_eq!(records[1].parent_id, Some(1));
        assert_eq!(records[1].name, "perl");
        assert_eq!(records[1].cmdline, "starman master --port 5000");
        assert_eq!(records[1].rss_bytes, 2048 * 1024);
        assert!(records[1].cpu_percent > 0.0);
    }

    #[test]
    fn test_record_without_status_is_skipped() {
        let dir = tempdir().unwrap();
        write_proc(dir.path(), 1, "init", 0, &["/sbin/init"]);
        fs::create_dir(dir.path().join("99")).unwrap();

        let records = ProcFs::new(dir.path()).list_processes().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pid, 1);
    }

    #[test]
    fn test_get_process_not_found() {
        let dir = tempdir().unwrap();
        let err = ProcFs::new(dir.path()).get_process(12345).unwrap_err();
        assert!(matches!(err, Error::TargetNotFound(12345)));
    }

    #[test]
    fn test_scan_deadline_exceeded() {
        let dir = tempdir().unwrap();
        write_proc(dir.path(), 1, "init", 0, &["/sbin/init"]);

        let procfs = ProcFs::new(dir.path()).with_timeout(Duration::ZERO);
        let err = procfs.list_processes().unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_blocked_status_read_hits_deadline() {
        let dir = tempdir().unwrap();
        write_proc(dir.path(), 1, "init", 0, &["/sbin/init"]);
        let stuck = dir.path().join("2");
        fs::create_dir(&stuck).unwrap();
        // Opening a FIFO with no writer blocks, like a D-state status read.
        nix::unistd::mkfifo(stuck.join("status").as_path(), nix::sys::stat::Mode::S_IRWXU).unwrap();

        let procfs = ProcFs::new(dir.path()).with_timeout(Duration::from_millis(300));
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(procfs.list_processes());
        });

        let result = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("scan stayed blocked past its deadline");
        assert!(matches!(result, Err(Error::DeadlineExceeded(_))));
    }

    #[test]
    fn test_read_cmdline_kernel_thread() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cmdline"), b"").unwrap();
        assert_eq!(read_cmdline(dir.path()).as_deref(), Some(""));
    }

    #[test]
    fn test_read_process_name_falls_back_to_cmdline() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cmdline"), b"/usr/bin/python3\0app.py\0").unwrap();
        assert_eq!(read_process_name(dir.path()).as_deref(), Some("python3"));
    }
}
