//! CPU statistics parsing for process records.
//!
//! This module parses `/proc/<pid>/stat` and `/proc/uptime` and derives the
//! lifetime CPU percentage shown next to each process (total CPU time divided
//! by wall-clock time since the process started).

use once_cell::sync::Lazy;
use std::fs;
use std::path::Path;

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as f64;
            }
        }
    }
    // Fallback to common default for error cases or non-Unix platforms
    100.0
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Fields of interest from `/proc/<pid>/stat`, in clock ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatFields {
    pub ppid: u32,
    pub utime: u64,
    pub stime: u64,
    pub starttime: u64,
}

impl StatFields {
    /// Total CPU time (user+system) in seconds.
    pub fn cpu_time_seconds(&self) -> f64 {
        (self.utime + self.stime) as f64 / *CLK_TCK
    }

    /// Process start time in seconds since boot.
    pub fn start_time_seconds(&self) -> f64 {
        self.starttime as f64 / *CLK_TCK
    }
}

/// Parses the content of a stat file.
///
/// The comm field is wrapped in parentheses and may itself contain spaces or
/// parentheses, so fields are counted from the last `)`.
pub fn parse_stat(content: &str) -> Option<StatFields> {
    let close = content.rfind(')')?;
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();
    // rest[0] is the state (field 3); field N lives at rest[N - 3].
    if rest.len() < 20 {
        return None;
    }
    Some(StatFields {
        ppid: rest[1].parse().ok()?,
        utime: rest[11].parse().ok()?,
        stime: rest[12].parse().ok()?,
        starttime: rest[19].parse().ok()?,
    })
}

/// Reads and parses `<proc_path>/stat`.
pub fn read_stat(proc_path: &Path) -> Result<StatFields, std::io::Error> {
    let content = fs::read_to_string(proc_path.join("stat"))?;
    parse_stat(&content).ok_or_else(|| std::io::Error::other("Invalid stat format"))
}

/// Reads system uptime in seconds from `<root>/uptime`.
pub fn read_uptime(root: &Path) -> Result<f64, std::io::Error> {
    let content = fs::read_to_string(root.join("uptime"))?;
    content
        .split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| std::io::Error::other("Invalid uptime format"))
}

/// Average CPU usage over the lifetime of a process.
pub fn lifetime_cpu_percent(stat: &StatFields, uptime_seconds: f64) -> f64 {
    let elapsed = uptime_seconds - stat.start_time_seconds();
    if elapsed <= 0.0 {
        return 0.0;
    }
    stat.cpu_time_seconds() / elapsed * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const STAT: &str = "1234 (test_process) S 1 1234 1234 0 -1 4194304 100 0 0 0 1000 500 0 0 20 0 1 0 12345 12345678 1234 18446744073709551615 4194304 4238788 140736466511168 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0";

    #[test]
    fn test_parse_stat_fields() {
        let stat = parse_stat(STAT).expect("stat should parse");
        assert_eq!(stat.ppid, 1);
        assert_eq!(stat.utime, 1000);
        assert_eq!(stat.stime, 500);
        assert_eq!(stat.starttime, 12345);
    }

    #[test]
    fn test_parse_stat_comm_with_spaces_and_parens() {
        let content = "77 (tmux: server (1)) S 12 77 77 0 -1 0 0 0 0 0 30 20 0 0 20 0 1 0 500 0 0";
        let stat = parse_stat(content).expect("stat should parse");
        assert_eq!(stat.ppid, 12);
        assert_eq!(stat.utime, 30);
        assert_eq!(stat.stime, 20);
        assert_eq!(stat.starttime, 500);
    }

    #[test]
    fn test_parse_stat_invalid() {
        assert!(parse_stat("1234 (test) S 1 2 3").is_none());
        assert!(parse_stat("no parens at all").is_none());
    }

    #[test]
    fn test_cpu_time_seconds() {
        let stat = parse_stat(STAT).unwrap();
        let expected = 1500.0 / *CLK_TCK;
        assert!((stat.cpu_time_seconds() - expected).abs() < 0.001);
    }

    #[test]
    fn test_lifetime_cpu_percent() {
        let stat = StatFields {
            ppid: 1,
            utime: 0,
            stime: 0,
            starttime: 0,
        };
        assert_eq!(lifetime_cpu_percent(&stat, 100.0), 0.0);

        // Half of the elapsed time spent on CPU.
        let tck = *CLK_TCK as u64;
        let stat = StatFields {
            ppid: 1,
            utime: 5 * tck,
            stime: 0,
            starttime: 90 * tck,
        };
        let pct = lifetime_cpu_percent(&stat, 100.0);
        assert!((pct - 50.0).abs() < 0.001, "got {pct}");
    }

    #[test]
    fn test_lifetime_cpu_percent_not_started_yet() {
        let stat = StatFields {
            ppid: 1,
            utime: 10,
            stime: 10,
            starttime: (1000.0 * *CLK_TCK) as u64,
        };
        assert_eq!(lifetime_cpu_percent(&stat, 10.0), 0.0);
    }

    #[test]
    fn test_read_stat_and_uptime() {
        let dir = tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("stat"), STAT).expect("Failed to write stat file");
        std::fs::write(dir.path().join("uptime"), "3600.50 7000.00\n")
            .expect("Failed to write uptime file");

        assert_eq!(read_stat(dir.path()).unwrap().ppid, 1);
        assert!((read_uptime(dir.path()).unwrap() - 3600.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_read_stat_missing_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        assert!(read_stat(dir.path()).is_err());
    }
}
