//! Resident memory parsing for process records.
//!
//! `/proc/<pid>/status` carries `VmRSS` for user processes; kernel threads
//! have no such line and fall back to `/proc/<pid>/statm`.

use once_cell::sync::Lazy;
use std::fs;
use std::path::Path;

fn get_page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_PAGESIZE
        unsafe {
            let size = libc::sysconf(libc::_SC_PAGESIZE);
            if size > 0 {
                return size as u64;
            }
        }
    }
    4096
}

/// System page size in bytes.
pub static PAGE_SIZE: Lazy<u64> = Lazy::new(get_page_size);

/// Parses kilobyte values from status file lines (`"  1234 kB"`).
pub fn parse_kb_value(v: &str) -> Option<u64> {
    v.split_whitespace().next()?.parse().ok()
}

/// Extracts `VmRSS` in bytes from the content of a status file.
pub fn parse_vmrss_bytes(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|l| l.strip_prefix("VmRSS:"))
        .and_then(parse_kb_value)
        .map(|kb| kb * 1024)
}

/// Reads resident memory in bytes from `<proc_path>/statm` (second field, in pages).
pub fn read_statm_rss_bytes(proc_path: &Path) -> Option<u64> {
    let content = fs::read_to_string(proc_path.join("statm")).ok()?;
    let pages: u64 = content.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * *PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_kb_value() {
        assert_eq!(parse_kb_value("   1234 kB"), Some(1234));
        assert_eq!(parse_kb_value("0 kB"), Some(0));
        assert_eq!(parse_kb_value(""), None);
        assert_eq!(parse_kb_value("abc kB"), None);
    }

    #[test]
    fn test_parse_vmrss_bytes() {
        let status = "Name:\tbash\nPPid:\t1\nVmRSS:\t    8192 kB\nThreads:\t1\n";
        assert_eq!(parse_vmrss_bytes(status), Some(8192 * 1024));
    }

    #[test]
    fn test_parse_vmrss_missing_for_kernel_threads() {
        let status = "Name:\tkthreadd\nPPid:\t0\nThreads:\t1\n";
        assert_eq!(parse_vmrss_bytes(status), None);
    }

    #[test]
    fn test_read_statm_rss_bytes() {
        let dir = tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("statm"), "5000 300 100 10 0 200 0\n")
            .expect("Failed to write statm file");
        assert_eq!(read_statm_rss_bytes(dir.path()), Some(300 * *PAGE_SIZE));
    }

    #[test]
    fn test_read_statm_missing_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        assert_eq!(read_statm_rss_bytes(dir.path()), None);
    }
}
