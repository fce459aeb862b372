//! Point-in-time process table.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::ProcessSource;
use crate::error::Result;

/// One process as captured by a snapshot. Never mutated after capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    /// `None` when the parent id could not be read.
    #[serde(default)]
    pub parent_id: Option<u32>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cmdline: String,
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub rss_bytes: u64,
}

impl ProcessRecord {
    pub fn new(pid: u32, parent_id: Option<u32>, name: impl Into<String>) -> Self {
        Self {
            pid,
            parent_id,
            name: name.into(),
            cmdline: String::new(),
            cpu_percent: 0.0,
            rss_bytes: 0,
        }
    }

    pub fn with_cmdline(mut self, cmdline: impl Into<String>) -> Self {
        self.cmdline = cmdline.into();
        self
    }

    pub fn with_usage(mut self, cpu_percent: f64, rss_bytes: u64) -> Self {
        self.cpu_percent = cpu_percent;
        self.rss_bytes = rss_bytes;
        self
    }

    /// Command line, or the process name when the command line is empty.
    pub fn command(&self) -> &str {
        if self.cmdline.is_empty() {
            &self.name
        } else {
            &self.cmdline
        }
    }

    pub fn rss_kb(&self) -> u64 {
        self.rss_bytes / 1024
    }
}

/// All processes of one refresh cycle, keyed by pid, with a
/// parent id -> children index computed once at construction.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    processes: BTreeMap<u32, ProcessRecord>,
    children: HashMap<u32, Vec<u32>>,
}

impl Snapshot {
    /// Builds a snapshot; a later record with the same pid replaces an earlier one.
    pub fn new(records: impl IntoIterator<Item = ProcessRecord>) -> Self {
        let processes: BTreeMap<u32, ProcessRecord> =
            records.into_iter().map(|r| (r.pid, r)).collect();

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for record in processes.values() {
            match record.parent_id {
                // A self-parented record would be its own child.
                Some(ppid) if ppid != record.pid => {
                    children.entry(ppid).or_default().push(record.pid)
                }
                _ => {}
            }
        }

        Self {
            processes,
            children,
        }
    }

    /// Takes a fresh snapshot from `source`.
    pub fn capture(source: &dyn ProcessSource) -> Result<Self> {
        let records = source.list_processes()?;
        debug!("Captured snapshot with {} processes", records.len());
        Ok(Self::new(records))
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.processes.get(&pid)
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.processes.contains_key(&pid)
    }

    /// Direct children of `pid` in ascending pid order.
    pub fn children_of(&self, pid: u32) -> &[u32] {
        self.children.get(&pid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All descendants of `pid` (excluding `pid`), each listed once even
    /// when the parent links are cyclic.
    pub fn descendants(&self, pid: u32) -> Vec<u32> {
        let mut seen = HashSet::new();
        seen.insert(pid);
        let mut out = Vec::new();
        let mut stack = vec![pid];

        while let Some(current) = stack.pop() {
            for &child in self.children_of(current) {
                if seen.insert(child) {
                    out.push(child);
                    stack.push(child);
                }
            }
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.processes.values()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pid: u32, ppid: u32) -> ProcessRecord {
        ProcessRecord::new(pid, Some(ppid), format!("p{pid}"))
    }

    #[test]
    fn test_children_index_is_sorted() {
        let snap = Snapshot::new(vec![rec(30, 1), rec(1, 0), rec(10, 1), rec(20, 1)]);
        assert_eq!(snap.children_of(1), &[10, 20, 30]);
        assert!(snap.children_of(10).is_empty());
    }

    #[test]
    fn test_self_parent_is_not_a_child() {
        let snap = Snapshot::new(vec![rec(5, 5)]);
        assert!(snap.children_of(5).is_empty());
        assert!(snap.descendants(5).is_empty());
    }

    #[test]
    fn test_descendants_survive_cycles() {
        // 2 -> 3 -> 4 -> 2
        let snap = Snapshot::new(vec![rec(2, 4), rec(3, 2), rec(4, 3)]);
        let mut desc = snap.descendants(2);
        desc.sort_unstable();
        assert_eq!(desc, vec![3, 4]);
    }

    #[test]
    fn test_command_falls_back_to_name() {
        let r = ProcessRecord::new(7, Some(1), "kworker");
        assert_eq!(r.command(), "kworker");
        let r = r.with_cmdline("/usr/bin/kworker --flag");
        assert_eq!(r.command(), "/usr/bin/kworker --flag");
    }

    #[test]
    fn test_record_deserializes_with_defaults() {
        let r: ProcessRecord = serde_json::from_str(r#"{"pid": 42}"#).unwrap();
        assert_eq!(r.pid, 42);
        assert_eq!(r.parent_id, None);
        assert!(r.cmdline.is_empty());
        assert_eq!(r.rss_bytes, 0);
    }
}
