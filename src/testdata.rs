//! JSON snapshot files.
//!
//! A snapshot file holds a process table and a socket table. It is used by
//! `--test-data-file` (synthetic data instead of /proc) and written by
//! `--dump-snapshot`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::net::{Connection, ConnectionSource};
use crate::process::{ProcessRecord, ProcessSource};

pub const SNAPSHOT_FILE_VERSION: &str = "1.0";

fn default_version() -> String {
    SNAPSHOT_FILE_VERSION.to_string()
}

/// Root structure for snapshot JSON files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub processes: Vec<ProcessRecord>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl SnapshotFile {
    pub fn from_parts(processes: Vec<ProcessRecord>, connections: Vec<Connection>) -> Self {
        Self {
            version: default_version(),
            generated_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            processes,
            connections,
        }
    }

    /// Reads both tables from live sources.
    pub fn capture(procs: &dyn ProcessSource, conns: &dyn ConnectionSource) -> Result<Self> {
        Ok(Self::from_parts(
            procs.list_processes()?,
            conns.list_connections()?,
        ))
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading snapshot file from: {}", path.display());
        let content = fs::read_to_string(path)?;
        let file: SnapshotFile = serde_json::from_str(&content)?;
        info!(
            "Loaded snapshot file version {} ({} processes, {} connections)",
            file.version,
            file.processes.len(),
            file.connections.len()
        );
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl ProcessSource for SnapshotFile {
    fn list_processes(&self) -> Result<Vec<ProcessRecord>> {
        Ok(self.processes.clone())
    }

    fn get_process(&self, pid: u32) -> Result<ProcessRecord> {
        self.processes
            .iter()
            .find(|p| p.pid == pid)
            .cloned()
            .ok_or(Error::TargetNotFound(pid))
    }
}

impl ConnectionSource for SnapshotFile {
    fn list_connections(&self) -> Result<Vec<Connection>> {
        Ok(self.connections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let file = SnapshotFile::from_parts(
            vec![ProcessRecord::new(1, Some(0), "init").with_cmdline("/sbin/init")],
            vec![Connection {
                pid: Some(1),
                local_addr: "0.0.0.0".into(),
                local_port: 22,
                remote_addr: "0.0.0.0".into(),
                remote_port: 0,
                status: "LISTEN".into(),
            }],
        );
        file.save(&path).unwrap();

        let loaded = SnapshotFile::load(&path).unwrap();
        assert_eq!(loaded.processes, file.processes);
        assert_eq!(loaded.connections, file.connections);
    }

    #[test]
    fn test_minimal_json() {
        let file: SnapshotFile =
            serde_json::from_str(r#"{"processes": [{"pid": 1, "name": "init"}]}"#).unwrap();
        assert_eq!(file.version, SNAPSHOT_FILE_VERSION);
        assert!(file.connections.is_empty());
        assert_eq!(file.get_process(1).unwrap().name, "init");
        assert!(matches!(file.get_process(2), Err(Error::TargetNotFound(2))));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SnapshotFile::load(&path), Err(Error::Json(_))));
    }
}
