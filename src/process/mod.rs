//! Process snapshot acquisition.
//!
//! This module provides:
//! - `snapshot`: the `ProcessRecord` / `Snapshot` data model
//! - `scanner`: the `/proc` backed `ProcFs` source
//! - `cpu`: CPU time parsing from `/proc/<pid>/stat`
//! - `memory`: resident memory parsing from `/proc/<pid>/status` and `statm`

pub mod cpu;
pub mod memory;
pub mod scanner;
pub mod snapshot;

use crate::error::Result;

pub use scanner::{ProcFs, DEFAULT_PROC_ROOT, DEFAULT_SCAN_TIMEOUT};
pub use snapshot::{ProcessRecord, Snapshot};

/// Supplies process records.
///
/// `list_processes` returns one record per live process. `get_process` is the
/// fresh single-pid lookup used when a pid is missing from a snapshot; it
/// fails with [`crate::Error::TargetNotFound`] when the process is gone.
pub trait ProcessSource {
    fn list_processes(&self) -> Result<Vec<ProcessRecord>>;
    fn get_process(&self, pid: u32) -> Result<ProcessRecord>;
}
