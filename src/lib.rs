//! psjungle library
//!
//! Focused process trees: pick target processes by PID, by port, or by a
//! name/command-line pattern, then print each target with its ancestors and
//! all of its descendants. Optionally signal every displayed target.
//!
//! # Usage
//!
//! ```rust
//! use psjungle::{Matcher, ProcessRecord, Renderer, Snapshot, SnapshotFile, TreeDisplay};
//!
//! let data = SnapshotFile::from_parts(
//!     vec![
//!         ProcessRecord::new(1, Some(0), "init"),
//!         ProcessRecord::new(42, Some(1), "sshd").with_cmdline("/usr/sbin/sshd -D"),
//!     ],
//!     Vec::new(),
//! );
//! let snapshot = Snapshot::capture(&data).unwrap();
//! let specifiers = psjungle::parse_specifiers(&["sshd"]).unwrap();
//! let targets = Matcher::default()
//!     .resolve(&specifiers, &snapshot, &data)
//!     .unwrap();
//!
//! let mut out: Vec<u8> = Vec::new();
//! TreeDisplay::new(&snapshot, &data, Renderer::default())
//!     .display_all(&targets, &mut out)
//!     .unwrap();
//! ```

pub mod display;
pub mod error;
pub mod format;
pub mod matcher;
pub mod net;
pub mod process;
pub mod render;
pub mod signal;
pub mod testdata;
pub mod tree;
pub mod watch;

// Re-export main types for convenience
pub use display::TreeDisplay;
pub use error::{Error, Result};
pub use format::format_memory;
pub use matcher::{parse_specifiers, MatchOptions, Matcher, Specifier};
pub use net::{Connection, ConnectionSource};
pub use process::{ProcFs, ProcessRecord, ProcessSource, Snapshot};
pub use render::{RenderOptions, Renderer};
pub use signal::{deliver, DryRunSender, KillSender, Signal, SignalSender};
pub use testdata::SnapshotFile;
pub use tree::{ProcessTree, TreeBuilder};
pub use watch::{watch, CycleContext, WatchOptions};
