//! Multi-target display with overlap suppression.

use ahash::AHashSet as HashSet;
use std::io::Write;
use tracing::debug;

use crate::error::Result;
use crate::process::{ProcessSource, Snapshot};
use crate::render::Renderer;
use crate::tree::TreeBuilder;

/// Prints one tree per target, skipping targets already covered by an
/// earlier tree in the same call.
pub struct TreeDisplay<'a> {
    snapshot: &'a Snapshot,
    source: &'a dyn ProcessSource,
    renderer: Renderer,
}

impl<'a> TreeDisplay<'a> {
    pub fn new(snapshot: &'a Snapshot, source: &'a dyn ProcessSource, renderer: Renderer) -> Self {
        Self {
            snapshot,
            source,
            renderer,
        }
    }

    /// Returns the targets that produced a tree, in input order. Only these
    /// receive signals.
    pub fn display_all(&self, targets: &[u32], out: &mut dyn Write) -> Result<Vec<u32>> {
        let builder = TreeBuilder::new(self.snapshot, self.source);
        let mut shown: HashSet<u32> = HashSet::new();
        let mut processed = Vec::new();
        let with_headers = targets.len() > 1;

        for &target in targets {
            if !builder.exists(target) {
                writeln!(out, "Process {} not found", target)?;
                continue;
            }

            let members = builder.membership(target);
            if members.iter().any(|pid| shown.contains(pid)) {
                debug!("pid {} already covered by an earlier tree", target);
                continue;
            }

            if !processed.is_empty() {
                writeln!(out)?;
            }
            if with_headers {
                writeln!(out, "Process tree for PID {}:", target)?;
            }

            match builder.build(target) {
                Ok(tree) => {
                    for line in self.renderer.render(&tree) {
                        writeln!(out, "{}", line)?;
                    }
                }
                Err(e) => writeln!(out, "Error for PID {}: {}", target, e)?,
            }

            processed.push(target);
            shown.extend(members);
        }

        Ok(processed)
    }
}
