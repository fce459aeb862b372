//! One display cycle and the refresh loop around it.
//!
//! Every cycle captures a fresh snapshot; nothing is carried over from one
//! cycle to the next.

use std::io::Write;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::display::TreeDisplay;
use crate::error::{Error, Result};
use crate::matcher::{Matcher, Specifier};
use crate::net::ConnectionSource;
use crate::process::{ProcessSource, Snapshot};
use crate::render::Renderer;
use crate::signal::{deliver, Signal, SignalSender};

const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

/// Everything a cycle needs; built once per invocation.
pub struct CycleContext<'a> {
    pub processes: &'a dyn ProcessSource,
    pub connections: &'a dyn ConnectionSource,
    pub specifiers: Vec<Specifier>,
    pub matcher: Matcher,
    pub renderer: Renderer,
    /// Sent to every displayed target after the trees are printed.
    pub signal: Option<Signal>,
    pub sender: &'a dyn SignalSender,
}

impl CycleContext<'_> {
    /// Snapshot, resolve, display, then signal. Returns the targets that
    /// produced a tree.
    pub fn run_cycle(&self, out: &mut dyn Write) -> Result<Vec<u32>> {
        let snapshot = Snapshot::capture(self.processes)?;

        let targets = self
            .matcher
            .resolve(&self.specifiers, &snapshot, self.connections)?;
        if targets.is_empty() {
            return Err(Error::NoProcessesFound);
        }
        debug!("Resolved {} targets: {:?}", targets.len(), targets);

        let display = TreeDisplay::new(&snapshot, self.processes, self.renderer.clone());
        let processed = display.display_all(&targets, out)?;

        if let Some(signal) = self.signal {
            deliver(self.sender, signal, &processed, out)?;
        }
        Ok(processed)
    }
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub interval: Duration,
    /// Shown after the interval on the status line.
    pub header: String,
    /// Stop after this many cycles; `None` runs until a terminal error.
    pub max_cycles: Option<usize>,
}

/// Clears the screen and runs a cycle every `interval`. Snapshot failures are
/// printed and retried on the next cycle; any other error ends the loop.
pub fn watch(ctx: &CycleContext<'_>, options: &WatchOptions, out: &mut dyn Write) -> Result<()> {
    let mut cycles = 0usize;
    loop {
        write!(out, "{}", CLEAR_SCREEN)?;
        writeln!(
            out,
            "Every {:.1}s: {}",
            options.interval.as_secs_f64(),
            options.header
        )?;
        writeln!(out)?;

        match ctx.run_cycle(out) {
            Ok(_) => {}
            Err(e) if !e.is_terminal() => {
                warn!("Cycle failed: {}", e);
                writeln!(out, "Error: {}", e)?;
            }
            Err(e) => return Err(e),
        }
        out.flush()?;

        cycles += 1;
        if options.max_cycles.is_some_and(|max| cycles >= max) {
            return Ok(());
        }
        thread::sleep(options.interval);
    }
}
