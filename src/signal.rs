//! Signal parsing and delivery.

use nix::sys::signal::{kill, Signal as NixSignal};
use nix::unistd::Pid;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Highest signal number accepted in numeric form.
pub const MAX_SIGNAL: i32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    #[default]
    Term,
    Hup,
    Int,
    Kill,
    Stop,
    Cont,
    Usr1,
    Usr2,
    /// Any other number in `0..=MAX_SIGNAL`.
    Raw(i32),
}

const NAMED: [(Signal, &str); 8] = [
    (Signal::Term, "term"),
    (Signal::Hup, "hup"),
    (Signal::Int, "int"),
    (Signal::Kill, "kill"),
    (Signal::Stop, "stop"),
    (Signal::Cont, "cont"),
    (Signal::Usr1, "usr1"),
    (Signal::Usr2, "usr2"),
];

impl Signal {
    pub fn number(self) -> i32 {
        match self {
            Signal::Term => libc::SIGTERM,
            Signal::Hup => libc::SIGHUP,
            Signal::Int => libc::SIGINT,
            Signal::Kill => libc::SIGKILL,
            Signal::Stop => libc::SIGSTOP,
            Signal::Cont => libc::SIGCONT,
            Signal::Usr1 => libc::SIGUSR1,
            Signal::Usr2 => libc::SIGUSR2,
            Signal::Raw(n) => n,
        }
    }

    /// Named variant for known numbers, `Raw` otherwise.
    pub fn from_number(n: i32) -> Option<Self> {
        if !(0..=MAX_SIGNAL).contains(&n) {
            return None;
        }
        Some(
            NAMED
                .iter()
                .map(|&(sig, _)| sig)
                .find(|sig| sig.number() == n)
                .unwrap_or(Signal::Raw(n)),
        )
    }

    /// True when `s` names a signal (used to tell `-k hup` from `-k nginx`).
    pub fn is_signal_name(s: &str) -> bool {
        !s.is_empty() && s.parse::<Signal>().is_ok()
    }
}

impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        if lower.is_empty() {
            return Ok(Signal::Term);
        }
        let name = lower.strip_prefix("sig").unwrap_or(&lower);
        if let Some(&(sig, _)) = NAMED.iter().find(|(_, n)| *n == name) {
            return Ok(sig);
        }
        lower
            .parse::<i32>()
            .ok()
            .and_then(Signal::from_number)
            .ok_or_else(|| Error::InvalidSignal(s.to_string()))
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match NAMED.iter().find(|(sig, _)| sig == self) {
            Some((_, name)) => write!(f, "SIG{}", name.to_ascii_uppercase()),
            None => write!(f, "{}", self.number()),
        }
    }
}

pub trait SignalSender {
    fn send(&self, pid: u32, signal: Signal) -> Result<()>;

    /// Wording used for a successful send.
    fn verb(&self) -> &'static str {
        "Sent"
    }
}

/// Delivers signals with `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KillSender;

impl SignalSender for KillSender {
    fn send(&self, pid: u32, signal: Signal) -> Result<()> {
        let raw_pid = i32::try_from(pid).map_err(|_| Error::InvalidPid(pid.to_string()))?;
        let number = signal.number();

        if number == 0 {
            // Existence probe.
            return kill(Pid::from_raw(raw_pid), None::<NixSignal>)
                .map_err(|e| Error::Io(e.into()));
        }
        match NixSignal::try_from(number) {
            Ok(sig) => kill(Pid::from_raw(raw_pid), sig).map_err(|e| Error::Io(e.into())),
            Err(_) => {
                // Real-time signals have no nix variant.
                debug!("Sending raw signal {} to pid {}", number, pid);
                // SAFETY: kill takes plain integers and has no memory effects.
                let rc = unsafe { libc::kill(raw_pid, number) };
                if rc == 0 {
                    Ok(())
                } else {
                    Err(Error::Io(io::Error::last_os_error()))
                }
            }
        }
    }
}

/// Reports what would be sent without touching any process.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunSender;

impl SignalSender for DryRunSender {
    fn send(&self, _pid: u32, _signal: Signal) -> Result<()> {
        Ok(())
    }

    fn verb(&self) -> &'static str {
        "Would send"
    }
}

/// Sends `signal` to every pid. A failed send is reported and delivery
/// continues with the next pid.
pub fn deliver(
    sender: &dyn SignalSender,
    signal: Signal,
    pids: &[u32],
    out: &mut dyn Write,
) -> Result<()> {
    let number = signal.number();
    for &pid in pids {
        match sender.send(pid, signal) {
            Ok(()) => writeln!(out, "{} signal {} to PID {}", sender.verb(), number, pid)?,
            Err(e) => {
                warn!("Signal {} to pid {} failed: {}", signal, pid, e);
                writeln!(out, "Warning: Could not send signal to PID {}: {}", pid, e)?;
            }
        }
    }
    Ok(())
}
