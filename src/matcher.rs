//! Specifier resolution.
//!
//! A specifier selects target processes in one of three ways:
//!
//! - `1234`: a literal pid (existence is checked later, when building the tree)
//! - `:8080`: every process owning a socket on that local or remote port
//! - anything else: a regex (default) or literal substring (strict mode)
//!   tested against the command line, then the process name
//!
//! Several specifiers in one invocation must all be literal pids.

use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::debug;

use crate::error::{Error, Result};
use crate::net::ConnectionSource;
use crate::process::{ProcessRecord, Snapshot};

/// One parsed target selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Specifier {
    Pid(u32),
    Port(u16),
    Pattern(String),
}

impl FromStr for Specifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if is_pid_literal(s) {
            return parse_pid(s).map(Specifier::Pid);
        }
        if let Some(port) = s.strip_prefix(':') {
            return port
                .parse::<u16>()
                .map(Specifier::Port)
                .map_err(|_| Error::InvalidPort(port.to_string()));
        }
        Ok(Specifier::Pattern(s.to_string()))
    }
}

fn is_pid_literal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_pid(s: &str) -> Result<u32> {
    s.parse().map_err(|_| Error::InvalidPid(s.to_string()))
}

/// Parses the positional arguments of one invocation.
pub fn parse_specifiers<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<Specifier>> {
    match inputs {
        [] => Err(Error::NoTargets),
        [single] => Ok(vec![single.as_ref().parse()?]),
        many => many
            .iter()
            .map(|input| {
                let input = input.as_ref();
                if !is_pid_literal(input) {
                    return Err(Error::InvalidPid(input.to_string()));
                }
                parse_pid(input).map(Specifier::Pid)
            })
            .collect(),
    }
}

/// Matching behaviour for port and pattern specifiers.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Literal substring matching instead of regex.
    pub strict: bool,
    /// Case-fold regex patterns. Strict mode always ignores case.
    pub case_insensitive: bool,
    /// Restrict `:port` matches to listening sockets bound to this host.
    pub host: Option<String>,
    /// Excluded from pattern matches (the invoking process).
    pub self_pid: u32,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            strict: false,
            case_insensitive: true,
            host: None,
            self_pid: std::process::id(),
        }
    }
}

enum NameMatcher {
    Regex(Regex),
    Literal(String),
}

impl NameMatcher {
    fn is_match(&self, text: &str) -> bool {
        match self {
            NameMatcher::Regex(re) => re.is_match(text),
            NameMatcher::Literal(needle) => text.to_lowercase().contains(needle.as_str()),
        }
    }

    /// Command line first, then the name when the command line is empty or
    /// does not match.
    fn matches_record(&self, record: &ProcessRecord) -> bool {
        (!record.cmdline.is_empty() && self.is_match(&record.cmdline))
            || (!record.name.is_empty() && self.is_match(&record.name))
    }
}

/// Resolves specifiers into a sorted, de-duplicated pid list.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    options: MatchOptions,
}

impl Matcher {
    pub fn new(options: MatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    /// Connections are only listed when a port specifier is present.
    pub fn resolve(
        &self,
        specifiers: &[Specifier],
        snapshot: &Snapshot,
        connections: &dyn ConnectionSource,
    ) -> Result<Vec<u32>> {
        let mut pids = BTreeSet::new();
        for spec in specifiers {
            match spec {
                Specifier::Pid(pid) => {
                    pids.insert(*pid);
                }
                Specifier::Port(port) => pids.extend(self.by_port(*port, connections)?),
                Specifier::Pattern(pattern) => pids.extend(self.by_pattern(pattern, snapshot)?),
            }
        }
        Ok(pids.into_iter().collect())
    }

    /// Pids owning a socket on `port`.
    pub fn by_port(&self, port: u16, connections: &dyn ConnectionSource) -> Result<Vec<u32>> {
        let host = self.options.host.as_deref().filter(|h| !h.is_empty());
        let mut pids = BTreeSet::new();

        for conn in connections.list_connections()? {
            let pid = match conn.pid {
                Some(pid) if pid != 0 => pid,
                _ => continue,
            };
            if !conn.touches_port(port) {
                continue;
            }
            if let Some(host) = host {
                if !conn.is_listening() || !host_matches(&conn.local_addr, host) {
                    continue;
                }
            }
            pids.insert(pid);
        }

        debug!("Port {} resolved to {} pids", port, pids.len());
        Ok(pids.into_iter().collect())
    }

    /// Pids whose command line or name matches `pattern`.
    pub fn by_pattern(&self, pattern: &str, snapshot: &Snapshot) -> Result<Vec<u32>> {
        let matcher = if self.options.strict {
            NameMatcher::Literal(pattern.to_lowercase())
        } else {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(self.options.case_insensitive)
                .build()
                .map_err(|source| Error::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            NameMatcher::Regex(re)
        };

        // Snapshot iteration is already in pid order.
        let pids: Vec<u32> = snapshot
            .iter()
            .filter(|r| r.pid != self.options.self_pid)
            .filter(|r| matcher.matches_record(r))
            .map(|r| r.pid)
            .collect();

        debug!("Pattern {:?} resolved to {} pids", pattern, pids.len());
        Ok(pids)
    }
}

fn is_loopback_alias(addr: &str) -> bool {
    addr == "127.0.0.1" || addr.eq_ignore_ascii_case("localhost")
}

/// `*` binds every host; `127.0.0.1` and `localhost` name the same one.
fn host_matches(local_addr: &str, host: &str) -> bool {
    local_addr == host
        || local_addr == "*"
        || (is_loopback_alias(local_addr) && is_loopback_alias(host))
}
