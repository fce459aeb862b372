//! Socket tables from `/proc/net/{tcp,tcp6,udp,udp6}`.
//!
//! Sockets are tied to processes through the `socket:[inode]` links in
//! `/proc/<pid>/fd`. When the system-wide tables cannot be read, each
//! process's own `/proc/<pid>/net` view is used instead.

use ahash::AHashMap as HashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use tracing::debug;

use super::{tcp_state_name, Connection, ConnectionSource, STATUS_NONE};
use crate::error::{Error, Result};
use crate::process::scanner::{collect_proc_entries, Deadline};
use crate::process::ProcFs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proto {
    Tcp,
    Udp,
}

/// One row of a socket table.
#[derive(Debug, Clone, PartialEq)]
pub struct NetEntry {
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
    pub status: &'static str,
    pub inode: u64,
}

const TABLES: [(&str, Proto, bool); 4] = [
    ("tcp", Proto::Tcp, false),
    ("tcp6", Proto::Tcp, true),
    ("udp", Proto::Udp, false),
    ("udp6", Proto::Udp, true),
];

/// Parses the content of one socket table, skipping the header and malformed rows.
pub fn parse_net_table(content: &str, proto: Proto, ipv6: bool) -> Vec<NetEntry> {
    let mut result = Vec::new();
    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }
        let (local_ip, local_port) = match parse_addr_port(parts[1], ipv6) {
            Some(v) => v,
            None => continue,
        };
        let (remote_ip, remote_port) = match parse_addr_port(parts[2], ipv6) {
            Some(v) => v,
            None => continue,
        };
        let status = match proto {
            Proto::Tcp => tcp_state_name(parts[3]),
            Proto::Udp => STATUS_NONE,
        };
        result.push(NetEntry {
            local_ip,
            local_port,
            remote_ip,
            remote_port,
            status,
            inode: parts[9].parse().unwrap_or(0),
        });
    }
    result
}

fn parse_addr_port(s: &str, ipv6: bool) -> Option<(IpAddr, u16)> {
    let (addr_hex, port_hex) = s.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    let ip = if ipv6 {
        let v6 = parse_ipv6(addr_hex)?;
        match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        }
    } else {
        IpAddr::V4(parse_ipv4(addr_hex)?)
    };
    Some((ip, port))
}

fn parse_ipv4(hex: &str) -> Option<Ipv4Addr> {
    if hex.len() != 8 {
        return None;
    }
    let raw = u32::from_str_radix(hex, 16).ok()?;
    let bytes = raw.to_le_bytes();
    Some(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
}

fn parse_ipv6(hex: &str) -> Option<Ipv6Addr> {
    if hex.len() != 32 {
        return None;
    }
    let mut bytes = [0u8; 16];
    for i in 0..4 {
        let raw = u32::from_str_radix(&hex[i * 8..(i + 1) * 8], 16).ok()?;
        bytes[i * 4..i * 4 + 4].copy_from_slice(&raw.to_le_bytes());
    }
    Some(Ipv6Addr::from(bytes))
}

/// Extracts the inode from a `socket:[12345]` fd link target.
pub fn parse_socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

/// Socket inodes held open by the process at `proc_path`.
fn socket_inodes(proc_path: &Path) -> Vec<u64> {
    let entries = match fs::read_dir(proc_path.join("fd")) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };
    entries
        .flatten()
        .filter_map(|entry| fs::read_link(entry.path()).ok())
        .filter_map(|link| parse_socket_inode(&link.to_string_lossy()))
        .collect()
}

/// Reads every socket table under `dir`; `None` when none of them is readable.
fn read_tables(dir: &Path) -> Option<Vec<NetEntry>> {
    let mut any = false;
    let mut entries = Vec::new();
    for (file, proto, ipv6) in TABLES {
        if let Ok(content) = fs::read_to_string(dir.join(file)) {
            any = true;
            entries.extend(parse_net_table(&content, proto, ipv6));
        }
    }
    any.then_some(entries)
}

fn to_connection(entry: &NetEntry, pid: Option<u32>) -> Connection {
    Connection {
        pid,
        local_addr: entry.local_ip.to_string(),
        local_port: entry.local_port,
        remote_addr: entry.remote_ip.to_string(),
        remote_port: entry.remote_port,
        status: entry.status.to_string(),
    }
}

impl ProcFs {
    /// Maps socket inode -> every pid holding it (forked children share sockets).
    fn inode_owners(&self, deadline: &Deadline) -> Result<HashMap<u64, Vec<u32>>> {
        let mut owners: HashMap<u64, Vec<u32>> = HashMap::new();
        for entry in collect_proc_entries(self.root())? {
            deadline.check()?;
            for inode in socket_inodes(&entry.proc_path) {
                owners.entry(inode).or_default().push(entry.pid);
            }
        }
        Ok(owners)
    }

    fn bulk_connections(
        &self,
        sockets: Vec<NetEntry>,
        deadline: &Deadline,
    ) -> Result<Vec<Connection>> {
        let owners = self.inode_owners(deadline)?;
        let mut out = Vec::with_capacity(sockets.len());
        for entry in &sockets {
            match owners.get(&entry.inode) {
                Some(pids) if entry.inode != 0 => {
                    out.extend(pids.iter().map(|&pid| to_connection(entry, Some(pid))))
                }
                _ => out.push(to_connection(entry, None)),
            }
        }
        Ok(out)
    }

    /// Per-process fallback: each process's own net view, filtered to the
    /// sockets that process holds.
    fn per_process_connections(&self, deadline: &Deadline) -> Result<Vec<Connection>> {
        let mut all = Vec::new();
        let mut unreadable = 0usize;

        for entry in collect_proc_entries(self.root())? {
            deadline.check()?;
            let sockets = match read_tables(&entry.proc_path.join("net")) {
                Some(s) => s,
                None => {
                    unreadable += 1;
                    continue;
                }
            };
            let held = socket_inodes(&entry.proc_path);
            all.extend(
                sockets
                    .iter()
                    .filter(|s| s.inode != 0 && held.contains(&s.inode))
                    .map(|s| to_connection(s, Some(entry.pid))),
            );
        }

        if all.is_empty() && unreadable > 0 {
            return Err(Error::Io(std::io::Error::other(
                "no readable socket tables in the process table",
            )));
        }
        Ok(all)
    }
}

impl ConnectionSource for ProcFs {
    fn list_connections(&self) -> Result<Vec<Connection>> {
        self.bounded(|procfs, deadline| match read_tables(&procfs.root().join("net")) {
            Some(sockets) => procfs.bulk_connections(sockets, &deadline),
            None => {
                debug!(
                    "System socket tables unreadable under {}, scanning per process",
                    procfs.root().display()
                );
                procfs.per_process_connections(&deadline)
            }
        })
    }
}
