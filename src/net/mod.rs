//! Network connection ownership, used to resolve `:port` specifiers.

pub mod procnet;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const STATUS_LISTEN: &str = "LISTEN";
pub const STATUS_NONE: &str = "NONE";

/// One socket with the process owning it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// `None` when no process could be found holding the socket.
    #[serde(default)]
    pub pid: Option<u32>,
    pub local_addr: String,
    pub local_port: u16,
    #[serde(default)]
    pub remote_addr: String,
    #[serde(default)]
    pub remote_port: u16,
    #[serde(default)]
    pub status: String,
}

impl Connection {
    pub fn is_listening(&self) -> bool {
        self.status == STATUS_LISTEN
    }

    pub fn touches_port(&self, port: u16) -> bool {
        self.local_port == port || self.remote_port == port
    }
}

/// Supplies the system's socket table.
pub trait ConnectionSource {
    fn list_connections(&self) -> Result<Vec<Connection>>;
}

/// Conventional name of a kernel TCP state code (`st` column of `/proc/net/tcp`).
pub fn tcp_state_name(code: &str) -> &'static str {
    match code.to_ascii_uppercase().as_str() {
        "01" => "ESTABLISHED",
        "02" => "SYN_SENT",
        "03" => "SYN_RECV",
        "04" => "FIN_WAIT1",
        "05" => "FIN_WAIT2",
        "06" => "TIME_WAIT",
        "07" => "CLOSE",
        "08" => "CLOSE_WAIT",
        "09" => "LAST_ACK",
        "0A" => STATUS_LISTEN,
        "0B" => "CLOSING",
        _ => STATUS_NONE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_state_names() {
        assert_eq!(tcp_state_name("0A"), "LISTEN");
        assert_eq!(tcp_state_name("0a"), "LISTEN");
        assert_eq!(tcp_state_name("01"), "ESTABLISHED");
        assert_eq!(tcp_state_name("ZZ"), "NONE");
    }

    #[test]
    fn test_touches_port() {
        let conn = Connection {
            pid: Some(1),
            local_addr: "10.0.0.2".into(),
            local_port: 51000,
            remote_addr: "10.0.0.9".into(),
            remote_port: 5432,
            status: "ESTABLISHED".into(),
        };
        assert!(conn.touches_port(5432));
        assert!(conn.touches_port(51000));
        assert!(!conn.touches_port(80));
        assert!(!conn.is_listening());
    }
}
