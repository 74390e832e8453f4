//! Server configuration parsing.
//!
//! Line-oriented format: `#` starts a comment line, the first space
//! splits key from value, keys are case-insensitive. Unknown keys are
//! ignored; malformed values keep their defaults.

use std::io;
use std::path::Path;

/// Parsed server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address.
    pub bind: String,
    /// Listen port.
    pub port: u16,
    /// Enable the append-only file.
    pub append_only: bool,
    /// AOF path.
    pub append_only_filename: String,
    /// Advisory connection cap; informational only.
    pub max_clients: usize,
    /// Advisory password; no auth in the core.
    pub require_pass: String,
    /// Number of logical databases.
    pub databases: usize,
    /// Cluster peer addresses.
    pub peers: Vec<String>,
    /// This node's cluster address.
    pub self_addr: String,
    /// Refuse database commands until the client SELECTs.
    pub require_select: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 6666,
            append_only: false,
            append_only_filename: "appendonly.aof".into(),
            max_clients: 0,
            require_pass: String::new(),
            databases: 16,
            peers: Vec::new(),
            self_addr: String::new(),
            require_select: false,
        }
    }
}

impl Config {
    /// Reads and parses a config file.
    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// Parses config text. Unknown keys and bad values fall back to
    /// defaults rather than failing startup.
    pub fn parse(text: &str) -> Self {
        let mut config = Self::default();
        for raw_line in text.lines() {
            let line = raw_line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(' ') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match key.to_lowercase().as_str() {
                "bind" => config.bind = value.into(),
                "port" => {
                    if let Ok(port) = value.parse() {
                        config.port = port;
                    }
                }
                "appendonly" => config.append_only = parse_bool(value),
                "appendonlyfilename" => config.append_only_filename = value.into(),
                "maxclients" => {
                    if let Ok(n) = value.parse() {
                        config.max_clients = n;
                    }
                }
                "requirepass" => config.require_pass = value.into(),
                "databases" => {
                    if let Ok(n) = value.parse::<usize>() {
                        if n > 0 {
                            config.databases = n;
                        }
                    }
                }
                "peers" => {
                    config.peers = value
                        .split(',')
                        .map(|p| p.trim().to_owned())
                        .filter(|p| !p.is_empty())
                        .collect();
                }
                "self" => config.self_addr = value.into(),
                "requireselect" => config.require_select = parse_bool(value),
                _ => {}
            }
        }
        config
    }

    /// The socket address to listen on.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Cluster mode needs this node's identity and at least one peer.
    pub fn cluster_enabled(&self) -> bool {
        !self.self_addr.is_empty() && !self.peers.is_empty()
    }
}

fn parse_bool(value: &str) -> bool {
    value == "yes" || value == "true"
}
