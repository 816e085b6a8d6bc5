//! Runtime parameters not negotiated with the peer.

use crate::cookie::COOKIE_SIZE;

/// Session-local configuration: where to connect/listen, reporting cadence,
/// and the session cookie.
#[derive(Debug, Clone)]
pub struct Config {
    pub target: String,
    pub config_port: u16,
    pub data_port: u16,
    /// Reporting interval in seconds (drives the server's `TEST_RUNNING`
    /// schedule cadence).
    pub interval: f64,
    /// Bitrate cap in bytes/sec, 0 = unlimited.
    pub bitrate: u64,
    /// When set, the client's end timer sends a `TEST_END` opcode to the
    /// server, a preserved wire quirk.
    pub compat: bool,
    /// Session identity; populated by [`crate::cookie::make_cookie`] on the
    /// client, or read off the wire on the server.
    pub cookie: [u8; COOKIE_SIZE],
}

impl Config {
    pub fn new(target: impl Into<String>, config_port: u16, data_port: u16) -> Self {
        Self {
            target: target.into(),
            config_port,
            data_port,
            interval: 1.0,
            bitrate: 0,
            compat: false,
            cookie: [0u8; COOKIE_SIZE],
        }
    }
}
