//! # Command-Line Interface Module
//!
//! Argument parsing for the client/server modes, using `clap`'s derive API.
//! Scope is deliberately smaller than real iperf3's flag set: one transport
//! selector, one parallelism knob, one rate cap. The ambient pieces
//! (verbosity, log file) are carried regardless.

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser,
};

use crate::bandwidth::parse_bitrate;
use crate::config::Config;
use crate::cookie::{make_cookie, COOKIE_SIZE};
use crate::params::{Params, Transport};

/// Defines the styles for the help message to replicate clap v3's appearance.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// rusty-iperf - A wire-compatible iperf3-style network throughput and
/// jitter tool.
///
/// Run with `--server` to listen for control connections, or `--client
/// <host>` to drive a test against a running server.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    /// Run in server mode, listening for control connections
    #[arg(short = 's', long, conflicts_with = "client", help_heading = "Core Options")]
    pub server: bool,

    /// Run in client mode, connecting to the given host
    #[arg(short = 'c', long, value_name = "HOST", help_heading = "Core Options")]
    pub client: Option<String>,

    /// Control channel port
    #[arg(short = 'p', long, default_value_t = 5201, help_heading = "Core Options")]
    pub port: u16,

    /// Data-plane port; defaults to the control port + 1 when unset
    #[arg(long, default_value_t = 0, help_heading = "Core Options")]
    pub data_port: u16,

    /// Test duration in seconds
    #[arg(short = 't', long, default_value_t = 10, help_heading = "Core Options")]
    pub time: u64,

    /// Number of parallel streams
    #[arg(short = 'P', long = "parallel", default_value_t = 1, help_heading = "Core Options")]
    pub parallel: u32,

    /// Use UDP rather than TCP
    #[arg(short = 'u', long, help_heading = "Core Options")]
    pub udp: bool,

    /// Reverse mode: the server sends, the client receives
    #[arg(short = 'R', long, help_heading = "Core Options")]
    pub reverse: bool,

    /// Payload length in bytes per read/write (TCP) or per datagram (UDP)
    #[arg(short = 'l', long = "len", help_heading = "Core Options")]
    pub len: Option<u32>,

    /// Reporting interval in seconds, driving the server's TEST_RUNNING cadence
    #[arg(short = 'i', long, default_value_t = 1.0, help_heading = "Core Options")]
    pub interval: f64,

    /// Target bitrate, e.g. "10M", "500k", or a bare integer for bytes/sec;
    /// unset means unlimited
    #[arg(long, value_parser = parse_bitrate_arg, default_value = "0", help_heading = "Core Options")]
    pub bitrate: u64,

    /// Client sends a TEST_END opcode when its own end timer fires
    #[arg(long, help_heading = "Core Options")]
    pub compat: bool,

    /// Use 64-bit UDP packet counters
    #[arg(long, help_heading = "Core Options")]
    pub udp_counters_64bit: bool,

    /// Silence all user-facing informational output on stdout
    #[arg(short = 'q', long, help_heading = "Output and Logging")]
    pub quiet: bool,

    /// Increase diagnostic log verbosity on stderr.
    ///
    /// Can be used multiple times to increase detail:
    ///  -v: debug
    ///  -vv and more: trace
    /// By default, only INFO and above are shown.
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Output and Logging")]
    pub verbose: u8,

    /// Write detailed logs to this file instead of stderr; "stderr" keeps
    /// them on stderr alongside the colorized stdout output
    #[arg(long, help_heading = "Output and Logging")]
    pub log_file: Option<String>,
}

impl Args {
    pub fn transport(&self) -> Transport {
        if self.udp {
            Transport::Udp
        } else {
            Transport::Tcp
        }
    }

    /// Resolved data-plane port: the explicit `--data-port`, or the control
    /// port + 1 when left at its zero sentinel.
    pub fn resolved_data_port(&self) -> u16 {
        if self.data_port != 0 {
            self.data_port
        } else {
            self.port.wrapping_add(1)
        }
    }

    /// Build the session-local `Config`. `cookie` is fresh on the client
    /// (identifies this session to the server) and a placeholder on the
    /// server (the real cookie is read off the wire per accepted
    /// connection in `ControlChannel::accept`).
    pub fn build_config(&self) -> Config {
        let target = self.client.clone().unwrap_or_else(|| "0.0.0.0".to_string());
        let cookie = if self.server {
            [0u8; COOKIE_SIZE]
        } else {
            make_cookie()
        };
        let mut config = Config::new(target, self.port, self.resolved_data_port());
        config.interval = self.interval;
        config.bitrate = self.bitrate;
        config.compat = self.compat;
        config.cookie = cookie;
        config
    }

    /// Build the negotiated `Params` the client sends at `PARAM_EXCHANGE`.
    /// Unused on the server, which receives its `Params` off the wire
    /// instead.
    pub fn build_params(&self) -> Params {
        let mut params = Params::new(self.transport(), self.time, self.parallel);
        if self.len.is_some() {
            params.len = self.len;
        }
        if self.reverse {
            params.reverse = Some(true);
        }
        if self.udp_counters_64bit {
            params.udp_counters_64bit = Some(true);
        }
        params.interval = Some(self.interval);
        params
    }
}

fn parse_bitrate_arg(s: &str) -> Result<u64, String> {
    parse_bitrate(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_data_port_defaults_to_control_port_plus_one() {
        let args = Args::parse_from(["rusty-iperf", "-c", "host"]);
        assert_eq!(args.resolved_data_port(), 5202);
    }

    #[test]
    fn resolved_data_port_honors_explicit_override() {
        let args = Args::parse_from(["rusty-iperf", "-c", "host", "--data-port", "6000"]);
        assert_eq!(args.resolved_data_port(), 6000);
    }

    #[test]
    fn build_params_carries_udp_and_reverse_flags() {
        let args = Args::parse_from(["rusty-iperf", "-c", "host", "-u", "-R"]);
        let params = args.build_params();
        assert_eq!(params.transport(), Transport::Udp);
        assert!(params.is_reverse());
    }

    #[test]
    fn bitrate_flag_is_parsed_through_the_bandwidth_table() {
        let args = Args::parse_from(["rusty-iperf", "-c", "host", "--bitrate", "10M"]);
        assert_eq!(args.bitrate, 1_250_000);
    }
}
