//! # rusty-iperf
//!
//! A wire-compatible iperf3-style network throughput, jitter, and loss
//! measurement tool.

pub mod bandwidth;
pub mod cli;
pub mod client_fsm;
pub mod config;
pub mod control;
pub mod cookie;
pub mod counters;
pub mod dataplane;
pub mod error;
pub mod framing;
pub mod opcode;
pub mod params;
pub mod results;
pub mod server_fsm;
pub mod stream;

pub use cli::Args;
pub use config::Config;
pub use error::IperfError;
pub use params::{Params, Transport};

/// The current version of rusty-iperf.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
