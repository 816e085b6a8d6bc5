//! A TCP sender capped at 1,000,000 bit/s (125000 B/s) over two seconds
//! should move roughly 250000 bytes on loopback, not an unthrottled
//! multiple of that.

use std::time::Duration;

use rusty_iperf::config::Config;
use rusty_iperf::cookie::make_cookie;
use rusty_iperf::params::{Params, Transport};
use rusty_iperf::{client_fsm, server_fsm};
use tokio::net::TcpListener;

const CONTROL_PORT: u16 = 15341;
const DATA_PORT: u16 = 15342;

#[tokio::test]
async fn bitrate_cap_limits_sender_throughput_over_loopback() {
    let listener = TcpListener::bind(("127.0.0.1", CONTROL_PORT))
        .await
        .expect("bind control port");
    let server_config = Config::new("127.0.0.1", CONTROL_PORT, DATA_PORT);
    let server = tokio::spawn(server_fsm::accept_one(server_config, listener));

    let mut client_config = Config::new("127.0.0.1", CONTROL_PORT, DATA_PORT);
    client_config.cookie = make_cookie();
    client_config.bitrate = 1_000_000;
    let params = Params::new(Transport::Tcp, 2, 1);

    let outcome = tokio::time::timeout(Duration::from_secs(15), client_fsm::run(client_config, params))
        .await
        .expect("client did not finish within timeout")
        .expect("client session failed");

    let local = outcome.local_results.expect("client collates local results");
    let bytes = local.streams[0].bytes;
    assert!(
        (200_000..=300_000).contains(&bytes),
        "capped transfer moved {bytes} bytes, expected roughly 250000"
    );

    server
        .await
        .expect("server task panicked")
        .expect("server session failed");
}
