//! One TCP stream, two seconds, over loopback.

use std::time::Duration;

use rusty_iperf::config::Config;
use rusty_iperf::cookie::make_cookie;
use rusty_iperf::params::{Params, Transport};
use rusty_iperf::{client_fsm, server_fsm};
use tokio::net::TcpListener;

const CONTROL_PORT: u16 = 15301;
const DATA_PORT: u16 = 15302;

#[tokio::test]
async fn tcp_single_stream_loopback_round_trip() {
    let listener = TcpListener::bind(("127.0.0.1", CONTROL_PORT))
        .await
        .expect("bind control port");
    let server_config = Config::new("127.0.0.1", CONTROL_PORT, DATA_PORT);
    let server = tokio::spawn(server_fsm::accept_one(server_config, listener));

    let mut client_config = Config::new("127.0.0.1", CONTROL_PORT, DATA_PORT);
    client_config.cookie = make_cookie();
    let params = Params::new(Transport::Tcp, 2, 1);

    let outcome = tokio::time::timeout(Duration::from_secs(15), client_fsm::run(client_config, params))
        .await
        .expect("client did not finish within timeout")
        .expect("client session failed");

    let local = outcome.local_results.expect("client collates local results");
    assert_eq!(local.streams.len(), 1);
    assert_eq!(local.streams[0].id, 1);
    assert!(local.streams[0].bytes > 0, "expected nonzero bytes transferred");
    assert!(
        (local.streams[0].end_time - 2.0).abs() < 0.5,
        "end_time {} not close to 2.0",
        local.streams[0].end_time
    );
    assert_eq!(local.streams[0].errors, 0);

    server
        .await
        .expect("server task panicked")
        .expect("server session failed");
}
