//! Two UDP streams, three seconds. Checks both the client's quirked
//! stream-id numbering and the server's per-peer Counters-derived results.

use std::time::Duration;

use rusty_iperf::config::Config;
use rusty_iperf::cookie::make_cookie;
use rusty_iperf::params::{Params, Transport};
use rusty_iperf::{client_fsm, server_fsm};
use tokio::net::TcpListener;

const CONTROL_PORT: u16 = 15311;
const DATA_PORT: u16 = 15312;

#[tokio::test]
async fn udp_two_streams_loopback_round_trip() {
    let listener = TcpListener::bind(("127.0.0.1", CONTROL_PORT))
        .await
        .expect("bind control port");
    let server_config = Config::new("127.0.0.1", CONTROL_PORT, DATA_PORT);
    let server = tokio::spawn(server_fsm::accept_one(server_config, listener));

    let mut client_config = Config::new("127.0.0.1", CONTROL_PORT, DATA_PORT);
    client_config.cookie = make_cookie();
    let params = Params::new(Transport::Udp, 3, 2);

    let outcome = tokio::time::timeout(Duration::from_secs(15), client_fsm::run(client_config, params))
        .await
        .expect("client did not finish within timeout")
        .expect("client session failed");

    let local = outcome.local_results.expect("client collates local results");
    let mut ids: Vec<u32> = local.streams.iter().map(|s| s.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 3], "stream ids should follow the 1,3,... quirk");

    let server_outcome = server
        .await
        .expect("server task panicked")
        .expect("server session failed");
    let server_results = server_outcome
        .local_results
        .expect("server collates one synthetic stream result per peer");
    assert_eq!(server_results.streams.len(), 2);
    for stream in &server_results.streams {
        assert!(stream.packets > 0, "expected the server to have observed packets from each peer");
        assert!(stream.jitter >= 0.0);
    }
}
