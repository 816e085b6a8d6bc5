//! The server drives the session through EXCHANGE_RESULTS normally, then
//! stalls instead of sending DISPLAY_RESULTS. The client's failsafe timer
//! (params.time + 10s) must still close the session out and leave a
//! results pair behind.

use std::time::Duration;

use rusty_iperf::config::Config;
use rusty_iperf::cookie::make_cookie;
use rusty_iperf::framing::{json_recv, json_send};
use rusty_iperf::opcode::{write_opcode, State};
use rusty_iperf::params::{Params, Transport};
use rusty_iperf::results::TestResults;
use rusty_iperf::client_fsm;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

const CONTROL_PORT: u16 = 15321;
const DATA_PORT: u16 = 15322;

/// A hand-rolled server stub: plays the protocol straight up through
/// EXCHANGE_RESULTS, then goes silent instead of sending DISPLAY_RESULTS.
async fn run_stalling_server(mut control: TcpStream, data_listener: TcpListener) {
    let mut cookie = [0u8; 37];
    control.read_exact(&mut cookie).await.expect("read cookie");

    write_opcode(&mut control, State::ParamExchange)
        .await
        .expect("send PARAM_EXCHANGE");
    let params: serde_json::Value = json_recv(&mut control).await.expect("recv params");
    let time = params.get("time").and_then(|v| v.as_u64()).unwrap_or(1);

    write_opcode(&mut control, State::CreateStreams)
        .await
        .expect("send CREATE_STREAMS");
    let (_data_conn, _) = data_listener.accept().await.expect("accept data stream");

    write_opcode(&mut control, State::TestStart)
        .await
        .expect("send TEST_START");
    tokio::time::sleep(Duration::from_secs(time)).await;

    write_opcode(&mut control, State::ExchangeResults)
        .await
        .expect("send EXCHANGE_RESULTS");
    let _client_results: serde_json::Value = json_recv(&mut control).await.expect("recv client results");
    json_send(&mut control, &TestResults::default())
        .await
        .expect("send server results");

    // Deliberately never send DISPLAY_RESULTS; hold the connection open so
    // the client's next opcode read blocks until its failsafe timer fires.
    tokio::time::sleep(Duration::from_secs(60)).await;
}

#[tokio::test]
async fn failsafe_timer_closes_out_a_stalled_display_results() {
    let control_listener = TcpListener::bind(("127.0.0.1", CONTROL_PORT))
        .await
        .expect("bind control port");
    let data_listener = TcpListener::bind(("127.0.0.1", DATA_PORT))
        .await
        .expect("bind data port");

    let server = tokio::spawn(async move {
        let (control, _) = control_listener.accept().await.expect("accept control connection");
        run_stalling_server(control, data_listener).await;
    });

    let mut client_config = Config::new("127.0.0.1", CONTROL_PORT, DATA_PORT);
    client_config.cookie = make_cookie();
    let params = Params::new(Transport::Tcp, 1, 1);

    let outcome = tokio::time::timeout(Duration::from_secs(13), client_fsm::run(client_config, params))
        .await
        .expect("client must close out within its failsafe window (params.time + 10s)")
        .expect("client session failed");

    assert!(
        outcome.local_results.is_some(),
        "client should have collated its own results during EXCHANGE_RESULTS, before the failsafe fired"
    );
    assert!(
        outcome.peer_results.is_some(),
        "client already received the server's EXCHANGE_RESULTS payload before the stall"
    );

    server.abort();
}
