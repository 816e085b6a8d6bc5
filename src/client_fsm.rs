//! Client control-plane state machine.
//!
//! Grounded on `iperf_control.py::TestClient` for the overall shape
//! (connect, authorize, state_transition loop) and its client opcode table
//! for the literal transition behavior, generalizing the reference's
//! un-timed blocking loop into a `tokio::select!` race between the next
//! incoming opcode and the two timers.

use std::pin::Pin;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::control::ControlChannel;
use crate::error::IperfError;
use crate::framing::wall_clock_now;
use crate::opcode::State;
use crate::params::{Params, Transport};
use crate::results::{self, CpuSnapshot, TestResults};
use crate::stream::{self, StreamHandle};

/// The two result objects a finished client session leaves behind: its own
/// collated stream results, and whatever the server sent back (absent on
/// the failsafe-timer path).
#[derive(Debug, Default)]
pub struct ClientOutcome {
    pub local_results: Option<TestResults>,
    pub peer_results: Option<TestResults>,
}

pub struct ClientFsm {
    config: Config,
    params: Params,
    control: ControlChannel,
    /// Data sockets connected at CREATE_STREAMS, not yet handed to
    /// `stream::start`; the worker loop only begins at TEST_START.
    pending_streams: Vec<(u32, stream::DataSocket)>,
    streams: Vec<StreamHandle>,
    cpu_start: Option<CpuSnapshot>,
    start_wall: Option<f64>,
    local_results: Option<TestResults>,
    peer_results: Option<TestResults>,
    displayed: bool,
}

impl ClientFsm {
    pub async fn connect(config: Config, params: Params) -> Result<Self, IperfError> {
        let control =
            ControlChannel::connect(&config.target, config.config_port, config.cookie).await?;
        Ok(Self {
            config,
            params,
            control,
            pending_streams: Vec::new(),
            streams: Vec::new(),
            cpu_start: None,
            start_wall: None,
            local_results: None,
            peer_results: None,
            displayed: false,
        })
    }

    /// Drive the client to completion. Always attempts `display_results`
    /// before returning, even on a fatal path, matching the reference's
    /// unconditional `self.end_test()` after the receive loop exits.
    pub async fn run(mut self) -> Result<ClientOutcome, IperfError> {
        let outcome = self.run_loop().await;
        self.display_results().await;
        outcome?;
        Ok(ClientOutcome {
            local_results: self.local_results,
            peer_results: self.peer_results,
        })
    }

    async fn run_loop(&mut self) -> Result<(), IperfError> {
        let mut end_timer: Option<Pin<Box<tokio::time::Sleep>>> = None;
        let mut failsafe_timer: Option<Pin<Box<tokio::time::Sleep>>> = None;
        let mut end_fired = false;

        loop {
            tokio::select! {
                biased;

                _ = async { failsafe_timer.as_mut().unwrap().as_mut().await }, if failsafe_timer.is_some() => {
                    warn!("client failsafe timer fired; forcing DISPLAY_RESULTS");
                    return Ok(());
                }

                _ = async { end_timer.as_mut().unwrap().as_mut().await }, if end_timer.is_some() && !end_fired => {
                    end_fired = true;
                    if self.config.compat {
                        if let Err(e) = self.control.send_opcode(State::TestEnd).await {
                            warn!(error = %e, "best-effort TEST_END send failed");
                        }
                    }
                }

                opcode = self.control.recv_opcode() => {
                    let opcode = opcode?;
                    match State::from_byte(opcode) {
                        Some(State::ParamExchange) => {
                            self.control.send_json(&self.params).await?;
                        }
                        Some(State::CreateStreams) => {
                            self.create_streams().await?;
                        }
                        Some(State::TestStart) => {
                            self.start_test().await?;
                            end_timer = Some(Box::pin(tokio::time::sleep(Duration::from_secs(self.params.time))));
                            failsafe_timer = Some(Box::pin(tokio::time::sleep(Duration::from_secs(self.params.time + 10))));
                            end_fired = false;
                        }
                        Some(State::TestRunning) => {}
                        Some(State::ExchangeResults) => {
                            self.exchange_results().await?;
                        }
                        Some(State::DisplayResults) => {
                            self.display_results().await;
                            return Ok(());
                        }
                        Some(State::ServerTerminate) => {
                            self.display_results().await;
                            return Ok(());
                        }
                        Some(State::IperfDone) => {
                            return Ok(());
                        }
                        Some(State::AccessDenied) => {
                            return Err(IperfError::AccessDenied);
                        }
                        Some(State::ServerError) => {}
                        // Unrecognized opcodes are tolerated as a no-op.
                        _ => {}
                    }
                }
            }
        }
    }

    async fn create_streams(&mut self) -> Result<(), IperfError> {
        if self.params.transport() == Transport::Udp {
            if let Some(mss) = self.control.discover_mss() {
                self.params.mss = Some(mss);
            }
        }

        let ids = stream::stream_ids(self.params.parallel);
        for id in ids {
            let socket = stream::connect(
                self.params.transport(),
                &self.config.target,
                self.config.data_port,
                &self.config.cookie,
            )
            .await?;
            self.pending_streams.push((id, socket));
        }
        Ok(())
    }

    async fn start_test(&mut self) -> Result<(), IperfError> {
        self.cpu_start = Some(CpuSnapshot::now());
        self.start_wall = Some(wall_clock_now());
        for (id, socket) in self.pending_streams.drain(..) {
            self.streams
                .push(stream::start(id, socket, self.params.clone(), self.config.bitrate));
        }
        Ok(())
    }

    async fn exchange_results(&mut self) -> Result<(), IperfError> {
        let mut stream_results = Vec::with_capacity(self.streams.len());
        for handle in &mut self.streams {
            handle.shutdown().await;
            if let Some(result) = handle.result().await {
                stream_results.push(result);
            }
        }

        let cpu_start = self.cpu_start.unwrap_or(CpuSnapshot { user: 0.0, system: 0.0 });
        let local = results::collate(cpu_start, stream_results);
        self.control.send_json(&local).await?;
        self.local_results = Some(local);

        match self.control.recv_json::<TestResults>().await {
            Ok(peer) => self.peer_results = Some(peer),
            Err(e) => warn!(error = %e, "did not receive peer results; printing local results only"),
        }
        Ok(())
    }

    /// Print both result objects once and tear down. Idempotent: a repeat
    /// call (from `run`'s unconditional final call, or SERVER_TERMINATE
    /// followed by a natural loop exit) is a no-op.
    async fn display_results(&mut self) {
        if self.displayed {
            return;
        }
        self.displayed = true;
        info!(results = ?self.local_results, "client results");
        info!(results = ?self.peer_results, "server results");
        self.control.mark_inactive();
    }
}

/// Run a complete client session end to end: connect, authorize via the
/// control channel's cookie handshake, drive the FSM, and tear down.
pub async fn run(config: Config, params: Params) -> Result<ClientOutcome, IperfError> {
    let fsm = ClientFsm::connect(config, params).await?;
    fsm.run().await
}
