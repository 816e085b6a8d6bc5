//! Server control-plane state machine.
//!
//! Grounded on `iperf_control_server.py` (`create_schedule`, `run`) for the
//! baseline scheduled-sleep loop; the peer-driven opcode override on top of
//! that schedule supersedes the reference's un-overridable one, following
//! the newer `iperf_*` implementation over the earlier `helper_*` draft.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::config::Config;
use crate::control::ControlChannel;
use crate::dataplane::{self, DataPlaneServer};
use crate::error::IperfError;
use crate::framing::wall_clock_now;
use crate::opcode::State;
use crate::params::Params;
use crate::results::{self, CpuSnapshot, TestResults};

/// Minimum pause between a schedule entry's send and the next poll; also
/// the fixed delay ahead of `PARAM_EXCHANGE`/`CREATE_STREAMS`/`TEST_START`.
const SETUP_PAUSE: Duration = Duration::from_millis(100);

/// The two result objects a finished server session leaves behind, mirroring
/// `client_fsm::ClientOutcome`.
#[derive(Debug, Default)]
pub struct ServerOutcome {
    pub local_results: Option<TestResults>,
    pub peer_results: Option<TestResults>,
}

pub struct ServerFsm {
    config: Config,
    control: ControlChannel,
    params: Option<Params>,
    dataplane: Option<DataPlaneServer>,
    cpu_start: Option<CpuSnapshot>,
    start_wall: Option<f64>,
    local_results: Option<TestResults>,
    peer_results: Option<TestResults>,
}

impl ServerFsm {
    pub async fn accept(config: Config, stream: TcpStream) -> Result<Self, IperfError> {
        let control = ControlChannel::accept(stream).await?;
        Ok(Self {
            config,
            control,
            params: None,
            dataplane: None,
            cpu_start: None,
            start_wall: None,
            local_results: None,
            peer_results: None,
        })
    }

    pub async fn run(mut self) -> Result<ServerOutcome, IperfError> {
        let outcome = self.run_loop().await;
        if let Some(dp) = self.dataplane.take() {
            dp.shutdown().await;
        }
        outcome?;
        Ok(ServerOutcome {
            local_results: self.local_results,
            peer_results: self.peer_results,
        })
    }

    async fn run_loop(&mut self) -> Result<(), IperfError> {
        let mut schedule: VecDeque<(State, Duration)> = VecDeque::new();
        schedule.push_back((State::ParamExchange, SETUP_PAUSE));

        while let Some((scheduled, pause)) = schedule.pop_front() {
            let state = match self.control.try_read_opcode() {
                Ok(Some(overridden)) => overridden,
                Ok(None) => scheduled,
                Err(e) => {
                    self.control.mark_inactive();
                    return Err(e);
                }
            };

            self.control.send_opcode(state).await?;

            match state {
                State::ParamExchange => self.handle_param_exchange(&mut schedule).await?,
                State::CreateStreams => {}
                State::TestStart => {
                    self.cpu_start = Some(CpuSnapshot::now());
                    self.start_wall = Some(wall_clock_now());
                }
                State::TestRunning => {}
                State::ExchangeResults => self.exchange_results().await?,
                State::DisplayResults => self.display_results(),
                State::IperfDone => return Ok(()),
                State::TestEnd => {
                    // An early TEST_END (the compat client's end-timer quirk)
                    // overrides whatever was left in the schedule; still run
                    // the result exchange before ending the session.
                    schedule.clear();
                    schedule.push_back((State::ExchangeResults, SETUP_PAUSE));
                    schedule.push_back((State::DisplayResults, SETUP_PAUSE));
                    schedule.push_back((State::IperfDone, SETUP_PAUSE));
                }
                State::AccessDenied | State::ServerError => {}
                _ => {}
            }

            tokio::time::sleep(pause).await;
        }
        Ok(())
    }

    /// Receive the client's negotiated `Params`, start the matching
    /// data-plane server, and append the rest of the schedule (the repeated
    /// `TEST_RUNNING` entries, the result exchange, and the terminal
    /// `IPERF_DONE`) now that `params.time` is known.
    async fn handle_param_exchange(
        &mut self,
        schedule: &mut VecDeque<(State, Duration)>,
    ) -> Result<(), IperfError> {
        let params: Params = self.control.recv_json().await?;
        let dp = dataplane::start(&self.config.target, self.config.data_port, &params).await?;
        self.dataplane = Some(dp);

        schedule.push_back((State::CreateStreams, SETUP_PAUSE));
        schedule.push_back((State::TestStart, SETUP_PAUSE));

        let interval = self.config.interval.max(0.1);
        let target = params.time as f64 + 2.0;
        let mut elapsed = SETUP_PAUSE.as_secs_f64() * 3.0;
        while elapsed < target {
            schedule.push_back((State::TestRunning, Duration::from_secs_f64(interval)));
            elapsed += interval;
        }
        schedule.push_back((State::ExchangeResults, SETUP_PAUSE));
        schedule.push_back((State::DisplayResults, SETUP_PAUSE));
        schedule.push_back((State::IperfDone, SETUP_PAUSE));

        self.params = Some(params);
        Ok(())
    }

    /// Recv-then-send: opposite order from the client's `EXCHANGE_RESULTS`
    /// handling, since the server is the one building its results out of
    /// the data-plane server's peer map rather than its own stream workers.
    async fn exchange_results(&mut self) -> Result<(), IperfError> {
        let peer: TestResults = self.control.recv_json().await?;
        self.peer_results = Some(peer);

        if let Some(dp) = &self.dataplane {
            let start_time = self.start_wall.unwrap_or_else(wall_clock_now);
            let stream_results =
                results::collate_server_peers(&dp.peers, start_time, wall_clock_now()).await;
            let cpu_start = self.cpu_start.unwrap_or(CpuSnapshot { user: 0.0, system: 0.0 });
            let local = results::collate(cpu_start, stream_results);
            self.control.send_json(&local).await?;
            self.local_results = Some(local);
        }
        Ok(())
    }

    fn display_results(&self) {
        info!(results = ?self.local_results, "server results");
        info!(results = ?self.peer_results, "client results");
    }
}

/// Accept exactly one control connection on an already-bound listener and
/// run it to completion. Used by tests that want a single deterministic
/// session rather than `serve`'s infinite accept loop.
pub async fn accept_one(config: Config, listener: TcpListener) -> Result<ServerOutcome, IperfError> {
    let (stream, _addr) = listener.accept().await.map_err(IperfError::Transport)?;
    let fsm = ServerFsm::accept(config, stream).await?;
    fsm.run().await
}

/// Accept loop: one `ServerFsm` per control connection, each on its own
/// task.
pub async fn serve(config: Config) -> Result<(), IperfError> {
    let listener = TcpListener::bind((config.target.as_str(), config.config_port))
        .await
        .map_err(IperfError::Transport)?;
    info!(addr = %listener.local_addr().map_err(IperfError::Transport)?, "server listening");

    loop {
        let (stream, addr) = listener.accept().await.map_err(IperfError::Transport)?;
        let session_config = config.clone();
        tokio::spawn(async move {
            match ServerFsm::accept(session_config, stream).await {
                Ok(fsm) => {
                    if let Err(e) = fsm.run().await {
                        warn!(peer = %addr, error = %e, "server session ended with error");
                    }
                }
                Err(e) => warn!(peer = %addr, error = %e, "failed to accept control connection"),
            }
        });
    }
}
