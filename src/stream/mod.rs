//! Stream worker: one of {UDP sender, UDP receiver, TCP sender, TCP
//! receiver}. Owns one data socket, a send/receive loop, an optional rate
//! limiter, and a [`Counters`] instance.
//!
//! Grounded on `iperf_data.py` (`Client`/`UDPClient`/`TCPClient`) for
//! behavior, using a tokio-task-per-connection idiom (non-blocking
//! `try_read`/`try_write`, `Arc<Mutex<..>>`-guarded shared state).

mod tcp;
pub(crate) mod udp;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::counters::Counters;
use crate::error::IperfError;
use crate::params::{Params, Transport};

/// Stream id assignment follows the reference's quirk: for `parallel`
/// streams, ids are `1, 3, 4, 5, ...`, the second stream numbered 3, not 2.
/// Grounded on `iperf_control.py::create_streams`'s `off` variable.
pub fn stream_ids(parallel: u32) -> Vec<u32> {
    (0..parallel)
        .map(|stream_index| {
            let off = if stream_index >= 1 { 2 } else { 1 };
            stream_index + off
        })
        .collect()
}

/// Terminal per-stream result, matching the reference's result dict shape
/// exactly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamResult {
    pub id: u32,
    pub bytes: u64,
    pub retransmits: u64,
    pub jitter: f64,
    pub errors: i64,
    pub packets: i64,
    pub start_time: f64,
    pub end_time: f64,
}

/// A running (or finished) stream worker: the join handle plus the
/// cooperative shutdown flag and the mutex-guarded terminal result.
pub struct StreamHandle {
    pub id: u32,
    done: Arc<AtomicBool>,
    result: Arc<Mutex<Option<StreamResult>>>,
    join: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Idempotent shutdown: set the done flag, join the worker task, return
    /// once it has exited. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join.take() {
            if let Err(e) = handle.await {
                warn!(stream_id = self.id, error = %e, "stream worker task join failed");
            }
        }
    }

    /// The terminal result, if the worker has finished writing it.
    pub async fn result(&self) -> Option<StreamResult> {
        self.result.lock().await.clone()
    }
}

/// One connected data-plane endpoint, either a TCP stream or a UDP socket
/// already `connect()`-ed to the peer.
pub(crate) enum DataSocket {
    Tcp(tokio::net::TcpStream),
    Udp(tokio::net::UdpSocket),
}

/// Perform the stream connect handshake.
pub async fn connect(
    transport: Transport,
    target: &str,
    data_port: u16,
    cookie: &[u8],
) -> Result<DataSocket, IperfError> {
    match transport {
        Transport::Tcp => tcp::connect(target, data_port, cookie).await,
        Transport::Udp => udp::connect(target, data_port).await,
    }
}

/// Spawn the worker's send/receive loop as a tokio task and return a handle
/// that can be shut down and whose result can be awaited.
pub fn start(id: u32, socket: DataSocket, params: Params, bitrate: u64) -> StreamHandle {
    let done = Arc::new(AtomicBool::new(false));
    let result: Arc<Mutex<Option<StreamResult>>> = Arc::new(Mutex::new(None));

    let task_done = done.clone();
    let task_result = result.clone();
    let join = tokio::spawn(async move {
        run(id, socket, params, bitrate, task_done, task_result).await;
    });

    StreamHandle {
        id,
        done,
        result,
        join: Some(join),
    }
}

async fn run(
    id: u32,
    mut socket: DataSocket,
    params: Params,
    bitrate: u64,
    done: Arc<AtomicBool>,
    result: Arc<Mutex<Option<StreamResult>>>,
) {
    let reverse = params.is_reverse();
    let long_counters = params.is_long_counters();
    let buf_len = params.max_packet_size().max(udp::UDP_CONNECT_MSG.len() as u32) as usize;
    let mut buf = vec![0u8; buf_len];

    let mut counters = Counters::new();
    let mut packet_count: i64 = 0;
    let mut total: u64 = 0;

    let start = Instant::now();
    let duration = Duration::from_secs(params.time);

    loop {
        let now = Instant::now();
        if now.duration_since(start) >= duration || done.load(Ordering::SeqCst) {
            break;
        }

        let outcome = if !reverse {
            send_once(
                &mut socket,
                &mut buf,
                &mut packet_count,
                long_counters,
                start,
                now,
                bitrate,
                total,
            )
            .await
        } else {
            receive_once(&mut socket, &mut buf, long_counters, &mut counters).await
        };

        match outcome {
            Ok(Some(n)) => total += n as u64,
            Ok(None) => {}
            Err(e) if e.is_peer_hangup() => {
                debug!(stream_id = id, "stream worker peer hangup, ending loop");
                break;
            }
            Err(e) => {
                warn!(stream_id = id, error = %e, "stream worker I/O error");
                break;
            }
        }

        tokio::task::yield_now().await;
    }

    let end_time = Instant::now().duration_since(start).as_secs_f64();
    let final_result = StreamResult {
        id,
        bytes: total,
        retransmits: 0,
        jitter: counters.jitter,
        errors: counters.cnt_error,
        packets: counters.packet_count,
        start_time: 0.0,
        end_time,
    };
    *result.lock().await = Some(final_result);
}

/// One sender iteration. Returns `Ok(Some(bytes))` on a successful send,
/// `Ok(None)` on a rate-limit skip or a would-block no-op.
#[allow(clippy::too_many_arguments)]
async fn send_once(
    socket: &mut DataSocket,
    buf: &mut [u8],
    packet_count: &mut i64,
    long_counters: bool,
    start: Instant,
    now: Instant,
    bitrate: u64,
    total_so_far: u64,
) -> Result<Option<usize>, IperfError> {
    if bitrate > 0 {
        let elapsed = now.duration_since(start).as_secs_f64();
        if elapsed > 0.0 && (total_so_far as f64 / elapsed) > bitrate as f64 {
            return Ok(None);
        }
    }

    match socket {
        DataSocket::Tcp(stream) => tcp::send_once(stream, buf).await,
        DataSocket::Udp(sock) => udp::send_once(sock, buf, packet_count, long_counters).await,
    }
}

async fn receive_once(
    socket: &mut DataSocket,
    buf: &mut [u8],
    long_counters: bool,
    counters: &mut Counters,
) -> Result<Option<usize>, IperfError> {
    match socket {
        DataSocket::Tcp(stream) => tcp::receive_once(stream, buf).await,
        DataSocket::Udp(sock) => udp::receive_once(sock, buf, long_counters, counters).await,
    }
}
