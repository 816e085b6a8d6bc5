//! UDP and TCP data-plane servers: per-peer [`Counters`], address-keyed
//! state, the UDP connect-reply handshake.
//!
//! Grounded on `iperf_data_server.py` (`UDPDataServer`/`TCPDataServer`/
//! `UDPRequestHandler`/`TCPRequestHandler`), with the accept/serve loop
//! using a tokio-task-per-connection idiom in place of the reference's
//! `threading`-based server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::counters::Counters;
use crate::error::IperfError;
use crate::framing::{wall_clock_now, PacketHeader};
use crate::params::Params;
use crate::stream::udp::UDP_CONNECT_REPLY;

/// Per-peer state shared between the server's accept/serve loop and
/// whatever later reads it back out for result collation.
#[derive(Debug, Default)]
pub struct PeerState {
    pub counters: Counters,
}

/// Keyed by `"ip:port"`, matching the reference's address-string key.
pub type PeerMap = Arc<Mutex<HashMap<String, PeerState>>>;

/// A running data-plane server (UDP or TCP), with the accept/serve loop on
/// its own task and cooperative shutdown.
pub struct DataPlaneServer {
    pub local_addr: SocketAddr,
    pub peers: PeerMap,
    pub bytes_received: Arc<std::sync::atomic::AtomicU64>,
    join: JoinHandle<()>,
}

impl DataPlaneServer {
    pub async fn shutdown(self) {
        self.join.abort();
        let _ = self.join.await;
    }
}

/// Bind and start the data-plane server appropriate for `params.transport()`
/// at `(target, data_port)`.
pub async fn start(
    target: &str,
    data_port: u16,
    params: &Params,
) -> Result<DataPlaneServer, IperfError> {
    match params.transport() {
        crate::params::Transport::Udp => start_udp(target, data_port, params).await,
        crate::params::Transport::Tcp => start_tcp(target, data_port, params).await,
    }
}

async fn start_udp(
    target: &str,
    data_port: u16,
    params: &Params,
) -> Result<DataPlaneServer, IperfError> {
    let sock = UdpSocket::bind((target, data_port))
        .await
        .map_err(IperfError::Transport)?;
    let local_addr = sock.local_addr().map_err(IperfError::Transport)?;
    let long_counters = params.is_long_counters();
    let max_packet_size = params.max_packet_size() as usize;

    let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));
    let bytes_received = Arc::new(std::sync::atomic::AtomicU64::new(0));

    let task_peers = peers.clone();
    let task_bytes = bytes_received.clone();
    let join = tokio::spawn(async move {
        let mut buf = vec![0u8; max_packet_size];
        loop {
            let (n, addr) = match sock.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "UDP data-plane recv_from failed");
                    break;
                }
            };
            handle_udp_datagram(
                &sock,
                &task_peers,
                &task_bytes,
                addr,
                &buf[..n],
                long_counters,
            )
            .await;
        }
    });

    Ok(DataPlaneServer {
        local_addr,
        peers,
        bytes_received,
        join,
    })
}

async fn handle_udp_datagram(
    sock: &UdpSocket,
    peers: &PeerMap,
    bytes_received: &Arc<std::sync::atomic::AtomicU64>,
    addr: SocketAddr,
    datagram: &[u8],
    long_counters: bool,
) {
    let key = addr.to_string();
    let mut map = peers.lock().await;
    match map.get_mut(&key) {
        Some(state) => {
            if datagram.len() >= PacketHeader::wire_len(long_counters) {
                match PacketHeader::decode(datagram, long_counters) {
                    Ok(header) => {
                        state
                            .counters
                            .process_header(&header, datagram.len(), wall_clock_now());
                        bytes_received
                            .fetch_add(datagram.len() as u64, std::sync::atomic::Ordering::Relaxed);
                    }
                    Err(e) => debug!(peer = %key, error = %e, "dropping malformed UDP datagram"),
                }
            }
        }
        None => {
            map.insert(key.clone(), PeerState::default());
            if let Err(e) = sock
                .send_to(&UDP_CONNECT_REPLY.to_ne_bytes(), addr)
                .await
            {
                warn!(peer = %key, error = %e, "failed to send UDP connect reply");
            }
        }
    }
}

async fn start_tcp(
    target: &str,
    data_port: u16,
    params: &Params,
) -> Result<DataPlaneServer, IperfError> {
    let listener = TcpListener::bind((target, data_port))
        .await
        .map_err(IperfError::Transport)?;
    let local_addr = listener.local_addr().map_err(IperfError::Transport)?;
    let bufsize = params.max_packet_size() as usize;

    let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));
    let bytes_received = Arc::new(std::sync::atomic::AtomicU64::new(0));

    let task_peers = peers.clone();
    let task_bytes = bytes_received.clone();
    let join = tokio::spawn(async move {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "TCP data-plane accept failed");
                    break;
                }
            };
            let peers = task_peers.clone();
            let bytes_received = task_bytes.clone();
            tokio::spawn(async move {
                handle_tcp_connection(stream, addr, peers, bytes_received, bufsize).await;
            });
        }
    });

    Ok(DataPlaneServer {
        local_addr,
        peers,
        bytes_received,
        join,
    })
}

async fn handle_tcp_connection(
    mut stream: tokio::net::TcpStream,
    addr: SocketAddr,
    peers: PeerMap,
    bytes_received: Arc<std::sync::atomic::AtomicU64>,
    bufsize: usize,
) {
    use crate::cookie::COOKIE_SIZE;
    use tokio::io::AsyncReadExt;

    let mut cookie = [0u8; COOKIE_SIZE];
    if let Err(e) = stream.read_exact(&mut cookie).await {
        debug!(peer = %addr, error = %e, "TCP data connection dropped before cookie");
        return;
    }

    let key = addr.to_string();
    peers.lock().await.entry(key.clone()).or_default();

    let mut buf = vec![0u8; bufsize];
    loop {
        match stream.try_read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                bytes_received.fetch_add(n as u64, std::sync::atomic::Ordering::Relaxed);
                if let Some(state) = peers.lock().await.get_mut(&key) {
                    state.counters.bytes_received += n as u64;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tokio::task::yield_now().await;
            }
            Err(e) if crate::error::IperfError::Transport(e).is_peer_hangup() => break,
            Err(e) => {
                warn!(peer = %addr, error = %e, "TCP data-plane connection error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Params, Transport};
    use std::time::Duration;

    #[tokio::test]
    async fn udp_server_replies_to_first_datagram_then_tracks_counters() {
        let server = start_udp("127.0.0.1", 0, &Params::new(Transport::Udp, 1, 1))
            .await
            .unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(server.local_addr).await.unwrap();
        client.send(&crate::stream::udp::UDP_CONNECT_MSG).await.unwrap();

        let mut reply = [0u8; 4];
        let n = tokio::time::timeout(Duration::from_secs(1), client.recv(&mut reply))
            .await
            .expect("timed out waiting for connect reply")
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(i32::from_ne_bytes(reply), UDP_CONNECT_REPLY);

        let mut buf = vec![0u8; 64];
        let header = PacketHeader::new(0, 0, 1);
        let len = header.encode_into(&mut buf, false).unwrap();
        client.send(&buf[..len]).await.unwrap();

        // give the server task a moment to process the second datagram
        for _ in 0..50 {
            if server.bytes_received.load(std::sync::atomic::Ordering::Relaxed) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(server.bytes_received.load(std::sync::atomic::Ordering::Relaxed) > 0);

        let peers = server.peers.lock().await;
        assert_eq!(peers.len(), 1);
        let state = peers.values().next().unwrap();
        assert_eq!(state.counters.packet_count, 1);
        drop(peers);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn tcp_server_accepts_cookie_then_accumulates_bytes() {
        let server = start_tcp("127.0.0.1", 0, &Params::new(Transport::Tcp, 1, 1))
            .await
            .unwrap();

        let mut stream = tokio::net::TcpStream::connect(server.local_addr)
            .await
            .unwrap();
        use tokio::io::AsyncWriteExt;
        stream.write_all(&[0u8; crate::cookie::COOKIE_SIZE]).await.unwrap();
        stream.write_all(b"payload-bytes").await.unwrap();

        for _ in 0..50 {
            if server.bytes_received.load(std::sync::atomic::Ordering::Relaxed) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            server.bytes_received.load(std::sync::atomic::Ordering::Relaxed),
            "payload-bytes".len() as u64
        );

        server.shutdown().await;
    }
}
