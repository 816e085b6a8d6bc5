//! UDP stream connect handshake and send/receive primitives.
//!
//! Grounded on `iperf_data.py::UDPClient` and `iperf_data.py`'s module-level
//! `UDP_CONNECT_MSG`/`UDP_CONNECT_REPLY` constants. The host-order encoding
//! of the connect handshake constants is a deliberately preserved quirk,
//! not a bug to fix.

use tokio::net::UdpSocket;

use super::DataSocket;
use crate::counters::Counters;
use crate::error::IperfError;
use crate::framing::{wall_clock_now, PacketHeader};

/// `0x36373839` packed in the host's native byte order.
pub const UDP_CONNECT_MSG: [u8; 4] = 0x36373839_i32.to_ne_bytes();
/// `0x39383736`, compared against the reply in the host's native byte
/// order.
pub const UDP_CONNECT_REPLY: i32 = 0x39383736;

pub async fn connect(target: &str, data_port: u16) -> Result<DataSocket, IperfError> {
    let sock = UdpSocket::bind(("0.0.0.0", 0))
        .await
        .map_err(IperfError::Transport)?;
    sock.connect((target, data_port))
        .await
        .map_err(IperfError::Transport)?;

    sock.send(&UDP_CONNECT_MSG)
        .await
        .map_err(IperfError::Transport)?;

    let mut reply = [0u8; 4];
    let n = sock.recv(&mut reply).await.map_err(IperfError::Transport)?;
    if n < 4 {
        return Err(IperfError::Framing("short UDP connect reply".into()));
    }
    let reply_value = i32::from_ne_bytes(reply);
    if reply_value != UDP_CONNECT_REPLY {
        return Err(IperfError::Framing(format!(
            "unexpected UDP connect reply {reply_value:#x}"
        )));
    }

    Ok(DataSocket::Udp(sock))
}

/// Stamp the header into `buf` and send it. Packet counts are 1-based and
/// strictly increasing.
pub async fn send_once(
    sock: &UdpSocket,
    buf: &mut [u8],
    packet_count: &mut i64,
    long_counters: bool,
) -> Result<Option<usize>, IperfError> {
    *packet_count += 1;

    let now_wall = wall_clock_now();
    let sec = now_wall.trunc() as i32;
    let usec = ((now_wall.fract()) * 1e6) as i32;

    let header = PacketHeader::new(sec, usec, *packet_count);
    let header_len = header.encode_into(buf, long_counters)?;
    let _ = header_len;

    match sock.try_send(buf) {
        Ok(n) => Ok(Some(n)),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(IperfError::Transport(e)),
    }
}

pub async fn receive_once(
    sock: &UdpSocket,
    buf: &mut [u8],
    long_counters: bool,
    counters: &mut Counters,
) -> Result<Option<usize>, IperfError> {
    match sock.try_recv(buf) {
        Ok(n) => {
            if n >= PacketHeader::wire_len(long_counters) {
                let header = PacketHeader::decode(&buf[..n], long_counters)?;
                counters.process_header(&header, n, wall_clock_now());
            }
            Ok(Some(n))
        }
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(IperfError::Transport(e)),
    }
}
