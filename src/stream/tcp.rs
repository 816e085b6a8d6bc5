//! TCP stream connect and send/receive primitives.
//!
//! Grounded on `iperf_data.py::TCPClient.connect` (send cookie, then switch
//! to non-blocking), using the same non-blocking read/write idiom as the
//! UDP side.

use tokio::net::TcpStream;

use super::DataSocket;
use crate::error::IperfError;

pub async fn connect(target: &str, data_port: u16, cookie: &[u8]) -> Result<DataSocket, IperfError> {
    let mut stream = TcpStream::connect((target, data_port))
        .await
        .map_err(IperfError::Transport)?;
    tokio::io::AsyncWriteExt::write_all(&mut stream, cookie)
        .await
        .map_err(IperfError::Transport)?;
    stream.set_nodelay(true).ok();
    Ok(DataSocket::Tcp(stream))
}

/// Send the configured payload buffer once. A `WouldBlock` result is
/// silently counted as a no-op, matching the reference's
/// `except BlockingIOError: pass`.
pub async fn send_once(stream: &mut TcpStream, buf: &[u8]) -> Result<Option<usize>, IperfError> {
    match stream.try_write(buf) {
        Ok(n) => Ok(Some(n)),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(classify(e)),
    }
}

pub async fn receive_once(
    stream: &mut TcpStream,
    buf: &mut [u8],
) -> Result<Option<usize>, IperfError> {
    match stream.try_read(buf) {
        Ok(0) => Err(IperfError::Transport(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "peer closed TCP data stream",
        ))),
        Ok(n) => Ok(Some(n)),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(classify(e)),
    }
}

fn classify(e: std::io::Error) -> IperfError {
    IperfError::Transport(e)
}
