//! Control channel: the reliable byte stream carrying single-byte opcodes
//! and length-prefixed JSON frames. Grounded on `iperf_control.py`'s
//! cookie-then-opcode sequencing and `iperf_utils.py::json_send`/`json_recv`.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::cookie::COOKIE_SIZE;
use crate::error::IperfError;
use crate::framing::{json_recv, json_send};
use crate::opcode::{read_opcode, write_opcode, State};

/// One TCP control connection, wrapping the cookie handshake and the
/// opcode/JSON send/recv primitives. Both the client and server FSMs drive
/// one of these.
pub struct ControlChannel {
    stream: TcpStream,
    pub cookie: [u8; COOKIE_SIZE],
    active: bool,
}

impl ControlChannel {
    /// Client side: connect, then immediately emit the cookie unframed,
    /// before any state byte.
    pub async fn connect(target: &str, config_port: u16, cookie: [u8; COOKIE_SIZE]) -> Result<Self, IperfError> {
        let mut stream = TcpStream::connect((target, config_port))
            .await
            .map_err(IperfError::Transport)?;
        stream.write_all(&cookie).await.map_err(IperfError::Transport)?;
        stream.set_nodelay(true).ok();
        Ok(Self {
            stream,
            cookie,
            active: true,
        })
    }

    /// Server side: read exactly 37 bytes of cookie off a freshly accepted
    /// connection and store them as session identity (cookie content is not
    /// validated; it is identity, not authorization.
    pub async fn accept(mut stream: TcpStream) -> Result<Self, IperfError> {
        let mut cookie = [0u8; COOKIE_SIZE];
        stream
            .read_exact(&mut cookie)
            .await
            .map_err(IperfError::Transport)?;
        stream.set_nodelay(true).ok();
        Ok(Self {
            stream,
            cookie,
            active: true,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn mark_inactive(&mut self) {
        self.active = false;
    }

    /// Non-blocking poll for one incoming opcode byte: `Ok(None)` on
    /// would-block, used by the server FSM's peer-driven-override schedule
    /// poll.
    pub fn try_read_opcode(&mut self) -> Result<Option<State>, IperfError> {
        let mut buf = [0u8; 1];
        match self.stream.try_read(&mut buf) {
            Ok(0) => Err(IperfError::Transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "peer closed control channel",
            ))),
            Ok(_) => Ok(State::from_byte(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(IperfError::Transport(e)),
        }
    }

    /// Block until one opcode byte arrives.
    pub async fn recv_opcode(&mut self) -> Result<u8, IperfError> {
        read_opcode(&mut self.stream).await
    }

    pub async fn send_opcode(&mut self, state: State) -> Result<(), IperfError> {
        write_opcode(&mut self.stream, state).await
    }

    pub async fn send_json<T: serde::Serialize>(&mut self, value: &T) -> Result<(), IperfError> {
        json_send(&mut self.stream, value).await
    }

    pub async fn recv_json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, IperfError> {
        json_recv(&mut self.stream).await
    }

    /// Discover the peer's MSS via `TCP_MAXSEG` on the control socket, used
    /// by `CREATE_STREAMS` for UDP tests. Falls back to `None`
    /// on platforms or socket states where the option is unavailable; the
    /// caller then uses `params.len` instead.
    pub fn discover_mss(&self) -> Option<u32> {
        use std::os::unix::io::AsRawFd;
        let fd = self.stream.as_raw_fd();
        let mut value: libc::c_int = 0;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::IPPROTO_TCP,
                libc::TCP_MAXSEG,
                &mut value as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        if rc == 0 && value > 0 {
            Some(value as u32)
        } else {
            None
        }
    }
}
