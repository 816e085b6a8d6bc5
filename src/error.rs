//! Error taxonomy for the control protocol and data plane.

use thiserror::Error;

/// Errors surfaced by the control FSM, framing codecs, and stream workers.
///
/// This is the crate's internal error boundary; `main.rs` converts these
/// into `anyhow::Error` at the CLI edge.
#[derive(Debug, Error)]
pub enum IperfError {
    /// Short read on a length prefix or JSON payload, or a truncated packet
    /// header.
    #[error("framing error: {0}")]
    Framing(String),

    /// `ConnectionRefused`, `ConnectionReset`, `BrokenPipe`, or any other I/O
    /// failure on a control or data socket.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A JSON payload failed to parse or did not match the expected shape.
    #[error("protocol payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// The server replied `ACCESS_DENIED`; fatal on the client.
    #[error("access denied by peer")]
    AccessDenied,
}

impl IperfError {
    /// True for the transport errors the worker loop should treat as a
    /// normal (non-panicking) exit rather than propagate.
    pub fn is_peer_hangup(&self) -> bool {
        matches!(
            self,
            IperfError::Transport(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionRefused
                        | std::io::ErrorKind::BrokenPipe
                )
        )
    }
}
