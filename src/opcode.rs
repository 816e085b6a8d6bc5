//! Control-plane state opcodes exchanged as single signed bytes on the
//! control channel.

use crate::error::IperfError;

/// A single-byte control-plane state opcode.
///
/// Values match the reference tool's wire protocol exactly; they are not
/// renumbered or reordered for Rust-side convenience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum State {
    TestStart = 1,
    TestRunning = 2,
    ResultRequest = 3,
    TestEnd = 4,
    StreamBegin = 5,
    StreamRunning = 6,
    StreamEnd = 7,
    AllStreamsEnd = 8,
    ParamExchange = 9,
    CreateStreams = 10,
    ServerTerminate = 11,
    ClientTerminate = 12,
    ExchangeResults = 13,
    DisplayResults = 14,
    IperfStart = 15,
    IperfDone = 16,
    AccessDenied = -1,
    ServerError = -2,
}

impl State {
    /// Decode a wire byte into a known opcode.
    ///
    /// Unrecognized bytes are a protocol error that callers must tolerate
    /// (spec: unknown opcodes are treated as a no-op, not an abort), so this
    /// returns `Option` rather than `IperfError` directly.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b as i8 {
            1 => Some(State::TestStart),
            2 => Some(State::TestRunning),
            3 => Some(State::ResultRequest),
            4 => Some(State::TestEnd),
            5 => Some(State::StreamBegin),
            6 => Some(State::StreamRunning),
            7 => Some(State::StreamEnd),
            8 => Some(State::AllStreamsEnd),
            9 => Some(State::ParamExchange),
            10 => Some(State::CreateStreams),
            11 => Some(State::ServerTerminate),
            12 => Some(State::ClientTerminate),
            13 => Some(State::ExchangeResults),
            14 => Some(State::DisplayResults),
            15 => Some(State::IperfStart),
            16 => Some(State::IperfDone),
            -1 => Some(State::AccessDenied),
            -2 => Some(State::ServerError),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        (self as i8) as u8
    }
}

/// Read one opcode byte from an async stream, blocking the task until it
/// arrives.
pub async fn read_opcode<R>(mut reader: R) -> Result<u8, IperfError>
where
    R: tokio::io::AsyncReadExt + Unpin,
{
    let mut buf = [0u8; 1];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(IperfError::Transport)?;
    Ok(buf[0])
}

/// Write one opcode byte to an async stream.
pub async fn write_opcode<W>(mut writer: W, state: State) -> Result<(), IperfError>
where
    W: tokio::io::AsyncWriteExt + Unpin,
{
    writer
        .write_all(&[state.to_byte()])
        .await
        .map_err(IperfError::Transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_named_opcode() {
        let values: &[(State, i8)] = &[
            (State::TestStart, 1),
            (State::TestRunning, 2),
            (State::ResultRequest, 3),
            (State::TestEnd, 4),
            (State::StreamBegin, 5),
            (State::StreamRunning, 6),
            (State::StreamEnd, 7),
            (State::AllStreamsEnd, 8),
            (State::ParamExchange, 9),
            (State::CreateStreams, 10),
            (State::ServerTerminate, 11),
            (State::ClientTerminate, 12),
            (State::ExchangeResults, 13),
            (State::DisplayResults, 14),
            (State::IperfStart, 15),
            (State::IperfDone, 16),
            (State::AccessDenied, -1),
            (State::ServerError, -2),
        ];
        for (state, raw) in values {
            assert_eq!(state.to_byte(), *raw as u8);
            assert_eq!(State::from_byte(*raw as u8), Some(*state));
        }
    }

    #[test]
    fn unknown_opcode_is_none_not_panic() {
        assert_eq!(State::from_byte(100), None);
    }
}
