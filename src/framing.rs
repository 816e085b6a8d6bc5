//! Binary framing primitives: the fixed-layout UDP packet header and the
//! length-prefixed JSON frame used on the control channel.
//!
//! Grounded on `iperf_data.py::Header` (`FORMAT32`/`FORMAT64`) and
//! `iperf_utils.py::json_send`/`json_recv`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::IperfError;

/// Current wall-clock time as seconds since the Unix epoch. Used both to
/// stamp outgoing UDP packet headers and to timestamp their receipt, so
/// sender and receiver (separate processes, possibly separate hosts) share
/// a common timeline for the transit/jitter computation in
/// [`crate::counters::Counters::process_header`].
pub fn wall_clock_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// `sec`/`usec`/`packet_count` packet header, in either the 32-bit or
/// 64-bit `packet_count` wire layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sec: i32,
    pub usec: i32,
    pub packet_count: i64,
}

impl PacketHeader {
    pub const LEN_32: usize = 12;
    pub const LEN_64: usize = 16;

    pub fn new(sec: i32, usec: i32, packet_count: i64) -> Self {
        Self {
            sec,
            usec,
            packet_count,
        }
    }

    /// Encode the header into the front of `buf` using the 32-bit
    /// `packet_count` layout (`!iii`).
    pub fn encode_32(&self, buf: &mut [u8]) -> Result<(), IperfError> {
        if buf.len() < Self::LEN_32 {
            return Err(IperfError::Framing("buffer shorter than 32-bit header".into()));
        }
        buf[0..4].copy_from_slice(&self.sec.to_be_bytes());
        buf[4..8].copy_from_slice(&self.usec.to_be_bytes());
        buf[8..12].copy_from_slice(&(self.packet_count as i32).to_be_bytes());
        Ok(())
    }

    pub fn decode_32(buf: &[u8]) -> Result<Self, IperfError> {
        if buf.len() < Self::LEN_32 {
            return Err(IperfError::Framing("short 32-bit packet header".into()));
        }
        let sec = i32::from_be_bytes(buf[0..4].try_into().unwrap());
        let usec = i32::from_be_bytes(buf[4..8].try_into().unwrap());
        let packet_count = i32::from_be_bytes(buf[8..12].try_into().unwrap()) as i64;
        Ok(Self {
            sec,
            usec,
            packet_count,
        })
    }

    /// Encode using the 64-bit `packet_count` layout (`!iil`): two 32-bit
    /// big-endian fields followed by one 64-bit big-endian field, fixed as
    /// big-endian matching the first two fields rather than a
    /// host-dependent layout.
    pub fn encode_64(&self, buf: &mut [u8]) -> Result<(), IperfError> {
        if buf.len() < Self::LEN_64 {
            return Err(IperfError::Framing("buffer shorter than 64-bit header".into()));
        }
        buf[0..4].copy_from_slice(&self.sec.to_be_bytes());
        buf[4..8].copy_from_slice(&self.usec.to_be_bytes());
        buf[8..16].copy_from_slice(&self.packet_count.to_be_bytes());
        Ok(())
    }

    pub fn decode_64(buf: &[u8]) -> Result<Self, IperfError> {
        if buf.len() < Self::LEN_64 {
            return Err(IperfError::Framing("short 64-bit packet header".into()));
        }
        let sec = i32::from_be_bytes(buf[0..4].try_into().unwrap());
        let usec = i32::from_be_bytes(buf[4..8].try_into().unwrap());
        let packet_count = i64::from_be_bytes(buf[8..16].try_into().unwrap());
        Ok(Self {
            sec,
            usec,
            packet_count,
        })
    }

    /// Encode using whichever layout `long_counters` selects, returning the
    /// number of bytes written.
    pub fn encode_into(&self, buf: &mut [u8], long_counters: bool) -> Result<usize, IperfError> {
        if long_counters {
            self.encode_64(buf)?;
            Ok(Self::LEN_64)
        } else {
            self.encode_32(buf)?;
            Ok(Self::LEN_32)
        }
    }

    pub fn decode(buf: &[u8], long_counters: bool) -> Result<Self, IperfError> {
        if long_counters {
            Self::decode_64(buf)
        } else {
            Self::decode_32(buf)
        }
    }

    pub fn wire_len(long_counters: bool) -> usize {
        if long_counters {
            Self::LEN_64
        } else {
            Self::LEN_32
        }
    }
}

/// Send a JSON value as a 4-byte big-endian length prefix followed by the
/// UTF-8 payload. A short write on either part is a framing failure.
pub async fn json_send<W, T>(writer: &mut W, value: &T) -> Result<(), IperfError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    let len = i32::try_from(payload.len())
        .map_err(|_| IperfError::Framing("JSON payload too large for i32 length prefix".into()))?;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(IperfError::Transport)?;
    writer
        .write_all(&payload)
        .await
        .map_err(IperfError::Transport)?;
    Ok(())
}

/// Receive a length-prefixed JSON value. Reads exactly 4 bytes for the
/// length, then exactly that many bytes for the payload; a short read at
/// either step is a framing failure, not a panic.
pub async fn json_recv<R, T>(reader: &mut R) -> Result<T, IperfError>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| to_framing_or_transport(e, "length prefix"))?;
    let len = i32::from_be_bytes(len_buf);
    if len < 0 {
        return Err(IperfError::Framing(format!("negative JSON length {len}")));
    }
    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| to_framing_or_transport(e, "JSON payload"))?;
    let value = serde_json::from_slice(&payload)?;
    Ok(value)
}

fn to_framing_or_transport(e: std::io::Error, what: &str) -> IperfError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        IperfError::Framing(format!("short read on {what}"))
    } else {
        IperfError::Transport(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Cursor;

    #[test]
    fn header_32_round_trips() {
        let h = PacketHeader::new(1_700_000_000, 123_456, 42);
        let mut buf = [0u8; PacketHeader::LEN_32];
        h.encode_32(&mut buf).unwrap();
        assert_eq!(PacketHeader::decode_32(&buf).unwrap(), h);
    }

    #[test]
    fn header_64_round_trips() {
        let h = PacketHeader::new(1_700_000_000, 999_999, 9_000_000_000);
        let mut buf = [0u8; PacketHeader::LEN_64];
        h.encode_64(&mut buf).unwrap();
        assert_eq!(PacketHeader::decode_64(&buf).unwrap(), h);
    }

    #[test]
    fn header_decode_rejects_short_buffer() {
        let buf = [0u8; 4];
        assert!(PacketHeader::decode_32(&buf).is_err());
        assert!(PacketHeader::decode_64(&buf).is_err());
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Demo {
        a: u32,
        b: String,
    }

    #[tokio::test]
    async fn json_frame_round_trips() {
        let value = Demo {
            a: 7,
            b: "hello".into(),
        };
        let mut buf = Vec::new();
        json_send(&mut buf, &value).await.unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded: Demo = json_recv(&mut cursor).await.unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn json_frame_truncated_prefix_is_framing_error_not_panic() {
        let mut cursor = Cursor::new(vec![0u8, 0u8]);
        let result: Result<Demo, _> = json_recv(&mut cursor).await;
        assert!(matches!(result, Err(IperfError::Framing(_))));
    }

    #[tokio::test]
    async fn json_frame_truncated_body_is_framing_error_not_panic() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&100i32.to_be_bytes());
        buf.extend_from_slice(b"short");
        let mut cursor = Cursor::new(buf);
        let result: Result<Demo, _> = json_recv(&mut cursor).await;
        assert!(matches!(result, Err(IperfError::Framing(_))));
    }
}
